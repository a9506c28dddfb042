use std::time::Duration;

use crate::{
    error::{PanotourError, PanotourResult},
    route::RoutePoint,
};

/// Tick cadence for tour playback.
///
/// The scheduler itself never sleeps; the caller owns the clock and calls
/// [`TourScheduler::tick`] at whichever of these intervals applies. That
/// keeps playback deterministic under test.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerConfig {
    /// Interval between automatic advances while playing.
    pub playback_interval: Duration,
    /// Interval suggested for manual stepping.
    pub manual_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            playback_interval: Duration::from_millis(1500),
            manual_interval: Duration::from_millis(3000),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TourState {
    Idle,
    Playing,
    Paused,
    /// Terminal. A stopped scheduler is inert and must be recreated to run
    /// again.
    Stopped,
}

/// Drives timed progression through an ordered route point sequence.
///
/// `Idle -> Playing <-> Paused -> Stopped`; reaching the last point parks the
/// scheduler in `Paused` rather than `Stopped`, so the caller can still
/// request final actions (a last capture, an encode) before exiting.
#[derive(Debug)]
pub struct TourScheduler {
    cfg: SchedulerConfig,
    state: TourState,
    points: Vec<RoutePoint>,
    current: usize,
}

impl TourScheduler {
    pub fn new(cfg: SchedulerConfig) -> Self {
        Self {
            cfg,
            state: TourState::Idle,
            points: Vec::new(),
            current: 0,
        }
    }

    pub fn state(&self) -> TourState {
        self.state
    }

    pub fn points(&self) -> &[RoutePoint] {
        &self.points
    }

    /// The point the tour is currently parked on, once started.
    pub fn current_point(&self) -> Option<&RoutePoint> {
        if self.state == TourState::Idle {
            return None;
        }
        self.points.get(self.current)
    }

    /// Fraction of the route visited so far, 0.0..=1.0.
    pub fn progress(&self) -> f64 {
        if self.points.is_empty() || self.state == TourState::Idle {
            return 0.0;
        }
        (self.current + 1) as f64 / self.points.len() as f64
    }

    /// Interval until the next tick for the current mode.
    pub fn tick_interval(&self) -> Duration {
        match self.state {
            TourState::Playing => self.cfg.playback_interval,
            _ => self.cfg.manual_interval,
        }
    }

    /// Begin playback from the first point. Only valid from `Idle`.
    pub fn start(&mut self, points: Vec<RoutePoint>) -> PanotourResult<&RoutePoint> {
        if self.state != TourState::Idle {
            return Err(PanotourError::validation(format!(
                "scheduler cannot start from {:?}",
                self.state
            )));
        }
        if points.is_empty() {
            return Err(PanotourError::empty_route(
                "cannot start a tour with zero route points",
            ));
        }
        self.points = points;
        self.current = 0;
        self.state = TourState::Playing;
        Ok(&self.points[0])
    }

    /// Advance one point if playing.
    ///
    /// Returns the newly current point, or `None` when no advance happened.
    /// Reaching the last point transitions to `Paused` (the tour ends
    /// naturally without forcing `Stopped`).
    pub fn tick(&mut self) -> Option<&RoutePoint> {
        if self.state != TourState::Playing {
            return None;
        }
        if self.current + 1 >= self.points.len() {
            self.state = TourState::Paused;
            return None;
        }
        self.current += 1;
        Some(&self.points[self.current])
    }

    pub fn pause(&mut self) {
        if self.state == TourState::Playing {
            self.state = TourState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == TourState::Paused {
            self.state = TourState::Playing;
        }
    }

    /// Halt from any state. Terminal.
    pub fn stop(&mut self) {
        self.state = TourState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    fn points(n: usize) -> Vec<RoutePoint> {
        (0..n)
            .map(|i| RoutePoint {
                index: i,
                coord: Coordinate::new(i as f64, i as f64),
            })
            .collect()
    }

    #[test]
    fn start_requires_idle_and_nonempty_points() {
        let mut s = TourScheduler::new(SchedulerConfig::default());
        assert!(matches!(
            s.start(vec![]),
            Err(PanotourError::EmptyRoute(_))
        ));

        let first = s.start(points(3)).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(s.state(), TourState::Playing);

        assert!(s.start(points(3)).is_err());
    }

    #[test]
    fn tick_walks_the_route_then_parks_in_paused() {
        let mut s = TourScheduler::new(SchedulerConfig::default());
        s.start(points(3)).unwrap();

        assert_eq!(s.tick().unwrap().index, 1);
        assert_eq!(s.tick().unwrap().index, 2);
        // At the last point: no advance, natural end.
        assert!(s.tick().is_none());
        assert_eq!(s.state(), TourState::Paused);
        // Final point is still current so the caller can act on it.
        assert_eq!(s.current_point().unwrap().index, 2);
        assert!((s.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pause_and_resume_toggle_only_between_play_states() {
        let mut s = TourScheduler::new(SchedulerConfig::default());

        // No-ops while idle.
        s.pause();
        s.resume();
        assert_eq!(s.state(), TourState::Idle);

        s.start(points(5)).unwrap();
        s.pause();
        assert_eq!(s.state(), TourState::Paused);
        assert!(s.tick().is_none());

        s.resume();
        assert_eq!(s.state(), TourState::Playing);
        assert_eq!(s.tick().unwrap().index, 1);
    }

    #[test]
    fn stop_is_terminal_from_any_state() {
        let mut s = TourScheduler::new(SchedulerConfig::default());
        s.start(points(5)).unwrap();
        s.tick();
        s.stop();
        assert_eq!(s.state(), TourState::Stopped);
        assert!(s.tick().is_none());
        s.resume();
        assert_eq!(s.state(), TourState::Stopped);
    }

    #[test]
    fn tick_interval_follows_mode() {
        let cfg = SchedulerConfig {
            playback_interval: Duration::from_millis(100),
            manual_interval: Duration::from_millis(200),
        };
        let mut s = TourScheduler::new(cfg);
        assert_eq!(s.tick_interval(), cfg.manual_interval);
        s.start(points(2)).unwrap();
        assert_eq!(s.tick_interval(), cfg.playback_interval);
        s.pause();
        assert_eq!(s.tick_interval(), cfg.manual_interval);
    }
}
