use std::thread;

use crate::{
    capture::{CaptureSpec, DirectionalImage, ImageryProvider, capture_directional_images},
    encode::{EncodeConfig, EncodedVideo, default_mp4_config, encode_tour_video},
    error::{PanotourError, PanotourResult},
    route::RoutePoint,
    scheduler::{SchedulerConfig, TourScheduler},
    stitch::{Panorama, StitchConfig, stitch_panorama},
};

/// What to do when a waypoint's directional capture fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureFailurePolicy {
    /// Log and omit the waypoint from the stitched sequence.
    Skip,
    /// Retry the full capture once, then skip.
    Retry,
    /// Keep whatever headings succeeded and stitch with gray fill tiles.
    BlankTile,
}

#[derive(Clone, Debug)]
pub struct TourConfig {
    pub scheduler: SchedulerConfig,
    pub capture: CaptureSpec,
    pub stitch: StitchConfig,
    pub encode: EncodeConfig,
    pub on_capture_failure: CaptureFailurePolicy,
}

impl TourConfig {
    pub fn new(out_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            capture: CaptureSpec::default(),
            stitch: StitchConfig::default(),
            encode: default_mp4_config(out_path),
            on_capture_failure: CaptureFailurePolicy::Skip,
        }
    }

    pub fn validate(&self) -> PanotourResult<()> {
        self.capture.validate()?;
        self.encode.validate()?;
        if self.stitch.expected_headings != self.capture.headings {
            return Err(PanotourError::validation(
                "stitch heading order must match capture heading order",
            ));
        }
        Ok(())
    }
}

/// Mutable aggregate state for one tour.
///
/// Panoramas are appended strictly in route-point order; no point index is
/// ever stitched twice within a session.
#[derive(Debug, Default)]
pub struct TourSession {
    pub panoramas: Vec<Panorama>,
    pub video: Option<EncodedVideo>,
}

/// Handle to an encode running on a worker thread.
///
/// Survives orchestrator exit, so a result that completes after the tour
/// closes is still deliverable to the caller.
pub struct EncodeJob {
    handle: thread::JoinHandle<PanotourResult<EncodedVideo>>,
}

impl EncodeJob {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> PanotourResult<EncodedVideo> {
        self.handle
            .join()
            .map_err(|_| PanotourError::encoding("encode worker panicked"))?
    }
}

/// Everything handed back when a tour exits.
pub struct TourExit {
    pub panoramas: Vec<Panorama>,
    pub video: Option<EncodedVideo>,
    pub pending_encode: Option<EncodeJob>,
}

/// Composes scheduler, capture, stitcher and encoder into a tour session.
///
/// The caller drives the clock: each [`tick`](Self::tick) advances the
/// scheduler and captures + stitches the newly current waypoint. Encoding is
/// requested explicitly, runs on a worker thread over a snapshot of the
/// accumulated panoramas, and never terminates the session; a later request
/// re-encodes the full (longer) sequence from scratch.
pub struct TourOrchestrator<P: ImageryProvider> {
    provider: P,
    cfg: TourConfig,
    scheduler: TourScheduler,
    session: TourSession,
    pending: Option<EncodeJob>,
    // A background encode failure collected during tick, held for the next
    // poll_video call.
    pending_error: Option<PanotourError>,
}

impl<P: ImageryProvider> TourOrchestrator<P> {
    pub fn new(provider: P, cfg: TourConfig) -> PanotourResult<Self> {
        cfg.validate()?;
        let scheduler = TourScheduler::new(cfg.scheduler);
        Ok(Self {
            provider,
            cfg,
            scheduler,
            session: TourSession::default(),
            pending: None,
            pending_error: None,
        })
    }

    pub fn session(&self) -> &TourSession {
        &self.session
    }

    pub fn scheduler(&self) -> &TourScheduler {
        &self.scheduler
    }

    /// Begin the tour and capture the first waypoint.
    pub fn start(&mut self, points: Vec<RoutePoint>) -> PanotourResult<()> {
        let first = *self.scheduler.start(points)?;
        self.capture_waypoint(&first);
        Ok(())
    }

    /// Advance one waypoint if playing; capture + stitch the new position.
    ///
    /// Returns the index of the newly toured point, or `None` when nothing
    /// advanced (paused, stopped, or natural end of route). Also collects a
    /// finished background encode into the session, holding a failed
    /// attempt's error for the next [`poll_video`](Self::poll_video) call.
    pub fn tick(&mut self) -> Option<usize> {
        self.collect_finished_encode();

        let point = *self.scheduler.tick()?;
        self.capture_waypoint(&point);
        Some(point.index)
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    /// Halt the scheduler. Any encode in flight keeps running; its result is
    /// retrievable via [`poll_video`](Self::poll_video) or [`exit`](Self::exit).
    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    /// Kick off an encode of the accumulated panorama snapshot on a worker
    /// thread. One encode at a time; the scheduler stays responsive.
    pub fn request_encode(&mut self) -> PanotourResult<()> {
        if self.pending.is_some() {
            return Err(PanotourError::validation(
                "an encode is already in flight for this session",
            ));
        }
        // Stable snapshot: ticks may keep appending while the worker reads.
        let frames = self.session.panoramas.clone();
        let cfg = self.cfg.encode.clone();
        tracing::debug!(frames = frames.len(), "starting background encode");
        let handle = thread::spawn(move || encode_tour_video(&frames, &cfg));
        self.pending = Some(EncodeJob { handle });
        Ok(())
    }

    /// Collect a finished background encode, if any.
    ///
    /// `Ok(Some(_))` hands back the session's latest video. A failed attempt
    /// surfaces its `EncodingFailed` here exactly once; the captured frames
    /// stay intact and a fresh [`request_encode`](Self::request_encode) may
    /// be retried.
    pub fn poll_video(&mut self) -> PanotourResult<Option<&EncodedVideo>> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if let Some(job) = self.pending.take() {
            if job.is_finished() {
                let video = job.join()?;
                self.session.video = Some(video);
            } else {
                self.pending = Some(job);
            }
        }
        Ok(self.session.video.as_ref())
    }

    /// Encode synchronously: request, wait, and return the finished video.
    pub fn generate_video(&mut self) -> PanotourResult<&EncodedVideo> {
        self.request_encode()?;
        let job = self
            .pending
            .take()
            .ok_or_else(|| PanotourError::encoding("encode job vanished before join"))?;
        let video = job.join()?;
        self.session.video = Some(video);
        self.session
            .video
            .as_ref()
            .ok_or_else(|| PanotourError::encoding("encoded video missing after join"))
    }

    /// Stop the scheduler and hand the session's contents to the caller,
    /// including the handle of a still-running encode.
    pub fn exit(mut self) -> TourExit {
        self.scheduler.stop();
        TourExit {
            panoramas: self.session.panoramas,
            video: self.session.video,
            pending_encode: self.pending,
        }
    }

    fn collect_finished_encode(&mut self) {
        if self.pending.as_ref().is_some_and(|job| job.is_finished()) {
            if let Some(job) = self.pending.take() {
                match job.join() {
                    Ok(video) => {
                        tracing::debug!(path = %video.path.display(), "background encode finished");
                        self.session.video = Some(video);
                    }
                    Err(e) => {
                        // Held for the next poll; frames stay intact for a
                        // retry.
                        tracing::warn!(error = %e, "background encode failed");
                        self.pending_error = Some(e);
                    }
                }
            }
        }
    }

    fn capture_waypoint(&mut self, point: &RoutePoint) {
        if self
            .session
            .panoramas
            .last()
            .is_some_and(|p| p.point_index >= point.index)
        {
            // Already stitched (or out of order); never stitch an index twice.
            return;
        }

        match self.capture_and_stitch(point) {
            Ok(panorama) => self.session.panoramas.push(panorama),
            Err(e) => {
                // Skipped waypoints are omitted from the sequence, logged but
                // never surfaced mid-tour.
                tracing::warn!(index = point.index, error = %e, "skipping waypoint");
            }
        }
    }

    fn capture_and_stitch(&self, point: &RoutePoint) -> PanotourResult<Panorama> {
        match self.cfg.on_capture_failure {
            CaptureFailurePolicy::Skip => {
                let images = self.capture_all(point)?;
                stitch_panorama(&images, &self.cfg.stitch)
            }
            CaptureFailurePolicy::Retry => {
                let images = match self.capture_all(point) {
                    Ok(images) => images,
                    Err(first_err) => {
                        tracing::debug!(index = point.index, error = %first_err, "retrying capture");
                        self.capture_all(point)?
                    }
                };
                stitch_panorama(&images, &self.cfg.stitch)
            }
            CaptureFailurePolicy::BlankTile => {
                let mut images = Vec::with_capacity(self.cfg.capture.headings.len());
                for &heading in &self.cfg.capture.headings {
                    let spec = CaptureSpec {
                        headings: vec![heading],
                        ..self.cfg.capture.clone()
                    };
                    match capture_directional_images(
                        &self.provider,
                        point.coord,
                        "",
                        point.index,
                        &spec,
                    ) {
                        Ok(mut fetched) => images.append(&mut fetched),
                        Err(e) => {
                            tracing::debug!(index = point.index, heading, error = %e, "filling blank tile");
                        }
                    }
                }
                if images.is_empty() {
                    // Every heading failed. Seed one gray tile so the fill
                    // policy still yields an all-gray panorama and the
                    // waypoint keeps its slot in the sequence.
                    images.push(self.blank_tile(point)?);
                }
                let cfg = StitchConfig {
                    fill_missing: true,
                    ..self.cfg.stitch.clone()
                };
                stitch_panorama(&images, &cfg)
            }
        }
    }

    fn capture_all(&self, point: &RoutePoint) -> PanotourResult<Vec<DirectionalImage>> {
        capture_directional_images(
            &self.provider,
            point.coord,
            "",
            point.index,
            &self.cfg.capture,
        )
    }

    /// A uniform gray stand-in tile for the first expected heading, matching
    /// the stitcher's fill color.
    fn blank_tile(&self, point: &RoutePoint) -> PanotourResult<DirectionalImage> {
        use anyhow::Context as _;
        use image::ImageEncoder as _;

        let size = self.cfg.capture.width;
        let tile = image::RgbImage::from_pixel(size, size, image::Rgb([128, 128, 128]));
        let mut bytes = Vec::new();
        let quality = self.cfg.stitch.jpeg_quality.clamp(1, 100);
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
        encoder
            .write_image(tile.as_raw(), size, size, image::ExtendedColorType::Rgb8)
            .context("encode blank stand-in tile")?;
        Ok(DirectionalImage {
            point_index: point.index,
            heading: self.cfg.capture.headings[0],
            width: size,
            height: size,
            bytes,
            captured_at: std::time::SystemTime::now(),
        })
    }
}
