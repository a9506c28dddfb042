use std::time::{Duration, SystemTime};

use crate::{
    error::{PanotourError, PanotourResult},
    geo::Coordinate,
};

/// Parameters for one directional-capture pass at a route point.
#[derive(Clone, Debug)]
pub struct CaptureSpec {
    /// Headings in stitch order.
    pub headings: Vec<u32>,
    /// Per-shot field of view in degrees.
    pub fov: u32,
    /// Requested tile width in pixels.
    pub width: u32,
    /// Requested tile height in pixels. Stitching requires square tiles, so
    /// this normally equals `width`.
    pub height: u32,
}

impl Default for CaptureSpec {
    fn default() -> Self {
        // Four cardinal shots at 90° FOV cover the full horizontal sweep.
        Self {
            headings: vec![0, 90, 180, 270],
            fov: 90,
            width: 512,
            height: 512,
        }
    }
}

impl CaptureSpec {
    pub fn validate(&self) -> PanotourResult<()> {
        if self.headings.is_empty() {
            return Err(PanotourError::validation(
                "capture requires at least one heading",
            ));
        }
        if self.fov == 0 || self.fov > 120 {
            return Err(PanotourError::validation(format!(
                "field of view {} outside supported range 1..=120",
                self.fov
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PanotourError::validation(
                "capture width/height must be non-zero",
            ));
        }
        Ok(())
    }
}

/// One fetch issued to the imagery provider.
#[derive(Clone, Debug)]
pub struct ImageryRequest {
    pub position: Coordinate,
    pub pano_id: String,
    pub heading: u32,
    pub fov: u32,
    pub width: u32,
    pub height: u32,
}

/// A captured directional still, bound to a route point.
///
/// `bytes` holds the provider's encoded image (JPEG in practice); ownership
/// transfers to the stitcher and the image is discardable afterwards.
#[derive(Clone, Debug)]
pub struct DirectionalImage {
    pub point_index: usize,
    pub heading: u32,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
    pub captured_at: SystemTime,
}

/// Seam to the street-level imagery collaborator.
pub trait ImageryProvider {
    fn fetch(&self, request: &ImageryRequest) -> PanotourResult<Vec<u8>>;
}

/// Fetch one still per heading for a route point, in spec order.
///
/// Any single failing fetch fails the whole call with
/// [`PanotourError::ImageFetchFailed`] naming the heading; retry and
/// partial-set policy live in the orchestrator, never here.
pub fn capture_directional_images(
    provider: &dyn ImageryProvider,
    position: Coordinate,
    pano_id: &str,
    point_index: usize,
    spec: &CaptureSpec,
) -> PanotourResult<Vec<DirectionalImage>> {
    spec.validate()?;

    let mut images = Vec::with_capacity(spec.headings.len());
    for &heading in &spec.headings {
        let request = ImageryRequest {
            position,
            pano_id: pano_id.to_string(),
            heading,
            fov: spec.fov,
            width: spec.width,
            height: spec.height,
        };
        let bytes = provider
            .fetch(&request)
            .map_err(|e| PanotourError::image_fetch(heading, e.to_string()))?;
        images.push(DirectionalImage {
            point_index,
            heading,
            width: spec.width,
            height: spec.height,
            bytes,
            captured_at: SystemTime::now(),
        });
    }

    Ok(images)
}

/// Street View Static API client over a blocking HTTP connection.
pub struct StreetViewProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl StreetViewProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://maps.googleapis.com/maps/api/streetview";

    pub fn new(api_key: impl Into<String>) -> PanotourResult<Self> {
        Self::with_base_url(Self::DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> PanotourResult<Self> {
        use anyhow::Context as _;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build imagery http client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn request_url(&self, request: &ImageryRequest) -> String {
        // Pitch is pinned to 0: the stitcher assumes horizon-level shots.
        format!(
            "{}?size={}x{}&pano={}&heading={}&pitch=0&fov={}&location={},{}&key={}",
            self.base_url,
            request.width,
            request.height,
            request.pano_id,
            request.heading,
            request.fov,
            request.position.lat,
            request.position.lng,
            self.api_key
        )
    }
}

impl ImageryProvider for StreetViewProvider {
    fn fetch(&self, request: &ImageryRequest) -> PanotourResult<Vec<u8>> {
        use anyhow::Context as _;
        let url = self.request_url(request);
        let response = self
            .client
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("imagery fetch for heading {}", request.heading))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("imagery body for heading {}", request.heading))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        fail_heading: Option<u32>,
    }

    impl ImageryProvider for StubProvider {
        fn fetch(&self, request: &ImageryRequest) -> PanotourResult<Vec<u8>> {
            if self.fail_heading == Some(request.heading) {
                return Err(PanotourError::validation("provider unavailable"));
            }
            Ok(vec![request.heading as u8; 8])
        }
    }

    #[test]
    fn captures_one_image_per_heading_in_spec_order() {
        let provider = StubProvider { fail_heading: None };
        let images = capture_directional_images(
            &provider,
            Coordinate::new(51.5, -0.1),
            "pano-1",
            7,
            &CaptureSpec::default(),
        )
        .unwrap();

        assert_eq!(images.len(), 4);
        let headings: Vec<u32> = images.iter().map(|i| i.heading).collect();
        assert_eq!(headings, vec![0, 90, 180, 270]);
        assert!(images.iter().all(|i| i.point_index == 7));
    }

    #[test]
    fn single_fetch_failure_names_the_heading() {
        let provider = StubProvider {
            fail_heading: Some(180),
        };
        let err = capture_directional_images(
            &provider,
            Coordinate::new(51.5, -0.1),
            "pano-1",
            0,
            &CaptureSpec::default(),
        )
        .unwrap_err();

        match err {
            PanotourError::ImageFetchFailed { heading, .. } => assert_eq!(heading, 180),
            other => panic!("expected ImageFetchFailed, got {other}"),
        }
    }

    #[test]
    fn spec_validation_catches_bad_values() {
        let mut spec = CaptureSpec::default();
        spec.headings.clear();
        assert!(spec.validate().is_err());

        let spec = CaptureSpec {
            fov: 0,
            ..CaptureSpec::default()
        };
        assert!(spec.validate().is_err());

        let spec = CaptureSpec {
            width: 0,
            ..CaptureSpec::default()
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn street_view_url_carries_all_fetch_parameters() {
        let provider = StreetViewProvider::with_base_url("http://localhost/sv", "k123").unwrap();
        let url = provider.request_url(&ImageryRequest {
            position: Coordinate::new(51.5, -0.1),
            pano_id: "abc".to_string(),
            heading: 270,
            fov: 90,
            width: 512,
            height: 512,
        });
        assert!(url.starts_with("http://localhost/sv?"));
        assert!(url.contains("size=512x512"));
        assert!(url.contains("pano=abc"));
        assert!(url.contains("heading=270"));
        assert!(url.contains("pitch=0"));
        assert!(url.contains("fov=90"));
        assert!(url.contains("key=k123"));
    }
}
