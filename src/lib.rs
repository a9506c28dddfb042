//! Panotour turns a computed geographic route into a navigable 360° video
//! tour.
//!
//! The pipeline, leaf to root:
//!
//! - [`geo`] / [`route`]: boundary containment and route-point extraction
//!   (polyline decoding, waypoint sequencing)
//! - [`scheduler`]: deterministic play/pause/advance/stop state machine
//!   driven by an external tick source
//! - [`capture`]: directional street-level stills behind an
//!   [`ImageryProvider`] seam
//! - [`stitch`]: four cardinal shots composited into one equirectangular
//!   JPEG per waypoint
//! - [`encode`]: the panorama sequence encoded to H.264/MP4 with both
//!   spherical metadata tag families (requires `ffmpeg` on PATH)
//! - [`tour`]: the session orchestrator composing all of the above
#![forbid(unsafe_code)]

pub mod capture;
pub mod encode;
pub mod error;
pub mod geo;
pub mod route;
pub mod scheduler;
pub mod stitch;
pub mod tour;

pub use capture::{
    CaptureSpec, DirectionalImage, ImageryProvider, ImageryRequest, StreetViewProvider,
    capture_directional_images,
};
pub use encode::{
    EncodeConfig, EncodedVideo, default_mp4_config, encode_tour_video, is_ffmpeg_on_path,
    spherical_tag_set,
};
pub use error::{PanotourError, PanotourResult};
pub use geo::{Coordinate, Polygon};
pub use route::{RoutePoint, RouteResponse, decode_polyline, extract_route_points};
pub use scheduler::{SchedulerConfig, TourScheduler, TourState};
pub use stitch::{Panorama, StitchConfig, stitch_panorama};
pub use tour::{
    CaptureFailurePolicy, EncodeJob, TourConfig, TourExit, TourOrchestrator, TourSession,
};
