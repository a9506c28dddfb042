pub type PanotourResult<T> = Result<T, PanotourError>;

#[derive(thiserror::Error, Debug)]
pub enum PanotourError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("empty route: {0}")]
    EmptyRoute(String),

    #[error("image fetch failed at heading {heading}: {reason}")]
    ImageFetchFailed { heading: u32, reason: String },

    #[error("incomplete capture: {0}")]
    IncompleteCapture(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PanotourError {
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    pub fn empty_route(msg: impl Into<String>) -> Self {
        Self::EmptyRoute(msg.into())
    }

    pub fn image_fetch(heading: u32, reason: impl Into<String>) -> Self {
        Self::ImageFetchFailed {
            heading,
            reason: reason.into(),
        }
    }

    pub fn incomplete_capture(msg: impl Into<String>) -> Self {
        Self::IncompleteCapture(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
