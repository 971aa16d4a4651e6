/// Result alias that carries the custom [`TrackAnimatorError`] type.
pub type Result<T> = std::result::Result<T, TrackAnimatorError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TrackAnimatorError {
    /// Free-form message surfaced to the user as-is.
    #[error("{0}")]
    Message(String),
    /// Caller supplied data that cannot be processed.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// No track with the given id is held by the store.
    #[error("unknown track `{0}`")]
    UnknownTrack(String),
    /// A second export was requested while one is still running.
    #[error("an export job is already in progress")]
    ExportInProgress,
    /// The remote encoder answered with a non-success status.
    #[error("encoder service returned {status}: {detail}")]
    Transport { status: u16, detail: String },
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TrackAnimatorError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for TrackAnimatorError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TrackAnimatorError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
