use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the media → embedding → similarity pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode media: {0}")]
    MediaDecode(String),

    #[error("video has only {available} frames, but {requested} frames were requested")]
    InsufficientFrames { available: usize, requested: usize },

    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("no face detected in any sampled frame")]
    EmptyBatch,

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The detector session failed to run.
    #[error("face model failed: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::MediaDecode(err.to_string())
    }
}
