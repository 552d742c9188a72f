use std::time::Duration;

use thiserror::Error;

use crate::media::ValidationError;

/// Everything that can end a detection request early.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Pipeline(#[from] deepcheck_vision::Error),

    #[error("request storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("processing did not finish within {0:?}")]
    Timeout(Duration),

    #[error("processing task failed: {0}")]
    Worker(String),
}

impl DetectError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, DetectError::Validation(_))
    }

    pub fn title(&self) -> &'static str {
        match self {
            DetectError::Validation(v) => v.title(),
            _ => "Server error",
        }
    }
}
