use std::time::Duration;
use thiserror::Error;

/// Failure of a single analysis call. Never cached.
///
/// `Clone` so one outcome can be handed to every caller waiting on the same
/// in-flight request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("Vision API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Vision API returned an empty body")]
    EmptyBody,

    #[error("Malformed vision API response: {0}")]
    Malformed(String),

    #[error("Vision API request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Vision API request failed: {0}")]
    Transport(String),

    #[error("Vision client configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Whether the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::Timeout(_) | AnalysisError::Transport(_) => true,
            AnalysisError::Status { status, .. } => *status == 429 || *status >= 500,
            AnalysisError::EmptyBody | AnalysisError::Malformed(_) | AnalysisError::Config(_) => {
                false
            }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AnalysisError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
