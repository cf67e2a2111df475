use thiserror::Error;

/// Every failure a pipeline stage can surface to its caller.
///
/// No stage recovers silently: a failed generation or regeneration leaves
/// the stored menu exactly as it was.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("completion timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("rate limited by provider, retry after {retry_after_secs:?} seconds")]
    RateLimit { retry_after_secs: Option<u64> },

    #[error("could not decode completion at '{path}': {reason}")]
    Decode { path: String, reason: String },

    #[error("index {index} out of range for {list} (len {len})")]
    IndexOutOfRange {
        list: String,
        index: usize,
        len: usize,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn decode(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured budget back to us
            PipelineError::Timeout { secs: 0 }
        } else {
            PipelineError::Network(err.to_string())
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
