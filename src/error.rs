use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// `analyze` was called without a buffer.
    #[error("missing buffer")]
    MissingBuffer,
    #[error("invalid buffer: {reason}")]
    InvalidBuffer { reason: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out after {elapsed_ms} ms")]
    TimedOut { elapsed_ms: u128 },
    #[error("spectrum estimator failed: {reason}")]
    Estimator { reason: String },
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid_buffer(reason: impl Into<String>) -> Self {
        EngineError::InvalidBuffer {
            reason: reason.into(),
        }
    }

    /// Errors that must abort a whole analysis rather than degrade one step.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, EngineError::Cancelled | EngineError::TimedOut { .. })
    }
}
