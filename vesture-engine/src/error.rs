//! Error types for the engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while applying appearance state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A capability provider rejected or failed a call.
    #[error("provider error ({category}): {message}")]
    Provider {
        category: &'static str,
        message: String,
    },

    /// Content resolution/fetching failed.
    #[error("content error: {0}")]
    Content(String),

    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,

    /// The attempt was superseded or the session disposed.
    #[error("cancelled")]
    Cancelled,

    /// The target entity went away for good mid-operation.
    #[error("target entity invalidated")]
    EntityInvalid,
}

impl EngineError {
    /// Shorthand for a provider failure.
    pub fn provider(category: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            category,
            message: message.into(),
        }
    }
}
