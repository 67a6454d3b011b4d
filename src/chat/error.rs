//! Error taxonomy shared by the query service and the stream bridge.

use thiserror::Error;

use crate::llm::error::BackendError;

/// Chat error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request was rejected before reaching the store or the backend.
    #[error("{0}")]
    Validation(String),
    /// The backend cannot serve requests until it is configured.
    #[error("service configuration error: {0}")]
    Configuration(String),
    /// The backend call failed.
    #[error("failed to generate response: {0}")]
    Backend(BackendError),
    /// The requested conversation does not exist.
    #[error("conversation {0} not found")]
    NotFound(String),
    /// A worker failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<BackendError> for ChatError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotConfigured(message) => Self::Configuration(message),
            other => Self::Backend(other),
        }
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
