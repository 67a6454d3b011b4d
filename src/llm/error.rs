//! Errors produced by generation backends.

use thiserror::Error;

/// Generation backend error type.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend has no credentials or model configured.
    #[error("generation backend is not configured: {0}")]
    NotConfigured(String),
    /// Invalid backend settings.
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),
    /// HTTP client error when using the blocking client.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// HTTP response was not a success.
    #[error("backend http status {status}: {body}")]
    HttpStatus {
        /// Status code returned by the backend.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
    /// The backend reported an error inside a successful response.
    #[error("backend error: {0}")]
    Api(String),
    /// I/O failure while reading a streamed response.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The backend produced no text at all.
    #[error("backend returned an empty response")]
    EmptyResponse,
}

/// Convenience result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = BackendError::HttpStatus {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.to_string(), "backend http status 429: slow down");
        assert_eq!(
            BackendError::Api("response blocked: SAFETY".to_string()).to_string(),
            "backend error: response blocked: SAFETY"
        );
    }
}
