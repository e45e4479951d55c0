//! Error types for the matrix HTTP clients

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the build service, the blob
/// service or a deployed application
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server returned an error status code
    #[error("API error (status {status}{}): {message}", .code.as_deref().map(|c| format!(", {}", c)).unwrap_or_default())]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Service error code (x-ms-error-code for the blob service)
        code: Option<String>,
        /// Error body returned by the server
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local file error while streaming a response to disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Service error code, if the server sent one
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::ApiError { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(status) if status >= 500)
    }

    /// Check if retrying the same request may succeed
    ///
    /// Connection failures, timeouts, throttling and 5xx responses are
    /// transient. Everything else is a real answer from the server.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            Self::ApiError { status, .. } => matches!(status, 408 | 429) || *status >= 500,
            _ => false,
        }
    }
}
