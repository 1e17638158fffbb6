//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Adapter could not be constructed. Never retried.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Access token could not be obtained.
    #[error("authorization failed: {0}")]
    Unauthorized(String),

    /// File not found in storage.
    #[error("file not found: {key}")]
    NotFound {
        /// Identifier that was not found.
        key: String,
    },

    /// Backend or transport failure.
    #[error("{operation} failed: {message}")]
    Backend {
        /// Operation that failed.
        operation: &'static str,
        /// Backend error message.
        message: String,
        /// Whether repeating the call may succeed.
        transient: bool,
    },

    /// Storage API answered with a non-success HTTP status.
    #[error("{operation} failed with HTTP {status}: {body}")]
    Http {
        /// Operation that failed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the server.
        body: String,
    },

    /// Storage API answered 200 but reported a non-OK status.
    #[error("{operation} rejected: {message}")]
    Rejected {
        /// Operation that failed.
        operation: &'static str,
        /// Message from the response envelope.
        message: String,
    },

    /// Payload could not be encoded or decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Presign operation not supported by provider.
    #[error("presign operation not supported by storage provider")]
    PresignNotSupported,

    /// Local I/O failure (source stream or download destination).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an unauthorized error.
    #[must_use]
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a backend error.
    #[must_use]
    pub fn backend(operation: &'static str, msg: impl Into<String>, transient: bool) -> Self {
        Self::Backend {
            operation,
            message: msg.into(),
            transient,
        }
    }

    /// Create an invalid payload error.
    #[must_use]
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Map an OpenDAL error raised while running `operation` on `key`.
    #[must_use]
    pub fn opendal(operation: &'static str, key: &str, err: &opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::not_found(key),
            opendal::ErrorKind::Unsupported if operation == "presign" => Self::PresignNotSupported,
            opendal::ErrorKind::PermissionDenied => Self::unauthorized(err.to_string()),
            _ => Self::backend(operation, err.to_string(), err.is_temporary()),
        }
    }

    /// Map a transport error raised while running `operation`.
    #[must_use]
    pub fn request(operation: &'static str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Http {
                operation,
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            return Self::invalid_payload(format!("{operation}: {err}"));
        }
        let transient = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        Self::backend(operation, err.to_string(), transient)
    }

    /// Returns true if repeating the call may succeed.
    ///
    /// Timeouts, connection failures, 5xx, 408 and 429 are transient. Client
    /// errors, logical rejections and bad payloads are permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { transient, .. } => *transient,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            Self::Configuration(_)
            | Self::Unauthorized(_)
            | Self::NotFound { .. }
            | Self::Rejected { .. }
            | Self::InvalidPayload(_)
            | Self::PresignNotSupported => false,
        }
    }
}
