//! Error types for the session engine.

/// Errors produced while sharing or retrieving a file.
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    /// Token is missing or does not resolve to an active session
    #[error("invalid or missing token")]
    InvalidToken,

    /// Client exceeded its upload allowance for the current window
    #[error("rate limit exceeded: max {limit} uploads per {window_secs}s")]
    RateLimited { limit: u32, window_secs: u64 },

    /// Extension or MIME type is not on the whitelist
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// Request body or extracted file is larger than allowed
    #[error("payload too large: maximum is {max} bytes")]
    PayloadTooLarge { max: u64 },

    /// Body could not be parsed as a single-file multipart upload
    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),

    /// Connecting to or reading from an ephemeral endpoint failed
    #[error("transfer failed: {0}")]
    TransferIo(#[source] std::io::Error),

    /// Persisting or deleting a stored upload failed
    #[error("storage failure: {0}")]
    StorageIo(#[source] std::io::Error),
}

/// I/O error for a socket step that exceeded its deadline
pub(crate) fn timed_out(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::TimedOut, format!("{} timed out", what))
}

/// Result type alias for session engine operations
pub type ShareResult<T> = Result<T, ShareError>;
