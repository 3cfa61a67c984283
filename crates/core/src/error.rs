//! Unified error types for seamcache.
//!
//! Every variant renders with a stable code prefix so log lines can be
//! grepped by failure class.

use tokio_rusqlite::rusqlite;

/// Unified error type for the cache store, the network layer and the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input (malformed control message, bad header value, ...).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded back into a response.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure: DNS, connect, TLS, reset, timeout.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// A manifest fetch resolved with a non-success status.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The install step failed; the new version must not go live.
    #[error("INSTALL_FAILED: {0}")]
    InstallFailed(String),
}

impl Error {
    /// Whether the error came from the transport rather than the cache.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::FetchTooLarge(_) | Error::HttpError(_) | Error::InvalidUrl(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
