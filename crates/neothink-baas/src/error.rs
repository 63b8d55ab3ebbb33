//! Error types for BaaS access.

use thiserror::Error;

/// Result type for BaaS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by table and auth calls.
///
/// An empty result is never an error: queries that match nothing return
/// `Ok(vec![])`.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The BaaS answered with a non-success status.
    #[error("BaaS returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A row or response body did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid credentials or access token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The auth service refused the request (duplicate user, weak password, ...).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// The backend does not implement the operation.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
