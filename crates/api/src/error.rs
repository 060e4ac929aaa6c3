//! Error type shared by the vendor API clients.

use thiserror::Error;

/// Errors surfaced by vendor API calls.
///
/// `Status` bodies are pre-redacted, bounded excerpts: handlers embed them
/// verbatim in workflow log details.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with an unexpected HTTP status.
    #[error("{status} - {body}")]
    Status { status: u16, body: String },
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body did not decode into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// A client could not be constructed from the supplied parameters.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

pub type ApiResult<T> = Result<T, ApiError>;
