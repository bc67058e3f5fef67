use std::time::Duration;

use thiserror::Error;

/// Failure modes of a chat turn, from the inbound request through to
/// persisting the reply.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("thread {0} not found")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("no fragment received from upstream within {0:?}")]
    UpstreamTimeout(Duration),

    /// Never surfaced to the caller, the offending frame is skipped.
    #[error("malformed fragment: {0}")]
    MalformedFragment(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("caller disconnected")]
    Disconnected,
}

impl From<tokio_rusqlite::Error> for ChatError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

impl From<rusqlite::Error> for ChatError {
    fn from(err: rusqlite::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}
