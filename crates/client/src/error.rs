use domain::DomainError;
use thiserror::Error;

/// 客户端错误
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no transport could be established: {0}")]
    NoTransport(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected http status: {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Domain(#[from] DomainError),
    #[error("conversation session closed")]
    SessionClosed,
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}
