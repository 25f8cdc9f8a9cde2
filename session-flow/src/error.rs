use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
