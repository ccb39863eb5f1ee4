use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Server rejected request: {0}")]
    Server(String),
    #[error("Precondition failed: {0}")]
    Precondition(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("apply aborted at event {event_id} after {applied} applied: {message}")]
    ApplyAborted {
        event_id: String,
        applied: usize,
        message: String,
    },
}
