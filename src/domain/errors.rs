use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Outbox event {id} exhausted its retries ({retries})")]
    ExhaustedRetries { id: i64, retries: i32 },
    #[error("Outbox event {id} is no longer claimed by this publisher")]
    ClaimLost { id: i64 },
}
