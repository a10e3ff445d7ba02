// crates/counsel-server/src/error.rs
// Standardized error types for Counsel

use thiserror::Error;

/// Main error type for the Counsel library
#[derive(Error, Debug)]
pub enum CounselError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("adapter error: {0}")]
    Adapter(#[from] crate::adapters::AdapterError),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("similarity job queue is full")]
    QueueFull,

    #[error("summary generation failed: {0}")]
    Summary(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using CounselError
pub type Result<T> = std::result::Result<T, CounselError>;

impl From<String> for CounselError {
    fn from(s: String) -> Self {
        CounselError::Other(s)
    }
}

impl From<tokio::task::JoinError> for CounselError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            CounselError::Cancelled
        } else {
            CounselError::Other(err.to_string())
        }
    }
}

impl From<CounselError> for String {
    fn from(err: CounselError) -> Self {
        err.to_string()
    }
}
