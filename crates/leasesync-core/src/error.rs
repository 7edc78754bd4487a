//! Error types for leasesync

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Invalid change ids: {}", .0.join(", "))]
    InvalidChangeIds(Vec<String>),

    #[error("Changes for session {0} are already being applied")]
    ApplyInProgress(Uuid),

    #[error("{0}")]
    Apply(String),
}

pub type Result<T> = std::result::Result<T, Error>;
