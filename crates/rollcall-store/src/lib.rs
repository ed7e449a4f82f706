//! Persistence layer for rollcall
//!
//! Provides:
//! - The `SessionStore` collaborator trait the engine is written against
//! - Audit log (append-only)
//! - A SQLite implementation with subjects, sessions and audit tables

mod audit;
mod sqlite;
mod traits;

pub use audit::*;
pub use sqlite::*;
pub use traits::*;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A write lost a race against another writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage is busy or unreachable
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StoreError::Conflict(e.to_string()),
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
