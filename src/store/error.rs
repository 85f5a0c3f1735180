//! Store error taxonomy

use thiserror::Error;

/// Errors surfaced by a [`TaskStore`](super::TaskStore) implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// The referenced row does not exist (or is not in the given project)
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness or referential constraint rejected the write
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// The request was structurally invalid (e.g. unknown temporary id)
    #[error("invalid request: {0}")]
    Validation(String),

    /// Underlying SQLite failure
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// The blocking worker running the query panicked or was cancelled
    #[error("store worker failed: {0}")]
    Worker(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("row".to_string()),
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
