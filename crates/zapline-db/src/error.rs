//! Database error types

use thiserror::Error;
use zapline_core::CoreError;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    Conflict(String),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<sea_orm::DbErr> for DatabaseError {
    fn from(err: sea_orm::DbErr) -> Self {
        let text = err.to_string();
        if text.contains("duplicate key") || text.contains("UNIQUE constraint") {
            DatabaseError::Conflict(text)
        } else {
            DatabaseError::QueryError(text)
        }
    }
}

impl From<DatabaseError> for CoreError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => CoreError::not_found("record".to_string(), msg),
            DatabaseError::Conflict(msg) => CoreError::conflict(msg),
            other => CoreError::storage(other.to_string()),
        }
    }
}
