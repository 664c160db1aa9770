//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for stagehand_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => stagehand_core::Error::NotFound(msg),
            DbError::Conflict(msg) => stagehand_core::Error::Conflict(msg),
            other => stagehand_core::Error::Store(other.to_string()),
        }
    }
}
