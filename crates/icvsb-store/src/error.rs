//! Store-level error type. Kept separate from `sqlx::Error` so callers
//! outside this crate don't need to depend on `sqlx` directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
