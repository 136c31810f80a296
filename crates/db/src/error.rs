//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("row already exists")]
    AlreadyExists,

    /// A conditional status update found the row in a status it was not
    /// allowed to transition from.
    #[error("status conflict: row is '{current}'")]
    StatusConflict { current: String },

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
