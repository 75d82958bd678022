//! Errors that can occur while reading or writing engagement records.
use thiserror::Error;

/// Represents errors that can occur within the engagement repository.
///
/// `Conflict` is the only variant callers are expected to retry: it means a
/// compare-and-swap lost against a concurrent writer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Invalid vote type: {0}")]
    InvalidVoteType(i16),

    #[error("Invalid counter value: {0}")]
    InvalidCounter(i64),
}

impl RepositoryError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
