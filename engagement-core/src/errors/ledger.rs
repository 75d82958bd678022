//! Error types for the vote ledger.
use engagement_repository::RepositoryError;
use engagement_shared::types::TargetRef;
use thiserror::Error;

/// Represents errors that can occur while casting or reading a vote.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Target not found: {0}")]
    NotFound(TargetRef),

    #[error("Vote on {target} kept conflicting after {attempts} attempts")]
    Conflict { target: TargetRef, attempts: usize },

    #[error("Timed out waiting for the vote lock on {0}")]
    LockTimeout(TargetRef),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
