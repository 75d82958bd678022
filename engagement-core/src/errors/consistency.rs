//! Error types for the consistency checker.
use engagement_repository::RepositoryError;
use thiserror::Error;

/// Represents errors that abort a reconciliation pass.
///
/// Failures on individual targets do not abort the pass; they are reported
/// in the pass's `ReconcileReport` instead.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
