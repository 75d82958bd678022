//! Errors surfaced to callers of the engagement service.
use thiserror::Error;

use crate::errors::{ConsistencyError, LedgerError, ProjectorError};

/// Errors returned by `EngagementService`.
///
/// `NotFound` and `InvalidInput` are client errors and must not be retried.
/// `Transient` covers exhausted conflict retries and storage failures.
#[derive(Debug, Error)]
pub enum EngagementError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transient error: {0}")]
    Transient(String),
}

impl EngagementError {
    /// Whether the caller sent a request that can never succeed as is.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::InvalidInput(_))
    }
}

impl From<LedgerError> for EngagementError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(target) => Self::NotFound(target.to_string()),
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<ProjectorError> for EngagementError {
    fn from(err: ProjectorError) -> Self {
        match err {
            ProjectorError::NotFound(target) => Self::NotFound(target.to_string()),
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<ConsistencyError> for EngagementError {
    fn from(err: ConsistencyError) -> Self {
        Self::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use engagement_repository::RepositoryError;
    use engagement_shared::types::TargetRef;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_ledger_errors_map_to_client_and_server_errors() {
        let target = TargetRef::story(Uuid::new_v4());

        let not_found: EngagementError = LedgerError::NotFound(target).into();
        assert!(not_found.is_client_error());

        let conflict: EngagementError = LedgerError::Conflict { target, attempts: 5 }.into();
        assert!(matches!(conflict, EngagementError::Transient(_)));

        let repository: EngagementError =
            LedgerError::Repository(RepositoryError::conflict("lost")).into();
        assert!(!repository.is_client_error());
    }
}
