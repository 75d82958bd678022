//! Error types for the counter projectors.
use engagement_repository::RepositoryError;
use engagement_shared::types::TargetRef;
use thiserror::Error;
use uuid::Uuid;

/// Represents errors that can occur while applying a counter delta.
#[derive(Debug, Error)]
pub enum ProjectorError {
    #[error("Target not found: {0}")]
    NotFound(TargetRef),

    #[error("Timed out waiting for comment event {0} already being applied")]
    EventLockTimeout(Uuid),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
