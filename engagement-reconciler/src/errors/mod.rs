//! Error types for the engagement reconciler.
//! Consolidates configuration, database and engagement errors that can stop
//! the reconciler.
use engagement_core::EngagementError;
use engagement_repository::RepositoryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Missing or malformed environment configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Engagement error: {0}")]
    Engagement(#[from] EngagementError),
}

impl ReconcilerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
