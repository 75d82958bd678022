//! Dependency initialization and wiring for the reconciler.
use std::sync::Arc;
use std::time::Duration;

use engagement_core::EngagementService;
use engagement_repository::PostgresEngagementRepository;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{ConnectionMode, ReconcilerConfig};
use crate::errors::ReconcilerError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub service: Arc<EngagementService>,
}

impl Dependencies {
    /// Connects to the database, applies pending migrations and builds the
    /// engagement service.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ReconcilerError)` - If initialization fails (connection errors only in fail-fast mode)
    pub async fn new(config: &ReconcilerConfig) -> Result<Self, ReconcilerError> {
        info!(
            max_connections = config.max_connections,
            connection_mode = ?config.connection_mode,
            retry_interval_secs = config.retry_interval.as_secs(),
            targets = ?config.targets,
            mode = ?config.mode,
            batch_size = config.batch_size,
            "Initializing dependencies"
        );

        let pool = Self::connect_to_database(
            &config.database_url,
            config.max_connections,
            config.connection_mode,
            config.retry_interval,
        )
        .await?;
        info!("Database connection established");

        let repository = PostgresEngagementRepository::new(pool).await?;
        repository.migrate().await?;
        info!("Database migrations applied");

        let service = EngagementService::new(Arc::new(repository), config.engagement_config());
        Ok(Self {
            service: Arc::new(service),
        })
    }

    /// Connect to the database with retry logic based on connection mode.
    async fn connect_to_database(
        url: &str,
        max_connections: u32,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<PgPool, ReconcilerError> {
        loop {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
            {
                Ok(pool) => return Ok(pool),
                Err(e) => match mode {
                    ConnectionMode::FailFast => return Err(e.into()),
                    ConnectionMode::Retry => {
                        warn!(
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to the database, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use engagement_shared::types::TargetType;

    fn config(database_url: &str) -> ReconcilerConfig {
        ReconcilerConfig {
            database_url: database_url.to_string(),
            max_connections: 1,
            connection_mode: ConnectionMode::FailFast,
            retry_interval: Duration::from_millis(10),
            reconcile_interval: Duration::from_secs(300),
            targets: TargetType::ALL.to_vec(),
            mode: RunMode::Once,
            batch_size: 500,
            lock_timeout: Duration::from_secs(2),
            dedupe_window: 10_000,
        }
    }

    #[tokio::test]
    async fn test_invalid_database_url_fails_fast() {
        let result = Dependencies::new(&config("invalid-database-url")).await;

        assert!(matches!(result, Err(ReconcilerError::Database(_))));
    }
}
