//! Environment-driven settings for the reconciler.
use std::env;
use std::str::FromStr;
use std::time::Duration;

use engagement_core::EngagementConfig;
use engagement_shared::types::TargetType;
use tracing::warn;

use crate::errors::ReconcilerError;

/// Default maximum number of pooled database connections.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default connection retry interval in seconds.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default pause between scheduled passes in seconds.
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default targets read per page.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Default wait for a per-target repair lock in milliseconds.
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;

/// Default number of applied comment event ids remembered.
const DEFAULT_DEDUPE_WINDOW: usize = 10_000;

/// Connection mode for the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection every retry interval until it succeeds.
    Retry,
}

impl ConnectionMode {
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    fn from_env() -> Self {
        match env::var("DATABASE_CONNECTION_MODE")
            .unwrap_or_else(|_| "retry".to_string())
            .to_lowercase()
            .as_str()
        {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid DATABASE_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// What the binary does once its dependencies are up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Reconcile on an interval and whenever drift is signalled, until shutdown.
    Schedule,
    /// Reconcile every configured target type once, then exit.
    Once,
    /// Report mismatches once without writing, then exit.
    Diagnose,
}

impl FromStr for RunMode {
    type Err = ReconcilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "schedule" => Ok(Self::Schedule),
            "once" => Ok(Self::Once),
            "diagnose" => Ok(Self::Diagnose),
            other => Err(ReconcilerError::config(format!(
                "RECONCILE_MODE must be schedule, once or diagnose, got '{other}'"
            ))),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT=json` selects JSON lines; anything else is pretty output.
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Settings of the reconciler binary.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub reconcile_interval: Duration,
    pub targets: Vec<TargetType>,
    pub mode: RunMode,
    pub batch_size: usize,
    pub lock_timeout: Duration,
    pub dedupe_window: usize,
}

impl ReconcilerConfig {
    /// Reads the settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
    /// - `DATABASE_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `DATABASE_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `RECONCILE_INTERVAL_SECS`: Pause between scheduled passes, at least 1 (default: 300)
    /// - `RECONCILE_TARGETS`: Comma-separated target types (default: story,comment)
    /// - `RECONCILE_MODE`: "schedule", "once" or "diagnose" (default: schedule)
    /// - `RECONCILE_BATCH_SIZE`: Targets read per page (default: 500)
    /// - `ENGAGEMENT_LOCK_TIMEOUT_MS`: Wait for a per-target lock, at least 1 (default: 2000)
    /// - `COMMENT_DEDUPE_WINDOW`: Applied comment event ids remembered, 0 disables (default: 10000)
    ///
    /// # Returns
    ///
    /// * `Ok(ReconcilerConfig)` - Parsed settings
    /// * `Err(ReconcilerError::Config)` - A variable is missing or malformed
    pub fn from_env() -> Result<Self, ReconcilerError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ReconcilerError::config("DATABASE_URL must be set"))?;

        let targets = match env::var("RECONCILE_TARGETS") {
            Ok(raw) => parse_targets(&raw)?,
            Err(_) => TargetType::ALL.to_vec(),
        };

        let mode = match env::var("RECONCILE_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => RunMode::Schedule,
        };

        Ok(Self {
            database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            connection_mode: ConnectionMode::from_env(),
            retry_interval: Duration::from_secs(parse_var(
                "DATABASE_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )?),
            reconcile_interval: Duration::from_secs(parse_positive(
                "RECONCILE_INTERVAL_SECS",
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )?),
            targets,
            mode,
            batch_size: parse_var("RECONCILE_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            lock_timeout: Duration::from_millis(parse_positive(
                "ENGAGEMENT_LOCK_TIMEOUT_MS",
                DEFAULT_LOCK_TIMEOUT_MS,
            )?),
            dedupe_window: parse_var("COMMENT_DEDUPE_WINDOW", DEFAULT_DEDUPE_WINDOW)?,
        })
    }

    /// Engagement core settings derived from this configuration.
    pub fn engagement_config(&self) -> EngagementConfig {
        EngagementConfig::default()
            .with_reconcile_batch_size(self.batch_size)
            .with_lock_timeout(self.lock_timeout)
            .with_dedupe_window(self.dedupe_window)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ReconcilerError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ReconcilerError::config(format!("{name} is not valid: '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn parse_positive(name: &str, default: u64) -> Result<u64, ReconcilerError> {
    match parse_var(name, default)? {
        0 => Err(ReconcilerError::config(format!("{name} must be greater than zero"))),
        value => Ok(value),
    }
}

fn parse_targets(raw: &str) -> Result<Vec<TargetType>, ReconcilerError> {
    let mut targets = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let target_type = part
            .parse::<TargetType>()
            .map_err(|e| ReconcilerError::config(format!("RECONCILE_TARGETS: {e}")))?;
        if !targets.contains(&target_type) {
            targets.push(target_type);
        }
    }
    if targets.is_empty() {
        return Err(ReconcilerError::config("RECONCILE_TARGETS is empty"));
    }
    Ok(targets)
}
