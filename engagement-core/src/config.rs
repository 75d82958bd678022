//! Configuration types for the engagement core.
use std::time::Duration;

/// Tuning knobs for the vote ledger, projectors and consistency checker.
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// Total attempts of a cast before a persistent write conflict is
    /// reported as a transient error. Defaults to 5.
    pub max_cas_attempts: usize,
    /// Delay before the first retry; doubles on each further retry.
    pub retry_base_delay: Duration,
    /// Upper bound for a single retry delay.
    pub retry_max_delay: Duration,
    /// How long a cast, a comment event redelivery or a target repair waits
    /// for its lock. Defaults to 2 seconds.
    pub lock_timeout: Duration,
    /// Targets read per page during reconciliation. Defaults to 500.
    pub reconcile_batch_size: usize,
    /// Number of recent comment event ids remembered for redelivery checks.
    pub dedupe_window: usize,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            max_cas_attempts: 5,
            retry_base_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_millis(100),
            lock_timeout: Duration::from_secs(2),
            reconcile_batch_size: 500,
            dedupe_window: 10_000,
        }
    }
}

impl EngagementConfig {
    pub fn with_max_cas_attempts(mut self, attempts: usize) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_reconcile_batch_size(mut self, batch_size: usize) -> Self {
        self.reconcile_batch_size = batch_size.max(1);
        self
    }

    pub fn with_dedupe_window(mut self, window: usize) -> Self {
        self.dedupe_window = window;
        self
    }
}
