//! Drift signalling between the fast path and reconciliation.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use engagement_shared::types::TargetRef;
use tokio::sync::Notify;
use tracing::warn;

/// Why a projector believes a target's counters may have drifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftReason {
    /// A vote counter would have gone negative.
    CounterFloor,
    /// A comment count would have gone negative.
    CommentCountFloor,
    /// The target disappeared between the vote write and the counter write.
    MissingTarget,
    /// A vote was recorded but its counter delta could not be applied.
    ProjectionFailed,
}

impl fmt::Display for DriftReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriftReason::CounterFloor => "counter_floor",
            DriftReason::CommentCountFloor => "comment_count_floor",
            DriftReason::MissingTarget => "missing_target",
            DriftReason::ProjectionFailed => "projection_failed",
        })
    }
}

/// Shared flag raised when counters may have drifted.
///
/// Drift is never surfaced to end users. It is logged here and wakes
/// whoever waits in [`DriftSignal::notified`], typically the reconciler.
#[derive(Debug, Default)]
pub struct DriftSignal {
    pending: AtomicU64,
    notify: Notify,
}

impl DriftSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, target: TargetRef, reason: DriftReason) {
        warn!(
            target_ref = %target,
            reason = %reason,
            "Counter drift suspected, reconciliation requested"
        );
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Signals raised since the last [`take`](Self::take).
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Clears and returns the pending signal count.
    pub fn take(&self) -> u64 {
        self.pending.swap(0, Ordering::SeqCst)
    }

    /// Completes once a signal is raised. A signal raised while nobody was
    /// waiting completes the next call immediately.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
