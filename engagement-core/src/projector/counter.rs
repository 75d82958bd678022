use std::sync::Arc;

use engagement_repository::TargetsRepository;
use engagement_shared::types::{TargetRef, VoteDelta, VoteStats};
use tracing::instrument;

use crate::drift::{DriftReason, DriftSignal};
use crate::errors::ProjectorError;

/// Applies vote deltas to a target's upvote and downvote counters.
///
/// Every delta is a single atomic increment in the repository, so
/// concurrent deltas on the same target are never lost.
pub struct CounterProjector {
    targets: Arc<dyn TargetsRepository>,
    drift: Arc<DriftSignal>,
}

impl CounterProjector {
    pub fn new(targets: Arc<dyn TargetsRepository>, drift: Arc<DriftSignal>) -> Self {
        Self { targets, drift }
    }

    /// Applies `delta` to the counters of `target` and returns the resulting stats.
    ///
    /// A counter that would go negative is held at zero and drift is raised.
    /// A zero delta writes nothing.
    ///
    /// # Errors
    ///
    /// * `ProjectorError::NotFound` - The target does not exist.
    /// * `ProjectorError::Repository` - The store failed.
    #[instrument(skip_all, fields(target_ref = %target))]
    pub async fn apply_delta(
        &self,
        target: TargetRef,
        delta: VoteDelta,
    ) -> Result<VoteStats, ProjectorError> {
        if delta.is_zero() {
            return self.stats(target).await;
        }

        match self.targets.apply_vote_delta(target, delta).await? {
            Some(applied) => {
                if applied.clamped {
                    self.drift.raise(target, DriftReason::CounterFloor);
                }
                Ok(applied.stats)
            }
            None => {
                self.drift.raise(target, DriftReason::MissingTarget);
                Err(ProjectorError::NotFound(target))
            }
        }
    }

    /// Current stats of `target` as stored.
    pub async fn stats(&self, target: TargetRef) -> Result<VoteStats, ProjectorError> {
        self.targets
            .get_aggregate(target)
            .await?
            .map(|aggregate| aggregate.stats())
            .ok_or(ProjectorError::NotFound(target))
    }
}
