//! This module defines the `EngagementService`, the single entry point the
//! HTTP layer and the reconciler use.
//!
//! The service wires the vote ledger to the counter projector and exposes
//! comment events and reconciliation. It parses the raw strings callers
//! send and maps every internal failure onto [`EngagementError`].
use std::sync::Arc;

use engagement_repository::{TargetsRepository, VotesRepository};
use engagement_shared::types::{
    CastVoteOutcome, CommentEvent, ReconcileReport, TargetRef, TargetType, VoteStats, VoteValue,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngagementConfig;
use crate::consistency::ConsistencyChecker;
use crate::drift::{DriftReason, DriftSignal};
use crate::errors::{EngagementError, ProjectorError};
use crate::ledger::VoteLedger;
use crate::projector::{CommentCountProjector, CounterProjector};

pub struct EngagementService {
    ledger: VoteLedger,
    counters: CounterProjector,
    comments: CommentCountProjector,
    checker: ConsistencyChecker,
    drift: Arc<DriftSignal>,
}

impl EngagementService {
    /// Creates a service backed by a single store holding both votes and
    /// target counters.
    pub fn new<R>(repository: Arc<R>, config: EngagementConfig) -> Self
    where
        R: VotesRepository + TargetsRepository + 'static,
    {
        Self::from_parts(repository.clone(), repository, config)
    }

    /// Creates a service from separate vote and target stores.
    pub fn from_parts(
        votes: Arc<dyn VotesRepository>,
        targets: Arc<dyn TargetsRepository>,
        config: EngagementConfig,
    ) -> Self {
        let drift = Arc::new(DriftSignal::new());
        Self {
            ledger: VoteLedger::new(votes, targets.clone(), config.clone()),
            counters: CounterProjector::new(targets.clone(), drift.clone()),
            comments: CommentCountProjector::new(targets.clone(), drift.clone(), &config),
            checker: ConsistencyChecker::new(targets, &config),
            drift,
        }
    }

    /// Casts a vote and returns the voter's resulting vote with the
    /// target's stats.
    ///
    /// Casting the vote already held removes it; casting the opposite vote
    /// switches it. Once the vote is recorded the cast succeeds even if the
    /// counters cannot be updated or read; the stats are then `None`.
    ///
    /// # Arguments
    ///
    /// * `target_id` - Story or comment being voted on.
    /// * `target_type` - `"story"` or `"comment"`.
    /// * `voter_id` - The voting user.
    /// * `vote_type` - `"upvote"` or `"downvote"`.
    ///
    /// # Errors
    ///
    /// * `EngagementError::InvalidInput` - Unknown `target_type` or `vote_type`.
    /// * `EngagementError::NotFound` - The target does not exist or is deleted.
    /// * `EngagementError::Transient` - Conflicts persisted or the store failed.
    pub async fn cast_vote(
        &self,
        target_id: Uuid,
        target_type: &str,
        voter_id: Uuid,
        vote_type: &str,
    ) -> Result<CastVoteOutcome, EngagementError> {
        let target = TargetRef::new(target_id, parse_target_type(target_type)?);
        let vote_type = vote_type
            .parse::<VoteValue>()
            .map_err(|err| EngagementError::InvalidInput(err.to_string()))?;

        let transition = self.ledger.cast_vote(voter_id, target, vote_type).await?;
        let current_vote = transition.next.vote();

        let stats = match self.counters.apply_delta(target, transition.delta).await {
            Ok(stats) => Some(stats),
            // Already raised as drift by the projector.
            Err(err @ ProjectorError::NotFound(_)) => return Err(err.into()),
            Err(err) => {
                error!(
                    target_ref = %target,
                    voter_id = %voter_id,
                    error = %err,
                    "Vote recorded but counters were not updated"
                );
                self.drift.raise(target, DriftReason::ProjectionFailed);
                // The vote is recorded; the cast must succeed from here on.
                match self.counters.stats(target).await {
                    Ok(stats) => Some(stats),
                    Err(err) => {
                        warn!(target_ref = %target, error = %err, "Stats unavailable after the cast");
                        None
                    }
                }
            }
        };

        Ok(CastVoteOutcome {
            current_vote,
            stats,
        })
    }

    /// Returns the vote `voter_id` holds on the target, or `None`.
    pub async fn get_user_vote(
        &self,
        target_id: Uuid,
        voter_id: Uuid,
        target_type: &str,
    ) -> Result<Option<VoteValue>, EngagementError> {
        let target = TargetRef::new(target_id, parse_target_type(target_type)?);
        Ok(self.ledger.get_user_vote(voter_id, target).await?)
    }

    /// Returns the stored vote stats of a target.
    pub async fn get_stats(
        &self,
        target_id: Uuid,
        target_type: &str,
    ) -> Result<VoteStats, EngagementError> {
        let target = TargetRef::new(target_id, parse_target_type(target_type)?);
        Ok(self.counters.stats(target).await?)
    }

    pub async fn on_comment_created(&self, story_id: Uuid) -> Result<(), EngagementError> {
        Ok(self.comments.on_comment_created(story_id).await?)
    }

    pub async fn on_comment_deleted(&self, story_id: Uuid) -> Result<(), EngagementError> {
        Ok(self.comments.on_comment_deleted(story_id).await?)
    }

    /// Applies a comment event unless it was already applied recently.
    /// Returns whether the event changed the comment count.
    pub async fn handle_comment_event(&self, event: CommentEvent) -> Result<bool, EngagementError> {
        Ok(self.comments.handle(event).await?)
    }

    /// Repairs the counters of every target of `target_type`.
    pub async fn reconcile(&self, target_type: TargetType) -> Result<ReconcileReport, EngagementError> {
        let pending = self.drift.take();
        if pending > 0 {
            info!(pending, "Reconciling after drift signals");
        }
        Ok(self.checker.reconcile(target_type).await?)
    }

    /// Reports counter mismatches of every target of `target_type` without
    /// repairing them.
    pub async fn diagnose(&self, target_type: TargetType) -> Result<ReconcileReport, EngagementError> {
        Ok(self.checker.diagnose(target_type).await?)
    }

    /// The signal raised whenever counters may have drifted.
    pub fn drift_signal(&self) -> Arc<DriftSignal> {
        self.drift.clone()
    }
}

fn parse_target_type(raw: &str) -> Result<TargetType, EngagementError> {
    raw.parse::<TargetType>()
        .map_err(|err| EngagementError::InvalidInput(err.to_string()))
}
