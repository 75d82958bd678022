//! This module defines the `TargetsRepository` trait, which owns the
//! denormalized counters embedded in stories and comments.
use engagement_shared::types::{AggregateSnapshot, TargetRef, TargetSnapshot, TargetType, VoteDelta};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::types::{AppliedCommentDelta, AppliedDelta, TargetStatus};

/// A trait that defines the interface for target aggregates.
///
/// Implementors apply counter deltas as single atomic increments scoped to
/// one target, never as read-modify-write, and floor every counter at zero.
#[async_trait::async_trait]
pub trait TargetsRepository: Send + Sync {
    /// Reports whether a target exists and is not soft-deleted.
    async fn target_status(&self, target: TargetRef) -> Result<TargetStatus, RepositoryError>;

    /// Retrieves the stored counters of a target.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(AggregateSnapshot))` - The stored counters.
    /// * `Ok(None)` - The target does not exist.
    /// * `Err(RepositoryError)` - Database failure.
    async fn get_aggregate(
        &self,
        target: TargetRef,
    ) -> Result<Option<AggregateSnapshot>, RepositoryError>;

    /// Atomically adds a vote delta to a target's counters.
    ///
    /// # Arguments
    ///
    /// * `target` - The target whose counters change.
    /// * `delta` - Signed change for upvotes and downvotes.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(AppliedDelta))` - Counters after the change, with the clamp flag.
    /// * `Ok(None)` - The target does not exist.
    /// * `Err(RepositoryError)` - Database failure.
    async fn apply_vote_delta(
        &self,
        target: TargetRef,
        delta: VoteDelta,
    ) -> Result<Option<AppliedDelta>, RepositoryError>;

    /// Atomically adds `delta` to a story's comment count.
    ///
    /// Returns `Ok(None)` when the story does not exist.
    async fn apply_comment_delta(
        &self,
        story_id: Uuid,
        delta: i64,
    ) -> Result<Option<AppliedCommentDelta>, RepositoryError>;

    /// Lists target ids of one type in ascending order, starting after `after`.
    ///
    /// Soft-deleted targets are included: their counters are still reconciled.
    async fn list_target_ids(
        &self,
        target_type: TargetType,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>, RepositoryError>;

    /// Reads a target's stored counters together with the counts derived from
    /// live vote and comment records, as one consistent snapshot.
    ///
    /// Returns `Ok(None)` when the target does not exist.
    async fn snapshot(&self, target: TargetRef) -> Result<Option<TargetSnapshot>, RepositoryError>;

    /// Overwrites a target's counters if they still equal `expected`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The counters were replaced with `corrected`.
    /// * `Ok(false)` - The counters changed since `expected` was read; nothing was written.
    /// * `Err(RepositoryError)` - Database failure.
    async fn overwrite_aggregate(
        &self,
        target: TargetRef,
        expected: &AggregateSnapshot,
        corrected: &AggregateSnapshot,
    ) -> Result<bool, RepositoryError>;
}
