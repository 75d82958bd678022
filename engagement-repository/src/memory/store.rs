use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock as SyncRwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use engagement_shared::types::{
    AggregateSnapshot, TargetRef, TargetSnapshot, TargetType, Vote, VoteDelta, VoteKey, VoteStats,
    VoteValue,
};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::interfaces::{TargetsRepository, VotesRepository};
use crate::types::{AppliedCommentDelta, AppliedDelta, TargetStatus};

/// A story or comment with its embedded counters.
#[derive(Debug)]
struct TargetRecord {
    /// Parent story, set for comments only.
    story_id: Option<Uuid>,
    deleted: AtomicBool,
    upvotes: AtomicU64,
    downvotes: AtomicU64,
    /// Present for stories only.
    comment_count: Option<AtomicU64>,
    /// Deltas hold it shared; whole-aggregate writes hold it exclusively.
    counters: SyncRwLock<()>,
}

impl TargetRecord {
    fn new(target_type: TargetType, story_id: Option<Uuid>) -> Self {
        Self {
            story_id,
            deleted: AtomicBool::new(false),
            upvotes: AtomicU64::new(0),
            downvotes: AtomicU64::new(0),
            comment_count: target_type
                .has_comment_count()
                .then(|| AtomicU64::new(0)),
            counters: SyncRwLock::new(()),
        }
    }

    fn delta_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.counters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn overwrite_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.counters.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores every counter of `aggregate`. Callers hold the overwrite guard.
    fn store(&self, aggregate: &AggregateSnapshot) {
        self.upvotes.store(aggregate.upvotes, Ordering::SeqCst);
        self.downvotes.store(aggregate.downvotes, Ordering::SeqCst);
        if let (Some(count), Some(value)) = (&self.comment_count, aggregate.comment_count) {
            count.store(value, Ordering::SeqCst);
        }
    }

    fn aggregate(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            upvotes: self.upvotes.load(Ordering::SeqCst),
            downvotes: self.downvotes.load(Ordering::SeqCst),
            comment_count: self
                .comment_count
                .as_ref()
                .map(|count| count.load(Ordering::SeqCst)),
        }
    }
}

/// Adds `delta` to `counter` in one atomic step, holding it at zero.
///
/// Returns the new value and whether the floor was hit.
fn add_clamped(counter: &AtomicU64, delta: i64) -> (u64, bool) {
    let mut clamped = false;
    let previous = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            let next = current as i128 + delta as i128;
            clamped = next < 0;
            Some(next.clamp(0, u64::MAX as i128) as u64)
        })
        .unwrap_or_else(|current| current);
    let next = (previous as i128 + delta as i128).clamp(0, u64::MAX as i128) as u64;
    (next, clamped)
}

/// In-memory store implementing both `VotesRepository` and `TargetsRepository`.
///
/// Targets are registered with [`insert_story`](Self::insert_story) and
/// [`insert_comment`](Self::insert_comment). Registering a comment does not
/// touch its story's comment count; that is the comment-count projector's job.
#[derive(Debug, Default)]
pub struct InMemoryEngagementStore {
    targets: RwLock<HashMap<TargetRef, Arc<TargetRecord>>>,
    votes: Mutex<HashMap<VoteKey, Vote>>,
}

impl InMemoryEngagementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a story with zeroed counters. Existing stories are kept.
    pub async fn insert_story(&self, story_id: Uuid) {
        self.targets
            .write()
            .await
            .entry(TargetRef::story(story_id))
            .or_insert_with(|| Arc::new(TargetRecord::new(TargetType::Story, None)));
    }

    /// Registers a comment under `story_id` with zeroed counters.
    pub async fn insert_comment(&self, comment_id: Uuid, story_id: Uuid) {
        self.targets
            .write()
            .await
            .entry(TargetRef::comment(comment_id))
            .or_insert_with(|| Arc::new(TargetRecord::new(TargetType::Comment, Some(story_id))));
    }

    /// Sets the soft-delete flag of a target. Returns `false` if it does not exist.
    pub async fn soft_delete(&self, target: TargetRef) -> bool {
        match self.targets.read().await.get(&target) {
            Some(record) => {
                record.deleted.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Overwrites a target's counters unconditionally, e.g. when importing
    /// existing aggregates. Returns `false` if the target does not exist.
    pub async fn set_aggregate(&self, target: TargetRef, aggregate: AggregateSnapshot) -> bool {
        let targets = self.targets.read().await;
        let Some(record) = targets.get(&target) else {
            return false;
        };
        let _guard = record.overwrite_guard();
        record.store(&aggregate);
        true
    }

    /// Live votes referencing `target`.
    pub async fn votes_for(&self, target: TargetRef) -> Vec<Vote> {
        self.votes
            .lock()
            .await
            .values()
            .filter(|vote| vote.target == target)
            .cloned()
            .collect()
    }

    async fn record(&self, target: TargetRef) -> Option<Arc<TargetRecord>> {
        self.targets.read().await.get(&target).cloned()
    }
}

#[async_trait]
impl VotesRepository for InMemoryEngagementStore {
    async fn get_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
    ) -> Result<Option<Vote>, RepositoryError> {
        Ok(self.votes.lock().await.get(&(voter_id, target)).cloned())
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<(), RepositoryError> {
        let mut votes = self.votes.lock().await;
        if votes.contains_key(&vote.key()) {
            return Err(RepositoryError::conflict(format!(
                "vote by {} on {} already exists",
                vote.voter_id, vote.target
            )));
        }
        votes.insert(vote.key(), vote.clone());
        Ok(())
    }

    async fn update_vote_type(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        expected: VoteValue,
        vote_type: VoteValue,
    ) -> Result<(), RepositoryError> {
        let mut votes = self.votes.lock().await;
        match votes.get_mut(&(voter_id, target)) {
            Some(vote) if vote.vote_type == expected => {
                vote.vote_type = vote_type;
                vote.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(RepositoryError::conflict(format!(
                "{expected} by {voter_id} on {target} changed before update"
            ))),
        }
    }

    async fn delete_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        expected: VoteValue,
    ) -> Result<(), RepositoryError> {
        let mut votes = self.votes.lock().await;
        match votes.get(&(voter_id, target)) {
            Some(vote) if vote.vote_type == expected => {
                votes.remove(&(voter_id, target));
                Ok(())
            }
            _ => Err(RepositoryError::conflict(format!(
                "{expected} by {voter_id} on {target} changed before delete"
            ))),
        }
    }
}

#[async_trait]
impl TargetsRepository for InMemoryEngagementStore {
    async fn target_status(&self, target: TargetRef) -> Result<TargetStatus, RepositoryError> {
        Ok(match self.record(target).await {
            None => TargetStatus::Missing,
            Some(record) if record.deleted.load(Ordering::SeqCst) => TargetStatus::Deleted,
            Some(_) => TargetStatus::Live,
        })
    }

    async fn get_aggregate(
        &self,
        target: TargetRef,
    ) -> Result<Option<AggregateSnapshot>, RepositoryError> {
        Ok(self.record(target).await.map(|record| record.aggregate()))
    }

    async fn apply_vote_delta(
        &self,
        target: TargetRef,
        delta: VoteDelta,
    ) -> Result<Option<AppliedDelta>, RepositoryError> {
        let Some(record) = self.record(target).await else {
            return Ok(None);
        };
        let _guard = record.delta_guard();
        let (upvotes, up_clamped) = add_clamped(&record.upvotes, delta.upvotes);
        let (downvotes, down_clamped) = add_clamped(&record.downvotes, delta.downvotes);
        Ok(Some(AppliedDelta {
            stats: VoteStats::new(upvotes, downvotes),
            clamped: up_clamped || down_clamped,
        }))
    }

    async fn apply_comment_delta(
        &self,
        story_id: Uuid,
        delta: i64,
    ) -> Result<Option<AppliedCommentDelta>, RepositoryError> {
        let Some(record) = self.record(TargetRef::story(story_id)).await else {
            return Ok(None);
        };
        let Some(count) = record.comment_count.as_ref() else {
            return Ok(None);
        };
        let _guard = record.delta_guard();
        let (comment_count, clamped) = add_clamped(count, delta);
        Ok(Some(AppliedCommentDelta {
            comment_count,
            clamped,
        }))
    }

    async fn list_target_ids(
        &self,
        target_type: TargetType,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let mut ids: Vec<Uuid> = self
            .targets
            .read()
            .await
            .keys()
            .filter(|target| target.target_type == target_type)
            .map(|target| target.target_id)
            .filter(|id| after.is_none_or(|after| *id > after))
            .collect();
        ids.sort_unstable();
        ids.truncate(limit);
        Ok(ids)
    }

    /// Holds the vote table lock and the target map read lock while
    /// counting, so vote and comment records cannot move underneath.
    async fn snapshot(&self, target: TargetRef) -> Result<Option<TargetSnapshot>, RepositoryError> {
        let votes = self.votes.lock().await;
        let targets = self.targets.read().await;
        let Some(record) = targets.get(&target) else {
            return Ok(None);
        };

        let (mut live_upvotes, mut live_downvotes) = (0u64, 0u64);
        for vote in votes.values().filter(|vote| vote.target == target) {
            match vote.vote_type {
                VoteValue::Up => live_upvotes += 1,
                VoteValue::Down => live_downvotes += 1,
            }
        }

        let live_comments = target.target_type.has_comment_count().then(|| {
            targets
                .iter()
                .filter(|(key, comment)| {
                    key.target_type == TargetType::Comment
                        && comment.story_id == Some(target.target_id)
                        && !comment.deleted.load(Ordering::SeqCst)
                })
                .count() as u64
        });

        Ok(Some(TargetSnapshot {
            stored: record.aggregate(),
            actual: AggregateSnapshot {
                upvotes: live_upvotes,
                downvotes: live_downvotes,
                comment_count: live_comments,
            },
        }))
    }

    /// Compares and replaces all counters while no delta is in progress, so
    /// either every counter is written or none is.
    async fn overwrite_aggregate(
        &self,
        target: TargetRef,
        expected: &AggregateSnapshot,
        corrected: &AggregateSnapshot,
    ) -> Result<bool, RepositoryError> {
        let Some(record) = self.record(target).await else {
            return Ok(false);
        };
        let _guard = record.overwrite_guard();
        if record.aggregate() != *expected {
            return Ok(false);
        }
        record.store(corrected);
        Ok(true)
    }
}
