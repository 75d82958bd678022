//! This module defines the `ConsistencyChecker`, which recomputes stored
//! counters from the records they summarize and repairs any drift.
//!
//! A pass walks every target of one type in id order, one page at a time.
//! For each target it reads a snapshot of stored and live counts and, when
//! they differ, overwrites the stored counters with a compare-and-swap
//! against the values it read. A target whose counters moved in between is
//! reported as raced and left for the next pass; running a pass twice in a
//! quiet system changes nothing the second time.
use std::sync::Arc;
use std::time::Duration;

use engagement_repository::{RepositoryError, TargetsRepository};
use engagement_shared::types::{Correction, ReconcileReport, TargetRef, TargetType};
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngagementConfig;
use crate::errors::ConsistencyError;
use crate::locks::KeyedLocks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Repair,
    Diagnose,
}

enum Outcome {
    Consistent,
    Corrected(Correction),
    Mismatch(Correction),
    Raced,
    Vanished,
}

/// Reconciles the denormalized counters of stories and comments.
pub struct ConsistencyChecker {
    targets: Arc<dyn TargetsRepository>,
    locks: KeyedLocks<TargetRef>,
    batch_size: usize,
    lock_timeout: Duration,
}

impl ConsistencyChecker {
    pub fn new(targets: Arc<dyn TargetsRepository>, config: &EngagementConfig) -> Self {
        Self {
            targets,
            locks: KeyedLocks::new(),
            batch_size: config.reconcile_batch_size.max(1),
            lock_timeout: config.lock_timeout,
        }
    }

    /// Recomputes `upvotes`, `downvotes` and, for stories, `comment_count`
    /// of every target of `target_type` and overwrites the stored values
    /// that differ.
    ///
    /// # Returns
    ///
    /// * `Ok(ReconcileReport)` - What was scanned, corrected, raced or failed.
    /// * `Err(ConsistencyError)` - Listing targets failed; the pass stopped early.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, target_type: TargetType) -> Result<ReconcileReport, ConsistencyError> {
        self.run(target_type, Mode::Repair).await
    }

    /// Reports every target whose stored counters differ from the live
    /// records, without writing anything.
    #[instrument(skip(self))]
    pub async fn diagnose(&self, target_type: TargetType) -> Result<ReconcileReport, ConsistencyError> {
        self.run(target_type, Mode::Diagnose).await
    }

    async fn run(&self, target_type: TargetType, mode: Mode) -> Result<ReconcileReport, ConsistencyError> {
        let mut report = ReconcileReport::new(target_type);
        let mut after = None;

        loop {
            let ids = self
                .targets
                .list_target_ids(target_type, after, self.batch_size)
                .await?;
            let Some(last) = ids.last().copied() else {
                break;
            };

            for target_id in &ids {
                let target = TargetRef::new(*target_id, target_type);
                report.scanned += 1;
                match self.check(target, mode).await {
                    Ok(Outcome::Consistent | Outcome::Vanished) => {}
                    Ok(Outcome::Corrected(correction) | Outcome::Mismatch(correction)) => {
                        warn!(
                            target_ref = %target,
                            upvotes_delta = correction.upvotes_delta(),
                            downvotes_delta = correction.downvotes_delta(),
                            comment_count_delta = correction.comment_count_delta(),
                            repaired = mode == Mode::Repair,
                            "Counter drift found"
                        );
                        report.corrections.push(correction);
                    }
                    Ok(Outcome::Raced) => {
                        debug!(target_ref = %target, "Counters moved during reconciliation");
                        report.raced.push(*target_id);
                    }
                    Err(err) => {
                        error!(target_ref = %target, error = %err, "Failed to reconcile target");
                        report.failed.push(*target_id);
                    }
                }
            }

            if ids.len() < self.batch_size {
                break;
            }
            after = Some(last);
        }

        info!(
            target_type = %target_type,
            scanned = report.scanned,
            corrections = report.corrections.len(),
            raced = report.raced.len(),
            failed = report.failed.len(),
            dry_run = mode == Mode::Diagnose,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    async fn check(&self, target: TargetRef, mode: Mode) -> Result<Outcome, RepositoryError> {
        let Ok(_guard) = self.locks.acquire(target, self.lock_timeout).await else {
            return Ok(Outcome::Raced);
        };

        let Some(snapshot) = self.targets.snapshot(target).await? else {
            return Ok(Outcome::Vanished);
        };
        if snapshot.is_consistent() {
            return Ok(Outcome::Consistent);
        }

        let correction = Correction {
            target_id: target.target_id,
            before: snapshot.stored,
            after: snapshot.actual,
        };
        if mode == Mode::Diagnose {
            return Ok(Outcome::Mismatch(correction));
        }

        if self
            .targets
            .overwrite_aggregate(target, &snapshot.stored, &snapshot.actual)
            .await?
        {
            Ok(Outcome::Corrected(correction))
        } else {
            Ok(Outcome::Raced)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use engagement_repository::{
        AppliedCommentDelta, AppliedDelta, InMemoryEngagementStore, TargetStatus, VotesRepository,
    };
    use engagement_shared::types::{AggregateSnapshot, TargetSnapshot, Vote, VoteDelta, VoteValue};
    use uuid::Uuid;

    use super::*;

    /// Store whose first overwrite loses its compare-and-swap and whose
    /// later overwrites fail.
    struct LosingStore {
        inner: Arc<InMemoryEngagementStore>,
        overwrites: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TargetsRepository for LosingStore {
        async fn target_status(&self, target: TargetRef) -> Result<TargetStatus, RepositoryError> {
            self.inner.target_status(target).await
        }

        async fn get_aggregate(
            &self,
            target: TargetRef,
        ) -> Result<Option<AggregateSnapshot>, RepositoryError> {
            self.inner.get_aggregate(target).await
        }

        async fn apply_vote_delta(
            &self,
            target: TargetRef,
            delta: VoteDelta,
        ) -> Result<Option<AppliedDelta>, RepositoryError> {
            self.inner.apply_vote_delta(target, delta).await
        }

        async fn apply_comment_delta(
            &self,
            story_id: Uuid,
            delta: i64,
        ) -> Result<Option<AppliedCommentDelta>, RepositoryError> {
            self.inner.apply_comment_delta(story_id, delta).await
        }

        async fn list_target_ids(
            &self,
            target_type: TargetType,
            after: Option<Uuid>,
            limit: usize,
        ) -> Result<Vec<Uuid>, RepositoryError> {
            self.inner.list_target_ids(target_type, after, limit).await
        }

        async fn snapshot(&self, target: TargetRef) -> Result<Option<TargetSnapshot>, RepositoryError> {
            self.inner.snapshot(target).await
        }

        async fn overwrite_aggregate(
            &self,
            _target: TargetRef,
            _expected: &AggregateSnapshot,
            _corrected: &AggregateSnapshot,
        ) -> Result<bool, RepositoryError> {
            match self.overwrites.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(false),
                _ => Err(RepositoryError::conflict("connection reset")),
            }
        }
    }

    fn checker(store: Arc<InMemoryEngagementStore>, batch_size: usize) -> ConsistencyChecker {
        let config = EngagementConfig::default().with_reconcile_batch_size(batch_size);
        ConsistencyChecker::new(store, &config)
    }

    async fn story_with_comments(store: &InMemoryEngagementStore, live: usize, deleted: usize) -> Uuid {
        let story_id = Uuid::new_v4();
        store.insert_story(story_id).await;
        for i in 0..live + deleted {
            let comment_id = Uuid::new_v4();
            store.insert_comment(comment_id, story_id).await;
            if i >= live {
                store.soft_delete(TargetRef::comment(comment_id)).await;
            }
        }
        story_id
    }

    #[tokio::test]
    async fn test_reconcile_fixes_comment_count() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story_id = story_with_comments(&store, 3, 2).await;
        let story = TargetRef::story(story_id);
        store
            .set_aggregate(story, AggregateSnapshot { upvotes: 0, downvotes: 0, comment_count: Some(5) })
            .await;

        let report = checker(store.clone(), 10).reconcile(TargetType::Story).await.unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.corrections.len(), 1);
        let correction = report.corrections[0];
        assert_eq!(correction.target_id, story_id);
        assert_eq!(correction.before.comment_count, Some(5));
        assert_eq!(correction.after.comment_count, Some(3));
        assert_eq!(
            store.get_aggregate(story).await.unwrap().unwrap().comment_count,
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = TargetRef::story(story_with_comments(&store, 1, 0).await);
        store.insert_vote(&Vote::new(Uuid::new_v4(), story, VoteValue::Up)).await.unwrap();
        store.insert_vote(&Vote::new(Uuid::new_v4(), story, VoteValue::Down)).await.unwrap();
        let checker = checker(store.clone(), 10);

        let first = checker.reconcile(TargetType::Story).await.unwrap();
        let second = checker.reconcile(TargetType::Story).await.unwrap();

        assert_eq!(first.corrections.len(), 1);
        assert_eq!(first.corrections[0].after, AggregateSnapshot {
            upvotes: 1,
            downvotes: 1,
            comment_count: Some(1),
        });
        assert!(second.corrections.is_empty());
        assert!(second.is_clean());
        assert_eq!(second.scanned, 1);
    }

    #[tokio::test]
    async fn test_diagnose_does_not_write() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let comment = TargetRef::comment(Uuid::new_v4());
        store.insert_comment(comment.target_id, Uuid::new_v4()).await;
        store
            .set_aggregate(comment, AggregateSnapshot { upvotes: 7, downvotes: 0, comment_count: None })
            .await;

        let report = checker(store.clone(), 10).diagnose(TargetType::Comment).await.unwrap();

        assert_eq!(report.corrections.len(), 1);
        assert_eq!(report.corrections[0].upvotes_delta(), -7);
        assert_eq!(store.get_aggregate(comment).await.unwrap().unwrap().upvotes, 7);
    }

    #[tokio::test]
    async fn test_deleted_targets_are_reconciled() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let comment = TargetRef::comment(Uuid::new_v4());
        store.insert_comment(comment.target_id, Uuid::new_v4()).await;
        store
            .set_aggregate(comment, AggregateSnapshot { upvotes: 2, downvotes: 2, comment_count: None })
            .await;
        store.soft_delete(comment).await;

        let report = checker(store.clone(), 10).reconcile(TargetType::Comment).await.unwrap();

        assert_eq!(report.corrections.len(), 1);
        assert_eq!(
            store.get_aggregate(comment).await.unwrap().unwrap(),
            AggregateSnapshot::default()
        );
    }

    #[tokio::test]
    async fn test_pages_through_every_target() {
        let store = Arc::new(InMemoryEngagementStore::new());
        for _ in 0..7 {
            let story = TargetRef::story(story_with_comments(&store, 0, 0).await);
            store
                .set_aggregate(story, AggregateSnapshot { upvotes: 1, downvotes: 0, comment_count: Some(0) })
                .await;
        }

        let report = checker(store.clone(), 3).reconcile(TargetType::Story).await.unwrap();

        assert_eq!(report.scanned, 7);
        assert_eq!(report.corrections.len(), 7);
        assert!(report.raced.is_empty() && report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let report = checker(store, 3).reconcile(TargetType::Comment).await.unwrap();
        assert_eq!(report.scanned, 0);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_lost_and_failed_overwrites_are_reported() {
        let inner = Arc::new(InMemoryEngagementStore::new());
        let drifted = AggregateSnapshot { upvotes: 2, downvotes: 0, comment_count: Some(0) };
        let mut ids = Vec::new();
        for _ in 0..2 {
            let story_id = story_with_comments(&inner, 0, 0).await;
            inner.set_aggregate(TargetRef::story(story_id), drifted).await;
            ids.push(story_id);
        }
        ids.sort();
        let store = Arc::new(LosingStore {
            inner: inner.clone(),
            overwrites: AtomicUsize::new(0),
        });
        let checker = ConsistencyChecker::new(store, &EngagementConfig::default());

        let report = checker.reconcile(TargetType::Story).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert!(report.corrections.is_empty());
        assert_eq!(report.raced, vec![ids[0]]);
        assert_eq!(report.failed, vec![ids[1]]);
        assert!(!report.is_clean());
        for id in ids {
            assert_eq!(inner.get_aggregate(TargetRef::story(id)).await.unwrap(), Some(drifted));
        }
    }

    #[tokio::test]
    async fn test_held_target_lock_is_raced() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = TargetRef::story(story_with_comments(&store, 0, 0).await);
        store
            .set_aggregate(story, AggregateSnapshot { upvotes: 1, downvotes: 0, comment_count: Some(0) })
            .await;
        let config = EngagementConfig::default().with_lock_timeout(Duration::from_millis(10));
        let checker = ConsistencyChecker::new(store.clone(), &config);

        let held = checker.locks.acquire(story, Duration::from_secs(1)).await.unwrap();
        let report = checker.reconcile(TargetType::Story).await.unwrap();
        assert_eq!(report.raced, vec![story.target_id]);
        assert!(report.corrections.is_empty());
        drop(held);

        let report = checker.reconcile(TargetType::Story).await.unwrap();
        assert_eq!(report.corrections.len(), 1);
        assert!(report.is_clean());
    }
}
