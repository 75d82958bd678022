//! This module defines the `VoteLedger`, the only writer of vote records.
//!
//! A cast reads the voter's current vote, runs it through the
//! [`VoteState`] machine and writes the outcome back as a compare-and-swap.
//! Casts by the same voter on the same target are serialized by an
//! in-process lock; across processes the compare-and-swap catches the race
//! and the cast is retried with bounded backoff.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use engagement_repository::{RepositoryError, TargetStatus, TargetsRepository, VotesRepository};
use engagement_shared::types::{TargetRef, Vote, VoteKey, VoteState, VoteTransition, VoteValue};
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::EngagementConfig;
use crate::errors::LedgerError;
use crate::locks::KeyedLocks;

/// Authoritative record of per-voter vote state.
pub struct VoteLedger {
    votes: Arc<dyn VotesRepository>,
    targets: Arc<dyn TargetsRepository>,
    locks: KeyedLocks<VoteKey>,
    config: EngagementConfig,
}

impl VoteLedger {
    /// Creates a new `VoteLedger`.
    ///
    /// # Arguments
    ///
    /// * `votes` - Store of live vote records.
    /// * `targets` - Used to check that a target exists and is not deleted.
    /// * `config` - Retry and lock settings.
    pub fn new(
        votes: Arc<dyn VotesRepository>,
        targets: Arc<dyn TargetsRepository>,
        config: EngagementConfig,
    ) -> Self {
        Self {
            votes,
            targets,
            locks: KeyedLocks::new(),
            config,
        }
    }

    /// Casts `vote_type` for `voter_id` on `target`.
    ///
    /// Inserts, updates or deletes exactly one vote record according to the
    /// voter's current state, and returns the transition with the counter
    /// delta the caller must project onto the target.
    ///
    /// # Errors
    ///
    /// * `LedgerError::NotFound` - The target does not exist or is soft-deleted.
    /// * `LedgerError::LockTimeout` - Another cast by the same voter held the lock too long.
    /// * `LedgerError::Conflict` - Every compare-and-swap attempt lost a race.
    /// * `LedgerError::Repository` - The store failed.
    #[instrument(skip_all, fields(target_ref = %target, voter_id = %voter_id, vote_type = %vote_type))]
    pub async fn cast_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        vote_type: VoteValue,
    ) -> Result<VoteTransition, LedgerError> {
        self.ensure_live(target).await?;

        let _guard = self
            .locks
            .acquire((voter_id, target), self.config.lock_timeout)
            .await
            .map_err(|_| LedgerError::LockTimeout(target))?;

        let attempts = AtomicUsize::new(0);
        let result = RetryIf::spawn(
            self.retry_strategy(),
            || {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.try_cast(voter_id, target, vote_type)
            },
            |err: &RepositoryError| {
                if err.is_conflict() {
                    debug!(error = %err, "Vote write conflicted, retrying");
                }
                err.is_conflict()
            },
        )
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match result {
            Ok(transition) => {
                debug!(
                    previous = ?transition.previous,
                    next = ?transition.next,
                    attempts,
                    "Vote cast"
                );
                Ok(transition)
            }
            Err(err) if err.is_conflict() => {
                warn!(attempts, error = %err, "Vote write conflicts exhausted retries");
                Err(LedgerError::Conflict { target, attempts })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the vote `voter_id` currently holds on `target`, if any.
    pub async fn get_user_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
    ) -> Result<Option<VoteValue>, LedgerError> {
        let vote = self.votes.get_vote(voter_id, target).await?;
        Ok(vote.map(|vote| vote.vote_type))
    }

    async fn ensure_live(&self, target: TargetRef) -> Result<(), LedgerError> {
        match self.targets.target_status(target).await? {
            TargetStatus::Live => Ok(()),
            TargetStatus::Missing | TargetStatus::Deleted => Err(LedgerError::NotFound(target)),
        }
    }

    /// Delays between attempts: 2x, 4x, 8x ... the base delay, capped at
    /// `retry_max_delay`, with jitter.
    fn retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        let base_millis = self.config.retry_base_delay.as_millis().max(1) as u64;
        ExponentialBackoff::from_millis(2)
            .factor(base_millis)
            .max_delay(self.config.retry_max_delay)
            .map(jitter)
            .take(self.config.max_cas_attempts.saturating_sub(1))
    }

    /// One read-decide-write round. Fails with `RepositoryError::Conflict`
    /// when the record changed between the read and the write.
    async fn try_cast(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        vote_type: VoteValue,
    ) -> Result<VoteTransition, RepositoryError> {
        let held = self
            .votes
            .get_vote(voter_id, target)
            .await?
            .map(|vote| vote.vote_type);
        let transition = VoteState::from(held).cast(vote_type);

        match (held, transition.next.vote()) {
            (None, Some(next)) => {
                self.votes
                    .insert_vote(&Vote::new(voter_id, target, next))
                    .await?
            }
            (Some(held), Some(next)) => {
                self.votes
                    .update_vote_type(voter_id, target, held, next)
                    .await?
            }
            (Some(held), None) => self.votes.delete_vote(voter_id, target, held).await?,
            // A cast from no vote always creates one.
            (None, None) => {}
        }

        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use engagement_repository::InMemoryEngagementStore;
    use engagement_shared::types::{VoteDelta, VoteState};

    use super::*;

    /// Wraps the in-memory store and fails the first `conflicts` writes.
    struct ConflictingVotes {
        inner: Arc<InMemoryEngagementStore>,
        conflicts: AtomicUsize,
    }

    impl ConflictingVotes {
        fn conflict(&self) -> Result<(), RepositoryError> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(RepositoryError::conflict("injected"));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl VotesRepository for ConflictingVotes {
        async fn get_vote(
            &self,
            voter_id: Uuid,
            target: TargetRef,
        ) -> Result<Option<Vote>, RepositoryError> {
            self.inner.get_vote(voter_id, target).await
        }

        async fn insert_vote(&self, vote: &Vote) -> Result<(), RepositoryError> {
            self.conflict()?;
            self.inner.insert_vote(vote).await
        }

        async fn update_vote_type(
            &self,
            voter_id: Uuid,
            target: TargetRef,
            expected: VoteValue,
            vote_type: VoteValue,
        ) -> Result<(), RepositoryError> {
            self.conflict()?;
            self.inner.update_vote_type(voter_id, target, expected, vote_type).await
        }

        async fn delete_vote(
            &self,
            voter_id: Uuid,
            target: TargetRef,
            expected: VoteValue,
        ) -> Result<(), RepositoryError> {
            self.conflict()?;
            self.inner.delete_vote(voter_id, target, expected).await
        }
    }

    async fn story_store() -> (Arc<InMemoryEngagementStore>, TargetRef) {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = TargetRef::story(Uuid::new_v4());
        store.insert_story(story.target_id).await;
        (store, story)
    }

    fn ledger(store: Arc<InMemoryEngagementStore>) -> VoteLedger {
        VoteLedger::new(store.clone(), store, EngagementConfig::default())
    }

    #[tokio::test]
    async fn test_cast_walks_the_state_machine() {
        let (store, story) = story_store().await;
        let ledger = ledger(store.clone());
        let voter = Uuid::new_v4();

        let first = ledger.cast_vote(voter, story, VoteValue::Up).await.unwrap();
        assert_eq!(first.next, VoteState::Upvoted);
        assert_eq!(first.delta, VoteDelta::new(1, 0));

        let switch = ledger.cast_vote(voter, story, VoteValue::Down).await.unwrap();
        assert_eq!(switch.next, VoteState::Downvoted);
        assert_eq!(switch.delta, VoteDelta::new(-1, 1));
        assert_eq!(ledger.get_user_vote(voter, story).await.unwrap(), Some(VoteValue::Down));

        let toggle = ledger.cast_vote(voter, story, VoteValue::Down).await.unwrap();
        assert_eq!(toggle.next, VoteState::NoVote);
        assert_eq!(toggle.delta, VoteDelta::new(0, -1));
        assert!(store.votes_for(story).await.is_empty());
        assert_eq!(ledger.get_user_vote(voter, story).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_switch_updates_in_place() {
        let (store, story) = story_store().await;
        let ledger = ledger(store.clone());
        let voter = Uuid::new_v4();

        ledger.cast_vote(voter, story, VoteValue::Down).await.unwrap();
        let created_at = store.votes_for(story).await[0].created_at;
        ledger.cast_vote(voter, story, VoteValue::Up).await.unwrap();

        let votes = store.votes_for(story).await;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].created_at, created_at);
        assert_eq!(votes[0].vote_type, VoteValue::Up);
    }

    #[tokio::test]
    async fn test_missing_or_deleted_target_is_not_found() {
        let (store, story) = story_store().await;
        let ledger = ledger(store.clone());

        let missing = TargetRef::comment(Uuid::new_v4());
        assert!(matches!(
            ledger.cast_vote(Uuid::new_v4(), missing, VoteValue::Up).await,
            Err(LedgerError::NotFound(target)) if target == missing
        ));

        store.soft_delete(story).await;
        assert!(matches!(
            ledger.cast_vote(Uuid::new_v4(), story, VoteValue::Up).await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(store.votes_for(story).await.is_empty());
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let (store, story) = story_store().await;
        let votes = Arc::new(ConflictingVotes {
            inner: store.clone(),
            conflicts: AtomicUsize::new(2),
        });
        let ledger = VoteLedger::new(votes, store.clone(), EngagementConfig::default());

        let transition = ledger.cast_vote(Uuid::new_v4(), story, VoteValue::Up).await.unwrap();
        assert_eq!(transition.next, VoteState::Upvoted);
        assert_eq!(store.votes_for(story).await.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_conflicts_are_reported() {
        let (store, story) = story_store().await;
        let votes = Arc::new(ConflictingVotes {
            inner: store.clone(),
            conflicts: AtomicUsize::new(usize::MAX),
        });
        let config = EngagementConfig::default().with_max_cas_attempts(3);
        let ledger = VoteLedger::new(votes, store.clone(), config);

        let err = ledger
            .cast_vote(Uuid::new_v4(), story, VoteValue::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { attempts: 3, .. }));
        assert!(store.votes_for(story).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_casts_by_one_voter_keep_one_vote() {
        let (store, story) = story_store().await;
        let ledger = Arc::new(ledger(store.clone()));
        let voter = Uuid::new_v4();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.cast_vote(voter, story, VoteValue::Up).await })
            })
            .collect();

        let mut net = VoteDelta::ZERO;
        for handle in handles {
            let delta = handle.await.unwrap().unwrap().delta;
            net.upvotes += delta.upvotes;
            net.downvotes += delta.downvotes;
        }

        // 20 toggles of the same vote cancel out; the deltas must agree.
        assert!(store.votes_for(story).await.is_empty());
        assert_eq!(net, VoteDelta::ZERO);
    }
}
