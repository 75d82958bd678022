use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use engagement_repository::TargetsRepository;
use engagement_shared::types::{CommentEvent, TargetRef};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::EngagementConfig;
use crate::drift::{DriftReason, DriftSignal};
use crate::errors::ProjectorError;
use crate::locks::KeyedLocks;

/// Ids of the events applied most recently, oldest evicted first.
#[derive(Debug)]
struct RecentEvents {
    capacity: usize,
    order: VecDeque<Uuid>,
    seen: HashSet<Uuid>,
}

impl RecentEvents {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    fn contains(&self, event_id: &Uuid) -> bool {
        self.seen.contains(event_id)
    }

    /// Records `event_id` as applied. A zero capacity records nothing.
    fn insert(&mut self, event_id: Uuid) {
        if self.capacity == 0 || !self.seen.insert(event_id) {
            return;
        }
        self.order.push_back(event_id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }
}

/// Keeps each story's `comment_count` in step with comment creation and
/// deletion.
pub struct CommentCountProjector {
    targets: Arc<dyn TargetsRepository>,
    drift: Arc<DriftSignal>,
    in_flight: KeyedLocks<Uuid>,
    applied: Mutex<RecentEvents>,
    lock_timeout: Duration,
}

impl CommentCountProjector {
    /// Creates a new `CommentCountProjector`.
    ///
    /// # Arguments
    ///
    /// * `targets` - Owner of the story counters.
    /// * `drift` - Raised when the count hits its floor.
    /// * `config` - `dedupe_window` sets how many applied event ids
    ///   [`handle`](Self::handle) remembers (`0` disables redelivery
    ///   detection); `lock_timeout` bounds the wait on a redelivery that is
    ///   still being applied.
    pub fn new(
        targets: Arc<dyn TargetsRepository>,
        drift: Arc<DriftSignal>,
        config: &EngagementConfig,
    ) -> Self {
        Self {
            targets,
            drift,
            in_flight: KeyedLocks::new(),
            applied: Mutex::new(RecentEvents::new(config.dedupe_window)),
            lock_timeout: config.lock_timeout,
        }
    }

    /// Increments the story's comment count by one.
    pub async fn on_comment_created(&self, story_id: Uuid) -> Result<(), ProjectorError> {
        self.apply(story_id, 1).await
    }

    /// Decrements the story's comment count by one, never below zero.
    pub async fn on_comment_deleted(&self, story_id: Uuid) -> Result<(), ProjectorError> {
        self.apply(story_id, -1).await
    }

    /// Applies a comment event at most once within the dedupe window.
    ///
    /// Returns `Ok(false)` when the event id was already applied. A
    /// redelivery arriving while the same event is still being applied
    /// waits for that attempt: it is skipped if the attempt succeeded and
    /// applied again if it failed.
    #[instrument(skip_all, fields(event_id = %event.event_id, story_id = %event.story_id))]
    pub async fn handle(&self, event: CommentEvent) -> Result<bool, ProjectorError> {
        let _in_flight = self
            .in_flight
            .acquire(event.event_id, self.lock_timeout)
            .await
            .map_err(|_| ProjectorError::EventLockTimeout(event.event_id))?;

        if self.applied.lock().await.contains(&event.event_id) {
            debug!("Comment event already applied, skipping");
            return Ok(false);
        }

        self.apply(event.story_id, event.delta()).await?;
        self.applied.lock().await.insert(event.event_id);
        Ok(true)
    }

    async fn apply(&self, story_id: Uuid, delta: i64) -> Result<(), ProjectorError> {
        let story = TargetRef::story(story_id);
        match self.targets.apply_comment_delta(story_id, delta).await? {
            Some(applied) => {
                if applied.clamped {
                    self.drift.raise(story, DriftReason::CommentCountFloor);
                }
                debug!(
                    story_id = %story_id,
                    comment_count = applied.comment_count,
                    "Comment count updated"
                );
                Ok(())
            }
            None => Err(ProjectorError::NotFound(story)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use engagement_repository::{
        AppliedCommentDelta, AppliedDelta, InMemoryEngagementStore, RepositoryError, TargetStatus,
    };
    use engagement_shared::types::{AggregateSnapshot, TargetSnapshot, TargetType, VoteDelta};
    use tokio::time::sleep;

    use super::*;

    fn config(window: usize) -> EngagementConfig {
        EngagementConfig::default().with_dedupe_window(window)
    }

    async fn setup(window: usize) -> (Arc<InMemoryEngagementStore>, CommentCountProjector, Arc<DriftSignal>, Uuid) {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story_id = Uuid::new_v4();
        store.insert_story(story_id).await;
        let drift = Arc::new(DriftSignal::new());
        let projector = CommentCountProjector::new(store.clone(), drift.clone(), &config(window));
        (store, projector, drift, story_id)
    }

    /// Store whose first comment delta stalls and then fails.
    struct StallingStore {
        inner: Arc<InMemoryEngagementStore>,
        failed_once: AtomicBool,
    }

    #[async_trait::async_trait]
    impl TargetsRepository for StallingStore {
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
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                sleep(Duration::from_millis(50)).await;
                return Err(RepositoryError::conflict("connection reset"));
            }
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
            target: TargetRef,
            expected: &AggregateSnapshot,
            corrected: &AggregateSnapshot,
        ) -> Result<bool, RepositoryError> {
            self.inner.overwrite_aggregate(target, expected, corrected).await
        }
    }

    async fn comment_count(store: &InMemoryEngagementStore, story_id: Uuid) -> Option<u64> {
        store
            .get_aggregate(TargetRef::story(story_id))
            .await
            .unwrap()
            .and_then(|aggregate| aggregate.comment_count)
    }

    #[test]
    fn test_recent_events_evicts_oldest() {
        let mut recent = RecentEvents::new(2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        recent.insert(a);
        recent.insert(b);
        recent.insert(a);
        assert!(recent.contains(&a));
        recent.insert(c);
        // `a` fell out of the window.
        assert!(!recent.contains(&a));
        assert!(recent.contains(&b) && recent.contains(&c));
    }

    #[tokio::test]
    async fn test_created_and_deleted() {
        let (store, projector, drift, story_id) = setup(16).await;

        projector.on_comment_created(story_id).await.unwrap();
        projector.on_comment_created(story_id).await.unwrap();
        projector.on_comment_deleted(story_id).await.unwrap();

        assert_eq!(comment_count(&store, story_id).await, Some(1));
        assert_eq!(drift.pending(), 0);
    }

    #[tokio::test]
    async fn test_delete_at_zero_stays_zero() {
        let (store, projector, drift, story_id) = setup(16).await;

        projector.on_comment_deleted(story_id).await.unwrap();

        assert_eq!(comment_count(&store, story_id).await, Some(0));
        assert_eq!(drift.pending(), 1);
    }

    #[tokio::test]
    async fn test_unknown_story() {
        let (_store, projector, _drift, _story_id) = setup(16).await;
        let err = projector.on_comment_created(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ProjectorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_redelivered_event_applies_once() {
        let (store, projector, _drift, story_id) = setup(16).await;
        let event = CommentEvent::created(story_id);

        assert!(projector.handle(event).await.unwrap());
        assert!(!projector.handle(event).await.unwrap());

        assert_eq!(comment_count(&store, story_id).await, Some(1));
    }

    #[tokio::test]
    async fn test_failed_event_can_be_redelivered() {
        let (store, projector, _drift, _story_id) = setup(16).await;
        let late_story = Uuid::new_v4();
        let event = CommentEvent::created(late_story);

        assert!(projector.handle(event).await.is_err());
        store.insert_story(late_story).await;
        assert!(projector.handle(event).await.unwrap());

        assert_eq!(comment_count(&store, late_story).await, Some(1));
    }

    #[tokio::test]
    async fn test_zero_window_disables_dedupe() {
        let (store, projector, _drift, story_id) = setup(0).await;
        let event = CommentEvent::created(story_id);

        assert!(projector.handle(event).await.unwrap());
        assert!(projector.handle(event).await.unwrap());

        assert_eq!(comment_count(&store, story_id).await, Some(2));
    }

    #[tokio::test]
    async fn test_redelivery_waits_for_failing_attempt() {
        let inner = Arc::new(InMemoryEngagementStore::new());
        let story_id = Uuid::new_v4();
        inner.insert_story(story_id).await;
        let store = Arc::new(StallingStore {
            inner: inner.clone(),
            failed_once: AtomicBool::new(false),
        });
        let projector = CommentCountProjector::new(store, Arc::new(DriftSignal::new()), &config(16));
        let event = CommentEvent::created(story_id);

        let (first, redelivered) = tokio::join!(projector.handle(event), async {
            sleep(Duration::from_millis(10)).await;
            projector.handle(event).await
        });

        assert!(first.is_err());
        assert!(redelivered.unwrap());
        assert_eq!(comment_count(&inner, story_id).await, Some(1));
        assert!(projector.in_flight.is_empty());

        assert!(!projector.handle(event).await.unwrap());
        assert_eq!(comment_count(&inner, story_id).await, Some(1));
    }
}
