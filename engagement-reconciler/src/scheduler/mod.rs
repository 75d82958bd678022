//! Scheduling of reconciliation passes.
//!
//! A pass reconciles every configured target type in turn. Passes run on a
//! fixed interval and additionally whenever the engagement service raises
//! its drift signal, until shutdown.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use engagement_core::EngagementService;
use engagement_shared::types::{ReconcileReport, TargetType};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, instrument};

use crate::errors::ReconcilerError;

/// Whether a pass repairs counters or only reports mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Reconcile,
    Diagnose,
}

pub struct Scheduler {
    service: Arc<EngagementService>,
    targets: Vec<TargetType>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<EngagementService>, targets: Vec<TargetType>, interval: Duration) -> Self {
        Self {
            service,
            targets,
            interval,
        }
    }

    /// Runs one pass over every configured target type.
    ///
    /// A target type whose pass fails is logged and skipped; the remaining
    /// types still run. The first error is returned after all types ran.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, kind: PassKind) -> Result<Vec<ReconcileReport>, ReconcilerError> {
        let mut reports = Vec::with_capacity(self.targets.len());
        let mut first_error = None;

        for target_type in &self.targets {
            let result = match kind {
                PassKind::Reconcile => self.service.reconcile(*target_type).await,
                PassKind::Diagnose => self.service.diagnose(*target_type).await,
            };
            match result {
                Ok(report) => {
                    let summary = serde_json::to_string(&report)?;
                    info!(target_type = %target_type, report = %summary, "Pass report");
                    reports.push(report);
                }
                Err(e) => {
                    error!(target_type = %target_type, error = %e, "Reconciliation pass failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(reports),
        }
    }

    /// Runs reconciliation passes until `shutdown` completes.
    ///
    /// The first pass starts immediately. Failed passes are logged and
    /// retried on the next tick or drift signal.
    ///
    /// # Returns
    ///
    /// The number of passes started.
    pub async fn run_until<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let drift = self.service.drift_signal();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = self.interval.as_secs(), targets = ?self.targets, "Reconciler started");

        let mut passes = 0u64;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(passes, "Received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    info!("Starting scheduled reconciliation");
                }
                _ = drift.notified() => {
                    let pending = drift.pending();
                    if pending == 0 {
                        // Already handled by the pass that ran since the signal.
                        continue;
                    }
                    info!(pending, "Starting reconciliation after drift signal");
                }
            }

            passes += 1;
            if let Err(e) = self.run_pass(PassKind::Reconcile).await {
                error!(error = %e, "Reconciliation pass did not complete");
            }
        }
        passes
    }

    /// Runs reconciliation passes until Ctrl-C.
    pub async fn run(&self) -> u64 {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for the shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use engagement_core::{DriftReason, EngagementConfig};
    use engagement_repository::{InMemoryEngagementStore, TargetsRepository};
    use engagement_shared::types::{AggregateSnapshot, TargetRef};
    use tokio::time::sleep;
    use uuid::Uuid;

    use super::*;

    async fn drifted_story(store: &InMemoryEngagementStore) -> TargetRef {
        let story = TargetRef::story(Uuid::new_v4());
        store.insert_story(story.target_id).await;
        store
            .set_aggregate(story, AggregateSnapshot { upvotes: 3, downvotes: 0, comment_count: Some(2) })
            .await;
        story
    }

    fn scheduler(store: Arc<InMemoryEngagementStore>) -> Scheduler {
        let service = Arc::new(EngagementService::new(store, EngagementConfig::default()));
        Scheduler::new(service, TargetType::ALL.to_vec(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_diagnose_pass_reports_without_writing() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = drifted_story(&store).await;

        let reports = scheduler(store.clone()).run_pass(PassKind::Diagnose).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].target_type, TargetType::Story);
        assert_eq!(reports[0].corrections.len(), 1);
        assert_eq!(store.get_aggregate(story).await.unwrap().unwrap().upvotes, 3);
    }

    #[tokio::test]
    async fn test_reconcile_pass_repairs() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = drifted_story(&store).await;
        let scheduler = scheduler(store.clone());

        let reports = scheduler.run_pass(PassKind::Reconcile).await.unwrap();
        assert_eq!(reports[0].corrections.len(), 1);
        assert_eq!(
            store.get_aggregate(story).await.unwrap().unwrap(),
            AggregateSnapshot { upvotes: 0, downvotes: 0, comment_count: Some(0) }
        );

        let reports = scheduler.run_pass(PassKind::Reconcile).await.unwrap();
        assert!(reports.iter().all(|report| report.corrections.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_signal_triggers_an_extra_pass() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = drifted_story(&store).await;
        let scheduler = scheduler(store.clone());
        let drift = scheduler.service.drift_signal();

        // The startup pass repairs the story; it drifts again 10s later and
        // the signal must trigger a second pass before the 300s tick.
        let passes = scheduler
            .run_until(async {
                sleep(Duration::from_secs(10)).await;
                store
                    .set_aggregate(story, AggregateSnapshot { upvotes: 4, downvotes: 0, comment_count: Some(0) })
                    .await;
                drift.raise(story, DriftReason::CounterFloor);
                sleep(Duration::from_secs(1)).await;
            })
            .await;

        assert_eq!(passes, 2);
        assert_eq!(store.get_aggregate(story).await.unwrap().unwrap().upvotes, 0);
        assert_eq!(drift.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_handled_by_a_pass_does_not_repeat_it() {
        let store = Arc::new(InMemoryEngagementStore::new());
        let story = drifted_story(&store).await;
        let scheduler = scheduler(store.clone());
        scheduler
            .service
            .drift_signal()
            .raise(story, DriftReason::CounterFloor);

        // The startup pass consumes the pending drift; its leftover wakeup
        // must not start another pass.
        let passes = scheduler.run_until(sleep(Duration::from_secs(1))).await;

        assert_eq!(passes, 1);
        assert_eq!(store.get_aggregate(story).await.unwrap().unwrap().upvotes, 0);
    }
}
