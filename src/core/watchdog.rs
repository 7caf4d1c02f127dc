//! Recovery of transitions stuck in flight.
//!
//! A migration that has not arrived within the timeout is assumed dead: its
//! process group is terminated, the open record is deleted to release the
//! single-flight slot, and the same target is attempted again.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::core::orchestrator::MigrationOrchestrator;
use crate::core::runner::AutomationRunner;
use crate::error::{Result, SurfError};
use crate::storage::LedgerStore;

/// Result of one watchdog check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchdogOutcome {
    /// Nothing is stuck.
    Healthy,
    /// The stuck transition was replaced by a new attempt.
    Retried {
        target: String,
        cleared_transition: i64,
        transition_id: i64,
    },
    /// Another transition was started while recovering; not retried.
    RetryRaced { target: String },
    /// The stuck transition had lost its target; nothing to retry.
    ClearedWithoutTarget { cleared_transition: i64 },
    /// Another watchdog run holds the recovery claim.
    AlreadyRecovering { transition_id: i64 },
}

/// Detects and restarts stuck transitions.
pub struct StaleTransitionWatchdog<'a, R> {
    store: &'a LedgerStore,
    orchestrator: &'a MigrationOrchestrator<'a, R>,
    runner: &'a R,
    timeout: TimeDelta,
}

impl<'a, R: AutomationRunner> StaleTransitionWatchdog<'a, R> {
    #[must_use]
    pub const fn new(
        store: &'a LedgerStore,
        orchestrator: &'a MigrationOrchestrator<'a, R>,
        runner: &'a R,
        timeout: TimeDelta,
    ) -> Self {
        Self {
            store,
            orchestrator,
            runner,
            timeout,
        }
    }

    /// Run one check against the latest transition.
    ///
    /// # Errors
    /// Returns an error if the process group cannot be terminated, the ledger
    /// fails, or the retry fails for a reason other than a concurrent start.
    pub async fn check(&self) -> Result<WatchdogOutcome> {
        self.check_at(Utc::now()).await
    }

    /// [`Self::check`] evaluated at `now`.
    ///
    /// # Errors
    /// See [`Self::check`].
    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<WatchdogOutcome> {
        let Some(stuck) = self.store.latest_transition()? else {
            return Ok(WatchdogOutcome::Healthy);
        };

        if !stuck.is_in_flight() || stuck.age(now) <= self.timeout {
            tracing::debug!(transition_id = stuck.id, "No hanging migration found");
            return Ok(WatchdogOutcome::Healthy);
        }

        // Only the claiming run may terminate, so a concurrent run cannot
        // kill the attempt this one is about to start.
        if !self
            .store
            .claim_recovery(stuck.id, now, now - self.timeout)?
        {
            tracing::info!(transition_id = stuck.id, "Hanging migration already being recovered");
            return Ok(WatchdogOutcome::AlreadyRecovering {
                transition_id: stuck.id,
            });
        }

        tracing::warn!(
            transition_id = stuck.id,
            age_minutes = stuck.age(now).num_minutes(),
            pid = stuck.process_id,
            "Migration is hanging, terminating it"
        );

        // The process must be gone before the slot is released.
        self.runner.terminate_migration(stuck.process_id).await?;

        if !self.store.delete_open_transition(stuck.id)? {
            tracing::info!(transition_id = stuck.id, "Transition finished while recovering");
            return Ok(WatchdogOutcome::Healthy);
        }

        let Some(target) = self.store.resolve_host(stuck.target_id)? else {
            tracing::warn!(transition_id = stuck.id, "Stuck transition has no target, not retrying");
            return Ok(WatchdogOutcome::ClearedWithoutTarget {
                cleared_transition: stuck.id,
            });
        };

        let retry = self.orchestrator.begin_transition_at(
            &target.name,
            stuck.initiator.as_deref(),
            now,
        );
        classify_retry(stuck.id, &target.name, retry.map(|t| t.id))
    }
}

/// Map the retry result onto an outcome; a concurrent start is reportable,
/// not fatal.
///
/// # Errors
/// Propagates every error except `AlreadyInProgress`.
pub fn classify_retry(
    cleared_transition: i64,
    target: &str,
    retry: Result<i64>,
) -> Result<WatchdogOutcome> {
    match retry {
        Ok(transition_id) => {
            tracing::info!(target, transition_id, "Retrying hanging migration");
            Ok(WatchdogOutcome::Retried {
                target: target.to_string(),
                cleared_transition,
                transition_id,
            })
        }
        Err(SurfError::AlreadyInProgress) => {
            tracing::warn!(target, "Another migration started while recovering, not retrying");
            Ok(WatchdogOutcome::RetryRaced {
                target: target.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        RecordingRunner, RunnerCall, TestDir, catalog_host, open_transition, seeded_store,
    };

    #[tokio::test]
    async fn stuck_transition_is_killed_cleared_and_retried() {
        let dir = TestDir::new();
        let identifier = dir.host_identifier("Microsoft");
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let now = Utc::now();
        let stuck = open_transition(&store, "azure", "aws", now - TimeDelta::minutes(61));
        store.set_transition_process(stuck.id, 777).unwrap();

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await;

        let WatchdogOutcome::Retried {
            target,
            cleared_transition,
            transition_id,
        } = outcome.unwrap()
        else {
            panic!("expected a retry");
        };
        assert_eq!(target, "aws");
        assert_eq!(cleared_transition, stuck.id);
        assert!(store.transition(stuck.id).unwrap().is_none());

        let retried = store.transition(transition_id).unwrap().unwrap();
        assert!(retried.is_in_flight());
        assert_eq!(retried.target_id, Some(catalog_host(&store, "aws").id));
        assert_eq!(store.count_open_transitions().unwrap(), 1);

        let calls = runner.calls();
        assert_eq!(calls[0], RunnerCall::Terminate { pid: Some(777) });
        assert!(matches!(calls[1], RunnerCall::Migration { .. }));
    }

    #[tokio::test]
    async fn young_transition_is_left_alone() {
        let dir = TestDir::new();
        let identifier = dir.host_identifier("Microsoft");
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let now = Utc::now();
        let t = open_transition(&store, "azure", "aws", now - TimeDelta::minutes(59));

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await;

        assert_eq!(outcome.unwrap(), WatchdogOutcome::Healthy);
        assert!(store.transition(t.id).unwrap().is_some());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn finished_or_missing_history_is_healthy() {
        let dir = TestDir::new();
        let identifier = dir.host_identifier("Microsoft");
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let now = Utc::now();

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await;
        assert_eq!(outcome.unwrap(), WatchdogOutcome::Healthy);

        let t = open_transition(&store, "azure", "aws", now - TimeDelta::hours(5));
        store.finalize_transition(t.id, now - TimeDelta::hours(4)).unwrap();

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await;
        assert_eq!(outcome.unwrap(), WatchdogOutcome::Healthy);
    }

    #[tokio::test]
    async fn deleted_target_clears_without_retry() {
        let dir = TestDir::new();
        let identifier = dir.host_identifier("Microsoft");
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let now = Utc::now();
        let stuck = open_transition(&store, "azure", "google", now - TimeDelta::hours(2));
        store.delete_host(catalog_host(&store, "google").id).unwrap();

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await;

        assert_eq!(
            outcome.unwrap(),
            WatchdogOutcome::ClearedWithoutTarget {
                cleared_transition: stuck.id
            }
        );
        assert_eq!(store.count_open_transitions().unwrap(), 0);
        assert_eq!(runner.calls(), vec![RunnerCall::Terminate { pid: None }]);
    }

    #[tokio::test]
    async fn claimed_recovery_is_not_repeated() {
        let dir = TestDir::new();
        let identifier = dir.host_identifier("Microsoft");
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let now = Utc::now();
        let stuck = open_transition(&store, "azure", "aws", now - TimeDelta::minutes(90));
        assert!(
            store
                .claim_recovery(stuck.id, now - TimeDelta::minutes(1), now - TimeDelta::hours(1))
                .unwrap()
        );

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await;

        assert_eq!(
            outcome.unwrap(),
            WatchdogOutcome::AlreadyRecovering {
                transition_id: stuck.id
            }
        );
        assert!(runner.calls().is_empty());
        assert!(store.transition(stuck.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn lapsed_recovery_claim_is_taken_over() {
        let dir = TestDir::new();
        let identifier = dir.host_identifier("Microsoft");
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let now = Utc::now();
        let stuck = open_transition(&store, "azure", "aws", now - TimeDelta::hours(3));
        let earlier = now - TimeDelta::minutes(61);
        assert!(store.claim_recovery(stuck.id, earlier, earlier - TimeDelta::hours(1)).unwrap());

        let orchestrator = MigrationOrchestrator::new(&store, &identifier, &runner, false);
        let watchdog =
            StaleTransitionWatchdog::new(&store, &orchestrator, &runner, TimeDelta::minutes(60));
        let outcome = watchdog.check_at(now).await.unwrap();

        assert!(matches!(outcome, WatchdogOutcome::Retried { .. }), "got {outcome:?}");
        assert_eq!(runner.calls()[0], RunnerCall::Terminate { pid: None });
    }

    #[test]
    fn concurrent_start_is_reported_not_raised() {
        let outcome = classify_retry(7, "aws", Err(SurfError::AlreadyInProgress)).unwrap();
        assert_eq!(
            outcome,
            WatchdogOutcome::RetryRaced {
                target: "aws".to_string()
            }
        );

        assert!(classify_retry(7, "aws", Err(SurfError::InvalidTarget("aws".to_string()))).is_err());
    }
}
