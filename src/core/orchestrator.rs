//! Migration state machine.
//!
//! The ledger is the state: a transition without an end time means a
//! migration is in flight. Starting a transition validates the request,
//! records it with a single conditional insert, then launches the migration
//! automation without waiting for it. The automation signals success by
//! bringing the service up on the target, whose startup calls
//! [`MigrationOrchestrator::finalize_if_arrived`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::decommission::{DecommissionOutcome, HostDecommissioner};
use crate::core::host::HostIdentifier;
use crate::core::models::{MigrationState, NewTransition, Transition, TransitionId};
use crate::core::runner::AutomationRunner;
use crate::error::{Result, SurfError};
use crate::storage::LedgerStore;

/// Result of an arrival check at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArrivalOutcome {
    /// No transition has ever been recorded.
    NoTransition,
    /// The latest transition targets another host.
    NotTarget,
    /// The latest transition was already finalized and cleaned up.
    AlreadyFinalized { transition_id: TransitionId },
    /// This host completed the transition.
    Arrived {
        transition_id: TransitionId,
        decommission: DecommissionOutcome,
    },
}

/// Validates, records and launches transitions.
pub struct MigrationOrchestrator<'a, R> {
    store: &'a LedgerStore,
    host: &'a HostIdentifier,
    runner: &'a R,
    dry_run: bool,
}

impl<'a, R: AutomationRunner> MigrationOrchestrator<'a, R> {
    #[must_use]
    pub const fn new(
        store: &'a LedgerStore,
        host: &'a HostIdentifier,
        runner: &'a R,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            host,
            runner,
            dry_run,
        }
    }

    /// Current migration state as recorded in the ledger.
    ///
    /// # Errors
    /// Returns a storage error if the ledger cannot be read.
    pub fn state(&self) -> Result<MigrationState> {
        Ok(MigrationState::from_latest(self.store.latest_transition()?))
    }

    /// Start moving the service to the provider named `target`.
    ///
    /// # Errors
    /// - `AlreadyInProgress` if a transition is in flight
    /// - `InvalidTarget` if `target` is not a provider in the catalog
    /// - `AttemptedSelfTarget` if `target` is the current host
    /// - `NotInitialized` if the catalog is empty
    ///
    /// Launch failures are logged and absorbed; the transition stays recorded.
    pub fn begin_transition(&self, target: &str, initiator: Option<&str>) -> Result<Transition> {
        self.begin_transition_at(target, initiator, Utc::now())
    }

    /// [`Self::begin_transition`] with an explicit start time.
    ///
    /// # Errors
    /// See [`Self::begin_transition`].
    pub fn begin_transition_at(
        &self,
        target: &str,
        initiator: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if !self.state()?.accepts_new_transition() {
            return Err(SurfError::AlreadyInProgress);
        }

        let target = self
            .store
            .host_by_name(target)?
            .filter(|h| h.is_provider)
            .ok_or_else(|| SurfError::InvalidTarget(target.to_string()))?;

        let current = self.host.current_host(self.store)?;
        if current.id == target.id {
            return Err(SurfError::AttemptedSelfTarget {
                host: target.name.clone(),
            });
        }

        let new = NewTransition {
            initiator: initiator.map(str::to_string),
            source_id: Some(current.id),
            target_id: target.id,
            start_time: now,
        };
        let transition = self
            .store
            .insert_transition_if_idle(&new)?
            .ok_or(SurfError::AlreadyInProgress)?;

        tracing::info!(
            transition_id = transition.id,
            source = %current.name,
            target = %target.name,
            initiator = initiator.unwrap_or("-"),
            "Recorded transition"
        );

        if self.dry_run {
            tracing::info!(transition_id = transition.id, "Dry run, not launching migration");
            return Ok(transition);
        }

        match self.runner.launch_migration(&current, &target) {
            Ok(pid) => {
                self.store.set_transition_process(transition.id, pid)?;
                Ok(Transition {
                    process_id: Some(pid),
                    ..transition
                })
            }
            Err(e) => {
                tracing::error!(
                    transition_id = transition.id,
                    target = %target.name,
                    error = %e,
                    "Failed to launch migration; the watchdog will retry"
                );
                Ok(transition)
            }
        }
    }

    /// Complete the latest transition if this host is its target, then
    /// decommission the vacated host once.
    ///
    /// # Errors
    /// Returns `NotInitialized` if the catalog is empty, or a storage error.
    pub fn finalize_if_arrived(&self) -> Result<ArrivalOutcome> {
        self.finalize_if_arrived_at(Utc::now())
    }

    /// [`Self::finalize_if_arrived`] with an explicit end time.
    ///
    /// # Errors
    /// See [`Self::finalize_if_arrived`].
    pub fn finalize_if_arrived_at(&self, now: DateTime<Utc>) -> Result<ArrivalOutcome> {
        let Some(latest) = self.store.latest_transition()? else {
            return Ok(ArrivalOutcome::NoTransition);
        };

        let current = self.host.current_host(self.store)?;
        if latest.target_id != Some(current.id) {
            return Ok(ArrivalOutcome::NotTarget);
        }

        if latest.is_in_flight() && self.store.finalize_transition(latest.id, now)? {
            tracing::info!(transition_id = latest.id, host = %current.name, "Migration arrived");
        }

        if !self.store.claim_cleanup(latest.id)? {
            return Ok(ArrivalOutcome::AlreadyFinalized {
                transition_id: latest.id,
            });
        }

        let decommission = match self.store.resolve_host(latest.source_id)? {
            Some(source) => HostDecommissioner::new(self.runner, self.dry_run)
                .decommission(&current, &source),
            None => {
                tracing::warn!(
                    transition_id = latest.id,
                    "Vacated host no longer in catalog, skipping decommission"
                );
                DecommissionOutcome::Skipped {
                    reason: "vacated host was deleted".to_string(),
                }
            }
        };

        Ok(ArrivalOutcome::Arrived {
            transition_id: latest.id,
            decommission,
        })
    }
}
