//! Periodic entry points.
//!
//! An external scheduler runs the cost cycle and the hanging-migration check
//! on fixed cadences; service startup runs the arrival check. Each returns a
//! tagged outcome so callers branch on the kind of result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::decision::{DecisionEngine, PriceSource};
use crate::core::host::HostIdentifier;
use crate::core::models::TransitionId;
use crate::core::orchestrator::{ArrivalOutcome, MigrationOrchestrator};
use crate::core::runner::AutomationRunner;
use crate::core::watchdog::{StaleTransitionWatchdog, WatchdogOutcome};
use crate::error::Result;
use crate::storage::{Config, LedgerStore};

/// Result of one cost cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The cheapest provider is the current host.
    Stayed {
        host: String,
        means: BTreeMap<String, f64>,
    },
    /// A migration toward the cheapest provider was started.
    MoveStarted {
        target: String,
        transition_id: TransitionId,
        means: BTreeMap<String, f64>,
    },
}

impl CycleOutcome {
    /// One-line summary for human output.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Stayed { host, .. } => format!("Staying put on {host}"),
            Self::MoveStarted { target, .. } => format!("Moving to {target}"),
        }
    }
}

/// Shared collaborators for the periodic jobs.
pub struct Jobs<'a, R> {
    store: &'a LedgerStore,
    identifier: &'a HostIdentifier,
    runner: &'a R,
    config: &'a Config,
    dry_run: bool,
}

impl<'a, R: AutomationRunner> Jobs<'a, R> {
    #[must_use]
    pub const fn new(
        store: &'a LedgerStore,
        identifier: &'a HostIdentifier,
        runner: &'a R,
        config: &'a Config,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            identifier,
            runner,
            config,
            dry_run,
        }
    }

    #[must_use]
    pub const fn orchestrator(&self) -> MigrationOrchestrator<'a, R> {
        MigrationOrchestrator::new(self.store, self.identifier, self.runner, self.dry_run)
    }

    /// Sample prices, pick the cheapest provider and move there if it is not
    /// the current host.
    ///
    /// # Errors
    /// Returns decision errors (`InsufficientTickerData`, `UpstreamError`) and
    /// transition errors (`AlreadyInProgress`, `AttemptedSelfTarget`) as-is.
    pub async fn cost_cycle<P: PriceSource>(&self, source: &P) -> Result<CycleOutcome> {
        self.cost_cycle_at(source, Utc::now()).await
    }

    /// [`Self::cost_cycle`] evaluated at `now`.
    ///
    /// # Errors
    /// See [`Self::cost_cycle`].
    pub async fn cost_cycle_at<P: PriceSource>(
        &self,
        source: &P,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let decision = DecisionEngine::new(self.store, source, &self.config.decision)
            .next_target_at(now)
            .await?;

        let current = self.identifier.current_host(self.store)?;
        if decision.target.id == current.id {
            tracing::info!(host = %current.name, "Staying put");
            return Ok(CycleOutcome::Stayed {
                host: current.name,
                means: decision.means,
            });
        }

        // Current host is resolved again inside; the conditional insert
        // settles any concurrent start.
        let transition =
            self.orchestrator()
                .begin_transition_at(&decision.target.name, None, now)?;

        Ok(CycleOutcome::MoveStarted {
            target: decision.target.name,
            transition_id: transition.id,
            means: decision.means,
        })
    }

    /// Kill and retry a migration that has been in flight too long.
    ///
    /// # Errors
    /// See [`StaleTransitionWatchdog::check`].
    pub async fn hanging_check(&self) -> Result<WatchdogOutcome> {
        self.hanging_check_at(Utc::now()).await
    }

    /// [`Self::hanging_check`] evaluated at `now`.
    ///
    /// # Errors
    /// See [`StaleTransitionWatchdog::check`].
    pub async fn hanging_check_at(&self, now: DateTime<Utc>) -> Result<WatchdogOutcome> {
        let orchestrator = self.orchestrator();
        StaleTransitionWatchdog::new(
            self.store,
            &orchestrator,
            self.runner,
            self.config.timing.watchdog_timeout(),
        )
        .check_at(now)
        .await
    }

    /// Service startup: finalize an arrival on this host.
    ///
    /// The catalog is synchronised by [`open_ledger`] before this runs.
    ///
    /// # Errors
    /// Returns storage errors or `NotInitialized`.
    pub fn startup(&self) -> Result<ArrivalOutcome> {
        self.orchestrator().finalize_if_arrived()
    }
}

/// Open the ledger and bring the catalog in line with the configuration.
///
/// # Errors
/// Returns an error if the database cannot be opened or migrated.
pub fn open_ledger(database: &std::path::Path, config: &Config) -> Result<LedgerStore> {
    let store = LedgerStore::open(database)?;
    let hosts = store.sync_catalog(&config.hosts)?;
    tracing::debug!(hosts = hosts.len(), ?database, "Catalog synchronised");
    Ok(store)
}
