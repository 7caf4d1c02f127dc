//! Teardown of the host vacated by a completed migration.

use serde::Serialize;

use crate::core::models::HostIdentity;
use crate::core::runner::AutomationRunner;

/// What happened to a decommission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecommissionOutcome {
    /// The decommission process is running.
    Launched { host: String, pid: u32 },
    /// Dry-run mode: nothing was launched.
    DryRun { host: String },
    /// Nothing to tear down.
    Skipped { reason: String },
    /// The process could not be started; logged and absorbed.
    LaunchFailed { host: String, reason: String },
}

/// Launches the decommission automation for a vacated host.
pub struct HostDecommissioner<'a, R> {
    runner: &'a R,
    dry_run: bool,
}

impl<'a, R: AutomationRunner> HostDecommissioner<'a, R> {
    #[must_use]
    pub const fn new(runner: &'a R, dry_run: bool) -> Self {
        Self { runner, dry_run }
    }

    /// Tear down `host`, running from `current`.
    ///
    /// Only real providers are decommissioned; the local identity and plain
    /// API entries have nothing to delete.
    pub fn decommission(&self, current: &HostIdentity, host: &HostIdentity) -> DecommissionOutcome {
        if !host.is_provider {
            tracing::info!(host = %host.name, "Vacated host is not a provider, nothing to decommission");
            return DecommissionOutcome::Skipped {
                reason: format!("{} is not a provider", host.name),
            };
        }

        if host.id == current.id {
            tracing::warn!(host = %host.name, "Refusing to decommission the current host");
            return DecommissionOutcome::Skipped {
                reason: format!("{} is the current host", host.name),
            };
        }

        if self.dry_run {
            tracing::info!(host = %host.name, "Dry run, not decommissioning");
            return DecommissionOutcome::DryRun {
                host: host.name.clone(),
            };
        }

        match self.runner.launch_decommission(current, host) {
            Ok(pid) => {
                tracing::info!(host = %host.name, pid, "Decommissioning vacated host");
                DecommissionOutcome::Launched {
                    host: host.name.clone(),
                    pid,
                }
            }
            Err(e) => {
                tracing::error!(host = %host.name, error = %e, "Failed to launch decommission");
                DecommissionOutcome::LaunchFailed {
                    host: host.name.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingRunner, RunnerCall, catalog_host, seeded_store};

    #[test]
    fn launches_for_vacated_provider() {
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let aws = catalog_host(&store, "aws");
        let azure = catalog_host(&store, "azure");

        let outcome = HostDecommissioner::new(&runner, false).decommission(&aws, &azure);

        assert!(matches!(outcome, DecommissionOutcome::Launched { ref host, .. } if host == "azure"));
        assert_eq!(
            runner.calls(),
            vec![RunnerCall::Decommission {
                current: "aws".to_string(),
                host: "azure".to_string()
            }]
        );
    }

    #[test]
    fn local_identity_and_self_are_skipped() {
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let aws = catalog_host(&store, "aws");
        let none = catalog_host(&store, "none");
        let decommissioner = HostDecommissioner::new(&runner, false);

        assert!(matches!(
            decommissioner.decommission(&aws, &none),
            DecommissionOutcome::Skipped { .. }
        ));
        assert!(matches!(
            decommissioner.decommission(&aws, &aws),
            DecommissionOutcome::Skipped { .. }
        ));
        assert_eq!(runner.decommission_count(), 0);
    }

    #[test]
    fn dry_run_launches_nothing() {
        let store = seeded_store();
        let runner = RecordingRunner::new();
        let outcome = HostDecommissioner::new(&runner, true)
            .decommission(&catalog_host(&store, "aws"), &catalog_host(&store, "google"));

        assert_eq!(
            outcome,
            DecommissionOutcome::DryRun {
                host: "google".to_string()
            }
        );
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn launch_failure_is_absorbed() {
        let store = seeded_store();
        let runner = RecordingRunner::failing();
        let outcome = HostDecommissioner::new(&runner, false)
            .decommission(&catalog_host(&store, "aws"), &catalog_host(&store, "google"));

        let DecommissionOutcome::LaunchFailed { host, reason } = outcome else {
            panic!("expected launch failure");
        };
        assert_eq!(host, "google");
        assert!(reason.contains("os error 2"));
    }
}
