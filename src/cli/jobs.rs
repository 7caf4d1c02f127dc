//! Scheduler entry points: `cycle`, `watchdog` and `startup`.

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::cli::context::AppContext;
use crate::cli::output::print_json;
use crate::core::decision::AlphaVantageSource;
use crate::core::decommission::DecommissionOutcome;
use crate::core::orchestrator::ArrivalOutcome;
use crate::core::watchdog::WatchdogOutcome;
use crate::error::Result;

fn emit<T: Serialize>(value: &T, human: &str, format: OutputFormat, pretty: bool) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(value, pretty),
        OutputFormat::Human => {
            println!("{human}");
            Ok(())
        }
    }
}

/// Run one decision cycle.
///
/// # Errors
/// Returns decision and transition errors unchanged.
pub async fn cycle(ctx: &AppContext, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let source = AlphaVantageSource::from_store(&store, &ctx.resolved.config.decision)?;
    let outcome = ctx.jobs(&store).cost_cycle(&source).await?;
    emit(&outcome, &outcome.summary(), format, pretty)
}

/// Run one hanging-migration check.
///
/// # Errors
/// Returns termination, storage and retry errors.
pub async fn watchdog(ctx: &AppContext, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let outcome = ctx.jobs(&store).hanging_check().await?;
    let human = match &outcome {
        WatchdogOutcome::Healthy => "No hanging migration".to_string(),
        WatchdogOutcome::Retried { target, .. } => format!("Restarted hanging migration to {target}"),
        WatchdogOutcome::RetryRaced { target } => {
            format!("Cleared hanging migration to {target}; another migration is already running")
        }
        WatchdogOutcome::ClearedWithoutTarget { .. } => {
            "Cleared hanging migration; its target no longer exists".to_string()
        }
        WatchdogOutcome::AlreadyRecovering { .. } => {
            "Hanging migration is already being recovered".to_string()
        }
    };
    emit(&outcome, &human, format, pretty)
}

/// Finalize an arrival on this host.
///
/// # Errors
/// Returns storage errors or `NotInitialized`.
pub fn startup(ctx: &AppContext, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let outcome = ctx.jobs(&store).startup()?;
    let human = match &outcome {
        ArrivalOutcome::NoTransition => "No migration recorded".to_string(),
        ArrivalOutcome::NotTarget => "This host is not the target of the latest migration".to_string(),
        ArrivalOutcome::AlreadyFinalized { .. } => "Latest migration already finalized".to_string(),
        ArrivalOutcome::Arrived { decommission, .. } => match decommission {
            DecommissionOutcome::Launched { host, .. } => {
                format!("Migration complete, decommissioning {host}")
            }
            DecommissionOutcome::DryRun { host } => {
                format!("Migration complete, would decommission {host}")
            }
            DecommissionOutcome::Skipped { reason } => {
                format!("Migration complete, nothing to decommission ({reason})")
            }
            DecommissionOutcome::LaunchFailed { host, reason } => {
                format!("Migration complete, decommissioning {host} failed: {reason}")
            }
        },
    };
    emit(&outcome, &human, format, pretty)
}
