//! `history` and `forecasts` commands.

use serde::Serialize;

use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::context::AppContext;
use crate::cli::output::print_json;
use crate::core::models::{HostId, Transition};
use crate::error::Result;
use crate::storage::LedgerStore;
use crate::util::time::format_timestamp;

const DELETED_HOST: &str = "deleted host";

#[derive(Debug, Serialize)]
struct TransitionRow {
    #[serde(flatten)]
    transition: Transition,
    source: String,
    target: String,
}

#[derive(Debug, Serialize)]
struct ForecastRow {
    time: chrono::DateTime<chrono::Utc>,
    provider: String,
}

fn host_label(store: &LedgerStore, id: Option<HostId>) -> Result<String> {
    Ok(store
        .resolve_host(id)?
        .map_or_else(|| DELETED_HOST.to_string(), |h| h.long_name))
}

fn transition_rows(store: &LedgerStore, limit: usize) -> Result<Vec<TransitionRow>> {
    store
        .recent_transitions(limit)?
        .into_iter()
        .map(|transition| {
            Ok(TransitionRow {
                source: host_label(store, transition.source_id)?,
                target: host_label(store, transition.target_id)?,
                transition,
            })
        })
        .collect()
}

fn describe(row: &TransitionRow) -> String {
    let state = if row.transition.is_in_flight() {
        " (in flight)"
    } else if row.transition.succeeded {
        ""
    } else {
        " (aborted)"
    };
    format!(
        "{} to {} at {}{state}",
        row.source,
        row.target,
        format_timestamp(row.transition.start_time)
    )
}

/// List recent transitions, newest first.
///
/// # Errors
/// Returns a storage error if the ledger cannot be read.
pub fn transitions(ctx: &AppContext, args: &ListArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let rows = transition_rows(&store, args.limit)?;

    match format {
        OutputFormat::Json => print_json(&rows, pretty),
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("No migrations recorded");
            }
            for row in &rows {
                println!("{}", describe(row));
            }
            Ok(())
        }
    }
}

/// List recent forecasts, newest first.
///
/// # Errors
/// Returns a storage error if the ledger cannot be read.
pub fn forecasts(ctx: &AppContext, args: &ListArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let rows = store
        .recent_forecasts(args.limit)?
        .into_iter()
        .map(|f| {
            Ok(ForecastRow {
                time: f.time,
                provider: host_label(&store, f.provider_id)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    match format {
        OutputFormat::Json => print_json(&rows, pretty),
        OutputFormat::Human => {
            if rows.is_empty() {
                println!("No forecasts recorded");
            }
            for row in &rows {
                println!("{}  {}", format_timestamp(row.time), row.provider);
            }
            Ok(())
        }
    }
}
