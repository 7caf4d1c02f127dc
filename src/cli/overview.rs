//! `overview` command: where the service runs and for how long.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::cli::context::AppContext;
use crate::cli::output::{field, print_json};
use crate::error::Result;
use crate::storage::LedgerStore;
use crate::util::time::format_time_on_host;

#[derive(Debug, Serialize)]
struct Overview {
    current_host: String,
    current_host_name: String,
    moving_to: Option<String>,
    since: Option<DateTime<Utc>>,
    time_on_host: String,
}

fn build(ctx: &AppContext, store: &LedgerStore, now: DateTime<Utc>) -> Result<Overview> {
    let current = ctx.identifier.current_host(store)?;
    let latest = store.latest_transition()?;

    let moving_to = match &latest {
        Some(t) if t.is_in_flight() => Some(
            store
                .resolve_host(t.target_id)?
                .map_or_else(|| "deleted host".to_string(), |h| h.long_name),
        ),
        _ => None,
    };
    let since = latest.and_then(|t| t.end_time);

    Ok(Overview {
        current_host: current.name,
        current_host_name: current.long_name,
        moving_to,
        since,
        time_on_host: format_time_on_host(since, now),
    })
}

/// Print the overview.
///
/// # Errors
/// Returns an error if the ledger cannot be read or the catalog is empty.
pub fn execute(ctx: &AppContext, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let overview = build(ctx, &store, Utc::now())?;

    match format {
        OutputFormat::Json => print_json(&overview, pretty),
        OutputFormat::Human => {
            println!("{}", field("Current host", &overview.current_host_name));
            match &overview.moving_to {
                Some(target) => println!("{}", field("Moving to", &target.yellow().to_string())),
                None => println!("{}", field("Time on host", &overview.time_on_host)),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::Config;
    use crate::test_utils::{TestDir, open_transition, seeded_store};
    use chrono::TimeDelta;

    fn context(dir: &TestDir, vendor: &str) -> AppContext {
        dir.create_file("sys_vendor", vendor);
        let mut config = Config::default_with_catalog();
        config.general.descriptor_path = dir.file_path("sys_vendor");
        AppContext::new(crate::storage::ResolvedConfig {
            config,
            config_path: dir.file_path("config.toml"),
            database: dir.file_path("ledger.sqlite"),
            dry_run: true,
            no_color: true,
            sources: crate::storage::ConfigSources::default(),
        })
    }

    #[test]
    fn never_moved_without_history() {
        let dir = TestDir::new();
        let ctx = context(&dir, "Google");
        let store = seeded_store();

        let overview = build(&ctx, &store, Utc::now()).unwrap();

        assert_eq!(overview.current_host_name, "Google Cloud");
        assert_eq!(overview.moving_to, None);
        assert_eq!(overview.time_on_host, crate::util::time::NEVER_MOVED);
    }

    #[test]
    fn in_flight_shows_target() {
        let dir = TestDir::new();
        let ctx = context(&dir, "Google");
        let store = seeded_store();
        let _ = open_transition(&store, "google", "azure", Utc::now());

        let overview = build(&ctx, &store, Utc::now()).unwrap();

        assert_eq!(overview.moving_to.as_deref(), Some("Microsoft Azure"));
    }

    #[test]
    fn finished_transition_measures_time_on_host() {
        let dir = TestDir::new();
        let ctx = context(&dir, "Microsoft");
        let store = seeded_store();
        let now = Utc::now();
        let t = open_transition(&store, "google", "azure", now - TimeDelta::days(2));
        store
            .finalize_transition(t.id, now - TimeDelta::days(2) + TimeDelta::minutes(20))
            .unwrap();

        let overview = build(&ctx, &store, now).unwrap();

        assert_eq!(overview.time_on_host, "1 day, 23 hours");
    }
}
