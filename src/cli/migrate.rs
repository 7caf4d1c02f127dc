//! `move` command: the manual migration trigger.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::{MoveArgs, OutputFormat};
use crate::cli::context::AppContext;
use crate::cli::output::print_json;
use crate::core::models::Transition;
use crate::error::Result;

#[derive(Serialize)]
struct MoveJson<'a> {
    target: &'a str,
    dry_run: bool,
    transition: &'a Transition,
}

/// Start a transition toward `args.target`.
///
/// # Errors
/// Returns `AlreadyInProgress`, `AttemptedSelfTarget` or `InvalidTarget`
/// when the request is rejected; the ledger is left untouched in each case.
pub fn execute(ctx: &AppContext, args: &MoveArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let store = ctx.open_store()?;
    let transition = ctx
        .jobs(&store)
        .orchestrator()
        .begin_transition(&args.target, args.initiator.as_deref())?;

    match format {
        OutputFormat::Json => print_json(
            &MoveJson {
                target: &args.target,
                dry_run: ctx.resolved.dry_run,
                transition: &transition,
            },
            pretty,
        ),
        OutputFormat::Human => {
            println!(
                "{} {} (transition {})",
                "Moving to".green(),
                args.target.bold(),
                transition.id
            );
            if ctx.resolved.dry_run {
                println!("{}", "Dry run: no automation was launched".dimmed());
            }
            Ok(())
        }
    }
}
