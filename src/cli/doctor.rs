//! `doctor` command: readiness report.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::cli::context::AppContext;
use crate::cli::output::print_json;
use crate::core::doctor::{CheckStatus, DoctorReport, run_checks};
use crate::error::Result;

fn render_human(report: &DoctorReport) -> String {
    let mut out = format!("{} {}\n\n", "cloudsurf".bold(), report.version);

    for check in &report.checks {
        let mark = match check.status {
            CheckStatus::Pass { .. } => "ok".green(),
            CheckStatus::Warning { .. } => "warn".yellow(),
            CheckStatus::Fail { .. } => "FAIL".red().bold(),
        };
        out.push_str(&format!("[{mark}] {}: {}\n", check.name, check.status));
    }

    let pending: Vec<_> = report.hosts.iter().filter(|h| !h.is_ready()).collect();
    if !pending.is_empty() {
        out.push_str(&format!("\n{}\n", "Missing credentials".bold()));
        for host in pending {
            out.push_str(&format!("  {}: {}\n", host.long_name, host.missing.join(", ")));
        }
    }
    out
}

/// Print the readiness report. Returns whether everything is ready.
///
/// # Errors
/// Returns a storage error if the ledger cannot be read.
pub fn execute(ctx: &AppContext, format: OutputFormat, pretty: bool) -> Result<bool> {
    let store = ctx.open_store()?;
    let report = run_checks(&store, &ctx.resolved.config, &ctx.identifier)?;

    match format {
        OutputFormat::Json => print_json(&report, pretty)?,
        OutputFormat::Human => print!("{}", render_human(&report)),
    }
    Ok(report.is_ready())
}
