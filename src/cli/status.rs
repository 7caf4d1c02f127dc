//! `status` command: the migration progress query.

use crate::cli::context::AppContext;
use crate::cli::output::print_json;
use crate::error::Result;

/// Print the current migration status.
///
/// Always answers with the `{"date", "status"}` or `{"error"}` shape; log
/// problems are part of the answer, not a command failure.
///
/// # Errors
/// Returns an error only if the report cannot be serialized.
pub fn execute(ctx: &AppContext, pretty: bool) -> Result<()> {
    let report = ctx.log_parser().status();
    if report.is_error() {
        tracing::debug!(?report, "Status query answered with an error payload");
    }
    print_json(&report, pretty)
}
