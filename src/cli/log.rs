//! `log` command: print a full automation log.

use serde::Serialize;

use crate::cli::args::{LogArgs, OutputFormat};
use crate::cli::context::AppContext;
use crate::cli::output::print_json;
use crate::core::log_status::read_full_log;
use crate::error::Result;

#[derive(Serialize)]
struct LogJson {
    path: String,
    content: String,
}

/// Print the migration log, or the deletion log with `--deletion`.
///
/// # Errors
/// Returns an error only if JSON output cannot be serialized.
pub fn execute(ctx: &AppContext, args: &LogArgs, format: OutputFormat, pretty: bool) -> Result<()> {
    let automation = &ctx.resolved.config.automation;
    let path = if args.deletion {
        automation.deletion_log_path()
    } else {
        automation.migration_log_path()
    };

    let content = read_full_log(&path);
    match format {
        OutputFormat::Json => print_json(
            &LogJson {
                path: path.display().to_string(),
                content,
            },
            pretty,
        ),
        OutputFormat::Human => {
            print!("{content}");
            if !content.ends_with('\n') {
                println!();
            }
            Ok(())
        }
    }
}
