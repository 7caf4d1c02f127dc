//! cloudsurf - cost-driven service relocation between cloud providers
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use cloudsurf::cli::output::render_error;
use cloudsurf::cli::{AppContext, Cli};
use cloudsurf::core::logging::{self, LogSettings};
use cloudsurf::storage::ResolvedConfig;
use cloudsurf::util::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.effective_format();

    let resolved = ResolvedConfig::resolve(&cli);
    let config_level = resolved
        .as_ref()
        .ok()
        .and_then(|r| r.config.general.log_level.clone());
    logging::init(&LogSettings::resolve(
        cli.log_level.as_deref(),
        config_level.as_deref(),
        cli.json_output,
        cli.verbose,
    ));

    let no_color = resolved.as_ref().map_or(cli.no_color, |r| r.no_color);
    if !should_use_color(no_color) {
        colored::control::set_override(false);
    }

    let result = match resolved {
        Ok(resolved) => {
            tracing::debug!(
                config = %resolved.config_path.display(),
                source = %resolved.sources.config_path,
                database = %resolved.database.display(),
                dry_run = resolved.dry_run,
                "Configuration resolved"
            );
            let ctx = AppContext::new(resolved);
            cloudsurf::cli::execute(&cli, &ctx).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("{}", render_error(&e, format, cli.pretty));
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
