//! CLI argument parsing and command dispatch.

pub mod args;
pub mod context;
pub mod doctor;
pub mod history;
pub mod jobs;
pub mod log;
pub mod migrate;
pub mod output;
pub mod overview;
pub mod status;

pub use args::{Cli, Commands, OutputFormat};
pub use context::AppContext;

use crate::error::{ExitCode, Result};

/// Run the parsed command.
///
/// # Errors
/// Returns the command's error; the caller maps it to an exit code.
pub async fn execute(cli: &Cli, ctx: &AppContext) -> Result<ExitCode> {
    let format = cli.effective_format();
    let pretty = cli.pretty;

    match &cli.command {
        Commands::Status => status::execute(ctx, pretty)?,
        Commands::Overview => overview::execute(ctx, format, pretty)?,
        Commands::Log(args) => log::execute(ctx, args, format, pretty)?,
        Commands::Move(args) => migrate::execute(ctx, args, format, pretty)?,
        Commands::Cycle => jobs::cycle(ctx, format, pretty).await?,
        Commands::Watchdog => jobs::watchdog(ctx, format, pretty).await?,
        Commands::Startup => jobs::startup(ctx, format, pretty)?,
        Commands::History(args) => history::transitions(ctx, args, format, pretty)?,
        Commands::Forecasts(args) => history::forecasts(ctx, args, format, pretty)?,
        Commands::Doctor => {
            if !doctor::execute(ctx, format, pretty)? {
                return Ok(ExitCode::GeneralError);
            }
        }
    }
    Ok(ExitCode::Success)
}
