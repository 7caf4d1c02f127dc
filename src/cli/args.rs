//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// CloudSurf - relocate a running service between cloud providers.
#[derive(Parser, Debug)]
#[command(name = "cloudsurf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file to use instead of the platform default
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Record transitions without launching automation processes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective output format.
    #[must_use]
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the status of the current migration as JSON
    Status,

    /// Show the current host and how long it has been there
    Overview,

    /// Print the full migration or deletion log
    Log(LogArgs),

    /// Start moving the service to another provider
    Move(MoveArgs),

    /// Run one decision cycle and move if a cheaper provider wins
    Cycle,

    /// Recover a migration stuck past the watchdog timeout
    Watchdog,

    /// Finalize an arrived migration and decommission the old host
    Startup,

    /// List recorded transitions
    History(ListArgs),

    /// List recent forecasts
    Forecasts(ListArgs),

    /// Check that the catalog and credentials are ready
    Doctor,
}

/// Arguments for the `log` command.
#[derive(Parser, Debug)]
pub struct LogArgs {
    /// Show the decommission log instead of the migration log
    #[arg(long)]
    pub deletion: bool,
}

/// Arguments for the `move` command.
#[derive(Parser, Debug)]
pub struct MoveArgs {
    /// Catalog name of the provider to move to
    #[arg(value_name = "HOST")]
    pub target: String,

    /// Who asked for the move
    #[arg(long, value_name = "NAME", env = "USER")]
    pub initiator: Option<String>,
}

/// Arguments for listing commands.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Maximum number of rows
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_overrides_format() {
        let cli = Cli::try_parse_from(["cloudsurf", "status", "--json"]).unwrap();
        assert_eq!(cli.effective_format(), OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn move_takes_target_and_initiator() {
        let cli =
            Cli::try_parse_from(["cloudsurf", "move", "azure", "--initiator", "miles"]).unwrap();
        match cli.command {
            Commands::Move(args) => {
                assert_eq!(args.target, "azure");
                assert_eq!(args.initiator.as_deref(), Some("miles"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn move_requires_target() {
        assert!(Cli::try_parse_from(["cloudsurf", "move"]).is_err());
    }
}
