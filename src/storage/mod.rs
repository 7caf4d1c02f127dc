//! Storage for configuration, platform paths, and the transition ledger.

pub mod config;
pub mod ledger;
pub mod paths;
pub mod schema;

pub use config::{
    Config, ConfigSource, ConfigSources, HostEntry, ResolvedConfig, ENV_CONFIG, ENV_DATABASE,
    ENV_DRY_RUN, ENV_NO_COLOR, ENV_NO_COLOR_STD,
};
pub use ledger::LedgerStore;
pub use paths::AppPaths;
pub use schema::run_migrations;
