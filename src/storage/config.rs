//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/cloudsurf/config.toml`
//! - macOS: `~/Library/Application Support/cloudsurf/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `CLOUDSURF_CONFIG`: Override config file path
//! - `CLOUDSURF_DATABASE`: Override ledger database path
//! - `CLOUDSURF_DRY_RUN`: Record transitions without launching processes (1, true, yes)
//! - `CLOUDSURF_NO_COLOR` or `NO_COLOR`: Disable colors (1, true, yes)

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::Cli;
use crate::core::models::{HostSpec, LOCAL_HOST_NAME};
use crate::error::{Result, SurfError};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "CLOUDSURF_CONFIG";
/// Environment variable to override the ledger database path.
pub const ENV_DATABASE: &str = "CLOUDSURF_DATABASE";
/// Environment variable enabling dry-run mode.
pub const ENV_DRY_RUN: &str = "CLOUDSURF_DRY_RUN";
/// Environment variable to disable colors.
pub const ENV_NO_COLOR: &str = "CLOUDSURF_NO_COLOR";
/// Standard environment variable to disable colors.
pub const ENV_NO_COLOR_STD: &str = "NO_COLOR";

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Validated file configuration.
    pub config: Config,
    /// Config file that was consulted (it may not exist).
    pub config_path: PathBuf,
    /// Ledger database location.
    pub database: PathBuf,
    /// Whether automation processes are suppressed.
    pub dry_run: bool,
    /// Whether to disable colored output.
    pub no_color: bool,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub config_path: ConfigSource,
    pub database: ConfigSource,
    pub dry_run: ConfigSource,
    pub no_color: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI args, environment variables, and config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file exists but is invalid
    /// - The configuration fails validation
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let config_path = Self::resolve_config_path(cli, &mut sources.config_path);
        let config = Config::load_from(&config_path)?;
        config.validate()?;

        let database = Self::resolve_database(&config, &mut sources.database);
        let dry_run = Self::resolve_dry_run(cli, &config, &mut sources.dry_run);
        let no_color = Self::resolve_no_color(cli, &mut sources.no_color);

        Ok(Self {
            config,
            config_path,
            database,
            dry_run,
            no_color,
            sources,
        })
    }

    fn resolve_config_path(cli: &Cli, source: &mut ConfigSource) -> PathBuf {
        if let Some(path) = &cli.config {
            *source = ConfigSource::Cli;
            return path.clone();
        }

        if let Ok(path) = std::env::var(ENV_CONFIG) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }

        *source = ConfigSource::Default;
        Config::config_path()
    }

    fn resolve_database(config: &Config, source: &mut ConfigSource) -> PathBuf {
        if let Ok(path) = std::env::var(ENV_DATABASE) {
            *source = ConfigSource::Env;
            return PathBuf::from(path);
        }

        if let Some(path) = &config.general.database {
            *source = ConfigSource::ConfigFile;
            return path.clone();
        }

        *source = ConfigSource::Default;
        AppPaths::new().ledger_db_file()
    }

    fn resolve_dry_run(cli: &Cli, config: &Config, source: &mut ConfigSource) -> bool {
        if cli.dry_run {
            *source = ConfigSource::Cli;
            return true;
        }

        if Self::is_env_truthy(ENV_DRY_RUN) {
            *source = ConfigSource::Env;
            return true;
        }

        if config.general.dry_run {
            *source = ConfigSource::ConfigFile;
            return true;
        }

        *source = ConfigSource::Default;
        false
    }

    fn resolve_no_color(cli: &Cli, source: &mut ConfigSource) -> bool {
        if cli.no_color {
            *source = ConfigSource::Cli;
            return true;
        }

        if Self::is_env_truthy(ENV_NO_COLOR) || std::env::var(ENV_NO_COLOR_STD).is_ok() {
            *source = ConfigSource::Env;
            return true;
        }

        *source = ConfigSource::Default;
        false
    }

    /// Check if an environment variable is set to a truthy value.
    fn is_env_truthy(var: &str) -> bool {
        std::env::var(var)
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false)
    }
}

// =============================================================================
// File Configuration
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// External automation settings.
    pub automation: AutomationConfig,
    /// Timeouts and cadences.
    pub timing: TimingConfig,
    /// Decision engine settings.
    pub decision: DecisionConfig,
    /// Host catalog.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostEntry>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Ledger database path (platform data dir when unset).
    pub database: Option<PathBuf>,
    /// File whose contents identify the cloud vendor.
    pub descriptor_path: PathBuf,
    /// Record transitions without launching automation processes.
    pub dry_run: bool,
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// How the external automation tool is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub migration_playbook: PathBuf,
    pub decommission_playbook: PathBuf,
    /// Tool name resolved on `PATH` when running on the local identity.
    pub local_tool: String,
    /// Absolute tool path used on provider hosts.
    pub remote_tool: PathBuf,
    pub local_package_manager: String,
    pub remote_package_manager: String,
    /// Log written by the migration process (platform data dir when unset).
    pub migration_log: Option<PathBuf>,
    /// Log written by the decommission process (platform data dir when unset).
    pub deletion_log: Option<PathBuf>,
    /// Phase logged by a freshly-migrated host just before it takes over.
    pub fresh_host_phase: String,
}

/// Timeouts and the cadence expected from the external scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub watchdog_timeout_minutes: u64,
    pub stale_marker_minutes: u64,
    pub decision_interval_minutes: u64,
    pub watchdog_interval_minutes: u64,
    /// Seconds a runaway process group gets between SIGTERM and SIGKILL.
    pub termination_grace_seconds: u64,
}

/// Decision engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Number of trailing samples averaged per provider.
    pub window: usize,
    /// Provider names in tie-break order.
    pub priority: Vec<String>,
    pub price_api_base: String,
    /// Catalog entry owning the price API key.
    pub price_api_host: String,
    pub request_timeout_seconds: u64,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub long_name: String,
    #[serde(default)]
    pub provider: bool,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub marker: Option<String>,
    /// Credential name to value. Empty values mark a slot still to be filled.
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

impl HostEntry {
    #[must_use]
    pub fn to_spec(&self) -> HostSpec {
        HostSpec {
            name: self.name.clone(),
            long_name: self.long_name.clone(),
            is_provider: self.provider,
            ticker_symbol: self.ticker.clone(),
            identity_marker: self.marker.clone(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database: None,
            descriptor_path: PathBuf::from("/sys/devices/virtual/dmi/id/sys_vendor"),
            dry_run: false,
            log_level: None,
        }
    }
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            migration_playbook: PathBuf::from("ansible-scripts/main.yml"),
            decommission_playbook: PathBuf::from("ansible-scripts/death.yml"),
            local_tool: "ansible-playbook".to_string(),
            remote_tool: PathBuf::from("/home/ubuntu/.local/bin/ansible-playbook"),
            local_package_manager: "pip".to_string(),
            remote_package_manager: "pip3".to_string(),
            migration_log: None,
            deletion_log: None,
            fresh_host_phase: "Copying self to server".to_string(),
        }
    }
}

impl AutomationConfig {
    #[must_use]
    pub fn migration_log_path(&self) -> PathBuf {
        self.migration_log
            .clone()
            .unwrap_or_else(|| AppPaths::new().migration_log())
    }

    #[must_use]
    pub fn deletion_log_path(&self) -> PathBuf {
        self.deletion_log
            .clone()
            .unwrap_or_else(|| AppPaths::new().deletion_log())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_minutes: 60,
            stale_marker_minutes: 2,
            decision_interval_minutes: 20,
            watchdog_interval_minutes: 30,
            termination_grace_seconds: 5,
        }
    }
}

impl TimingConfig {
    /// Age after which an open transition is considered stuck.
    #[must_use]
    pub fn watchdog_timeout(&self) -> TimeDelta {
        minutes(self.watchdog_timeout_minutes)
    }

    /// Age after which the fresh-host phase is treated as leftover state.
    #[must_use]
    pub fn stale_marker(&self) -> TimeDelta {
        minutes(self.stale_marker_minutes)
    }

    #[must_use]
    pub const fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_seconds)
    }
}

fn minutes(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .unwrap_or(TimeDelta::MAX)
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            window: 72,
            priority: vec!["azure".to_string(), "aws".to_string(), "google".to_string()],
            price_api_base: "https://www.alphavantage.co".to_string(),
            price_api_host: "AlphaVantage".to_string(),
            request_timeout_seconds: 5,
        }
    }
}

impl DecisionConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn entry(
    name: &str,
    long_name: &str,
    provider: Option<(&str, &str)>,
    credentials: &[&str],
) -> HostEntry {
    HostEntry {
        name: name.to_string(),
        long_name: long_name.to_string(),
        provider: provider.is_some(),
        ticker: provider.map(|(ticker, _)| ticker.to_string()),
        marker: provider.map(|(_, marker)| marker.to_string()),
        credentials: credentials
            .iter()
            .map(|name| ((*name).to_string(), String::new()))
            .collect(),
    }
}

/// The catalog shipped with the service.
#[must_use]
pub fn default_hosts() -> Vec<HostEntry> {
    vec![
        entry("google", "Google Cloud", Some(("GOOG", "Google")), &[]),
        entry(
            "azure",
            "Microsoft Azure",
            Some(("MSFT", "Microsoft")),
            &["secret", "tenant", "client_id", "subscription_id"],
        ),
        entry(
            "aws",
            "Amazon Web Services",
            Some(("AMZN", "Xen")),
            &["secret_key", "access_key"],
        ),
        entry("DuckDNS", "Duck DNS", None, &["token"]),
        entry("AlphaVantage", "Alpha Vantage", None, &["key"]),
        entry(LOCAL_HOST_NAME, "Unknown Host", None, &[]),
    ]
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default_with_catalog());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SurfError::Config(format!("Invalid config file: {e}")))?;

        Ok(config)
    }

    /// Defaults including the shipped catalog.
    #[must_use]
    pub fn default_with_catalog() -> Self {
        Self {
            hosts: default_hosts(),
            ..Self::default()
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SurfError::Config(format!("Failed to serialize config: {e}")))?;

        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Validate configuration values.
    ///
    /// Checks that:
    /// - The decision window and timeouts are non-zero
    /// - Host names are unique and include the local identity
    /// - Tie-break priority only names catalog providers
    pub fn validate(&self) -> Result<()> {
        if self.decision.window == 0 {
            return Err(SurfError::Config(
                "decision.window must be at least 1 sample".to_string(),
            ));
        }

        if self.timing.watchdog_timeout_minutes == 0 || self.timing.stale_marker_minutes == 0 {
            return Err(SurfError::Config(
                "timing.watchdog_timeout_minutes and timing.stale_marker_minutes must be greater than 0"
                    .to_string(),
            ));
        }

        if self.decision.request_timeout_seconds == 0 {
            return Err(SurfError::Config(
                "decision.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return Err(SurfError::Config("Host names must not be empty".to_string()));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(SurfError::Config(format!(
                    "Duplicate host \"{}\" in catalog",
                    host.name
                )));
            }
        }

        if !seen.contains(LOCAL_HOST_NAME) {
            return Err(SurfError::Config(format!(
                "Catalog must contain the local identity \"{LOCAL_HOST_NAME}\""
            )));
        }

        for name in &self.decision.priority {
            let known = self.hosts.iter().any(|h| h.provider && &h.name == name);
            if !known {
                return Err(SurfError::Config(format!(
                    "Invalid provider \"{name}\" in decision.priority"
                )));
            }
        }

        Ok(())
    }
}
