//! Tracing setup for the binary.
//!
//! Library code only emits events; the subscriber is installed once here.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "CLOUDSURF_LOG";
pub const LOG_FORMAT_ENV: &str = "CLOUDSURF_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "CLOUDSURF_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, with targets).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log level from CLI argument or environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    #[default]
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    /// Directive value for an `EnvFilter`.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Combine CLI flags with the environment and config file.
    ///
    /// Level: `--log-level`, then `CLOUDSURF_LOG`, then the config file, then
    /// `error` (`debug` with `--verbose`).
    #[must_use]
    pub fn resolve(
        cli_level: Option<&str>,
        config_level: Option<&str>,
        json_output: bool,
        verbose: bool,
    ) -> Self {
        let explicit = cli_level
            .and_then(LogLevel::from_arg)
            .or_else(level_from_env)
            .or_else(|| config_level.and_then(LogLevel::from_arg));
        let level = match explicit {
            Some(level) => level,
            None if verbose => LogLevel::Debug,
            None => LogLevel::default(),
        };

        let format = if json_output {
            LogFormat::Json
        } else {
            format_from_env().unwrap_or_default()
        };

        Self {
            level,
            format,
            file: file_from_env(),
        }
    }

    /// The filter directive used when `RUST_LOG` is not set.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("cloudsurf={}", self.level.as_filter())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn level_from_env() -> Option<LogLevel> {
    non_empty_env(LOG_LEVEL_ENV).and_then(|v| LogLevel::from_arg(&v))
}

fn format_from_env() -> Option<LogFormat> {
    non_empty_env(LOG_FORMAT_ENV).and_then(|v| LogFormat::from_arg(&v))
}

fn file_from_env() -> Option<PathBuf> {
    non_empty_env(LOG_FILE_ENV).map(PathBuf::from)
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(settings: &LogSettings) {
    let file = settings.file.as_ref().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let writer = match file {
        Some(file) => BoxMakeWriter::new(file),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    match settings.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_writer(writer)
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_target(false)
                .try_init()
                .ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[allow(unsafe_code)]
    fn with_env_var(key: &str, value: Option<&str>, f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let prior = std::env::var(key).ok();
        unsafe {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
        f();
        match prior {
            Some(val) => unsafe {
                std::env::set_var(key, val);
            },
            None => unsafe {
                std::env::remove_var(key);
            },
        }
    }

    #[test]
    fn cli_level_beats_env_and_config() {
        with_env_var(LOG_LEVEL_ENV, Some("warn"), || {
            let settings = LogSettings::resolve(Some("trace"), Some("info"), false, false);
            assert_eq!(settings.level, LogLevel::Trace);

            let settings = LogSettings::resolve(None, Some("info"), false, false);
            assert_eq!(settings.level, LogLevel::Warn);
        });
    }

    #[test]
    fn verbose_only_raises_the_default() {
        with_env_var(LOG_LEVEL_ENV, None, || {
            assert_eq!(
                LogSettings::resolve(None, None, false, true).level,
                LogLevel::Debug
            );
            assert_eq!(
                LogSettings::resolve(None, Some("warn"), false, true).level,
                LogLevel::Warn
            );
            assert_eq!(
                LogSettings::resolve(None, None, false, false).level,
                LogLevel::Error
            );
        });
    }

    #[test]
    fn json_flag_and_format_env() {
        with_env_var(LOG_FORMAT_ENV, Some("compact"), || {
            assert_eq!(
                LogSettings::resolve(None, None, false, false).format,
                LogFormat::Compact
            );
            assert_eq!(
                LogSettings::resolve(None, None, true, false).format,
                LogFormat::Json
            );
        });
    }

    #[test]
    fn directive_targets_this_crate() {
        let settings = LogSettings {
            level: LogLevel::Info,
            ..LogSettings::default()
        };
        assert_eq!(settings.directive(), "cloudsurf=info");
        assert_eq!(LogLevel::from_arg("bogus"), None);
    }
}
