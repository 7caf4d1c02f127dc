//! Application paths for config, data, and automation logs.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Data directory (ledger database).
    pub data: PathBuf,
    /// Directory the automation logs are written to by default.
    pub logs: PathBuf,
}

impl AppPaths {
    /// Create paths for the cloudsurf application.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "cloudsurf") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
                logs: proj_dirs.data_dir().join("logs"),
            }
        } else {
            // Fallback to home directory
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            Self {
                config: home.join(".config/cloudsurf"),
                data: home.join(".local/share/cloudsurf"),
                logs: home.join(".local/share/cloudsurf/logs"),
            }
        }
    }

    /// Path to the default config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Path to the ledger database file.
    #[must_use]
    pub fn ledger_db_file(&self) -> PathBuf {
        self.data.join("cloudsurf.sqlite")
    }

    /// Log written by the migration automation.
    #[must_use]
    pub fn migration_log(&self) -> PathBuf {
        self.logs.join("ansible.log")
    }

    /// Log written by the decommission automation.
    #[must_use]
    pub fn deletion_log(&self) -> PathBuf {
        self.logs.join("delete_log.txt")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_files_live_under_their_dirs() {
        let paths = AppPaths::new();
        assert!(paths.config_file().starts_with(&paths.config));
        assert!(paths.ledger_db_file().starts_with(&paths.data));
        assert!(paths.migration_log().starts_with(&paths.logs));
        assert_ne!(paths.migration_log(), paths.deletion_log());
    }
}
