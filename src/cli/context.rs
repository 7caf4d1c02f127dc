//! Per-invocation state shared by commands.

use crate::core::host::HostIdentifier;
use crate::core::jobs::{Jobs, open_ledger};
use crate::core::log_status::LogStatusParser;
use crate::core::runner::PlaybookRunner;
use crate::error::Result;
use crate::storage::{LedgerStore, ResolvedConfig};

/// Resolved configuration plus the collaborators built from it.
pub struct AppContext {
    pub resolved: ResolvedConfig,
    pub identifier: HostIdentifier,
    pub runner: PlaybookRunner,
}

impl AppContext {
    #[must_use]
    pub fn new(resolved: ResolvedConfig) -> Self {
        let identifier = HostIdentifier::new(&resolved.config.general.descriptor_path);
        let runner = PlaybookRunner::new(resolved.config.automation.clone())
            .with_grace(resolved.config.timing.termination_grace());
        Self {
            resolved,
            identifier,
            runner,
        }
    }

    /// Open the ledger with the catalog synchronised.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_store(&self) -> Result<LedgerStore> {
        open_ledger(&self.resolved.database, &self.resolved.config)
    }

    #[must_use]
    pub const fn jobs<'a>(&'a self, store: &'a LedgerStore) -> Jobs<'a, PlaybookRunner> {
        Jobs::new(
            store,
            &self.identifier,
            &self.runner,
            &self.resolved.config,
            self.resolved.dry_run,
        )
    }

    #[must_use]
    pub fn log_parser(&self) -> LogStatusParser {
        let config = &self.resolved.config;
        LogStatusParser::from_config(&config.automation, &config.timing)
    }
}
