//! Detection of the provider the process is currently running on.
//!
//! Every cloud vendor exposes a distinctive system-vendor string (on Linux,
//! `/sys/devices/virtual/dmi/id/sys_vendor`). Each catalog entry carries a
//! marker substring; the first entry whose marker appears in that string is
//! the current host.

use std::path::{Path, PathBuf};

use crate::core::models::{HostIdentity, LOCAL_HOST_NAME};
use crate::error::{Result, SurfError};
use crate::storage::LedgerStore;

/// Resolves the current host against the catalog in the ledger.
#[derive(Debug, Clone)]
pub struct HostIdentifier {
    descriptor_path: PathBuf,
}

impl HostIdentifier {
    #[must_use]
    pub fn new(descriptor_path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor_path: descriptor_path.into(),
        }
    }

    #[must_use]
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// Contents of the system-vendor descriptor, or an empty string when it
    /// is missing or unreadable.
    #[must_use]
    pub fn read_descriptor(&self) -> String {
        match std::fs::read(&self.descriptor_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(
                    path = %self.descriptor_path.display(),
                    error = %e,
                    "Descriptor unreadable, treating as empty"
                );
                String::new()
            }
        }
    }

    /// The catalog entry this process runs on.
    ///
    /// # Errors
    /// Returns `NotInitialized` if the catalog has not been populated, or a
    /// storage error if the catalog cannot be read.
    pub fn current_host(&self, store: &LedgerStore) -> Result<HostIdentity> {
        let hosts = store.hosts()?;
        let descriptor = self.read_descriptor();
        let host = identify(&hosts, &descriptor)?;
        tracing::debug!(host = %host.name, "Resolved current host");
        Ok(host)
    }
}

/// Match `descriptor` against `hosts` in catalog order.
///
/// # Errors
/// Returns `NotInitialized` if `hosts` is empty or lacks the local identity.
pub fn identify(hosts: &[HostIdentity], descriptor: &str) -> Result<HostIdentity> {
    if hosts.is_empty() {
        return Err(SurfError::NotInitialized(
            "host catalog is empty".to_string(),
        ));
    }

    if let Some(found) = hosts.iter().find(|h| h.matches_descriptor(descriptor)) {
        return Ok(found.clone());
    }

    hosts
        .iter()
        .find(|h| h.is_local())
        .cloned()
        .ok_or_else(|| {
            SurfError::NotInitialized(format!(
                "host catalog has no \"{LOCAL_HOST_NAME}\" identity"
            ))
        })
}
