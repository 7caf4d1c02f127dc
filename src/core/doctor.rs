//! Readiness checks behind `cloudsurf doctor`.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::decision::API_KEY_CREDENTIAL;
use crate::core::host::HostIdentifier;
use crate::core::models::LOCAL_HOST_NAME;
use crate::error::Result;
use crate::storage::{Config, LedgerStore};

/// Result of a single check.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Pass { details: Option<String> },
    /// Usable, but something will not work as configured.
    Warning { details: String },
    Fail { reason: String },
}

impl CheckStatus {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Pass { .. } | Self::Warning { .. })
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass { details: Some(details) } => write!(f, "pass ({details})"),
            Self::Pass { details: None } => write!(f, "pass"),
            Self::Warning { details } => write!(f, "warning: {details}"),
            Self::Fail { reason } => write!(f, "fail: {reason}"),
        }
    }
}

/// A named check and its outcome.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: CheckStatus,
}

impl DiagnosticCheck {
    #[must_use]
    pub fn new(name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Credentials a catalog entry still needs.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HostReadiness {
    pub host: String,
    pub long_name: String,
    pub missing: Vec<String>,
}

impl HostReadiness {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Full readiness report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorReport {
    pub version: String,
    pub checks: Vec<DiagnosticCheck>,
    pub hosts: Vec<HostReadiness>,
}

impl DoctorReport {
    /// True when every check passes and no credential is missing.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.checks.iter().all(|c| c.status.is_ready())
            && self.hosts.iter().all(HostReadiness::is_ready)
    }
}

/// Inspect the catalog, credentials and automation setup.
///
/// # Errors
/// Returns a storage error if the ledger cannot be read.
pub fn run_checks(
    store: &LedgerStore,
    config: &Config,
    identifier: &HostIdentifier,
) -> Result<DoctorReport> {
    let mut checks = vec![check_catalog(store)?, check_current_host(store, identifier)];
    checks.push(check_price_key(store, config)?);
    checks.push(check_playbooks(config));

    let mut hosts = Vec::new();
    for host in store.hosts()? {
        let mut missing: BTreeSet<String> = store
            .credentials_for(host.id)?
            .into_iter()
            .filter(|c| !c.is_set())
            .map(|c| c.name)
            .collect();

        if let Some(entry) = config.hosts.iter().find(|e| e.name == host.name) {
            for name in entry.credentials.keys() {
                if store.credential(host.id, name)?.is_none() {
                    missing.insert(name.clone());
                }
            }
        }

        if !missing.is_empty() {
            tracing::debug!(host = %host.name, ?missing, "Host has unset credentials");
        }
        hosts.push(HostReadiness {
            host: host.name,
            long_name: host.long_name,
            missing: missing.into_iter().collect(),
        });
    }

    Ok(DoctorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
        hosts,
    })
}

fn check_catalog(store: &LedgerStore) -> Result<DiagnosticCheck> {
    let providers = store.providers()?.len();
    let has_local = store.host_by_name(LOCAL_HOST_NAME)?.is_some();
    let status = if providers == 0 {
        CheckStatus::Fail {
            reason: "no providers in catalog".to_string(),
        }
    } else if !has_local {
        CheckStatus::Fail {
            reason: format!("local identity \"{LOCAL_HOST_NAME}\" missing"),
        }
    } else {
        CheckStatus::Pass {
            details: Some(format!("{providers} providers")),
        }
    };
    Ok(DiagnosticCheck::new("catalog", status))
}

fn check_current_host(store: &LedgerStore, identifier: &HostIdentifier) -> DiagnosticCheck {
    let status = match identifier.current_host(store) {
        Ok(host) if host.is_local() => CheckStatus::Warning {
            details: format!(
                "no provider marker found in {}",
                identifier.descriptor_path().display()
            ),
        },
        Ok(host) => CheckStatus::Pass {
            details: Some(host.long_name),
        },
        Err(e) => CheckStatus::Fail {
            reason: e.to_string(),
        },
    };
    DiagnosticCheck::new("current host", status)
}

fn check_price_key(store: &LedgerStore, config: &Config) -> Result<DiagnosticCheck> {
    let api_host = &config.decision.price_api_host;
    let status = match store.host_by_name(api_host)? {
        None => CheckStatus::Fail {
            reason: format!("price API host \"{api_host}\" is not in the catalog"),
        },
        Some(host) => match store.credential(host.id, API_KEY_CREDENTIAL)? {
            Some(key) if key.is_set() => CheckStatus::Pass { details: None },
            _ => CheckStatus::Fail {
                reason: format!("{api_host} has no \"{API_KEY_CREDENTIAL}\" credential"),
            },
        },
    };
    Ok(DiagnosticCheck::new("price API key", status))
}

fn check_playbooks(config: &Config) -> DiagnosticCheck {
    let missing: Vec<String> = [
        &config.automation.migration_playbook,
        &config.automation.decommission_playbook,
    ]
    .into_iter()
    .filter(|p| !p.exists())
    .map(|p| p.display().to_string())
    .collect();

    let status = if missing.is_empty() {
        CheckStatus::Pass { details: None }
    } else {
        CheckStatus::Warning {
            details: format!("not found: {}", missing.join(", ")),
        }
    };
    DiagnosticCheck::new("playbooks", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestDir, catalog_host, seeded_store};

    #[test]
    fn fresh_catalog_lists_unset_credentials() {
        let dir = TestDir::new();
        let store = seeded_store();
        let config = Config::default_with_catalog();

        let report = run_checks(&store, &config, &dir.host_identifier("Xen")).unwrap();

        assert!(!report.is_ready());
        let azure = report.hosts.iter().find(|h| h.host == "azure").unwrap();
        assert_eq!(
            azure.missing,
            vec!["client_id", "secret", "subscription_id", "tenant"]
        );
        let google = report.hosts.iter().find(|h| h.host == "google").unwrap();
        assert!(google.is_ready());
        let key = report.checks.iter().find(|c| c.name == "price API key").unwrap();
        assert!(!key.status.is_ready());
    }

    #[test]
    fn filled_credentials_are_ready() {
        let dir = TestDir::new();
        let store = seeded_store();
        let config = Config::default_with_catalog();
        for host in store.hosts().unwrap() {
            for credential in store.credentials_for(host.id).unwrap() {
                store.set_credential(host.id, &credential.name, "x").unwrap();
            }
        }

        let report = run_checks(&store, &config, &dir.host_identifier("Google")).unwrap();

        assert!(report.hosts.iter().all(HostReadiness::is_ready));
        let key = report.checks.iter().find(|c| c.name == "price API key").unwrap();
        assert_eq!(key.status, CheckStatus::Pass { details: None });
        let current = report.checks.iter().find(|c| c.name == "current host").unwrap();
        assert_eq!(
            current.status,
            CheckStatus::Pass {
                details: Some(catalog_host(&store, "google").long_name)
            }
        );
    }

    #[test]
    fn unknown_descriptor_is_a_warning() {
        let dir = TestDir::new();
        let store = seeded_store();
        let check = check_current_host(&store, &dir.host_identifier("QEMU"));
        assert!(matches!(check.status, CheckStatus::Warning { .. }));
        assert!(check.status.is_ready());
    }
}
