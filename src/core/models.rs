//! Core data models.
//!
//! These are plain records as read from the ledger. Cross-record references
//! (`Transition::source_id`, `Forecast::provider_id`, ...) are optional ids
//! resolved through the store at read time, so history stays valid after a
//! host identity is deleted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Row id of a host identity.
pub type HostId = i64;

/// Row id of a transition.
pub type TransitionId = i64;

/// Name of the distinguished identity used when no provider matches.
pub const LOCAL_HOST_NAME: &str = "none";

// =============================================================================
// Host Identity
// =============================================================================

/// A known API or cloud provider entry in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostIdentity {
    pub id: HostId,
    /// Short unique key (e.g. `aws`).
    pub name: String,
    /// Display name (e.g. `Amazon Web Services`).
    pub long_name: String,
    /// True if the service can run on this entry.
    pub is_provider: bool,
    /// Stock ticker used by the decision engine.
    pub ticker_symbol: Option<String>,
    /// Substring expected in the local system-vendor descriptor.
    pub identity_marker: Option<String>,
}

impl HostIdentity {
    /// Whether this is the distinguished "unknown/local" identity.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.name == LOCAL_HOST_NAME
    }

    /// Case-insensitive containment of the identity marker in `descriptor`.
    ///
    /// Entries without a marker (or with an empty one) never match.
    #[must_use]
    pub fn matches_descriptor(&self, descriptor: &str) -> bool {
        match self.identity_marker.as_deref().map(str::trim) {
            Some(marker) if !marker.is_empty() => descriptor
                .to_lowercase()
                .contains(&marker.to_lowercase()),
            _ => false,
        }
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.long_name)
    }
}

/// Catalog entry as declared in configuration, before it has a row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub name: String,
    pub long_name: String,
    pub is_provider: bool,
    pub ticker_symbol: Option<String>,
    pub identity_marker: Option<String>,
}

// =============================================================================
// Credential
// =============================================================================

/// A named secret owned by exactly one host identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: i64,
    pub host_id: HostId,
    pub name: String,
    pub value: String,
}

impl Credential {
    /// A credential with an empty value counts as not configured.
    #[must_use]
    pub fn is_set(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

// =============================================================================
// Transition
// =============================================================================

/// A record of (or attempt at) moving the service between hosts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub id: TransitionId,
    /// User who asked for the move; `None` for automatic moves.
    pub initiator: Option<String>,
    pub source_id: Option<HostId>,
    pub target_id: Option<HostId>,
    pub start_time: DateTime<Utc>,
    /// `None` while the transition is in flight.
    pub end_time: Option<DateTime<Utc>>,
    pub succeeded: bool,
    /// Set once the vacated host has been handed to the decommissioner.
    pub cleanup_done: bool,
    /// Process group of the spawned migration process, when known.
    pub process_id: Option<u32>,
}

impl Transition {
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.end_time.is_none()
    }

    /// Time elapsed since the transition started.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.start_time)
    }
}

/// Transition to be inserted into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransition {
    pub initiator: Option<String>,
    pub source_id: Option<HostId>,
    pub target_id: HostId,
    pub start_time: DateTime<Utc>,
}

/// Migration state as observed through the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    /// No transition has ever been recorded.
    Idle,
    /// Exactly one transition has no end time.
    InFlight(Transition),
    /// Every transition has ended; carries the latest one.
    Terminal(Transition),
}

impl MigrationState {
    /// Derive the state from the latest transition by start time.
    #[must_use]
    pub fn from_latest(latest: Option<Transition>) -> Self {
        match latest {
            None => Self::Idle,
            Some(t) if t.is_in_flight() => Self::InFlight(t),
            Some(t) => Self::Terminal(t),
        }
    }

    #[must_use]
    pub const fn accepts_new_transition(&self) -> bool {
        !matches!(self, Self::InFlight(_))
    }
}

// =============================================================================
// Price Samples and Forecasts
// =============================================================================

/// Percent price change of every provider captured at one instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub id: i64,
    pub time: DateTime<Utc>,
    /// Provider name to percent change.
    pub changes: BTreeMap<String, f64>,
}

/// Output of one decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forecast {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub provider_id: Option<HostId>,
}

// =============================================================================
// Status Report
// =============================================================================

/// Answer of the status query surface.
///
/// Serializes to `{"date": ..., "status": ...}` or `{"error": ...}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StatusReport {
    Progress {
        date: Option<DateTime<Utc>>,
        status: String,
    },
    Failure {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<String>,
    },
}

impl StatusReport {
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(marker: Option<&str>) -> HostIdentity {
        HostIdentity {
            id: 1,
            name: "aws".to_string(),
            long_name: "Amazon Web Services".to_string(),
            is_provider: true,
            ticker_symbol: Some("AMZN".to_string()),
            identity_marker: marker.map(str::to_string),
        }
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        assert!(host(Some("Xen")).matches_descriptor("XEN\n"));
        assert!(host(Some("xen")).matches_descriptor("Xen HVM domU"));
        assert!(!host(Some("Google")).matches_descriptor("Xen"));
    }

    #[test]
    fn missing_or_empty_marker_never_matches() {
        assert!(!host(None).matches_descriptor("anything"));
        assert!(!host(Some("")).matches_descriptor("anything"));
        assert!(!host(Some("  ")).matches_descriptor("anything"));
    }

    #[test]
    fn migration_state_from_latest() {
        let open = Transition {
            id: 1,
            initiator: None,
            source_id: Some(1),
            target_id: Some(2),
            start_time: Utc::now(),
            end_time: None,
            succeeded: false,
            cleanup_done: false,
            process_id: None,
        };
        let mut closed = open.clone();
        closed.end_time = Some(Utc::now());

        assert_eq!(MigrationState::from_latest(None), MigrationState::Idle);
        assert!(!MigrationState::from_latest(Some(open)).accepts_new_transition());
        assert!(MigrationState::from_latest(Some(closed)).accepts_new_transition());
    }

    #[test]
    fn status_report_serializes_to_query_shape() {
        let progress = StatusReport::Progress {
            date: None,
            status: "Installing packages".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&progress).unwrap(),
            r#"{"date":null,"status":"Installing packages"}"#
        );

        let failure = StatusReport::Failure {
            error: "invalid".to_string(),
            status: None,
        };
        assert_eq!(serde_json::to_string(&failure).unwrap(), r#"{"error":"invalid"}"#);
    }
}
