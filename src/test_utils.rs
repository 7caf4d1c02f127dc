//! Test utilities for cloudsurf.
//!
//! Provides fakes for the external collaborators (automation runner, price
//! source), seeded ledgers, temporary directories and assertion macros for
//! use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cloudsurf::test_utils::*;
//!
//! let dir = TestDir::new();
//! let identifier = dir.host_identifier("Xen");
//! let store = seeded_store();
//! let runner = RecordingRunner::new();
//! ```

use std::collections::HashMap;
use std::fs;
use std::future::{Future, ready};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use chrono::{DateTime, Utc};

use crate::core::decision::PriceSource;
use crate::core::host::HostIdentifier;
use crate::core::models::{HostIdentity, NewTransition, Transition};
use crate::core::runner::AutomationRunner;
use crate::error::{Result, SurfError};
use crate::storage::LedgerStore;
use crate::storage::config::default_hosts;

// =============================================================================
// Automation Runner Fake
// =============================================================================

/// A call made against [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Migration { current: String, target: String },
    Decommission { current: String, host: String },
    Terminate { pid: Option<u32> },
}

/// Runner that records calls instead of spawning processes.
#[derive(Debug)]
pub struct RecordingRunner {
    calls: Mutex<Vec<RunnerCall>>,
    fail_launches: AtomicBool,
    next_pid: AtomicU32,
}

impl RecordingRunner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_launches: AtomicBool::new(false),
            next_pid: AtomicU32::new(40_000),
        }
    }

    /// A runner whose launches all fail.
    #[must_use]
    pub fn failing() -> Self {
        let runner = Self::new();
        runner.fail_launches.store(true, Ordering::SeqCst);
        runner
    }

    /// All recorded calls, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the call log mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().expect("runner call log").clone()
    }

    /// Number of decommission launches attempted.
    #[must_use]
    pub fn decommission_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RunnerCall::Decommission { .. }))
            .count()
    }

    fn record(&self, call: RunnerCall) {
        self.calls.lock().expect("runner call log").push(call);
    }

    fn launch(&self, program: &str) -> Result<u32> {
        if self.fail_launches.load(Ordering::SeqCst) {
            return Err(SurfError::ProcessLaunchFailure {
                program: program.to_string(),
                reason: "No such file or directory (os error 2)".to_string(),
            });
        }
        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomationRunner for RecordingRunner {
    fn launch_migration(&self, current: &HostIdentity, target: &HostIdentity) -> Result<u32> {
        self.record(RunnerCall::Migration {
            current: current.name.clone(),
            target: target.name.clone(),
        });
        self.launch("ansible-playbook main.yml")
    }

    fn launch_decommission(&self, current: &HostIdentity, host: &HostIdentity) -> Result<u32> {
        self.record(RunnerCall::Decommission {
            current: current.name.clone(),
            host: host.name.clone(),
        });
        self.launch("ansible-playbook death.yml")
    }

    fn terminate_migration(&self, pid: Option<u32>) -> impl Future<Output = Result<()>> + Send {
        self.record(RunnerCall::Terminate { pid });
        ready(Ok(()))
    }
}

// =============================================================================
// Price Source Stub
// =============================================================================

/// Price source answering from a fixed table of ticker to change.
#[derive(Debug, Clone, Default)]
pub struct StubPriceSource {
    quotes: HashMap<String, std::result::Result<f64, String>>,
}

impl StubPriceSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote `change` percent for `ticker`.
    #[must_use]
    pub fn with_quote(mut self, ticker: &str, change: f64) -> Self {
        self.quotes.insert(ticker.to_string(), Ok(change));
        self
    }

    /// Answer `ticker` with an upstream error.
    #[must_use]
    pub fn with_error(mut self, ticker: &str, message: &str) -> Self {
        self.quotes
            .insert(ticker.to_string(), Err(message.to_string()));
        self
    }
}

impl PriceSource for StubPriceSource {
    fn change_percent(&self, symbol: &str) -> impl Future<Output = Result<f64>> + Send {
        let answer = match self.quotes.get(symbol) {
            Some(Ok(change)) => Ok(*change),
            Some(Err(message)) => Err(SurfError::UpstreamError(message.clone())),
            None => Err(SurfError::UpstreamError(format!("no quote for {symbol}"))),
        };
        ready(answer)
    }
}

// =============================================================================
// Ledger Fixtures
// =============================================================================

/// In-memory ledger holding the shipped catalog.
///
/// # Panics
///
/// Panics if the store cannot be opened or seeded.
#[must_use]
pub fn seeded_store() -> LedgerStore {
    let store = LedgerStore::open_in_memory().expect("open in-memory ledger");
    store
        .sync_catalog(&default_hosts())
        .expect("seed default catalog");
    store
}

/// Look up a catalog entry that must exist.
///
/// # Panics
///
/// Panics if the host is missing.
#[must_use]
pub fn catalog_host(store: &LedgerStore, name: &str) -> HostIdentity {
    store
        .host_by_name(name)
        .expect("query host")
        .unwrap_or_else(|| panic!("host {name} not in catalog"))
}

/// Insert an open transition between two named hosts.
///
/// # Panics
///
/// Panics if the hosts are unknown or a transition is already open.
#[must_use]
pub fn open_transition(
    store: &LedgerStore,
    source: &str,
    target: &str,
    start_time: DateTime<Utc>,
) -> Transition {
    let new = NewTransition {
        initiator: None,
        source_id: Some(catalog_host(store, source).id),
        target_id: catalog_host(store, target).id,
        start_time,
    };
    store
        .insert_transition_if_idle(&new)
        .expect("insert transition")
        .expect("no transition open")
}

// =============================================================================
// Temporary Directory
// =============================================================================

/// An isolated temporary directory for test files.
///
/// The directory is removed when the value is dropped.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// Create a new isolated temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file in the temporary directory with the given content.
    ///
    /// Creates parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }

        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
        path
    }

    /// Get the full path to a file in the temporary directory.
    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }

    /// A host identifier reading a descriptor file that contains `vendor`.
    #[must_use]
    pub fn host_identifier(&self, vendor: &str) -> HostIdentifier {
        HostIdentifier::new(self.create_file("sys_vendor", &format!("{vendor}\n")))
    }

    /// Point an existing identifier's descriptor at a different vendor.
    pub fn set_vendor(&self, vendor: &str) {
        self.create_file("sys_vendor", &format!("{vendor}\n"));
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Config file for end-to-end runs: dry-run, ledger and logs inside `dir`.
#[must_use]
pub fn make_test_config_toml(dir: &Path) -> String {
    format!(
        r#"[general]
database = "{db}"
descriptor_path = "{descriptor}"
dry_run = true

[automation]
migration_log = "{log}"
deletion_log = "{deletion}"
"#,
        db = dir.join("cloudsurf.sqlite").display(),
        descriptor = dir.join("sys_vendor").display(),
        log = dir.join("ansible.log").display(),
        deletion = dir.join("delete_log.txt").display(),
    )
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

/// Assert that a string is valid JSON.
#[macro_export]
macro_rules! assert_json_valid {
    ($json:expr) => {
        let json = $json;
        match serde_json::from_str::<serde_json::Value>(json) {
            Ok(_) => {}
            Err(e) => {
                panic!(
                    "Expected valid JSON, but parsing failed: {}\n\nJSON string:\n{}",
                    e, json
                );
            }
        }
    };
}

/// Assert approximate floating point equality.
#[macro_export]
macro_rules! assert_float_eq {
    ($left:expr, $right:expr) => {
        let left: f64 = $left;
        let right: f64 = $right;
        let epsilon: f64 = f64::EPSILON * 100.0;
        assert!(
            (left - right).abs() < epsilon,
            "Float equality assertion failed: {} != {} (epsilon: {})",
            left,
            right,
            epsilon
        );
    };
}
