//! Error types for cloudsurf.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are grouped into six categories:
//! - **Migration**: the transition state machine rejected a request
//! - **Decision**: the cost signal could not be computed
//! - **Automation**: the external automation tool failed or left a broken log
//! - **Configuration**: config file, catalog or credential problems
//! - **Storage**: the ledger database failed
//! - **Internal**: I/O, serialization and unclassified failures
//!
//! Each error has a stable code (e.g. `SURF-M001`) for programmatic handling.
//! Periodic jobs branch on the variant, never on the message text.

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transition requests rejected by the orchestrator.
    Migration,
    /// Price sampling and target selection failures.
    Decision,
    /// External automation process and log failures.
    Automation,
    /// Configuration, catalog and credential issues.
    Configuration,
    /// Ledger database failures.
    Storage,
    /// Internal errors (I/O, serialization, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Migration => "Migration error",
            Self::Decision => "Decision error",
            Self::Automation => "Automation error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Migration => "M",
            Self::Decision => "D",
            Self::Automation => "A",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Request rejected by the state machine (in progress, self target, unknown host)
    Rejected = 2,
    /// Configuration or catalog problem
    ConfigError = 3,
    /// Price source unreachable or returned an error
    Upstream = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Main error type for cloudsurf operations.
#[derive(Error, Debug)]
pub enum SurfError {
    // ==========================================================================
    // Migration errors (Category: Migration)
    // ==========================================================================
    /// A transition without an end time already exists.
    #[error("a migration is already in progress")]
    AlreadyInProgress,

    /// The requested target is the host the service is running on.
    #[error("cannot migrate to {host}: it is the current host")]
    AttemptedSelfTarget { host: String },

    /// The requested target is not a known host identity.
    #[error("invalid migration target: {0}")]
    InvalidTarget(String),

    // ==========================================================================
    // Decision errors (Category: Decision)
    // ==========================================================================
    /// A provider has no ticker symbol, so providers cannot be compared.
    #[error("cannot compare all hosts, a ticker symbol for {provider} is missing")]
    InsufficientTickerData { provider: String },

    /// The price source was unreachable or returned an error payload.
    #[error("price source error: {0}")]
    UpstreamError(String),

    // ==========================================================================
    // Automation errors (Category: Automation)
    // ==========================================================================
    /// The external automation process could not be started.
    #[error("failed to launch {program}: {reason}")]
    ProcessLaunchFailure { program: String, reason: String },

    /// A running automation process group could not be signalled.
    #[error("failed to terminate process group {pid}: {reason}")]
    ProcessTerminationFailure { pid: u32, reason: String },

    /// The automation log has no recognisable task line in its tail.
    #[error("invalid automation log; inspect the full log for details")]
    InvalidLogFormat,

    /// The automation log reports a fatal failure.
    #[error("automation crashed: {line}")]
    AutomationCrashed { line: String },

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// The host catalog has not been bootstrapped.
    #[error("host catalog not initialized: {0}")]
    NotInitialized(String),

    /// A credential needed for an operation is absent or empty.
    #[error("credential '{name}' for {host} is not set")]
    CredentialMissing { host: String, name: String },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// Ledger database operation failed.
    #[error("database error: {0}")]
    Database(String),

    // ==========================================================================
    // Network errors (Category: Decision)
    // ==========================================================================
    /// Request timeout.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for SurfError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl SurfError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AlreadyInProgress | Self::AttemptedSelfTarget { .. } | Self::InvalidTarget(_) => {
                ExitCode::Rejected
            }

            Self::NotInitialized(_)
            | Self::CredentialMissing { .. }
            | Self::Config(_)
            | Self::InsufficientTickerData { .. } => ExitCode::ConfigError,

            Self::UpstreamError(_) | Self::Timeout(_) | Self::Network(_) => ExitCode::Upstream,

            Self::ProcessLaunchFailure { .. }
            | Self::ProcessTerminationFailure { .. }
            | Self::InvalidLogFormat
            | Self::AutomationCrashed { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyInProgress | Self::AttemptedSelfTarget { .. } | Self::InvalidTarget(_) => {
                ErrorCategory::Migration
            }

            Self::InsufficientTickerData { .. }
            | Self::UpstreamError(_)
            | Self::Timeout(_)
            | Self::Network(_) => ErrorCategory::Decision,

            Self::ProcessLaunchFailure { .. }
            | Self::ProcessTerminationFailure { .. }
            | Self::InvalidLogFormat
            | Self::AutomationCrashed { .. } => ErrorCategory::Automation,

            Self::NotInitialized(_) | Self::CredentialMissing { .. } | Self::Config(_) => {
                ErrorCategory::Configuration
            }

            Self::Database(_) => ErrorCategory::Storage,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyInProgress => "SURF-M001",
            Self::AttemptedSelfTarget { .. } => "SURF-M002",
            Self::InvalidTarget(_) => "SURF-M003",

            Self::InsufficientTickerData { .. } => "SURF-D001",
            Self::UpstreamError(_) => "SURF-D002",
            Self::Timeout(_) => "SURF-D003",
            Self::Network(_) => "SURF-D004",

            Self::ProcessLaunchFailure { .. } => "SURF-A001",
            Self::InvalidLogFormat => "SURF-A002",
            Self::AutomationCrashed { .. } => "SURF-A003",
            Self::ProcessTerminationFailure { .. } => "SURF-A004",

            Self::NotInitialized(_) => "SURF-C001",
            Self::CredentialMissing { .. } => "SURF-C002",
            Self::Config(_) => "SURF-C003",

            Self::Database(_) => "SURF-S001",

            Self::Io(_) => "SURF-X001",
            Self::Json(_) => "SURF-X002",
            Self::Other(_) => "SURF-X003",
        }
    }

    /// Whether retrying the same call later can succeed without new input.
    ///
    /// `AlreadyInProgress` and `AttemptedSelfTarget` need a different request
    /// or a finished transition first, so they are not retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamError(_) | Self::Timeout(_) | Self::Network(_) | Self::Database(_)
        )
    }
}

/// Result type alias for cloudsurf operations.
pub type Result<T> = std::result::Result<T, SurfError>;
