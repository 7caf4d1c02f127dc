//! Migration engine: host detection, decisions, the transition state
//! machine and its recovery paths.

pub mod decision;
pub mod decommission;
pub mod doctor;
pub mod host;
pub mod http;
pub mod jobs;
pub mod log_status;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod runner;
pub mod watchdog;

pub use decision::{AlphaVantageSource, Decision, DecisionEngine, PriceSource};
pub use decommission::{DecommissionOutcome, HostDecommissioner};
pub use host::HostIdentifier;
pub use jobs::{CycleOutcome, Jobs};
pub use log_status::LogStatusParser;
pub use models::{
    Credential, Forecast, HostIdentity, MigrationState, PriceSample, StatusReport, Transition,
};
pub use orchestrator::{ArrivalOutcome, MigrationOrchestrator};
pub use runner::{AutomationRunner, PlaybookRunner};
pub use watchdog::{StaleTransitionWatchdog, WatchdogOutcome};
