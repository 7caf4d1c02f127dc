//! cloudsurf - cost-driven service relocation between cloud providers
//!
//! Moves a running service between a fixed catalog of cloud hosts when a
//! price signal says another provider is cheaper, and reports the progress
//! of the migration from the automation log.
//!
//! The ledger (`storage::ledger`) is the single source of truth: at most one
//! transition is ever in flight, enforced by a conditional insert.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

#[cfg(not(unix))]
compile_error!("cloudsurf manages process groups and only builds on unix");

pub mod cli;
pub mod core;
pub mod error;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, Result, SurfError};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
