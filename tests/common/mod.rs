//! Shared helpers for integration tests.
//!
//! - `logger`: per-test phase logging on stderr
//! - `log_capture`: assertions over events emitted by the library

pub mod log_capture;
pub mod logger;
