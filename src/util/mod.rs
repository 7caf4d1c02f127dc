//! Utility functions.

pub mod env;
pub mod time;

pub use env::should_use_color;
pub use time::{format_elapsed, format_relative_time, format_time_on_host, format_timestamp};
