//! Phase-tagged test logging on stderr.
//!
//! Set `TEST_LOG_JSON=1` for one JSON object per line, `TEST_LOG_QUIET=1` to
//! silence everything.
#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
struct Entry<'a> {
    timestamp: String,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u128>,
}

fn env_flag(key: &str) -> bool {
    std::env::var(key).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Per-test logger with duration tracking.
pub struct TestLogger {
    test_name: String,
    started: Instant,
    phase: Mutex<String>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            started: Instant::now(),
            phase: Mutex::new("init".to_string()),
        };
        logger.emit("Test starting", None);
        logger
    }

    /// Common phases: "setup", "execute", "verify".
    pub fn phase(&self, phase: &str) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase.to_string();
        }
    }

    pub fn info(&self, message: &str) {
        self.emit(message, None);
    }

    pub fn finish_ok(&self) {
        self.emit("Test passed", Some(self.started.elapsed().as_millis()));
    }

    fn emit(&self, message: &str, duration_ms: Option<u128>) {
        if env_flag("TEST_LOG_QUIET") {
            return;
        }
        let phase = self
            .phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

        if env_flag("TEST_LOG_JSON") {
            let entry = Entry {
                timestamp,
                test: &self.test_name,
                phase: &phase,
                message,
                duration_ms,
            };
            if let Ok(json) = serde_json::to_string(&entry) {
                eprintln!("{json}");
            }
        } else {
            let duration = duration_ms.map(|ms| format!(" ({ms}ms)")).unwrap_or_default();
            eprintln!("[{timestamp}] [{}] [{phase}] {message}{duration}", self.test_name);
        }
    }
}
