//! Migration status derived from the automation log.
//!
//! The playbook tool appends lines of the form
//! `2026-03-20 12:34:56,789 p=123 u=ubuntu | TASK [Install packages] ***`.
//! The current phase is the bracketed name of the last `TASK` line in the
//! tail of the file; a `fatal` line after it means the run crashed.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};

use crate::core::models::StatusReport;
use crate::error::SurfError;
use crate::storage::config::{AutomationConfig, TimingConfig};

/// Bytes read from the end of the log.
pub const TAIL_BYTES: u64 = 2500;

/// Phase reported when the log only holds leftovers of a finished migration.
pub const NOT_MIGRATING: &str = "not migrating";

/// Status attached to a crash report.
pub const CRASH_STATUS: &str =
    "automation crashed, most likely credentials are not configured correctly; see the log for details";

const TASK_TOKEN: &str = "TASK";
const FATAL_TOKEN: &str = "fatal";
const TIMESTAMP_LEN: usize = 19;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads the migration log and reports the current phase.
#[derive(Debug, Clone)]
pub struct LogStatusParser {
    path: PathBuf,
    fresh_host_phase: String,
    stale_after: TimeDelta,
}

impl LogStatusParser {
    #[must_use]
    pub fn new(
        path: impl Into<PathBuf>,
        fresh_host_phase: impl Into<String>,
        stale_after: TimeDelta,
    ) -> Self {
        Self {
            path: path.into(),
            fresh_host_phase: fresh_host_phase.into(),
            stale_after,
        }
    }

    #[must_use]
    pub fn from_config(automation: &AutomationConfig, timing: &TimingConfig) -> Self {
        Self::new(
            automation.migration_log_path(),
            automation.fresh_host_phase.clone(),
            timing.stale_marker(),
        )
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current status. Never fails: problems are reported in the payload.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.status_at(Utc::now())
    }

    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> StatusReport {
        match read_tail(&self.path, TAIL_BYTES) {
            Ok(tail) => self.parse_tail(&tail, now),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "Migration log unreadable");
                StatusReport::Failure {
                    error: format!("automation log unavailable: {e}"),
                    status: None,
                }
            }
        }
    }

    /// Derive the status from the tail of the log.
    #[must_use]
    pub fn parse_tail(&self, tail: &str, now: DateTime<Utc>) -> StatusReport {
        let Some(line) = last_relevant_line(tail) else {
            return StatusReport::Failure {
                error: SurfError::InvalidLogFormat.to_string(),
                status: None,
            };
        };

        let line = match line {
            Relevant::Fatal(line) => {
                return StatusReport::Failure {
                    error: SurfError::AutomationCrashed {
                        line: line.trim().to_string(),
                    }
                    .to_string(),
                    status: Some(CRASH_STATUS.to_string()),
                };
            }
            Relevant::Task(line) => line,
        };

        let phase = phase_of(line);
        let date = timestamp_of(line);

        if let Some(date) = date
            && phase == self.fresh_host_phase
            && now.signed_duration_since(date) > self.stale_after
        {
            return StatusReport::Progress {
                date: Some(now),
                status: NOT_MIGRATING.to_string(),
            };
        }

        StatusReport::Progress {
            date,
            status: phase.to_string(),
        }
    }
}

enum Relevant<'a> {
    Task(&'a str),
    Fatal(&'a str),
}

/// Scan backward for the last `TASK` line, stopping early at a `fatal` one.
fn last_relevant_line(tail: &str) -> Option<Relevant<'_>> {
    for line in tail.lines().rev() {
        if line.contains(TASK_TOKEN) {
            return Some(Relevant::Task(line));
        }
        if line.contains(FATAL_TOKEN) {
            return Some(Relevant::Fatal(line));
        }
    }
    None
}

/// Phase name of a `TASK` line.
///
/// The text between the first `[` and the following `]`. Without a `[` the
/// whole line is returned; without a closing `]` everything after the `[`.
#[must_use]
pub fn phase_of(line: &str) -> &str {
    let Some(open) = line.find('[') else {
        return line.trim();
    };
    let rest = &line[open + 1..];
    match rest.find(']') {
        Some(close) => rest[..close].trim(),
        None => rest.trim(),
    }
}

/// Local timestamp prefix of a log line, converted to UTC.
#[must_use]
pub fn timestamp_of(line: &str) -> Option<DateTime<Utc>> {
    let prefix = line.get(..TIMESTAMP_LEN)?;
    let naive = NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Last `max_bytes` of a file, decoded lossily.
///
/// A multi-byte character cut by the seek, or a line still being written,
/// only costs replacement characters in the first or last line.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn read_tail(path: &Path, max_bytes: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(max_bytes)))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Whole log for display, or a notice explaining why it is unavailable.
#[must_use]
pub fn read_full_log(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("Unavailable. Failed to open with {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FRESH: &str = "Copying self to server";

    fn parser() -> LogStatusParser {
        LogStatusParser::new("/unused", FRESH, TimeDelta::minutes(2))
    }

    fn line_at(time: DateTime<Utc>, message: &str) -> String {
        format!(
            "{},123 p=4242 u=ubuntu n=ansible | {message}",
            time.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        )
    }

    #[test]
    fn reports_last_task_phase_and_time() {
        let now = Utc::now();
        let started = now - TimeDelta::seconds(30);
        let tail = format!(
            "{}\n{}\nok: [aws]\n",
            line_at(started - TimeDelta::seconds(5), "TASK [Gathering Facts] ***"),
            line_at(started, "TASK [Install packages] ***"),
        );

        match parser().parse_tail(&tail, now) {
            StatusReport::Progress { date, status } => {
                assert_eq!(status, "Install packages");
                let date = date.expect("timestamp parsed");
                assert_eq!(date.timestamp(), started.timestamp());
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn fatal_after_last_task_is_a_crash() {
        let now = Utc::now();
        let tail = format!(
            "{}\n{}\n",
            line_at(now, "TASK [Create VM] ***"),
            line_at(now, "fatal: [azure]: FAILED! => credentials rejected"),
        );

        match parser().parse_tail(&tail, now) {
            StatusReport::Failure { error, status } => {
                assert!(error.contains("fatal: [azure]"));
                assert_eq!(status.as_deref(), Some(CRASH_STATUS));
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn fatal_before_last_task_is_ignored() {
        let now = Utc::now();
        let tail = format!(
            "{}\n{}\n",
            line_at(now, "fatal: [azure]: FAILED! ...ignoring"),
            line_at(now, "TASK [Retry] ***"),
        );
        assert!(!parser().parse_tail(&tail, now).is_error());
    }

    #[test]
    fn no_task_in_tail_is_invalid_log() {
        let report = parser().parse_tail("PLAY RECAP\nok=3 changed=1\n", Utc::now());
        assert_eq!(
            report,
            StatusReport::Failure {
                error: SurfError::InvalidLogFormat.to_string(),
                status: None,
            }
        );
        assert!(parser().parse_tail("", Utc::now()).is_error());
    }

    #[test]
    fn stale_fresh_host_phase_means_not_migrating() {
        let now = Utc::now();
        let tail = line_at(
            now - TimeDelta::minutes(10),
            "TASK [Copying self to server] ***",
        );

        assert_eq!(
            parser().parse_tail(&tail, now),
            StatusReport::Progress {
                date: Some(now),
                status: NOT_MIGRATING.to_string(),
            }
        );
    }

    #[test]
    fn recent_fresh_host_phase_is_reported_as_is() {
        let now = Utc::now();
        let tail = line_at(now - TimeDelta::seconds(30), "TASK [Copying self to server] ***");

        match parser().parse_tail(&tail, now) {
            StatusReport::Progress { status, .. } => assert_eq!(status, FRESH),
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn phase_extraction_edge_cases() {
        assert_eq!(phase_of("x | TASK [Install packages] ***"), "Install packages");
        assert_eq!(phase_of("x | TASK [ ] ***"), "");
        assert_eq!(phase_of("x | TASK broken"), "x | TASK broken");
        assert_eq!(phase_of("x | TASK [broken respon"), "broken respon");
    }

    #[test]
    fn timestamp_requires_fixed_prefix() {
        assert!(timestamp_of("2026-03-20 12:34:56,789 p=1 | TASK [a]").is_some());
        assert!(timestamp_of("TASK [a]").is_none());
        assert!(timestamp_of("short").is_none());
    }

    #[test]
    fn undated_task_line_still_reports_phase() {
        assert_eq!(
            parser().parse_tail("TASK [Install packages] ***", Utc::now()),
            StatusReport::Progress {
                date: None,
                status: "Install packages".to_string(),
            }
        );
    }

    #[test]
    fn tail_only_reads_last_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let old_task = format!("{}\n", line_at(Utc::now(), "TASK [Old phase] ***"));
        file.write_all(old_task.as_bytes()).unwrap();
        file.write_all("ok: [aws]\n".repeat(400).as_bytes()).unwrap();

        let tail = read_tail(file.path(), TAIL_BYTES).unwrap();
        assert!(tail.len() <= usize::try_from(TAIL_BYTES).unwrap());
        assert!(!tail.contains("Old phase"));

        let parser = LogStatusParser::new(file.path(), FRESH, TimeDelta::minutes(2));
        assert!(parser.status().is_error());
    }

    #[test]
    fn cut_multibyte_character_does_not_fail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all("é".repeat(2000).as_bytes()).unwrap();
        file.write_all(b"\nTASK [Deploy] ***\n").unwrap();

        let parser = LogStatusParser::new(file.path(), FRESH, TimeDelta::minutes(2));
        match parser.status() {
            StatusReport::Progress { status, .. } => assert_eq!(status, "Deploy"),
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[test]
    fn missing_log_is_an_error_payload() {
        let parser = LogStatusParser::new("/nonexistent/ansible.log", FRESH, TimeDelta::minutes(2));
        assert!(parser.status().is_error());
    }

    #[test]
    fn full_log_reports_open_failure() {
        let text = read_full_log(Path::new("/nonexistent/delete_log.txt"));
        assert!(text.starts_with("Unavailable. Failed to open with"));
    }
}
