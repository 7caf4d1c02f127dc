//! External automation process runner.
//!
//! Migration and decommission are driven by an external playbook tool. Both
//! are launched fire-and-forget in their own process group, with a
//! background task reaping the child so it never lingers as a zombie. The
//! process group id is returned to the caller and recorded in the ledger so
//! the watchdog can terminate the whole tree later, from any process.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::runtime::Handle;

use crate::core::models::HostIdentity;
use crate::error::{Result, SurfError};
use crate::storage::config::AutomationConfig;

/// Environment variable the playbook tool writes its log to.
pub const LOG_PATH_ENV: &str = "ANSIBLE_LOG_PATH";

/// How long a process group gets between SIGTERM and SIGKILL.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(5);

/// Launches and stops the external automation processes.
pub trait AutomationRunner {
    /// Start moving the service from `current` to `target`.
    ///
    /// Returns the process group id of the spawned process.
    fn launch_migration(&self, current: &HostIdentity, target: &HostIdentity) -> Result<u32>;

    /// Start tearing down `host`, running from `current`.
    fn launch_decommission(&self, current: &HostIdentity, host: &HostIdentity) -> Result<u32>;

    /// Stop a runaway migration. Without a recorded process group, every
    /// process of the automation tool is stopped.
    fn terminate_migration(&self, pid: Option<u32>) -> impl Future<Output = Result<()>> + Send;
}

/// A fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, PathBuf)>,
}

impl CommandSpec {
    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Runs the playbooks with the configured tool.
#[derive(Debug, Clone)]
pub struct PlaybookRunner {
    automation: AutomationConfig,
    grace: Duration,
}

impl PlaybookRunner {
    #[must_use]
    pub const fn new(automation: AutomationConfig) -> Self {
        Self {
            automation,
            grace: TERMINATION_GRACE,
        }
    }

    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Tool path: resolved on `PATH` on the local identity, fixed on providers.
    #[must_use]
    pub fn tool_for(&self, current: &HostIdentity) -> PathBuf {
        if current.is_local() {
            which::which(&self.automation.local_tool)
                .unwrap_or_else(|_| PathBuf::from(&self.automation.local_tool))
        } else {
            self.automation.remote_tool.clone()
        }
    }

    fn package_manager_for(&self, current: &HostIdentity) -> &str {
        if current.is_local() {
            &self.automation.local_package_manager
        } else {
            &self.automation.remote_package_manager
        }
    }

    /// Invocation of the migration playbook.
    #[must_use]
    pub fn migration_command(&self, current: &HostIdentity, target: &HostIdentity) -> CommandSpec {
        CommandSpec {
            program: self.tool_for(current),
            args: vec![
                self.automation.migration_playbook.display().to_string(),
                "-e".to_string(),
                format!("pip={}", self.package_manager_for(current)),
                "-e".to_string(),
                format!("target_host={}", target.name),
                "-e".to_string(),
                format!("current_host={}", current.name),
            ],
            env: vec![(
                LOG_PATH_ENV.to_string(),
                self.automation.migration_log_path(),
            )],
        }
    }

    /// Invocation of the decommission playbook.
    #[must_use]
    pub fn decommission_command(&self, current: &HostIdentity, host: &HostIdentity) -> CommandSpec {
        CommandSpec {
            program: self.tool_for(current),
            args: vec![
                self.automation.decommission_playbook.display().to_string(),
                "-e".to_string(),
                format!("to_delete_host={}", host.name),
            ],
            env: vec![(
                LOG_PATH_ENV.to_string(),
                self.automation.deletion_log_path(),
            )],
        }
    }

    /// Distinct tool names used for the process-name fallback.
    fn tool_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let remote = self
            .automation
            .remote_tool
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        for name in [Some(self.automation.local_tool.clone()), remote]
            .into_iter()
            .flatten()
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

impl AutomationRunner for PlaybookRunner {
    fn launch_migration(&self, current: &HostIdentity, target: &HostIdentity) -> Result<u32> {
        spawn_detached(&self.migration_command(current, target))
    }

    fn launch_decommission(&self, current: &HostIdentity, host: &HostIdentity) -> Result<u32> {
        spawn_detached(&self.decommission_command(current, host))
    }

    async fn terminate_migration(&self, pid: Option<u32>) -> Result<()> {
        match pid {
            Some(pid) if group_runs_any(pid, &self.tool_names()) => {
                terminate_group(pid, self.grace).await?;
            }
            Some(pid) => {
                tracing::info!(
                    pid,
                    "Recorded process group no longer runs the automation tool, not signalling"
                );
            }
            None => {
                for name in self.tool_names() {
                    kill_by_name(&name).await;
                }
            }
        }
        Ok(())
    }
}

/// Spawn `spec` in a new process group and reap it in the background.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
/// Returns `ProcessLaunchFailure` if there is no runtime or the process
/// cannot be started.
pub fn spawn_detached(spec: &CommandSpec) -> Result<u32> {
    let launch_error = |reason: String| SurfError::ProcessLaunchFailure {
        program: spec.program_name(),
        reason,
    };

    let handle = Handle::try_current().map_err(|e| launch_error(e.to_string()))?;
    let _guard = handle.enter();

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| launch_error(e.to_string()))?;

    let pid = child
        .id()
        .ok_or_else(|| launch_error("process exited before its id was read".to_string()))?;

    tracing::info!(program = %spec.program_name(), pid, "Launched automation process");

    handle.spawn(async move {
        match child.wait().await {
            Ok(status) => tracing::debug!(pid, %status, "Automation process exited"),
            Err(e) => tracing::warn!(pid, error = %e, "Failed to reap automation process"),
        }
    });

    Ok(pid)
}

/// SIGTERM the process group `pgid`, then SIGKILL it if it outlives `grace`.
///
/// Returns false if the group no longer existed.
///
/// # Errors
/// Returns `ProcessTerminationFailure` if the group cannot be signalled.
pub async fn terminate_group(pgid: u32, grace: Duration) -> Result<bool> {
    let failure = |reason: String| SurfError::ProcessTerminationFailure { pid: pgid, reason };
    let group = Pid::from_raw(i32::try_from(pgid).map_err(|e| failure(e.to_string()))?);

    if !group_is_running(pgid) {
        tracing::debug!(pgid, "Process group already gone");
        return Ok(false);
    }

    match signal::killpg(group, Signal::SIGTERM) {
        Ok(()) => tracing::debug!(pgid, "Sent SIGTERM to process group"),
        Err(Errno::ESRCH) => {
            tracing::debug!(pgid, "Process group already gone (ESRCH)");
            return Ok(false);
        }
        Err(e) => return Err(failure(e.to_string())),
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !group_is_running(pgid) {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    match signal::killpg(group, Signal::SIGKILL) {
        Ok(()) => {
            tracing::warn!(pgid, "Process group ignored SIGTERM, sent SIGKILL");
            Ok(true)
        }
        Err(Errno::ESRCH) => Ok(true),
        Err(e) => Err(failure(e.to_string())),
    }
}

/// Whether any member of process group `pgid` is still running.
///
/// Zombies do not count: an orphaned child stays a zombie until init reaps
/// it, which can take a while in containers. Without `/proc` this falls back
/// to probing the group with a null signal, which does count zombies.
#[must_use]
pub fn group_is_running(pgid: u32) -> bool {
    match live_group_members(pgid) {
        Some(members) => !members.is_empty(),
        None => i32::try_from(pgid).is_ok_and(|raw| {
            !matches!(signal::killpg(Pid::from_raw(raw), None), Err(Errno::ESRCH))
        }),
    }
}

/// Whether a live member of `pgid` was started from one of `programs`.
///
/// Process group ids are recycled, so a group recorded an hour ago may now
/// belong to something else. Without `/proc` the group is assumed to be ours.
#[must_use]
pub fn group_runs_any(pgid: u32, programs: &[String]) -> bool {
    let Some(members) = live_group_members(pgid) else {
        return true;
    };
    members.iter().any(|pid| {
        std::fs::read(format!("/proc/{pid}/cmdline")).is_ok_and(|raw| {
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            programs.iter().any(|p| cmdline.contains(p.as_str()))
        })
    })
}

/// Pids of the non-zombie members of `pgid`, or `None` without `/proc`.
#[must_use]
pub fn live_group_members(pgid: u32) -> Option<Vec<u32>> {
    let entries = std::fs::read_dir("/proc").ok()?;
    let mut members = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        // The process may exit between listing and reading.
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some((state, group)) = parse_stat(&stat)
            && group == pgid
            && !matches!(state, 'Z' | 'X')
        {
            members.push(pid);
        }
    }
    Some(members)
}

/// State and process group id from a `/proc/<pid>/stat` line.
fn parse_stat(stat: &str) -> Option<(char, u32)> {
    // The command name may contain spaces and parentheses.
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

async fn kill_by_name(name: &str) {
    match Command::new("killall").arg(name).status().await {
        Ok(status) if status.success() => tracing::info!(name, "Killed automation processes"),
        Ok(_) => tracing::debug!(name, "No automation processes to kill"),
        Err(e) => tracing::warn!(name, error = %e, "Failed to run killall"),
    }
}
