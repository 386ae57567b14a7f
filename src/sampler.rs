//! Per-process memory counters from the procfs status interface
//!
//! Reads `/proc/<pid>/status` and extracts `VmRSS`, `VmSize` and `VmData`
//! (all in kB). Parsing is tolerant: a missing or malformed counter line
//! reads as 0 so one odd field never aborts a live capture. A vanished
//! process is reported as `None`, which the sampling loop treats as a
//! normal end of run.

use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};

/// Instantaneous memory counters for one process, in kB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCounters {
    pub resident_kb: u64,
    pub virtual_kb: u64,
    pub data_kb: u64,
}

/// Source of liveness and memory readings for a process
///
/// The sampling loop only talks to this trait, so runs can be driven by a
/// scripted probe in tests.
pub trait MemoryProbe {
    /// Non-destructive existence check. Any failure means "absent".
    fn is_alive(&self, pid: i32) -> bool;

    /// Read the three counters, or `None` when the process is gone
    fn read(&self, pid: i32) -> Option<MemoryCounters>;
}

/// Probe backed by procfs and the signal-0 existence check
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    root: PathBuf,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcfsProbe {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Use an alternative procfs mount (e.g. a fixture directory)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn status_path(&self, pid: i32) -> PathBuf {
        self.root.join(pid.to_string()).join("status")
    }

    fn read_status(&self, pid: i32) -> Option<String> {
        if pid <= 0 {
            return None;
        }
        // NotFound and ESRCH (process exited between open and read) both
        // land here
        std::fs::read_to_string(self.status_path(pid)).ok()
    }
}

impl MemoryProbe for ProcfsProbe {
    fn is_alive(&self, pid: i32) -> bool {
        // kill(0) and kill(-1) address process groups, never a single target
        if pid <= 0 {
            return false;
        }

        if kill(Pid::from_raw(pid), None).is_err() {
            return false;
        }

        // An exited but unreaped child still answers signal 0
        match self.read_status(pid) {
            Some(status) => !is_defunct(&status),
            None => true,
        }
    }

    fn read(&self, pid: i32) -> Option<MemoryCounters> {
        self.read_status(pid).map(|status| parse_status(&status))
    }
}

/// Extract memory counters from status text
///
/// # Example
/// ```
/// use memspike::sampler::parse_status;
///
/// let counters = parse_status("VmSize:\t  2048 kB\nVmRSS:\t   512 kB\n");
/// assert_eq!(counters.resident_kb, 512);
/// assert_eq!(counters.virtual_kb, 2048);
/// assert_eq!(counters.data_kb, 0);
/// ```
pub fn parse_status(status: &str) -> MemoryCounters {
    let mut counters = MemoryCounters::default();

    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            counters.resident_kb = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("VmSize:") {
            counters.virtual_kb = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("VmData:") {
            counters.data_kb = parse_kb(rest);
        }
    }

    counters
}

/// First whitespace-separated token as an integer, 0 if absent or invalid
fn parse_kb(rest: &str) -> u64 {
    rest.split_whitespace()
        .next()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0)
}

/// True when the `State:` line reports a zombie (`Z`) or dead (`X`) task
pub fn is_defunct(status: &str) -> bool {
    status
        .lines()
        .find_map(|line| line.strip_prefix("State:"))
        .and_then(|rest| rest.trim_start().chars().next())
        .is_some_and(|state| matches!(state, 'Z' | 'X'))
}
