//! Launch a target command and monitor it end to end
//!
//! The sampling loop only needs a pid. This module is the thin layer around
//! it: spawn the target with its output captured, monitor it, decide what
//! to do with the child once monitoring ends, and leave a plain-text recap
//! next to the trace.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use crate::config::MonitorConfig;
use crate::monitor::{RunSummary, SamplingLoop, TerminationReason};
use crate::recorder::TraceRecorder;
use crate::sampler::ProcfsProbe;

pub const TRACE_FILE: &str = "rss_trace.csv";
pub const LOG_FILE: &str = "target.log";
pub const RECAP_FILE: &str = "config.txt";

/// What to run and where to put the results
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Program followed by its arguments
    pub command: Vec<String>,
    pub output_dir: PathBuf,
    /// Exported to the target as `MEMORY_LIMIT_MB`
    pub memory_limit_mb: Option<u64>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn trace_path(&self) -> PathBuf {
        self.output_dir.join(TRACE_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(LOG_FILE)
    }

    pub fn recap_path(&self) -> PathBuf {
        self.output_dir.join(RECAP_FILE)
    }
}

/// Outcome of a launched and monitored run
#[derive(Debug)]
pub struct LaunchOutcome {
    pub pid: i32,
    pub summary: RunSummary,
    /// `None` when the exit status could not be collected
    pub exit_status: Option<ExitStatus>,
    /// True if the target was killed because the run was interrupted
    pub killed: bool,
    pub trace_path: PathBuf,
    pub recap_path: PathBuf,
}

/// Parse a `KEY=VALUE` pair
pub fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

/// Spawn the target with stdout and stderr redirected to the log file
pub fn spawn_target(spec: &LaunchSpec) -> Result<Child> {
    let (program, args) = spec
        .command
        .split_first()
        .context("Command array is empty")?;

    std::fs::create_dir_all(&spec.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            spec.output_dir.display()
        )
    })?;

    let log_path = spec.log_path();
    let log = File::create(&log_path)
        .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
    let log_err = log
        .try_clone()
        .context("Failed to duplicate log file handle")?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    if let Some(limit) = spec.memory_limit_mb {
        command.env("MEMORY_LIMIT_MB", limit.to_string());
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    command
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))
}

/// Launch, monitor and reap the target, then write the recap file
///
/// On `Interrupted` the target is killed here; the monitor itself never
/// touches it. `on_monitored` runs as soon as sampling stops, before the
/// target is reaped: after a timeout the target keeps running and reaping
/// blocks until it exits on its own.
pub fn run_with_monitoring(
    spec: &LaunchSpec,
    config: MonitorConfig,
    cancel: Arc<AtomicBool>,
    on_launch: impl FnOnce(i32),
    on_monitored: impl FnOnce(&RunSummary),
) -> Result<LaunchOutcome> {
    let mut child = spawn_target(spec)?;
    let start = Instant::now();
    let pid = i32::try_from(child.id()).context("Child pid out of range")?;
    tracing::info!(pid, command = ?spec.command, "target launched");
    on_launch(pid);

    let trace_path = spec.trace_path();
    let monitored = TraceRecorder::open(&trace_path)
        .and_then(|recorder| {
            SamplingLoop::new(pid, ProcfsProbe::new(), config)
                .with_cancel_flag(cancel)
                .with_start_time(start)
                .run(recorder)
        });

    let summary = match monitored {
        Ok(summary) => summary,
        Err(err) => {
            // The trace is unusable, don't leave the target running unobserved
            let _ = child.kill();
            let _ = child.wait();
            return Err(err).context("Monitoring failed");
        }
    };

    on_monitored(&summary);

    let killed = summary.reason == TerminationReason::Interrupted;
    if killed {
        tracing::warn!(pid, "interrupted, terminating target");
        if let Err(err) = child.kill() {
            tracing::warn!(pid, error = %err, "failed to kill target");
        }
    } else if summary.reason == TerminationReason::TimedOut {
        tracing::info!(pid, "timeout reached, waiting for target to exit");
    }
    let exit_status = match child.wait() {
        Ok(status) => Some(status),
        Err(err) => {
            tracing::warn!(pid, error = %err, "failed to reap target");
            None
        }
    };

    let recap_path = spec.recap_path();
    let recap = Recap {
        spec,
        config: &config,
        pid,
        exit_status,
        killed,
        summary: &summary,
        timestamp: unix_timestamp(),
    };
    write_recap(&recap_path, &recap)?;

    Ok(LaunchOutcome {
        pid,
        summary,
        exit_status,
        killed,
        trace_path,
        recap_path,
    })
}

/// Inputs to the recap file
#[derive(Debug)]
pub struct Recap<'a> {
    pub spec: &'a LaunchSpec,
    pub config: &'a MonitorConfig,
    pub pid: i32,
    pub exit_status: Option<ExitStatus>,
    pub killed: bool,
    pub summary: &'a RunSummary,
    pub timestamp: u64,
}

impl Recap<'_> {
    fn exit_code_text(&self) -> String {
        match self.exit_status.and_then(|status| status.code()) {
            Some(code) => code.to_string(),
            None if self.killed => "killed".to_string(),
            None => match self.exit_status {
                Some(status) => status.to_string(),
                None => "unknown".to_string(),
            },
        }
    }
}

/// Write the free-form run recap
pub fn write_recap(path: &Path, recap: &Recap<'_>) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create recap file {}", path.display()))?;

    let memory_limit = recap
        .spec
        .memory_limit_mb
        .map(|mb| format!("{} MB", mb))
        .unwrap_or_else(|| "none".to_string());

    let mut text = String::new();
    text.push_str(&format!("Command: {}\n", recap.spec.command.join(" ")));
    text.push_str(&format!("Memory Limit: {}\n", memory_limit));
    for (key, value) in &recap.spec.env {
        text.push_str(&format!("Env: {}={}\n", key, value));
    }
    text.push_str(&format!("Target PID: {}\n", recap.pid));
    text.push_str(&format!("Exit Code: {}\n", recap.exit_code_text()));
    text.push_str(&format!("Sample Interval: {} ms\n", recap.config.interval_ms));
    text.push_str(&format!("Timeout: {} s\n", recap.config.timeout_secs));
    text.push_str(&format!("Termination: {}\n", recap.summary.reason));
    text.push_str(&format!("Timestamp: {}\n", recap.timestamp));
    text.push_str("\n=== Peak Memory ===\n");
    text.push_str(&format!("VmRSS: {:.2} MB\n", recap.summary.peak_resident_mb));
    text.push_str(&format!("VmSize: {:.2} MB\n", recap.summary.peak_virtual_mb));
    text.push_str(&format!("VmData: {:.2} MB\n", recap.summary.peak_data_mb));
    text.push_str(&format!("Samples: {}\n", recap.summary.sample_count));

    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write recap file {}", path.display()))?;
    Ok(())
}

/// Seconds since the UNIX epoch
pub fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
