//! CLI argument parsing for memspike

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;

/// Output format for analysis reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "memspike")]
#[command(version)]
#[command(about = "High-frequency process memory sampler and spike analyzer", long_about = None)]
pub struct Cli {
    /// TOML configuration file (flags override its values)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample a running process until it exits, the timeout hits, or Ctrl+C
    Monitor(MonitorArgs),
    /// Launch a command and sample it from the start
    Run(RunArgs),
    /// Summarize a trace file and report allocation spikes
    Analyze(AnalyzeArgs),
}

/// Sampling overrides shared by `monitor` and `run`
#[derive(Args, Debug, Clone, Default)]
pub struct SamplingArgs {
    /// Sampling interval in milliseconds (default: 10)
    #[arg(long = "interval-ms", value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Stop sampling after this many seconds (default: 180)
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout_secs: Option<f64>,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// PID of the process to sample
    #[arg(short = 'p', long = "pid", value_name = "PID")]
    pub pid: i32,

    /// Trace file to write (default: rss_<PID>.csv)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub sampling: SamplingArgs,
}

impl MonitorArgs {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("rss_{}.csv", self.pid)))
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory for trace, target log and recap (default: measurements_<unix-time>)
    #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Memory limit exported to the target as MEMORY_LIMIT_MB
    #[arg(long = "memory-limit-mb", value_name = "MB")]
    pub memory_limit_mb: Option<u64>,

    /// Extra environment for the target (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = crate::launcher::parse_env_pair)]
    pub env: Vec<(String, String)>,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Command to launch (everything after --)
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Trace CSV produced by `monitor` or `run`
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Minimum RSS increase between samples to count as a spike (default: 20)
    #[arg(long = "threshold-mb", value_name = "MB")]
    pub threshold_mb: Option<f64>,

    /// Maximum gap between the two samples of a spike (default: 1000)
    #[arg(long = "window-ms", value_name = "MS")]
    pub window_ms: Option<f64>,

    /// Number of spikes to list, largest first (default: 10)
    #[arg(long = "top", value_name = "K")]
    pub top: Option<usize>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

impl SamplingArgs {
    /// Apply flag overrides on top of a loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if let Some(interval_ms) = self.interval_ms {
            config.monitor.interval_ms = interval_ms;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.monitor.timeout_secs = timeout_secs;
        }
    }
}

impl AnalyzeArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(threshold_mb) = self.threshold_mb {
            config.spikes.threshold_mb = threshold_mb;
        }
        if let Some(window_ms) = self.window_ms {
            config.spikes.window_ms = window_ms;
        }
        if let Some(top) = self.top {
            config.spikes.top_k = top;
        }
    }
}
