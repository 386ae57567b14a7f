//! Human-readable and JSON reports
//!
//! Ranking spikes by magnitude happens here; the detector itself always
//! returns them in time order.

use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::SpikeConfig;
use crate::error::EmptyTraceError;
use crate::monitor::RunSummary;
use crate::sample::Trace;
use crate::spike::{rank_by_magnitude, SpikeDetector, SpikeEvent};
use crate::summary::{summarize, TraceSummary};

/// Full analysis of one trace file
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub trace: PathBuf,
    pub summary: TraceSummary,
    /// `None` when the final RSS reading is zero
    pub peak_to_final_ratio: Option<f64>,
    pub threshold_mb: f64,
    pub window_ms: f64,
    pub spike_count: usize,
    /// Largest spikes first
    pub top_spikes: Vec<SpikeEvent>,
}

impl AnalysisReport {
    pub fn build(
        trace_path: &Path,
        trace: &Trace,
        config: &SpikeConfig,
    ) -> Result<Self, EmptyTraceError> {
        let summary = summarize(trace)?;
        let spikes = SpikeDetector::from(config).detect(trace);

        Ok(Self {
            trace: trace_path.to_path_buf(),
            peak_to_final_ratio: summary.peak_to_final_ratio(),
            summary,
            threshold_mb: config.threshold_mb,
            window_ms: config.window_ms,
            spike_count: spikes.len(),
            top_spikes: rank_by_magnitude(&spikes, config.top_k),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();

        let _ = writeln!(out, "=== Memory Analysis: {} ===", self.trace.display());
        let _ = writeln!(out, "Duration: {:.2}s", s.duration_s);
        let _ = writeln!(out, "Samples: {}", s.sample_count);
        let _ = writeln!(
            out,
            "Peak VmRSS: {:.2} MB (at t={:.2}s)",
            s.peak_resident_mb, s.peak_time
        );
        let _ = writeln!(out, "Peak VmSize: {:.2} MB", s.peak_virtual_mb);
        let _ = writeln!(out, "Peak VmData: {:.2} MB", s.peak_data_mb);
        let _ = writeln!(out, "Final RSS: {:.2} MB", s.final_resident_mb);
        match self.peak_to_final_ratio {
            Some(ratio) => {
                let _ = writeln!(out, "Peak/Final ratio: {:.2}x", ratio);
            }
            None => {
                let _ = writeln!(out, "Peak/Final ratio: N/A (process terminated)");
            }
        }
        out.push('\n');

        let criteria = format!(
            ">{} MB within {} ms",
            format_number(self.threshold_mb),
            format_number(self.window_ms)
        );
        let _ = writeln!(out, "Memory Spikes ({}): {}", criteria, self.spike_count);
        if self.top_spikes.is_empty() {
            let _ = writeln!(out, "  No major spikes detected");
        } else {
            let _ = writeln!(out, "Top {} spikes by magnitude:", self.top_spikes.len());
            let _ = writeln!(
                out,
                "{:<12} {:<12} {:<15} {:<15} {:<15}",
                "Time (s)", "RSS (MB)", "Increase (MB)", "Duration (ms)", "Rate (MB/s)"
            );
            let _ = writeln!(out, "{}", "-".repeat(80));
            for spike in &self.top_spikes {
                let _ = writeln!(
                    out,
                    "{:<12.2} {:<12.1} {:<15.1} {:<15.1} {:<15.1}",
                    spike.time,
                    spike.resident_mb,
                    spike.delta_mb,
                    spike.duration_ms,
                    spike.rate_mb_per_s
                );
            }
        }
        out.push('\n');

        let _ = writeln!(out, "Timeline segments (quartiles):");
        let labels = ["Q1 (0-25%):  ", "Q2 (25-50%): ", "Q3 (50-75%): ", "Q4 (75-100%):"];
        for (label, segment) in labels.iter().zip(s.quartiles.iter()) {
            let _ = writeln!(
                out,
                "  {} t={:.1}-{:.1}s, RSS: {:.1} → {:.1} MB",
                label,
                segment.start_time,
                segment.end_time,
                segment.start_resident_mb,
                segment.end_resident_mb
            );
        }

        out
    }
}

/// Integral values print without a fractional part
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Summary block printed at the end of every monitoring run
pub fn render_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Summary ===");
    let _ = writeln!(out, "Termination: {}", summary.reason);
    let _ = writeln!(out, "Peak VmRSS: {:.2} MB", summary.peak_resident_mb);
    let _ = writeln!(out, "Peak VmSize: {:.2} MB", summary.peak_virtual_mb);
    let _ = writeln!(out, "Peak VmData: {:.2} MB", summary.peak_data_mb);
    let _ = writeln!(out, "Samples: {}", summary.sample_count);
    let _ = writeln!(out, "Duration: {:.1}s", summary.duration_seconds);
    out
}
