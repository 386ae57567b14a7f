//! Aggregate statistics over a complete trace

use serde::Serialize;

use crate::error::EmptyTraceError;
use crate::sample::{Sample, Trace};

/// One quarter of the trace, split by sample index rather than by time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuartileSegment {
    pub start_index: usize,
    /// Inclusive. Segments share their boundary sample.
    pub end_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub start_resident_mb: f64,
    pub end_resident_mb: f64,
}

impl QuartileSegment {
    fn between(samples: &[Sample], start_index: usize, end_index: usize) -> Self {
        let start = &samples[start_index];
        let end = &samples[end_index];
        Self {
            start_index,
            end_index,
            start_time: start.elapsed_seconds,
            end_time: end.elapsed_seconds,
            start_resident_mb: start.resident_mb(),
            end_resident_mb: end.resident_mb(),
        }
    }

    /// RSS change across the segment (negative when memory was released)
    pub fn growth_mb(&self) -> f64 {
        self.end_resident_mb - self.start_resident_mb
    }
}

/// Peaks, final reading and quartile trend of a trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    pub sample_count: usize,
    pub peak_resident_mb: f64,
    pub peak_virtual_mb: f64,
    pub peak_data_mb: f64,
    /// Time of the earliest sample at `peak_resident_mb`
    pub peak_time: f64,
    pub final_resident_mb: f64,
    /// Elapsed time of the last sample
    pub duration_s: f64,
    pub quartiles: [QuartileSegment; 4],
}

impl TraceSummary {
    /// Peak over final RSS, undefined when the final reading is zero
    ///
    /// A reaped process typically leaves a terminal zero reading, which
    /// would otherwise make the ratio infinite.
    pub fn peak_to_final_ratio(&self) -> Option<f64> {
        if self.final_resident_mb > 0.0 {
            Some(self.peak_resident_mb / self.final_resident_mb)
        } else {
            None
        }
    }
}

/// Start indices of the four segments: `0, L/4, L/2, 3L/4`
pub fn quartile_starts(len: usize) -> [usize; 4] {
    [0, len / 4, len / 2, 3 * len / 4]
}

/// Summarize a trace
///
/// # Errors
///
/// Returns [`EmptyTraceError`] for a trace with no samples.
pub fn summarize(trace: &Trace) -> Result<TraceSummary, EmptyTraceError> {
    let samples = trace.samples();
    let last = samples.last().ok_or(EmptyTraceError)?;

    // Strict comparison keeps the earliest sample on ties
    let mut peak = &samples[0];
    for sample in &samples[1..] {
        if sample.resident_kb > peak.resident_kb {
            peak = sample;
        }
    }

    let peak_virtual_kb = samples.iter().map(|s| s.virtual_size_kb).max().unwrap_or(0);
    let peak_data_kb = samples.iter().map(|s| s.data_segment_kb).max().unwrap_or(0);

    let last_index = samples.len() - 1;
    let [q0, q1, q2, q3] = quartile_starts(samples.len());
    let quartiles = [
        QuartileSegment::between(samples, q0, q1),
        QuartileSegment::between(samples, q1, q2),
        QuartileSegment::between(samples, q2, q3),
        QuartileSegment::between(samples, q3, last_index),
    ];

    Ok(TraceSummary {
        sample_count: samples.len(),
        peak_resident_mb: peak.resident_mb(),
        peak_virtual_mb: crate::sample::kb_to_mb(peak_virtual_kb),
        peak_data_mb: crate::sample::kb_to_mb(peak_data_kb),
        peak_time: peak.elapsed_seconds,
        final_resident_mb: last.resident_mb(),
        duration_s: last.elapsed_seconds,
        quartiles,
    })
}
