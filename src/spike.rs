//! Transient allocation spike detection
//!
//! A spike is a pair of adjacent samples whose resident memory grew by more
//! than `threshold_mb` in less than `window_ms`. Both bounds are strict: a
//! delta exactly at the threshold, or a gap exactly at the window, does not
//! qualify.

use serde::Serialize;

use crate::config::SpikeConfig;
use crate::sample::{Sample, Trace};

/// One rapid increase in resident memory, derived from an adjacent pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpikeEvent {
    /// Elapsed time of the later sample (seconds)
    pub time: f64,
    /// Resident memory after the increase
    pub resident_mb: f64,
    pub delta_mb: f64,
    /// Gap between the two samples
    pub duration_ms: f64,
    pub rate_mb_per_s: f64,
}

/// Stateless pair-wise spike detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeDetector {
    threshold_mb: f64,
    window_ms: f64,
}

impl Default for SpikeDetector {
    fn default() -> Self {
        Self::from(&SpikeConfig::default())
    }
}

impl From<&SpikeConfig> for SpikeDetector {
    fn from(config: &SpikeConfig) -> Self {
        Self::new(config.threshold_mb, config.window_ms)
    }
}

impl SpikeDetector {
    /// # Arguments
    /// * `threshold_mb` - Minimum RSS increase, exclusive (default: 20 MB)
    /// * `window_ms` - Maximum spacing between the two samples, exclusive (default: 1000 ms)
    pub fn new(threshold_mb: f64, window_ms: f64) -> Self {
        Self {
            threshold_mb,
            window_ms,
        }
    }

    pub fn threshold_mb(&self) -> f64 {
        self.threshold_mb
    }

    pub fn window_ms(&self) -> f64 {
        self.window_ms
    }

    /// Scan a trace, returning spikes in time order
    pub fn detect(&self, trace: &Trace) -> Vec<SpikeEvent> {
        self.detect_samples(trace.samples())
    }

    /// Same as [`detect`](Self::detect) over a raw slice
    ///
    /// # Example
    /// ```
    /// use memspike::sample::Sample;
    /// use memspike::spike::SpikeDetector;
    ///
    /// let samples = [
    ///     Sample::new(0.0, 100_000, 0, 0),
    ///     Sample::new(0.5, 130_000, 0, 0),
    /// ];
    /// let spikes = SpikeDetector::new(20.0, 1000.0).detect_samples(&samples);
    /// assert_eq!(spikes.len(), 1);
    /// assert_eq!(spikes[0].duration_ms, 500.0);
    /// ```
    pub fn detect_samples(&self, samples: &[Sample]) -> Vec<SpikeEvent> {
        samples
            .windows(2)
            .filter_map(|pair| self.classify(&pair[0], &pair[1]))
            .collect()
    }

    /// Classify one adjacent pair
    pub fn classify(&self, previous: &Sample, current: &Sample) -> Option<SpikeEvent> {
        let delta_mb = current.resident_mb() - previous.resident_mb();
        let duration_ms = (current.elapsed_seconds - previous.elapsed_seconds) * 1000.0;

        // Out-of-order samples never form a pair
        if duration_ms < 0.0 {
            return None;
        }

        if !(delta_mb > self.threshold_mb && duration_ms < self.window_ms) {
            return None;
        }

        // Identical timestamps fall back to a one-second denominator
        let seconds = if duration_ms > 0.0 {
            duration_ms / 1000.0
        } else {
            1.0
        };

        Some(SpikeEvent {
            time: current.elapsed_seconds,
            resident_mb: current.resident_mb(),
            delta_mb,
            duration_ms,
            rate_mb_per_s: delta_mb / seconds,
        })
    }
}

/// Largest spikes first, truncated to `top_k`
///
/// Ties keep their time order.
pub fn rank_by_magnitude(spikes: &[SpikeEvent], top_k: usize) -> Vec<SpikeEvent> {
    let mut ranked = spikes.to_vec();
    ranked.sort_by(|a, b| b.delta_mb.total_cmp(&a.delta_mb));
    ranked.truncate(top_k);
    ranked
}
