//! Memory samples and the ordered trace they form

use serde::{Deserialize, Serialize};

/// Kibibytes per mebibyte, as reported by the process status interface
pub const KB_PER_MB: f64 = 1024.0;

/// Convert a kibibyte counter to mebibytes
pub fn kb_to_mb(kb: u64) -> f64 {
    kb as f64 / KB_PER_MB
}

/// A single memory reading taken at `elapsed_seconds` after sampling began
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub elapsed_seconds: f64,
    /// VmRSS
    pub resident_kb: u64,
    /// VmSize
    pub virtual_size_kb: u64,
    /// VmData
    pub data_segment_kb: u64,
}

impl Sample {
    pub fn new(
        elapsed_seconds: f64,
        resident_kb: u64,
        virtual_size_kb: u64,
        data_segment_kb: u64,
    ) -> Self {
        Self {
            elapsed_seconds,
            resident_kb,
            virtual_size_kb,
            data_segment_kb,
        }
    }

    pub fn resident_mb(&self) -> f64 {
        kb_to_mb(self.resident_kb)
    }

    pub fn virtual_mb(&self) -> f64 {
        kb_to_mb(self.virtual_size_kb)
    }

    pub fn data_mb(&self) -> f64 {
        kb_to_mb(self.data_segment_kb)
    }
}

/// Ordered sequence of samples from one monitoring run
///
/// Samples are kept in non-decreasing `elapsed_seconds` order. The loader
/// rejects traces that violate this, and the recorder produces them from a
/// single advancing clock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    samples: Vec<Sample>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a trace from samples already in time order
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub(crate) fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kb_to_mb() {
        assert_eq!(kb_to_mb(0), 0.0);
        assert_eq!(kb_to_mb(1024), 1.0);
        assert_eq!(kb_to_mb(1536), 1.5);
    }

    #[test]
    fn test_sample_mb_accessors() {
        let s = Sample::new(1.0, 2048, 4096, 512);
        assert_eq!(s.resident_mb(), 2.0);
        assert_eq!(s.virtual_mb(), 4.0);
        assert_eq!(s.data_mb(), 0.5);
    }

    #[test]
    fn test_trace_accessors() {
        let mut trace = Trace::new();
        assert!(trace.is_empty());
        assert!(trace.first().is_none());

        trace.push(Sample::new(0.0, 100, 200, 50));
        trace.push(Sample::new(0.01, 110, 200, 60));

        assert_eq!(trace.len(), 2);
        assert_eq!(trace.first().map(|s| s.resident_kb), Some(100));
        assert_eq!(trace.last().map(|s| s.resident_kb), Some(110));
        assert_eq!(trace.iter().count(), 2);
        assert_eq!((&trace).into_iter().map(|s| s.data_segment_kb).sum::<u64>(), 110);
    }
}
