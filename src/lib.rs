//! memspike - High-frequency process memory sampler and spike analyzer
//!
//! This library samples a process's memory counters from procfs at a fixed
//! cadence, streams them to a crash-safe CSV trace, and post-processes
//! traces to find transient allocation spikes and peak-vs-final divergence.
//!
//! The capture side is [`monitor::SamplingLoop`] driving a
//! [`sampler::MemoryProbe`] and a [`recorder::TraceRecorder`]; the analysis
//! side is [`loader::load`] feeding [`spike::SpikeDetector`] and
//! [`summary::summarize`].

pub mod cli;
pub mod config;
pub mod error;
pub mod launcher;
pub mod loader;
pub mod monitor;
pub mod recorder;
pub mod report;
pub mod sample;
pub mod sampler;
pub mod spike;
pub mod summary;

pub use error::{ConfigError, EmptyTraceError, TraceError};
pub use monitor::{RunSummary, SamplingLoop, TerminationReason};
pub use sample::{Sample, Trace};
