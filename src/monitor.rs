//! High-frequency sampling loop
//!
//! Polls a [`MemoryProbe`] at a fixed interval, streams every reading to a
//! [`TraceRecorder`], and tracks running peaks. The loop is single-threaded
//! and blocking; its only suspension point is the inter-sample sleep, which
//! is sliced so a cancellation request is noticed within a few milliseconds.
//!
//! State machine:
//!
//! ```text
//! Starting -> Sampling -> { ProcessExited | ReadFailed | TimedOut | Interrupted } -> Terminated
//! ```
//!
//! None of the terminal states is an error: every run yields a
//! [`RunSummary`]. Only trace I/O failures are propagated.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::error::TraceError;
use crate::recorder::TraceRecorder;
use crate::sample::{kb_to_mb, Sample};
use crate::sampler::{MemoryCounters, MemoryProbe};

/// Upper bound on how long a cancellation can go unnoticed during sleep
const CANCEL_POLL_SLICE: Duration = Duration::from_millis(5);

/// Why a sampling run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The liveness probe no longer found the target
    ProcessExited,
    /// The target looked alive but its counters could not be read
    ReadFailed,
    /// The wall-clock budget ran out (the boundary sample is recorded)
    TimedOut,
    /// The operator cancelled the run
    Interrupted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminationReason::ProcessExited => "process exited",
            TerminationReason::ReadFailed => "memory read failed",
            TerminationReason::TimedOut => "timeout reached",
            TerminationReason::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// Loop states, exposed for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Sampling,
    Finished(TerminationReason),
    Terminated(TerminationReason),
}

/// Terminal artifact of a sampling run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub peak_resident_mb: f64,
    pub peak_virtual_mb: f64,
    pub peak_data_mb: f64,
    pub sample_count: usize,
    pub duration_seconds: f64,
    pub reason: TerminationReason,
}

/// Running maxima of the three counters, in kB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeakTracker {
    pub resident_kb: u64,
    pub virtual_kb: u64,
    pub data_kb: u64,
}

impl PeakTracker {
    /// Fold in a reading. Returns true if any maximum advanced.
    pub fn observe(&mut self, counters: &MemoryCounters) -> bool {
        let mut advanced = false;
        if counters.resident_kb > self.resident_kb {
            self.resident_kb = counters.resident_kb;
            advanced = true;
        }
        if counters.virtual_kb > self.virtual_kb {
            self.virtual_kb = counters.virtual_kb;
            advanced = true;
        }
        if counters.data_kb > self.data_kb {
            self.data_kb = counters.data_kb;
            advanced = true;
        }
        advanced
    }
}

/// Progress callback, invoked whenever a running maximum advances
pub type PeakCallback = Box<dyn FnMut(&Sample, &PeakTracker)>;

/// One monitoring run against one process
pub struct SamplingLoop<P: MemoryProbe> {
    pid: i32,
    probe: P,
    config: MonitorConfig,
    cancel: Arc<AtomicBool>,
    start: Option<Instant>,
    on_peak: Option<PeakCallback>,
    state: LoopState,
    peaks: PeakTracker,
    sample_count: usize,
}

impl<P: MemoryProbe> SamplingLoop<P> {
    pub fn new(pid: i32, probe: P, config: MonitorConfig) -> Self {
        Self {
            pid,
            probe,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            start: None,
            on_peak: None,
            state: LoopState::Starting,
            peaks: PeakTracker::default(),
            sample_count: 0,
        }
    }

    /// Share an externally owned cancellation flag (e.g. a Ctrl+C handler)
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Measure elapsed time from the launcher's start reference
    pub fn with_start_time(mut self, start: Instant) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_peak_callback(mut self, callback: impl FnMut(&Sample, &PeakTracker) + 'static) -> Self {
        self.on_peak = Some(Box::new(callback));
        self
    }

    /// Flag that stops the loop when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn peaks(&self) -> PeakTracker {
        self.peaks
    }

    /// Sample until a terminal state, then close the trace
    ///
    /// # Errors
    ///
    /// Only trace write failures. A vanished or unreadable target ends the
    /// run normally with the matching [`TerminationReason`].
    pub fn run(&mut self, mut recorder: TraceRecorder) -> Result<RunSummary, TraceError> {
        let start = self.start.unwrap_or_else(Instant::now);
        self.state = LoopState::Starting;
        self.peaks = PeakTracker::default();
        self.sample_count = 0;

        tracing::info!(
            pid = self.pid,
            interval_ms = self.config.interval_ms,
            timeout_secs = self.config.timeout_secs,
            trace = %recorder.path().display(),
            "sampling started"
        );
        self.state = LoopState::Sampling;

        let reason = loop {
            if let Some(reason) = self.step(start, &mut recorder)? {
                break reason;
            }
            if !self.sleep_interruptible(self.config.interval()) {
                break TerminationReason::Interrupted;
            }
        };
        self.state = LoopState::Finished(reason);

        let rows = recorder.close()?;
        debug_assert_eq!(rows, self.sample_count);
        self.state = LoopState::Terminated(reason);

        let summary = RunSummary {
            peak_resident_mb: kb_to_mb(self.peaks.resident_kb),
            peak_virtual_mb: kb_to_mb(self.peaks.virtual_kb),
            peak_data_mb: kb_to_mb(self.peaks.data_kb),
            sample_count: self.sample_count,
            duration_seconds: start.elapsed().as_secs_f64(),
            reason,
        };
        tracing::info!(
            pid = self.pid,
            %reason,
            samples = summary.sample_count,
            peak_rss_mb = summary.peak_resident_mb,
            "sampling finished"
        );

        Ok(summary)
    }

    /// One iteration of the sampling state
    fn step(
        &mut self,
        start: Instant,
        recorder: &mut TraceRecorder,
    ) -> Result<Option<TerminationReason>, TraceError> {
        if self.is_cancelled() {
            return Ok(Some(TerminationReason::Interrupted));
        }

        if !self.probe.is_alive(self.pid) {
            tracing::debug!(pid = self.pid, "target no longer alive");
            return Ok(Some(TerminationReason::ProcessExited));
        }

        let Some(counters) = self.probe.read(self.pid) else {
            tracing::debug!(pid = self.pid, "memory counters unavailable");
            return Ok(Some(TerminationReason::ReadFailed));
        };

        let elapsed = start.elapsed().as_secs_f64();
        let sample = Sample::new(
            elapsed,
            counters.resident_kb,
            counters.virtual_kb,
            counters.data_kb,
        );
        recorder.append(&sample)?;
        self.sample_count += 1;

        if self.peaks.observe(&counters) {
            tracing::trace!(
                elapsed,
                rss_kb = self.peaks.resident_kb,
                vmsize_kb = self.peaks.virtual_kb,
                vmdata_kb = self.peaks.data_kb,
                "peak advanced"
            );
            if let Some(callback) = self.on_peak.as_mut() {
                callback(&sample, &self.peaks);
            }
        }

        if elapsed > self.config.timeout_secs {
            return Ok(Some(TerminationReason::TimedOut));
        }

        Ok(None)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` in short slices. Returns false if cancelled.
    fn sleep_interruptible(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_POLL_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// What the scripted probe reports on successive polls
    #[derive(Debug, Clone, Copy)]
    enum Poll {
        Reading(u64, u64, u64),
        Unreadable,
        Dead,
    }

    /// Replays a fixed script, then reports the process as dead
    struct ScriptedProbe {
        script: RefCell<VecDeque<Poll>>,
        current: RefCell<Option<Poll>>,
    }

    impl ScriptedProbe {
        fn new(polls: Vec<Poll>) -> Self {
            Self {
                script: RefCell::new(polls.into()),
                current: RefCell::new(None),
            }
        }
    }

    impl MemoryProbe for ScriptedProbe {
        fn is_alive(&self, _pid: i32) -> bool {
            let next = self.script.borrow_mut().pop_front().unwrap_or(Poll::Dead);
            *self.current.borrow_mut() = Some(next);
            !matches!(next, Poll::Dead)
        }

        fn read(&self, _pid: i32) -> Option<MemoryCounters> {
            match *self.current.borrow() {
                Some(Poll::Reading(resident_kb, virtual_kb, data_kb)) => Some(MemoryCounters {
                    resident_kb,
                    virtual_kb,
                    data_kb,
                }),
                _ => None,
            }
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            interval_ms: 1,
            timeout_secs: 60.0,
        }
    }

    fn recorder(dir: &tempfile::TempDir) -> TraceRecorder {
        TraceRecorder::open(dir.path().join("trace.csv")).unwrap()
    }

    #[test]
    fn test_dead_on_first_probe() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = SamplingLoop::new(1, ScriptedProbe::new(vec![]), fast_config());

        let summary = sampler.run(recorder(&dir)).unwrap();

        assert_eq!(summary.reason, TerminationReason::ProcessExited);
        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.peak_resident_mb, 0.0);
        assert_eq!(
            sampler.state(),
            LoopState::Terminated(TerminationReason::ProcessExited)
        );
    }

    #[test]
    fn test_samples_until_exit_and_tracks_peaks() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(vec![
            Poll::Reading(1024, 8192, 512),
            Poll::Reading(4096, 4096, 2048),
            Poll::Reading(2048, 4096, 1024),
        ]);
        let mut sampler = SamplingLoop::new(7, probe, fast_config());

        let summary = sampler.run(recorder(&dir)).unwrap();

        assert_eq!(summary.reason, TerminationReason::ProcessExited);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.peak_resident_mb, 4.0);
        assert_eq!(summary.peak_virtual_mb, 8.0);
        assert_eq!(summary.peak_data_mb, 2.0);

        let trace = crate::loader::load(dir.path().join("trace.csv")).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.samples()[1].resident_kb, 4096);
    }

    #[test]
    fn test_read_failure_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(vec![Poll::Reading(100, 200, 50), Poll::Unreadable]);
        let mut sampler = SamplingLoop::new(7, probe, fast_config());

        let summary = sampler.run(recorder(&dir)).unwrap();

        assert_eq!(summary.reason, TerminationReason::ReadFailed);
        assert_eq!(summary.sample_count, 1);
    }

    #[test]
    fn test_timeout_records_boundary_sample() {
        let dir = tempfile::tempdir().unwrap();
        let polls = vec![Poll::Reading(100, 200, 50); 1000];
        let config = MonitorConfig {
            interval_ms: 5,
            timeout_secs: 0.02,
        };
        let mut sampler = SamplingLoop::new(7, ScriptedProbe::new(polls), config);

        let summary = sampler.run(recorder(&dir)).unwrap();

        assert_eq!(summary.reason, TerminationReason::TimedOut);
        assert!(summary.sample_count >= 1);

        let trace = crate::loader::load(dir.path().join("trace.csv")).unwrap();
        assert_eq!(trace.len(), summary.sample_count);
        let last = trace.last().unwrap();
        assert!(last.elapsed_seconds > 0.02 - 0.0005);
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(vec![Poll::Reading(100, 200, 50); 10]);
        let cancel = Arc::new(AtomicBool::new(true));
        let mut sampler = SamplingLoop::new(7, probe, fast_config()).with_cancel_flag(cancel);

        let summary = sampler.run(recorder(&dir)).unwrap();

        assert_eq!(summary.reason, TerminationReason::Interrupted);
        assert_eq!(summary.sample_count, 0);
    }

    #[test]
    fn test_cancel_preempts_long_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(vec![Poll::Reading(100, 200, 50); 10]);
        let config = MonitorConfig {
            interval_ms: 60_000,
            timeout_secs: 600.0,
        };
        let mut sampler = SamplingLoop::new(7, probe, config);
        let cancel = sampler.cancel_handle();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel.store(true, Ordering::SeqCst);
        });

        let began = Instant::now();
        let summary = sampler.run(recorder(&dir)).unwrap();
        canceller.join().unwrap();

        assert_eq!(summary.reason, TerminationReason::Interrupted);
        assert_eq!(summary.sample_count, 1);
        assert!(began.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_peak_callback_fires_on_advance_only() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ScriptedProbe::new(vec![
            Poll::Reading(100, 200, 50),
            Poll::Reading(100, 200, 50),
            Poll::Reading(90, 300, 50),
            Poll::Reading(80, 100, 40),
        ]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut sampler = SamplingLoop::new(7, probe, fast_config())
            .with_peak_callback(move |sample, peaks| {
                sink.borrow_mut().push((sample.resident_kb, peaks.virtual_kb));
            });

        sampler.run(recorder(&dir)).unwrap();

        assert_eq!(*seen.borrow(), vec![(100, 200), (90, 300)]);
    }

    #[test]
    fn test_peak_tracker_observe() {
        let mut peaks = PeakTracker::default();
        let reading = MemoryCounters {
            resident_kb: 10,
            virtual_kb: 20,
            data_kb: 5,
        };
        assert!(peaks.observe(&reading));
        assert!(!peaks.observe(&reading));
        assert!(peaks.observe(&MemoryCounters {
            data_kb: 6,
            ..reading
        }));
        assert_eq!(peaks.data_kb, 6);
    }

    #[test]
    fn test_termination_reason_display() {
        assert_eq!(TerminationReason::ProcessExited.to_string(), "process exited");
        assert_eq!(TerminationReason::TimedOut.to_string(), "timeout reached");
    }
}
