//! Recorder -> loader round trips and crash-safety of partial traces

use memspike::loader;
use memspike::recorder::TraceRecorder;
use memspike::summary::summarize;
use memspike::{Sample, TraceError};

fn ramp(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| {
            let kb = 100_000 + (i as u64) * 1_500;
            Sample::new(i as f64 * 0.010, kb, kb * 3, kb - 10_000)
        })
        .collect()
}

#[test]
fn test_roundtrip_preserves_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rss_trace.csv");
    let samples = ramp(250);

    let mut recorder = TraceRecorder::open(&path).unwrap();
    for sample in &samples {
        recorder.append(sample).unwrap();
    }
    assert_eq!(recorder.close().unwrap(), samples.len());

    let trace = loader::load(&path).unwrap();
    assert_eq!(trace.len(), samples.len());
    for (loaded, written) in trace.iter().zip(&samples) {
        assert!((loaded.elapsed_seconds - written.elapsed_seconds).abs() < 0.0005);
        assert_eq!(loaded.resident_kb, written.resident_kb);
        assert_eq!(loaded.virtual_size_kb, written.virtual_size_kb);
        assert_eq!(loaded.data_segment_kb, written.data_segment_kb);
    }
}

#[test]
fn test_time_rounded_to_milliseconds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");

    let mut recorder = TraceRecorder::open(&path).unwrap();
    recorder.append(&Sample::new(1.23449, 1, 2, 3)).unwrap();
    recorder.close().unwrap();

    let trace = loader::load(&path).unwrap();
    assert_eq!(trace.samples()[0].elapsed_seconds, 1.234);
}

#[test]
fn test_unclosed_recorder_leaves_valid_trace() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");

    let mut recorder = TraceRecorder::open(&path).unwrap();
    for sample in ramp(20) {
        recorder.append(&sample).unwrap();
    }

    // Simulate an abrupt stop: the handle is never closed
    std::mem::forget(recorder);

    let trace = loader::load(&path).unwrap();
    assert_eq!(trace.len(), 20);
    assert_eq!(summarize(&trace).unwrap().sample_count, 20);
}

#[test]
fn test_header_only_trace_cannot_be_summarized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");
    TraceRecorder::open(&path).unwrap().close().unwrap();

    let trace = loader::load(&path).unwrap();
    assert!(trace.is_empty());
    assert!(summarize(&trace).is_err());
}

#[test]
fn test_corrupted_row_reports_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.csv");

    let mut recorder = TraceRecorder::open(&path).unwrap();
    for sample in ramp(3) {
        recorder.append(&sample).unwrap();
    }
    recorder.close().unwrap();

    // Torn final row, as if a foreign writer truncated it
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("0.030,1034");
    std::fs::write(&path, text).unwrap();

    match loader::load(&path) {
        Err(TraceError::MalformedTrace { row, .. }) => assert_eq!(row, 5),
        other => panic!("expected malformed trace, got {:?}", other),
    }
}
