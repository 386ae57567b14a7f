//! Spike detection and summarization throughput
//!
//! A 10 ms cadence over the default 180 s budget yields ~18,000 samples,
//! so analysis of a full trace must stay well below a second.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench spike_detection
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use memspike::loader::parse_trace;
use memspike::recorder::{format_row, TRACE_COLUMNS};
use memspike::sample::{Sample, Trace};
use memspike::spike::{rank_by_magnitude, SpikeDetector};
use memspike::summary::summarize;

/// Sawtooth RSS with a burst every 500 samples
fn synthetic_trace(len: usize) -> Trace {
    let samples = (0..len)
        .map(|i| {
            let base = 200_000 + (i % 100) as u64 * 256;
            let burst = if i % 500 == 0 { 64_000 } else { 0 };
            let rss = base + burst;
            Sample::new(i as f64 * 0.010, rss, rss * 3, rss - 50_000)
        })
        .collect();
    Trace::from_samples(samples)
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("spike_detect");
    let detector = SpikeDetector::default();

    for len in [1_000usize, 18_000, 100_000] {
        let trace = synthetic_trace(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &trace, |b, trace| {
            b.iter(|| {
                let spikes = detector.detect(black_box(trace));
                rank_by_magnitude(&spikes, 10)
            });
        });
    }

    group.finish();
}

fn bench_summarize(c: &mut Criterion) {
    let trace = synthetic_trace(18_000);
    c.bench_function("summarize_18k", |b| {
        b.iter(|| summarize(black_box(&trace)));
    });
}

fn bench_parse(c: &mut Criterion) {
    let trace = synthetic_trace(18_000);
    let mut text = TRACE_COLUMNS.join(",");
    text.push('\n');
    for sample in trace.iter() {
        text.push_str(&format_row(sample));
        text.push('\n');
    }

    c.bench_function("parse_trace_18k", |b| {
        b.iter(|| parse_trace(black_box(&text)));
    });
}

criterion_group!(benches, bench_detect, bench_summarize, bench_parse);
criterion_main!(benches);
