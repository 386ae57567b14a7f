#![no_main]

use libfuzzer_sys::fuzz_target;
use memspike::loader::parse_trace;
use memspike::spike::SpikeDetector;
use memspike::summary::summarize;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Anything the parser accepts must be safe to analyze
        if let Ok(trace) = parse_trace(input) {
            let _ = SpikeDetector::default().detect(&trace);
            let _ = summarize(&trace);
        }
    }
});
