//! Trace file reader, the inverse of [`crate::recorder::TraceRecorder`]
//!
//! Unlike live capture, reloading is strict: a row that cannot be parsed
//! fails the whole load with its line number, because a silently skipped
//! row would show up as a fake spike between its neighbours.

use std::path::Path;

use crate::error::TraceError;
use crate::sample::{Sample, Trace};

/// Positions of the required columns within a row
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    time: usize,
    resident: usize,
    virtual_size: usize,
    data: usize,
    width: usize,
}

impl ColumnMap {
    fn from_header(header: &str) -> Result<Self, TraceError> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |column: &'static str| {
            names
                .iter()
                .position(|name| *name == column)
                .ok_or(TraceError::MissingColumn { column })
        };

        let time = find("time_s")?;
        let resident = find("vmrss_kb")?;
        let virtual_size = find("vmsize_kb")?;
        let data = find("vmdata_kb")?;

        Ok(Self {
            time,
            resident,
            virtual_size,
            data,
            width: names.len(),
        })
    }
}

/// Load a trace file from disk
pub fn load(path: impl AsRef<Path>) -> Result<Trace, TraceError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| TraceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let trace = parse_trace(&text)?;
    tracing::debug!(path = %path.display(), samples = trace.len(), "trace loaded");
    Ok(trace)
}

/// Parse trace text (header + rows)
///
/// # Example
/// ```
/// use memspike::loader::parse_trace;
///
/// let trace = parse_trace("vmrss_kb,time_s,vmsize_kb,vmdata_kb\n2048,0.5,4096,1024\n").unwrap();
/// assert_eq!(trace.len(), 1);
/// assert_eq!(trace.samples()[0].elapsed_seconds, 0.5);
/// ```
pub fn parse_trace(text: &str) -> Result<Trace, TraceError> {
    let mut lines = text.lines().enumerate();

    let columns = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break ColumnMap::from_header(line)?,
            None => return Err(TraceError::MissingHeader),
        }
    };

    let mut trace = Trace::new();
    let mut previous_time = f64::NEG_INFINITY;

    for (index, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let row = index + 1;
        let sample = parse_row(line, &columns, row)?;

        if sample.elapsed_seconds < previous_time {
            return Err(TraceError::MalformedTrace {
                row,
                reason: format!(
                    "time_s {} is earlier than the previous row ({})",
                    sample.elapsed_seconds, previous_time
                ),
            });
        }
        previous_time = sample.elapsed_seconds;
        trace.push(sample);
    }

    Ok(trace)
}

fn parse_row(line: &str, columns: &ColumnMap, row: usize) -> Result<Sample, TraceError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < columns.width {
        return Err(TraceError::MalformedTrace {
            row,
            reason: format!(
                "expected {} fields, found {}",
                columns.width,
                fields.len()
            ),
        });
    }

    let time_s = parse_seconds(fields[columns.time], row)?;
    let resident_kb = parse_kb(fields[columns.resident], "vmrss_kb", row)?;
    let virtual_size_kb = parse_kb(fields[columns.virtual_size], "vmsize_kb", row)?;
    let data_segment_kb = parse_kb(fields[columns.data], "vmdata_kb", row)?;

    Ok(Sample::new(
        time_s,
        resident_kb,
        virtual_size_kb,
        data_segment_kb,
    ))
}

fn parse_seconds(raw: &str, row: usize) -> Result<f64, TraceError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(TraceError::MalformedTrace {
            row,
            reason: format!("invalid time_s `{}`", raw),
        }),
    }
}

/// Counters are integers, but `123.0` style text is accepted
fn parse_kb(raw: &str, column: &str, row: usize) -> Result<u64, TraceError> {
    if let Ok(value) = raw.parse::<u64>() {
        return Ok(value);
    }

    match raw.parse::<f64>() {
        // `u64::MAX as f64` rounds up to 2^64, which is already out of range
        Ok(value)
            if value.is_finite()
                && value >= 0.0
                && value.fract() == 0.0
                && value < u64::MAX as f64 =>
        {
            Ok(value as u64)
        }
        _ => Err(TraceError::MalformedTrace {
            row,
            reason: format!("invalid {} `{}`", column, raw),
        }),
    }
}
