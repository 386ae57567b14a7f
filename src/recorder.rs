//! Append-only CSV trace writer
//!
//! Every row is written, flushed and synced before `append` returns, so a
//! trace on disk is always valid up to the last appended sample even if the
//! monitor dies right after.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::TraceError;
use crate::sample::Sample;

/// Column names, in the order the recorder writes them
pub const TRACE_COLUMNS: [&str; 4] = ["time_s", "vmrss_kb", "vmsize_kb", "vmdata_kb"];

/// Format a sample as one CSV row (no trailing newline)
///
/// Time is written with millisecond precision.
pub fn format_row(sample: &Sample) -> String {
    format!(
        "{:.3},{},{},{}",
        sample.elapsed_seconds, sample.resident_kb, sample.virtual_size_kb, sample.data_segment_kb
    )
}

/// Live trace file handle
#[derive(Debug)]
pub struct TraceRecorder {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl TraceRecorder {
    /// Create (or truncate) `path` and write the header row
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| TraceError::Open {
            path: path.clone(),
            source,
        })?;

        let mut recorder = Self {
            path,
            writer: BufWriter::new(file),
            rows: 0,
        };
        recorder.write_line(&TRACE_COLUMNS.join(","))?;
        tracing::debug!(path = %recorder.path.display(), "trace opened");

        Ok(recorder)
    }

    /// Append one sample and force it to stable storage
    pub fn append(&mut self, sample: &Sample) -> Result<(), TraceError> {
        self.write_line(&format_row(sample))?;
        self.rows += 1;
        Ok(())
    }

    /// Number of data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finish the trace, returning the number of data rows written
    pub fn close(mut self) -> Result<usize, TraceError> {
        self.sync()?;
        tracing::debug!(path = %self.path.display(), rows = self.rows, "trace closed");
        Ok(self.rows)
    }

    fn write_line(&mut self, line: &str) -> Result<(), TraceError> {
        let path = &self.path;
        let to_error = |source| TraceError::Write {
            path: path.clone(),
            source,
        };
        self.writer.write_all(line.as_bytes()).map_err(to_error)?;
        self.writer.write_all(b"\n").map_err(to_error)?;
        self.sync()
    }

    fn sync(&mut self) -> Result<(), TraceError> {
        let path = &self.path;
        let to_error = |source| TraceError::Write {
            path: path.clone(),
            source,
        };
        self.writer.flush().map_err(to_error)?;
        self.writer.get_ref().sync_data().map_err(to_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_row_millisecond_precision() {
        let sample = Sample::new(1.23456, 100000, 250000, 90000);
        assert_eq!(format_row(&sample), "1.235,100000,250000,90000");
    }

    #[test]
    fn test_format_row_zero_time() {
        let sample = Sample::new(0.0, 1, 2, 3);
        assert_eq!(format_row(&sample), "0.000,1,2,3");
    }

    #[test]
    fn test_open_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");

        let recorder = TraceRecorder::open(&path).unwrap();
        assert_eq!(recorder.rows(), 0);
        assert_eq!(recorder.close().unwrap(), 0);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "time_s,vmrss_kb,vmsize_kb,vmdata_kb\n");
    }

    #[test]
    fn test_rows_visible_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");

        let mut recorder = TraceRecorder::open(&path).unwrap();
        recorder.append(&Sample::new(0.0, 10, 20, 30)).unwrap();
        recorder.append(&Sample::new(0.01, 11, 21, 31)).unwrap();

        // No close: a crash here must still leave both rows on disk
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0.000,10,20,30");
        assert_eq!(lines[2], "0.010,11,21,31");
        assert_eq!(recorder.rows(), 2);
    }

    #[test]
    fn test_open_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        std::fs::write(&path, "old contents\nmore\n").unwrap();

        TraceRecorder::open(&path).unwrap().close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old contents"));
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let err = TraceRecorder::open("/nonexistent/dir/trace.csv").unwrap_err();
        assert!(matches!(err, TraceError::Open { .. }));
    }
}
