//! Error types for trace persistence and analysis
//!
//! Live capture never fails on a vanished process (that is a termination
//! reason, see [`crate::monitor::TerminationReason`]). The errors here cover
//! storage failures and persisted data that cannot be trusted.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while writing or reading a trace file
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("failed to open trace {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write trace {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read trace {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trace has no header row")]
    MissingHeader,

    #[error("trace header is missing column `{column}`")]
    MissingColumn { column: &'static str },

    /// `row` is the 1-based line number in the file (header is line 1)
    #[error("malformed trace row {row}: {reason}")]
    MalformedTrace { row: usize, reason: String },
}

impl TraceError {
    /// Line number of the offending row, for malformed data only
    pub fn row(&self) -> Option<usize> {
        match self {
            TraceError::MalformedTrace { row, .. } => Some(*row),
            _ => None,
        }
    }
}

/// Summarization was requested for a trace without samples
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("trace contains no samples")]
pub struct EmptyTraceError;

/// Errors loading or validating a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
