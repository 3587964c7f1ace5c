//! Error types for the dump-file pipeline.

use std::fmt;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, DumpError>;

/// A human-readable snapshot of the line reader's position, attached to
/// errors raised while reading or writing so the message is self-contained.
#[derive(Debug, Clone)]
pub struct ReaderSnapshot {
    pub line_number: u64,
    pub start: u64,
    pub stop: u64,
    pub preview: String,
}

impl fmt::Display for ReaderSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {} [{}..{}): {:?}",
            self.line_number, self.start, self.stop, self.preview
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("malformed dump file: {message} (at {snapshot})")]
    Format {
        message: String,
        snapshot: ReaderSnapshot,
    },

    #[error("malformed dump file: {message}")]
    FormatPlain { message: String },

    #[error("unsupported dump format version: {message}")]
    Version { message: String },

    #[error("checksum mismatch: {message} (at {snapshot})")]
    Checksum {
        message: String,
        snapshot: ReaderSnapshot,
    },

    #[error("edit consistency violated: {0}")]
    EditConsistency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DumpError {
    pub fn format(message: impl Into<String>, snapshot: ReaderSnapshot) -> Self {
        DumpError::Format {
            message: message.into(),
            snapshot,
        }
    }

    pub fn format_plain(message: impl Into<String>) -> Self {
        DumpError::FormatPlain {
            message: message.into(),
        }
    }

    pub fn version(message: impl Into<String>) -> Self {
        DumpError::Version {
            message: message.into(),
        }
    }

    pub fn checksum(message: impl Into<String>, snapshot: ReaderSnapshot) -> Self {
        DumpError::Checksum {
            message: message.into(),
            snapshot,
        }
    }
}
