//! Error types for the archive engine.
//!
//! The primary error type is `EngineError`, which represents operation-level
//! failures (bad input, unreadable files, corrupt archives). Integrity
//! mismatches are never errors: they are collected as `verify::Mismatch`
//! values and handed back to the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a pack, unpack, backup, restore or verify operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source path does not exist
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Failed to read from a source file or archive
    #[error("Failed to read file: {}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to a destination file or archive
    #[error("Failed to write file: {}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Path is invalid for the requested operation
    #[error("Invalid path: {} ({reason})", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory: {}", path.display())]
    EnumerationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory: {}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A plain-mode backup has no manifest to verify against
    #[error("Backup manifest not found: {}", path.display())]
    ManifestNotFound { path: PathBuf },

    /// Archive or manifest content could not be parsed
    #[error("Corrupt data in {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// Filter descriptor carries an out-of-range value
    #[error("Invalid filter: {reason}")]
    InvalidFilter { reason: String },

    /// Configuration could not be loaded
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl EngineError {
    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path() {
        let err = EngineError::SourceNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert_eq!(err.to_string(), "Source not found: /no/such/dir");
    }

    #[test]
    fn test_format_error_display() {
        let err = EngineError::format("a.pck", "bad magic");
        assert_eq!(err.to_string(), "Corrupt data in a.pck: bad magic");
    }

    #[test]
    fn test_read_error_keeps_source() {
        use std::error::Error as _;
        let err = EngineError::ReadError {
            path: PathBuf::from("x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains('x'));
    }
}
