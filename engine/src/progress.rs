//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which decouples the engine
//! from any specific UI technology. The CLI prints to stderr; other callers
//! can forward events to a channel or a log.

use std::fmt;

/// Which engine operation is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Pack,
    Unpack,
    VerifyArchive,
    Backup,
    Restore,
    Verify,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Pack => "pack",
            Operation::Unpack => "unpack",
            Operation::VerifyArchive => "verify-archive",
            Operation::Backup => "backup",
            Operation::Restore => "restore",
            Operation::Verify => "verify",
        };
        write!(f, "{}", name)
    }
}

/// Trait for receiving progress updates from an engine operation.
///
/// All methods are called synchronously on the thread running the operation.
pub trait ProgressCallback: Send + Sync {
    /// Called when an operation starts; `total` is the number of entries
    /// that will be processed.
    fn on_started(&self, operation: Operation, total: usize);

    /// Called before an entry is processed.
    fn on_entry_started(&self, operation: Operation, index: usize, path: &str);

    /// Called after an entry is processed with the number of bytes it produced.
    fn on_entry_completed(&self, operation: Operation, index: usize, path: &str, bytes: u64);

    /// Called when the operation finishes successfully.
    fn on_completed(&self, operation: Operation, entries: usize, bytes: u64);
}

