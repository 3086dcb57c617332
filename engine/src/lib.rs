//! # MiniBackup Engine
//!
//! A headless selective-backup library. It packs a file or directory tree
//! into a single self-describing archive, optionally compressed with a
//! run-length codec and obscured with a stream cipher, and unpacks it again
//! with per-entry CRC-32 checks. A second, plain mode copies the tree
//! verbatim next to a digest manifest.
//!
//! Restores in both modes follow a verify-then-restore protocol: integrity
//! issues are collected first and the caller decides whether to proceed.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use minibackup_engine::{CompressionMode, EncryptionMode, Engine, Filter};
//!
//! let engine = Engine::new();
//! let filter = Filter {
//!     name_contains: Some(".txt".to_string()),
//!     ..Filter::default()
//! };
//!
//! let ok = engine.pack(
//!     Path::new("/data/docs"),
//!     Path::new("/backups/docs.pck"),
//!     "secret",
//!     EncryptionMode::Rc4,
//!     Some(&filter),
//!     CompressionMode::Rle,
//! );
//! assert!(ok);
//!
//! engine.unpack(Path::new("/backups/docs.pck"), Path::new("/restore"), "secret");
//! ```
//!
//! ## Modules
//!
//! - **model**: Entries, filters and mode enums
//! - **filter**: The filter predicate
//! - **codec**: Run-length codec
//! - **cipher**: XOR and RC4 stream ciphers
//! - **checksums**: CRC-32 and manifest digests
//! - **format**: Archive wire format
//! - **pack** / **unpack**: Archive pipeline
//! - **verify**: Mismatch reports and the restore protocol
//! - **plain**: Plain backup, restore and verify
//! - **engine**: The five-operation facade
//! - **config**, **progress**, **error**, **fs_ops**: Supporting pieces

pub mod model;
pub mod error;
pub mod filter;
pub mod codec;
pub mod cipher;
pub mod checksums;
pub mod fs_ops;
pub mod format;
pub mod pack;
pub mod unpack;
pub mod verify;
pub mod plain;
pub mod progress;
pub mod config;
pub mod engine;

// Re-export main types and functions
pub use model::{CompressionMode, EncryptionMode, Entry, EntryKind, Filter, FilterDescriptor};
pub use error::EngineError;
pub use checksums::{crc32, ChecksumAlgorithm, ChecksumValue};
pub use config::EngineConfig;
pub use engine::Engine;
pub use pack::{pack, PackOptions, PackSummary};
pub use unpack::{inspect_archive, restore_archive, unpack, verify_archive, ArchiveListing, UnpackSummary};
pub use verify::{Mismatch, MismatchReason, RestoreOutcome, RestoreProtocol, RestoreState, VerifyReport};
pub use plain::{CopySummary, Manifest};
pub use progress::{Operation, ProgressCallback};
