//! Core data model for the archive engine.
//!
//! This module defines the value objects passed between components:
//! - Entry: one filesystem object considered for backup
//! - Filter / FilterDescriptor: matching constraints applied to entries
//! - CompressionMode, EncryptionMode: per-archive pipeline settings

use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::error::EngineError;

/// Kind of filesystem object an entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    /// Wire value used in archive records.
    pub fn as_byte(self) -> u8 {
        match self {
            EntryKind::File => 0,
            EntryKind::Directory => 1,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryKind::File),
            1 => Some(EntryKind::Directory),
            _ => None,
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "file"),
            EntryKind::Directory => write!(f, "dir"),
        }
    }
}

/// A single file or directory found while walking a source tree.
///
/// Entries are produced by `fs_ops::enumerate_entries` and are read-only;
/// they are consumed by the packer or shown to a caller and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Full path on disk
    pub absolute_path: PathBuf,

    /// Path relative to the enumeration root, '/'-separated
    pub relative_path: String,

    /// File or directory
    pub kind: EntryKind,

    /// Size in bytes (0 for directories)
    pub size_bytes: u64,

    /// Last modification time, seconds since the Unix epoch
    pub modified_time: i64,

    /// Owning user id, when the platform has one
    pub owner_id: Option<u32>,
}

impl Entry {
    /// Base name of the entry (last path component).
    pub fn name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Matching constraints applied to entries before they are packed.
///
/// Every field defaults to "no constraint", so `Filter::default()` matches
/// every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Case-sensitive substring of the base name
    pub name_contains: Option<String>,

    /// Case-sensitive substring of the relative path
    pub path_contains: Option<String>,

    /// Restrict to one kind; None means any
    pub kind: Option<EntryKind>,

    /// Minimum file size in bytes (0 = unbounded)
    pub min_size: u64,

    /// Maximum file size in bytes (0 = unbounded)
    pub max_size: u64,

    /// Earliest modification time, epoch seconds (0 = unbounded)
    pub not_before: i64,

    /// Required owner id; None means any
    pub owner_id: Option<u32>,
}

impl Filter {
    /// Returns true when no constraint is active.
    pub fn is_unconstrained(&self) -> bool {
        *self == Filter::default()
    }
}

/// Fixed-width filter record exchanged with external callers.
///
/// Optional fields use sentinel values instead of `Option`: an empty string
/// means "no constraint", `kind` is -1 (any), 0 (file) or 1 (directory), and
/// a negative `owner_id` means any owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub name_contains: String,
    pub path_contains: String,
    pub kind: i32,
    pub min_size: u64,
    pub max_size: u64,
    pub not_before: i64,
    pub owner_id: i32,
}

impl FilterDescriptor {
    pub const KIND_ANY: i32 = -1;
    pub const KIND_FILE: i32 = 0;
    pub const KIND_DIRECTORY: i32 = 1;
}

impl Default for FilterDescriptor {
    fn default() -> Self {
        FilterDescriptor {
            name_contains: String::new(),
            path_contains: String::new(),
            kind: Self::KIND_ANY,
            min_size: 0,
            max_size: 0,
            not_before: 0,
            owner_id: -1,
        }
    }
}

impl TryFrom<FilterDescriptor> for Filter {
    type Error = EngineError;

    fn try_from(desc: FilterDescriptor) -> Result<Self, Self::Error> {
        let kind = match desc.kind {
            FilterDescriptor::KIND_ANY => None,
            FilterDescriptor::KIND_FILE => Some(EntryKind::File),
            FilterDescriptor::KIND_DIRECTORY => Some(EntryKind::Directory),
            other => {
                return Err(EngineError::InvalidFilter {
                    reason: format!("kind must be -1, 0 or 1, got {}", other),
                })
            }
        };

        Ok(Filter {
            name_contains: Some(desc.name_contains).filter(|s| !s.is_empty()),
            path_contains: Some(desc.path_contains).filter(|s| !s.is_empty()),
            kind,
            min_size: desc.min_size,
            max_size: desc.max_size,
            not_before: desc.not_before,
            owner_id: u32::try_from(desc.owner_id).ok(),
        })
    }
}

impl From<&Filter> for FilterDescriptor {
    fn from(filter: &Filter) -> Self {
        FilterDescriptor {
            name_contains: filter.name_contains.clone().unwrap_or_default(),
            path_contains: filter.path_contains.clone().unwrap_or_default(),
            kind: match filter.kind {
                None => FilterDescriptor::KIND_ANY,
                Some(EntryKind::File) => FilterDescriptor::KIND_FILE,
                Some(EntryKind::Directory) => FilterDescriptor::KIND_DIRECTORY,
            },
            min_size: filter.min_size,
            max_size: filter.max_size,
            not_before: filter.not_before,
            // Owner ids above i32::MAX cannot be expressed; they become "any".
            owner_id: filter
                .owner_id
                .and_then(|id| i32::try_from(id).ok())
                .unwrap_or(-1),
        }
    }
}

/// Compression applied to every file payload in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionMode {
    #[default]
    None,
    /// Run-length encoding (see `codec`)
    Rle,
}

impl CompressionMode {
    pub fn as_byte(self) -> u8 {
        match self {
            CompressionMode::None => 0,
            CompressionMode::Rle => 1,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMode::None),
            1 => Some(CompressionMode::Rle),
            _ => None,
        }
    }

    /// Parse mode from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(CompressionMode::None),
            "rle" => Some(CompressionMode::Rle),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMode::None => write!(f, "none"),
            CompressionMode::Rle => write!(f, "rle"),
        }
    }
}

/// Stream cipher applied to every file payload in an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncryptionMode {
    #[default]
    None,
    /// Repeating-key XOR
    Xor,
    /// RC4-style keystream
    Rc4,
}

impl EncryptionMode {
    pub fn as_byte(self) -> u8 {
        match self {
            EncryptionMode::None => 0,
            EncryptionMode::Xor => 1,
            EncryptionMode::Rc4 => 2,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(EncryptionMode::None),
            1 => Some(EncryptionMode::Xor),
            2 => Some(EncryptionMode::Rc4),
            _ => None,
        }
    }

    /// Parse mode from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(EncryptionMode::None),
            "xor" => Some(EncryptionMode::Xor),
            "rc4" => Some(EncryptionMode::Rc4),
            _ => None,
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionMode::None => write!(f, "none"),
            EncryptionMode::Xor => write!(f, "xor"),
            EncryptionMode::Rc4 => write!(f, "rc4"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(rel: &str) -> Entry {
        Entry {
            absolute_path: PathBuf::from("/root").join(rel),
            relative_path: rel.to_string(),
            kind: EntryKind::File,
            size_bytes: 0,
            modified_time: 0,
            owner_id: None,
        }
    }

    #[test]
    fn test_entry_name_is_last_component() {
        assert_eq!(entry("a/b/c.txt").name(), "c.txt");
        assert_eq!(entry("top.log").name(), "top.log");
    }

    #[test]
    fn test_default_descriptor_converts_to_unconstrained_filter() {
        let filter = Filter::try_from(FilterDescriptor::default()).expect("valid descriptor");
        assert!(filter.is_unconstrained());
    }

    #[test]
    fn test_descriptor_sentinels() {
        let desc = FilterDescriptor {
            name_contains: ".txt".to_string(),
            kind: FilterDescriptor::KIND_DIRECTORY,
            owner_id: 1000,
            ..FilterDescriptor::default()
        };
        let filter = Filter::try_from(desc.clone()).expect("valid descriptor");
        assert_eq!(filter.name_contains.as_deref(), Some(".txt"));
        assert_eq!(filter.path_contains, None);
        assert_eq!(filter.kind, Some(EntryKind::Directory));
        assert_eq!(filter.owner_id, Some(1000));

        assert_eq!(FilterDescriptor::from(&filter), desc);
    }

    #[test]
    fn test_descriptor_rejects_unknown_kind() {
        let desc = FilterDescriptor {
            kind: 7,
            ..FilterDescriptor::default()
        };
        assert!(matches!(
            Filter::try_from(desc),
            Err(EngineError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_mode_bytes_round_trip() {
        for mode in [EncryptionMode::None, EncryptionMode::Xor, EncryptionMode::Rc4] {
            assert_eq!(EncryptionMode::from_byte(mode.as_byte()), Some(mode));
        }
        assert_eq!(CompressionMode::from_byte(1), Some(CompressionMode::Rle));
        assert_eq!(CompressionMode::from_byte(9), None);
        assert_eq!(EncryptionMode::from_str("RC4"), Some(EncryptionMode::Rc4));
        assert_eq!(CompressionMode::from_str("zip"), None);
    }
}
