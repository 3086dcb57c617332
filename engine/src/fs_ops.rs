//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating a source file or directory tree into `Entry` values
//! - Copying files with modification-time preservation
//! - Creating directories recursively
//! - Mapping archive-relative paths back onto a destination root

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use crate::model::{Entry, EntryKind};
use crate::error::EngineError;

/// Enumerate `source` into entries.
///
/// A file yields a single entry whose relative path is its file name. A
/// directory yields one entry per object below it (the root itself is not
/// included), parents before children, siblings in name order.
///
/// # Errors
/// Returns EngineError if the source is missing or any directory or
/// metadata read fails.
pub fn enumerate_entries(source: &Path) -> Result<Vec<Entry>, EngineError> {
    let metadata = match fs::metadata(source) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::ReadError {
                path: source.to_path_buf(),
                source: e,
            })
        }
    };

    if !metadata.is_dir() {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::InvalidPath {
                path: source.to_path_buf(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;
        return Ok(vec![entry_from_metadata(source, name.to_string(), &metadata)]);
    }

    let mut entries = Vec::new();

    fn recurse(dir: &Path, rel_prefix: &str, entries: &mut Vec<Entry>) -> Result<(), EngineError> {
        let enumeration_failed = |e| EngineError::EnumerationFailed {
            path: dir.to_path_buf(),
            source: e,
        };

        let mut children = fs::read_dir(dir)
            .map_err(enumeration_failed)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(enumeration_failed)?;
        children.sort_by_key(|c| c.file_name());

        for child in children {
            let path = child.path();
            let file_name = child.file_name();
            let name = file_name.to_str().ok_or_else(|| EngineError::InvalidPath {
                path: path.clone(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;
            let rel = if rel_prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", rel_prefix, name)
            };

            let read_error = |e| EngineError::ReadError {
                path: path.clone(),
                source: e,
            };
            let mut metadata = child.metadata().map_err(read_error)?;

            // Linked files are taken by content; linked directories are not
            // descended into, so a link back to an ancestor cannot loop.
            if metadata.file_type().is_symlink() {
                match fs::metadata(&path) {
                    Ok(target) if target.is_file() => metadata = target,
                    Ok(_) => {
                        debug!(path = %path.display(), "skipping symlinked directory");
                        continue;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping dangling symlink");
                        continue;
                    }
                }
            }

            let entry = entry_from_metadata(&path, rel.clone(), &metadata);
            let is_dir = entry.is_dir();
            entries.push(entry);

            if is_dir {
                recurse(&path, &rel, entries)?;
            }
        }
        Ok(())
    }

    recurse(source, "", &mut entries)?;
    debug!(source = %source.display(), count = entries.len(), "enumerated source tree");
    Ok(entries)
}

fn entry_from_metadata(path: &Path, relative_path: String, metadata: &fs::Metadata) -> Entry {
    let kind = if metadata.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Entry {
        absolute_path: path.to_path_buf(),
        relative_path,
        kind,
        size_bytes: if kind == EntryKind::File { metadata.len() } else { 0 },
        modified_time: metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp())
            .unwrap_or(0),
        owner_id: owner_of(metadata),
    }
}

#[cfg(unix)]
fn owner_of(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.uid())
}

#[cfg(not(unix))]
fn owner_of(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

/// Join an archive-relative, '/'-separated path onto `root`.
///
/// # Errors
/// Rejects empty, absolute and parent-escaping paths.
pub fn resolve_relative(root: &Path, relative: &str) -> Result<PathBuf, EngineError> {
    let rel = Path::new(relative);
    let invalid = |reason: &str| EngineError::InvalidPath {
        path: rel.to_path_buf(),
        reason: reason.to_string(),
    };

    if relative.is_empty() {
        return Err(invalid("empty relative path"));
    }

    let mut out = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(invalid("path escapes the destination root")),
        }
    }
    Ok(out)
}

/// Canonical form of a path that may not exist yet: the longest existing
/// ancestor is canonicalized and the missing tail appended.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, EngineError> {
    let read_error = |e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_err(read_error)?.join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for part in tail.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(read_error(e)),
            },
        }
    }
}

/// Reject a copy whose source and destination overlap.
///
/// Copying a tree into itself truncates files before they are read, and
/// copying into one of its ancestors lets destination cleanup reach the
/// source.
///
/// # Errors
/// Returns `InvalidPath` when either path contains the other.
pub fn ensure_disjoint(source: &Path, dest: &Path) -> Result<(), EngineError> {
    let source_root = canonicalize_lenient(source)?;
    let dest_root = canonicalize_lenient(dest)?;

    if dest_root.starts_with(&source_root) || source_root.starts_with(&dest_root) {
        return Err(EngineError::InvalidPath {
            path: dest.to_path_buf(),
            reason: format!("overlaps the source {}", source.display()),
        });
    }
    Ok(())
}

/// Copy a file from source to destination with metadata preservation.
///
/// # Returns
/// Number of bytes copied
///
/// # Errors
/// Returns EngineError if the copy fails
pub fn copy_file_with_metadata(src: &Path, dst: &Path, preserve_mtime: bool) -> Result<u64, EngineError> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let src_mtime = src_file.metadata().ok().and_then(|m| m.modified().ok());

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let bytes_copied = io::copy(&mut src_file, &mut dst_file).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            }
        } else {
            EngineError::ReadError {
                path: src.to_path_buf(),
                source: e,
            }
        }
    })?;
    drop(dst_file);

    if preserve_mtime {
        if let Some(mtime) = src_mtime {
            let _ = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime));
        }
    }

    Ok(bytes_copied)
}

/// Write `data` to `dst`, creating parent directories first.
pub fn write_file(dst: &Path, data: &[u8]) -> Result<(), EngineError> {
    ensure_parent_dir_exists(dst)?;
    fs::write(dst, data).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })
}

/// Create `path` and any missing parents.
pub fn create_dir_all(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::DirectoryCreationFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Best-effort: apply an epoch-seconds modification time to `path`.
pub fn set_mtime(path: &Path, epoch_seconds: i64) {
    let mtime = filetime::FileTime::from_unix_time(epoch_seconds, 0);
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        debug!(path = %path.display(), error = %e, "could not restore modification time");
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        if parent.as_os_str().is_empty() {
            return Ok(());
        }

        match fs::metadata(parent) {
            Ok(metadata) => {
                if metadata.is_dir() {
                    Ok(())
                } else {
                    Err(EngineError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "Parent path exists but is not a directory",
                        ),
                    })
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => create_dir_all(parent),
            Err(e) => Err(EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            }),
        }
    } else {
        Ok(())
    }
}
