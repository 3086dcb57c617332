//! Plain-mode backup, restore and verify.
//!
//! A plain backup is a verbatim copy of the source tree plus a manifest file
//! in the backup root listing a digest and size for every copied file.
//!
//! Manifest format:
//!
//! ```text
//! ; Checksum file generated by MiniBackup
//! ; Algorithm: crc32
//! ; Backup-Id: 1b4e28ba-2fa1-11d2-883f-0016d3cca427
//! ; Created: 2025-01-01T00:00:00+00:00
//!
//! <hex digest> <size> <relative path>
//! ```
//!
//! Backslashes, newlines and carriage returns in paths are written as `\\`,
//! `\n` and `\r` so every record stays on one line.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{Entry, EntryKind};
use crate::progress::{Operation, ProgressCallback};
use crate::verify::{Mismatch, MismatchReason, RestoreOutcome, RestoreProtocol, VerifyReport};

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub relative_path: String,
    pub size: u64,
    pub checksum: ChecksumValue,
}

/// Digests of every file captured by a plain backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub algorithm: ChecksumAlgorithm,
    pub backup_id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub records: Vec<ManifestRecord>,
}

impl Manifest {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Manifest {
            algorithm,
            backup_id: Some(Uuid::new_v4()),
            created_at: Some(Utc::now()),
            records: Vec::new(),
        }
    }

    /// Render as the on-disk text format.
    pub fn render(&self) -> String {
        let mut result = String::new();

        result.push_str("; Checksum file generated by MiniBackup\n");
        result.push_str(&format!("; Algorithm: {}\n", self.algorithm));
        if let Some(id) = self.backup_id {
            result.push_str(&format!("; Backup-Id: {}\n", id));
        }
        if let Some(created) = self.created_at {
            result.push_str(&format!("; Created: {}\n", created.to_rfc3339()));
        }
        result.push('\n');

        for record in &self.records {
            result.push_str(&format!(
                "{} {} {}\n",
                record.checksum.hex(),
                record.size,
                escape_path(&record.relative_path)
            ));
        }

        result
    }

    /// Parse the text format; `source` names the file in errors.
    pub fn parse(content: &str, source: &Path) -> Result<Self, EngineError> {
        let mut algorithm = None;
        let mut backup_id = None;
        let mut created_at = None;
        let mut records = Vec::new();

        for (number, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix(';') {
                let comment = comment.trim();
                if let Some(value) = comment.strip_prefix("Algorithm:") {
                    let value = value.trim();
                    algorithm = Some(ChecksumAlgorithm::from_str(value).ok_or_else(|| {
                        EngineError::format(source, format!("unknown manifest algorithm '{}'", value))
                    })?);
                } else if let Some(value) = comment.strip_prefix("Backup-Id:") {
                    backup_id = Uuid::parse_str(value.trim()).ok();
                } else if let Some(value) = comment.strip_prefix("Created:") {
                    created_at = DateTime::parse_from_rfc3339(value.trim())
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                }
                continue;
            }

            let algorithm = algorithm.ok_or_else(|| {
                EngineError::format(source, "manifest records appear before the Algorithm header")
            })?;

            let malformed = || EngineError::format(source, format!("malformed manifest line {}", number + 1));
            let mut parts = line.splitn(3, ' ');
            let (hex, size, path) = match (parts.next(), parts.next(), parts.next()) {
                (Some(hex), Some(size), Some(path)) if !path.is_empty() => (hex, size, path),
                _ => return Err(malformed()),
            };
            let size = size.parse::<u64>().map_err(|_| malformed())?;
            let path = unescape_path(path).ok_or_else(malformed)?;

            records.push(ManifestRecord {
                relative_path: path,
                size,
                checksum: ChecksumValue::new(algorithm, hex.to_lowercase()),
            });
        }

        Ok(Manifest {
            algorithm: algorithm.ok_or_else(|| EngineError::format(source, "missing Algorithm header"))?,
            backup_id,
            created_at,
            records,
        })
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::ManifestNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&content, path)
    }
}

fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of `escape_path`; None on an unknown or dangling escape.
fn unescape_path(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

/// Totals for a completed plain backup or restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

fn manifest_path(root: &Path, config: &EngineConfig) -> PathBuf {
    root.join(&config.manifest_name)
}

/// Copy the selected `entries` under `dest`, returning per-file sizes.
fn copy_entries(
    entries: &[Entry],
    dest: &Path,
    operation: Operation,
    config: &EngineConfig,
    progress: Option<&dyn ProgressCallback>,
    mut on_file: impl FnMut(&Entry, u64) -> Result<(), EngineError>,
) -> Result<CopySummary, EngineError> {
    let mut summary = CopySummary::default();

    if let Some(callback) = progress {
        callback.on_started(operation, entries.len());
    }

    for (index, entry) in entries.iter().enumerate() {
        if let Some(callback) = progress {
            callback.on_entry_started(operation, index, &entry.relative_path);
        }

        let target = fs_ops::resolve_relative(dest, &entry.relative_path)?;
        let bytes = match entry.kind {
            EntryKind::Directory => {
                fs_ops::create_dir_all(&target)?;
                summary.directories += 1;
                0
            }
            EntryKind::File => {
                let bytes = fs_ops::copy_file_with_metadata(&entry.absolute_path, &target, config.preserve_mtime)?;
                on_file(entry, bytes)?;
                summary.files += 1;
                summary.bytes += bytes;
                bytes
            }
        };

        debug!(path = %entry.relative_path, bytes, %operation, "copied entry");
        if let Some(callback) = progress {
            callback.on_entry_completed(operation, index, &entry.relative_path, bytes);
        }
    }

    if let Some(callback) = progress {
        callback.on_completed(operation, summary.files + summary.directories, summary.bytes);
    }
    Ok(summary)
}

/// Entries of `root` except a root-level manifest file.
fn entries_without_manifest(root: &Path, config: &EngineConfig) -> Result<Vec<Entry>, EngineError> {
    Ok(fs_ops::enumerate_entries(root)?
        .into_iter()
        .filter(|e| !(e.kind == EntryKind::File && e.relative_path == config.manifest_name))
        .collect())
}

/// Make an existing `dest` ready to receive a fresh backup of `entries`.
///
/// A destination holding an earlier backup is brought in line by removing
/// whatever the new backup will not contain. Any other non-empty
/// destination is refused.
fn prepare_destination(dest: &Path, entries: &[Entry], config: &EngineConfig) -> Result<(), EngineError> {
    if !dest.exists() {
        return Ok(());
    }

    if !manifest_path(dest, config).is_file() {
        let mut children = fs::read_dir(dest).map_err(|e| EngineError::EnumerationFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
        if children.next().is_some() {
            return Err(EngineError::InvalidPath {
                path: dest.to_path_buf(),
                reason: "destination is not empty and holds no backup".to_string(),
            });
        }
        return Ok(());
    }

    let keep: HashMap<&str, EntryKind> = entries
        .iter()
        .map(|e| (e.relative_path.as_str(), e.kind))
        .collect();

    // Children come after their parents, so walk backwards.
    for stale in entries_without_manifest(dest, config)?.iter().rev() {
        if keep.get(stale.relative_path.as_str()) == Some(&stale.kind) {
            continue;
        }
        let removed = match stale.kind {
            EntryKind::Directory => fs::remove_dir_all(&stale.absolute_path),
            EntryKind::File => fs::remove_file(&stale.absolute_path),
        };
        match removed {
            Ok(()) => debug!(path = %stale.relative_path, "removed stale backup entry"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(EngineError::WriteError {
                    path: stale.absolute_path.clone(),
                    source: e,
                })
            }
        }
    }
    Ok(())
}

/// Copy `source` into `dest` byte for byte and write a manifest there.
///
/// A single-file source is copied to `dest/<file name>`. `dest` must be
/// missing, empty, or an earlier backup, which is replaced.
///
/// # Errors
/// Returns `InvalidPath` when `source` and `dest` overlap or `dest` holds
/// unrelated files.
pub fn backup(
    source: &Path,
    dest: &Path,
    config: &EngineConfig,
    progress: Option<&dyn ProgressCallback>,
) -> Result<CopySummary, EngineError> {
    let entries = entries_without_manifest(source, config)?;
    fs_ops::ensure_disjoint(source, dest)?;
    prepare_destination(dest, &entries, config)?;
    fs_ops::create_dir_all(dest)?;

    let mut manifest = Manifest::new(config.manifest_algorithm);
    let summary = copy_entries(&entries, dest, Operation::Backup, config, progress, |entry, bytes| {
        // Digest the original, not the copy.
        let checksum = compute_file_checksum(&entry.absolute_path, config.manifest_algorithm)?;
        manifest.records.push(ManifestRecord {
            relative_path: entry.relative_path.clone(),
            size: bytes,
            checksum,
        });
        Ok(())
    })?;

    let path = manifest_path(dest, config);
    fs::write(&path, manifest.render()).map_err(|e| EngineError::WriteError {
        path: path.clone(),
        source: e,
    })?;

    info!(
        source = %source.display(),
        dest = %dest.display(),
        files = summary.files,
        bytes = summary.bytes,
        algorithm = %config.manifest_algorithm,
        "plain backup written"
    );
    Ok(summary)
}

/// Check a plain backup rooted at `backup_root` against its manifest.
///
/// # Errors
/// Returns `ManifestNotFound` when the backup has no manifest, or a
/// `Format` error when the manifest cannot be parsed.
pub fn verify(
    backup_root: &Path,
    config: &EngineConfig,
    progress: Option<&dyn ProgressCallback>,
) -> Result<VerifyReport, EngineError> {
    let manifest = Manifest::load(&manifest_path(backup_root, config))?;
    let mut report = VerifyReport::default();

    if let Some(callback) = progress {
        callback.on_started(Operation::Verify, manifest.records.len());
    }

    for (index, record) in manifest.records.iter().enumerate() {
        if let Some(callback) = progress {
            callback.on_entry_started(Operation::Verify, index, &record.relative_path);
        }
        report.checked += 1;

        let target = fs_ops::resolve_relative(backup_root, &record.relative_path)?;
        match fs::metadata(&target) {
            Ok(meta) if meta.is_file() => {
                if meta.len() != record.size {
                    report.flag(record.relative_path.as_str(), MismatchReason::SizeMismatch);
                } else {
                    match compute_file_checksum(&target, manifest.algorithm) {
                        Ok(actual) if actual.hex() != record.checksum.hex() => {
                            report.flag(record.relative_path.as_str(), MismatchReason::ChecksumMismatch)
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(path = %record.relative_path, error = %e, "could not digest file");
                            report.flag(record.relative_path.as_str(), MismatchReason::UnreadableFile);
                        }
                    }
                }
            }
            _ => report.flag(record.relative_path.as_str(), MismatchReason::MissingFile),
        }

        if let Some(callback) = progress {
            callback.on_entry_completed(Operation::Verify, index, &record.relative_path, record.size);
        }
    }

    let known: HashSet<&str> = manifest
        .records
        .iter()
        .map(|r| r.relative_path.as_str())
        .collect();
    for entry in entries_without_manifest(backup_root, config)? {
        if entry.kind == EntryKind::File && !known.contains(entry.relative_path.as_str()) {
            report.flag(entry.relative_path.as_str(), MismatchReason::UnexpectedFile);
        }
    }

    info!(
        backup = %backup_root.display(),
        checked = report.checked,
        issues = report.mismatches.len(),
        "plain backup verified"
    );
    if let Some(callback) = progress {
        callback.on_completed(Operation::Verify, report.checked, 0);
    }
    Ok(report)
}

/// Copy a plain backup at `source` back to `dest`, leaving out the manifest.
///
/// This does not verify; callers are expected to run [`verify`] first, or
/// use [`restore_verified`].
pub fn restore(
    source: &Path,
    dest: &Path,
    config: &EngineConfig,
    progress: Option<&dyn ProgressCallback>,
) -> Result<CopySummary, EngineError> {
    if !manifest_path(source, config).exists() {
        warn!(source = %source.display(), "restoring from a directory without a manifest");
    }
    let entries = entries_without_manifest(source, config)?;
    fs_ops::ensure_disjoint(source, dest)?;
    fs_ops::create_dir_all(dest)?;

    let summary = copy_entries(&entries, dest, Operation::Restore, config, progress, |_, _| Ok(()))?;

    info!(
        source = %source.display(),
        dest = %dest.display(),
        files = summary.files,
        bytes = summary.bytes,
        "plain restore complete"
    );
    Ok(summary)
}

/// Verify-then-restore for plain backups.
///
/// `decide` is only consulted when verification finds issues; returning
/// false cancels the restore before anything is written.
pub fn restore_verified<F>(
    source: &Path,
    dest: &Path,
    config: &EngineConfig,
    decide: F,
) -> Result<RestoreOutcome, EngineError>
where
    F: FnOnce(&[Mismatch]) -> bool,
{
    let protocol = RestoreProtocol::verify(|| verify(source, config, None))?;
    let proceed = protocol.issues().is_empty() || decide(protocol.issues());
    protocol.resolve(proceed, || restore(source, dest, config, None).map(|_| ()))
}
