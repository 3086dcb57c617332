//! Archive reader.
//!
//! Parses an archive, reverses the pack pipeline (decrypt, then decompress)
//! and checks both recorded checksums. Integrity problems are collected in
//! a [`VerifyReport`] instead of aborting, so one bad entry never hides the
//! others.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::checksums::crc32;
use crate::error::EngineError;
use crate::format::{ArchiveHeader, EntryRecord, HEADER_LEN};
use crate::model::{CompressionMode, EncryptionMode, EntryKind};
use crate::progress::{Operation, ProgressCallback};
use crate::verify::{Mismatch, MismatchReason, RestoreOutcome, RestoreProtocol, VerifyReport};
use crate::{cipher, codec, fs_ops};

/// A fully parsed archive.
#[derive(Debug, Clone)]
pub struct Archive {
    pub header: ArchiveHeader,
    pub records: Vec<EntryRecord>,
}

/// Totals for a completed unpack, with any integrity issues found.
#[derive(Debug, Clone, Default)]
pub struct UnpackSummary {
    /// Files and directories created under the destination
    pub written: usize,
    /// Entries that could not be written
    pub failed: usize,
    pub bytes_written: u64,
    pub report: VerifyReport,
}

/// Per-record metadata, readable without the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub path: String,
    pub kind: EntryKind,
    pub modified_time: i64,
    pub original_size: u64,
    pub stored_size: u64,
    pub checksum: String,
}

/// Header modes plus record metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveListing {
    pub compression: CompressionMode,
    pub encryption: EncryptionMode,
    pub entries: Vec<RecordInfo>,
}

/// Parse every record of `path` into memory.
///
/// # Errors
/// Returns a `Format` error for bad magic, unknown modes, truncation,
/// trailing bytes or unsafe entry paths.
pub fn read_archive(path: &Path) -> Result<Archive, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let file_len = file
        .metadata()
        .map_err(|e| EngineError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?
        .len();
    let mut input = BufReader::new(file);

    let header = ArchiveHeader::read_from(&mut input, path)?;
    let mut consumed = HEADER_LEN as u64;

    // Capacity is bounded by what the file could possibly hold.
    let mut records = Vec::with_capacity((header.entry_count as usize).min(4096));
    for _ in 0..header.entry_count {
        let record = EntryRecord::read_from(&mut input, path, file_len - consumed)?;
        fs_ops::resolve_relative(Path::new(""), &record.relative_path).map_err(|_| {
            EngineError::format(path, format!("unsafe entry path '{}'", record.relative_path))
        })?;
        consumed += 4 + record.relative_path.len() as u64 + 1 + 8 + 8 + 8 + 4 + 4 + record.stored_size();
        records.push(record);
    }

    if consumed != file_len {
        return Err(EngineError::format(
            path,
            format!("{} trailing bytes after last entry", file_len - consumed),
        ));
    }

    debug!(archive = %path.display(), entries = records.len(), "archive parsed");
    Ok(Archive { header, records })
}

/// List an archive's contents without decrypting anything.
pub fn inspect_archive(path: &Path) -> Result<ArchiveListing, EngineError> {
    let archive = read_archive(path)?;
    Ok(ArchiveListing {
        compression: archive.header.compression,
        encryption: archive.header.encryption,
        entries: archive
            .records
            .iter()
            .map(|r| RecordInfo {
                path: r.relative_path.clone(),
                kind: r.kind,
                modified_time: r.modified_time,
                original_size: r.original_size,
                stored_size: r.stored_size(),
                checksum: format!("{:08x}", r.checksum),
            })
            .collect(),
    })
}

/// Reverse the pipeline for one file record, flagging problems in `report`.
///
/// Returns the best bytes available: the recovered plaintext, or the
/// decrypted payload when it cannot be decompressed.
fn recover(record: &EntryRecord, header: &ArchiveHeader, password: &[u8], report: &mut VerifyReport) -> Vec<u8> {
    let path = &record.relative_path;

    if crc32(&record.payload) != record.checksum {
        report.flag(path.as_str(), MismatchReason::ChecksumMismatch);
    }

    let decrypted = cipher::transform(&record.payload, password, header.encryption);
    let data = match header.compression {
        CompressionMode::None => decrypted,
        CompressionMode::Rle => match codec::decode(&decrypted) {
            Ok(data) => data,
            Err(e) => {
                debug!(path = %path, error = %e, "payload did not decode");
                report.flag(path.as_str(), MismatchReason::UndecodablePayload);
                return decrypted;
            }
        },
    };

    if data.len() as u64 != record.original_size {
        report.flag(path.as_str(), MismatchReason::SizeMismatch);
    }
    if crc32(&data) != record.content_checksum {
        report.flag(path.as_str(), MismatchReason::ChecksumMismatch);
    }

    data
}

/// Check every record of an archive without writing anything.
pub fn verify_archive(
    archive_path: &Path,
    password: &str,
    progress: Option<&dyn ProgressCallback>,
) -> Result<VerifyReport, EngineError> {
    let archive = read_archive(archive_path)?;
    let mut report = VerifyReport::default();

    if let Some(callback) = progress {
        callback.on_started(Operation::VerifyArchive, archive.records.len());
    }

    for (index, record) in archive.records.iter().enumerate() {
        if let Some(callback) = progress {
            callback.on_entry_started(Operation::VerifyArchive, index, &record.relative_path);
        }
        report.checked += 1;
        let bytes = match record.kind {
            EntryKind::File => recover(record, &archive.header, password.as_bytes(), &mut report).len() as u64,
            EntryKind::Directory => 0,
        };
        if let Some(callback) = progress {
            callback.on_entry_completed(Operation::VerifyArchive, index, &record.relative_path, bytes);
        }
    }

    info!(
        archive = %archive_path.display(),
        checked = report.checked,
        issues = report.mismatches.len(),
        "archive verified"
    );
    if let Some(callback) = progress {
        callback.on_completed(Operation::VerifyArchive, report.checked, 0);
    }
    Ok(report)
}

/// Unpack `archive_path` under `dest_root`.
///
/// Directories are created before any file is written. Entries that fail
/// verification are still written; the returned summary lists them.
///
/// # Errors
/// Returns EngineError if the archive cannot be parsed, or if it has
/// entries and none of them could be written.
pub fn unpack(
    archive_path: &Path,
    dest_root: &Path,
    password: &str,
    preserve_mtime: bool,
    progress: Option<&dyn ProgressCallback>,
) -> Result<UnpackSummary, EngineError> {
    let archive = read_archive(archive_path)?;
    let mut summary = UnpackSummary::default();
    let mut last_error = None;

    fs_ops::create_dir_all(dest_root)?;

    if let Some(callback) = progress {
        callback.on_started(Operation::Unpack, archive.records.len());
    }

    let (dirs, files): (Vec<(usize, &EntryRecord)>, Vec<(usize, &EntryRecord)>) = archive
        .records
        .iter()
        .enumerate()
        .partition(|(_, r)| r.kind == EntryKind::Directory);

    for &(index, record) in &dirs {
        if let Some(callback) = progress {
            callback.on_entry_started(Operation::Unpack, index, &record.relative_path);
        }
        summary.report.checked += 1;
        let result = fs_ops::resolve_relative(dest_root, &record.relative_path)
            .and_then(|target| fs_ops::create_dir_all(&target));
        match result {
            Ok(()) => summary.written += 1,
            Err(e) => {
                warn!(path = %record.relative_path, error = %e, "could not create directory");
                summary.failed += 1;
                last_error = Some(e);
            }
        }
        if let Some(callback) = progress {
            callback.on_entry_completed(Operation::Unpack, index, &record.relative_path, 0);
        }
    }

    for &(index, record) in &files {
        if let Some(callback) = progress {
            callback.on_entry_started(Operation::Unpack, index, &record.relative_path);
        }
        summary.report.checked += 1;
        let data = recover(record, &archive.header, password.as_bytes(), &mut summary.report);

        let result = fs_ops::resolve_relative(dest_root, &record.relative_path).and_then(|target| {
            fs_ops::write_file(&target, &data)?;
            if preserve_mtime {
                fs_ops::set_mtime(&target, record.modified_time);
            }
            Ok(())
        });
        match result {
            Ok(()) => {
                summary.written += 1;
                summary.bytes_written += data.len() as u64;
            }
            Err(e) => {
                warn!(path = %record.relative_path, error = %e, "could not write file");
                summary.failed += 1;
                last_error = Some(e);
            }
        }
        if let Some(callback) = progress {
            callback.on_entry_completed(Operation::Unpack, index, &record.relative_path, data.len() as u64);
        }
    }

    // Directory mtimes change as children are written, so apply them last.
    if preserve_mtime {
        for &(_, record) in dirs.iter().rev() {
            if let Ok(target) = fs_ops::resolve_relative(dest_root, &record.relative_path) {
                fs_ops::set_mtime(&target, record.modified_time);
            }
        }
    }

    if summary.written == 0 {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    info!(
        archive = %archive_path.display(),
        dest = %dest_root.display(),
        written = summary.written,
        failed = summary.failed,
        issues = summary.report.mismatches.len(),
        "archive unpacked"
    );
    if let Some(callback) = progress {
        callback.on_completed(Operation::Unpack, summary.written, summary.bytes_written);
    }

    Ok(summary)
}

/// Verify-then-restore for archives.
///
/// `decide` is only consulted when verification finds issues; returning
/// false cancels the restore before anything is written.
pub fn restore_archive<F>(
    archive_path: &Path,
    dest_root: &Path,
    password: &str,
    preserve_mtime: bool,
    decide: F,
) -> Result<RestoreOutcome, EngineError>
where
    F: FnOnce(&[Mismatch]) -> bool,
{
    let protocol = RestoreProtocol::verify(|| verify_archive(archive_path, password, None))?;
    let proceed = protocol.issues().is_empty() || decide(protocol.issues());
    protocol.resolve(proceed, || {
        unpack(archive_path, dest_root, password, preserve_mtime, None).map(|_| ())
    })
}
