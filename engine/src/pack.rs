//! Archive packer.
//!
//! Walks a source file or tree, keeps the entries accepted by the filter and
//! writes them as one archive. Each file payload goes through
//! compression, then encryption, then checksumming.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use crate::checksums::crc32;
use crate::error::EngineError;
use crate::format::{ArchiveHeader, EntryRecord};
use crate::model::{CompressionMode, EncryptionMode, Entry, EntryKind, Filter};
use crate::progress::{Operation, ProgressCallback};
use crate::{cipher, codec, filter, fs_ops};

/// Settings for one pack invocation.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Cipher key; ignored when `encryption` is `None`
    pub password: String,
    pub encryption: EncryptionMode,
    pub compression: CompressionMode,
    /// Entries failing this filter are left out; None keeps everything
    pub filter: Option<Filter>,
}

/// Totals for a completed pack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub files: usize,
    pub directories: usize,
    /// Entries rejected by the filter
    pub skipped: usize,
    pub original_bytes: u64,
    pub stored_bytes: u64,
}

impl PackSummary {
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }
}

/// Pack `source` into a new archive at `dest`.
///
/// The archive is assembled in a temporary file next to `dest` and renamed
/// into place once complete; on failure `dest` is left untouched.
///
/// # Errors
/// Returns EngineError if the source is missing, any selected entry cannot
/// be read, or the destination cannot be written.
pub fn pack(
    source: &Path,
    dest: &Path,
    options: &PackOptions,
    progress: Option<&dyn ProgressCallback>,
) -> Result<PackSummary, EngineError> {
    let entries = fs_ops::enumerate_entries(source)?;
    let total = entries.len();

    let selected: Vec<Entry> = match &options.filter {
        Some(f) => entries.into_iter().filter(|e| filter::matches(e, f)).collect(),
        None => entries,
    };

    let mut summary = PackSummary {
        skipped: total - selected.len(),
        ..PackSummary::default()
    };

    let entry_count = u32::try_from(selected.len()).map_err(|_| EngineError::InvalidPath {
        path: source.to_path_buf(),
        reason: format!("too many entries for one archive ({})", selected.len()),
    })?;

    let write_error = |e| EngineError::WriteError {
        path: dest.to_path_buf(),
        source: e,
    };

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if dest.is_dir() {
        return Err(EngineError::InvalidPath {
            path: dest.to_path_buf(),
            reason: "destination is a directory".to_string(),
        });
    }
    let temp = NamedTempFile::new_in(parent).map_err(write_error)?;
    let mut out = BufWriter::new(temp);

    if let Some(callback) = progress {
        callback.on_started(Operation::Pack, selected.len());
    }

    ArchiveHeader {
        compression: options.compression,
        encryption: options.encryption,
        entry_count,
    }
    .write_to(&mut out)
    .map_err(write_error)?;

    for (index, entry) in selected.iter().enumerate() {
        if let Some(callback) = progress {
            callback.on_entry_started(Operation::Pack, index, &entry.relative_path);
        }

        let record = build_record(entry, options)?;
        record.write_to(&mut out).map_err(write_error)?;

        match entry.kind {
            EntryKind::File => summary.files += 1,
            EntryKind::Directory => summary.directories += 1,
        }
        summary.original_bytes += record.original_size;
        summary.stored_bytes += record.stored_size();

        debug!(
            path = %entry.relative_path,
            original = record.original_size,
            stored = record.stored_size(),
            "packed entry"
        );
        if let Some(callback) = progress {
            callback.on_entry_completed(Operation::Pack, index, &entry.relative_path, record.stored_size());
        }
    }

    out.flush().map_err(write_error)?;
    let temp = out.into_inner().map_err(|e| write_error(e.into_error()))?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(dest).map_err(|e| write_error(e.error))?;

    info!(
        source = %source.display(),
        archive = %dest.display(),
        entries = summary.entries(),
        skipped = summary.skipped,
        original_bytes = summary.original_bytes,
        stored_bytes = summary.stored_bytes,
        "archive written"
    );
    if let Some(callback) = progress {
        callback.on_completed(Operation::Pack, summary.entries(), summary.stored_bytes);
    }

    Ok(summary)
}

/// Read one entry and run its bytes through the pipeline.
fn build_record(entry: &Entry, options: &PackOptions) -> Result<EntryRecord, EngineError> {
    if entry.is_dir() {
        return Ok(EntryRecord {
            relative_path: entry.relative_path.clone(),
            kind: EntryKind::Directory,
            modified_time: entry.modified_time,
            original_size: 0,
            checksum: crc32(&[]),
            content_checksum: crc32(&[]),
            payload: Vec::new(),
        });
    }

    let data = fs::read(&entry.absolute_path).map_err(|e| EngineError::ReadError {
        path: entry.absolute_path.clone(),
        source: e,
    })?;

    let payload = encode_payload(&data, options);

    Ok(EntryRecord {
        relative_path: entry.relative_path.clone(),
        kind: EntryKind::File,
        modified_time: entry.modified_time,
        original_size: data.len() as u64,
        checksum: crc32(&payload),
        content_checksum: crc32(&data),
        payload,
    })
}

/// Compress then encrypt.
pub(crate) fn encode_payload(data: &[u8], options: &PackOptions) -> Vec<u8> {
    let compressed = match options.compression {
        CompressionMode::Rle => codec::encode(data),
        CompressionMode::None => data.to_vec(),
    };
    cipher::transform(&compressed, options.password.as_bytes(), options.encryption)
}
