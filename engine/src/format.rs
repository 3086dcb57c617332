//! Archive wire format.
//!
//! All integers are little-endian.
//!
//! ```text
//! header : magic "MBKP" | version u8 | compression u8 | encryption u8
//!          | reserved u8 | entry_count u32
//! record : path_len u32 | path (UTF-8, '/'-separated) | kind u8
//!          | modified_time i64 | original_size u64 | stored_size u64
//!          | checksum u32 | content_checksum u32 | payload[stored_size]
//! ```
//!
//! `checksum` covers the payload exactly as stored (after compression and
//! encryption); `content_checksum` covers the original plaintext.

use std::io::{self, Read, Write};
use std::path::Path;
use crate::error::EngineError;
use crate::model::{CompressionMode, EncryptionMode, EntryKind};

pub const MAGIC: [u8; 4] = *b"MBKP";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 12;

/// Upper bound on a stored relative path.
pub const MAX_PATH_LEN: u32 = 64 * 1024;

/// Global archive settings written once at the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub compression: CompressionMode,
    pub encryption: EncryptionMode,
    pub entry_count: u32,
}

/// One archived object: metadata plus its processed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub relative_path: String,
    pub kind: EntryKind,
    pub modified_time: i64,
    pub original_size: u64,
    pub checksum: u32,
    pub content_checksum: u32,
    pub payload: Vec<u8>,
}

impl EntryRecord {
    /// Size of the payload as written to disk.
    pub fn stored_size(&self) -> u64 {
        self.payload.len() as u64
    }
}

impl ArchiveHeader {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut buf = [0u8; HEADER_LEN];
        buf[..4].copy_from_slice(&MAGIC);
        buf[4] = VERSION;
        buf[5] = self.compression.as_byte();
        buf[6] = self.encryption.as_byte();
        buf[8..12].copy_from_slice(&self.entry_count.to_le_bytes());
        out.write_all(&buf)
    }

    /// Parse a header; `archive` names the file in errors.
    pub fn read_from<R: Read>(input: &mut R, archive: &Path) -> Result<Self, EngineError> {
        let mut buf = [0u8; HEADER_LEN];
        read_exact(input, &mut buf, archive, "header")?;

        if buf[..4] != MAGIC {
            return Err(EngineError::format(archive, "not an archive (bad magic)"));
        }
        if buf[4] != VERSION {
            return Err(EngineError::format(
                archive,
                format!("unsupported format version {}", buf[4]),
            ));
        }
        let compression = CompressionMode::from_byte(buf[5]).ok_or_else(|| {
            EngineError::format(archive, format!("unknown compression mode {}", buf[5]))
        })?;
        let encryption = EncryptionMode::from_byte(buf[6]).ok_or_else(|| {
            EngineError::format(archive, format!("unknown encryption mode {}", buf[6]))
        })?;

        Ok(ArchiveHeader {
            compression,
            encryption,
            entry_count: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

impl EntryRecord {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let path = self.relative_path.as_bytes();
        out.write_all(&(path.len() as u32).to_le_bytes())?;
        out.write_all(path)?;
        out.write_all(&[self.kind.as_byte()])?;
        out.write_all(&self.modified_time.to_le_bytes())?;
        out.write_all(&self.original_size.to_le_bytes())?;
        out.write_all(&self.stored_size().to_le_bytes())?;
        out.write_all(&self.checksum.to_le_bytes())?;
        out.write_all(&self.content_checksum.to_le_bytes())?;
        out.write_all(&self.payload)
    }

    /// Parse one record. `remaining` is the number of unread bytes in the
    /// archive and bounds the payload allocation.
    pub fn read_from<R: Read>(
        input: &mut R,
        archive: &Path,
        remaining: u64,
    ) -> Result<Self, EngineError> {
        let path_len = u32::from_le_bytes(read_array(input, archive, "path length")?);
        if path_len == 0 || path_len > MAX_PATH_LEN {
            return Err(EngineError::format(
                archive,
                format!("invalid path length {}", path_len),
            ));
        }

        let mut path = vec![0u8; path_len as usize];
        read_exact(input, &mut path, archive, "path")?;
        let relative_path = String::from_utf8(path)
            .map_err(|_| EngineError::format(archive, "entry path is not valid UTF-8"))?;

        let [kind_byte] = read_array::<_, 1>(input, archive, "kind")?;
        let kind = EntryKind::from_byte(kind_byte).ok_or_else(|| {
            EngineError::format(archive, format!("unknown entry kind {}", kind_byte))
        })?;

        let modified_time = i64::from_le_bytes(read_array(input, archive, "modified time")?);
        let original_size = u64::from_le_bytes(read_array(input, archive, "original size")?);
        let stored_size = u64::from_le_bytes(read_array(input, archive, "stored size")?);
        let checksum = u32::from_le_bytes(read_array(input, archive, "checksum")?);
        let content_checksum = u32::from_le_bytes(read_array(input, archive, "content checksum")?);

        let fixed = 4 + u64::from(path_len) + 1 + 8 + 8 + 8 + 4 + 4;
        if stored_size > remaining.saturating_sub(fixed) {
            return Err(EngineError::format(
                archive,
                format!("truncated payload for '{}'", relative_path),
            ));
        }
        if kind == EntryKind::Directory && stored_size != 0 {
            return Err(EngineError::format(
                archive,
                format!("directory '{}' carries a payload", relative_path),
            ));
        }

        let mut payload = vec![0u8; stored_size as usize];
        read_exact(input, &mut payload, archive, "payload")?;

        Ok(EntryRecord {
            relative_path,
            kind,
            modified_time,
            original_size,
            checksum,
            content_checksum,
            payload,
        })
    }
}

fn read_exact<R: Read>(
    input: &mut R,
    buf: &mut [u8],
    archive: &Path,
    what: &str,
) -> Result<(), EngineError> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            EngineError::format(archive, format!("truncated {}", what))
        } else {
            EngineError::ReadError {
                path: archive.to_path_buf(),
                source: e,
            }
        }
    })
}

fn read_array<R: Read, const N: usize>(
    input: &mut R,
    archive: &Path,
    what: &str,
) -> Result<[u8; N], EngineError> {
    let mut buf = [0u8; N];
    read_exact(input, &mut buf, archive, what)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_record() -> EntryRecord {
        EntryRecord {
            relative_path: "docs/a.txt".to_string(),
            kind: EntryKind::File,
            modified_time: 1_700_000_000,
            original_size: 3,
            checksum: 0xdead_beef,
            content_checksum: 0x0bad_f00d,
            payload: b"abc".to_vec(),
        }
    }

    #[test]
    fn test_header_layout() {
        let header = ArchiveHeader {
            compression: CompressionMode::Rle,
            encryption: EncryptionMode::Rc4,
            entry_count: 2,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf).expect("write header");
        assert_eq!(buf, [b'M', b'B', b'K', b'P', 1, 1, 2, 0, 2, 0, 0, 0]);

        let parsed = ArchiveHeader::read_from(&mut Cursor::new(&buf), Path::new("t"))
            .expect("parse header");
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_rejects_bad_magic_and_modes() {
        let archive = Path::new("t");
        let bad_magic = [b'Z', b'I', b'P', b'!', 1, 0, 0, 0, 0, 0, 0, 0];
        assert!(ArchiveHeader::read_from(&mut Cursor::new(&bad_magic), archive).is_err());

        let bad_mode = [b'M', b'B', b'K', b'P', 1, 0, 9, 0, 0, 0, 0, 0];
        assert!(ArchiveHeader::read_from(&mut Cursor::new(&bad_mode), archive).is_err());

        let short = [b'M', b'B'];
        let err = ArchiveHeader::read_from(&mut Cursor::new(&short), archive).unwrap_err();
        assert!(err.to_string().contains("truncated header"));
    }

    #[test]
    fn test_record_parses_what_was_written() {
        let record = sample_record();
        let mut buf = Vec::new();
        record.write_to(&mut buf).expect("write record");

        let parsed = EntryRecord::read_from(&mut Cursor::new(&buf), Path::new("t"), buf.len() as u64)
            .expect("parse record");
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_record_truncated_payload() {
        let mut buf = Vec::new();
        sample_record().write_to(&mut buf).expect("write record");
        buf.pop();

        let result = EntryRecord::read_from(&mut Cursor::new(&buf), Path::new("t"), buf.len() as u64);
        assert!(matches!(result, Err(EngineError::Format { .. })));
    }

    #[test]
    fn test_record_rejects_oversized_path_length() {
        let buf = (MAX_PATH_LEN + 1).to_le_bytes();
        let result = EntryRecord::read_from(&mut Cursor::new(&buf), Path::new("t"), 4);
        assert!(matches!(result, Err(EngineError::Format { .. })));
    }
}
