//! Byte-level framing shared by the file backends.
//!
//! File layout:
//! ```text
//! [4 bytes: magic] [4 bytes: format version (big-endian u32)]
//! [data blocks or records ...]
//! [footer: bincode]
//! [8 bytes: footer offset (BE u64)] [4 bytes: CRC32 of footer (BE u32)] [4 bytes: "FEND"]
//! ```
//! A file without a valid trailer was never closed and is rejected.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StorageError, StorageResult};

pub(crate) const FORMAT_VERSION: u32 = 1;
pub(crate) const HEADER_LEN: u64 = 8;
pub(crate) const TRAILER_LEN: u64 = 16;
const TRAILER_MAGIC: &[u8; 4] = b"FEND";

/// Record header size: 4 bytes length + 4 bytes CRC.
const RECORD_HEADER_LEN: u64 = 8;

pub(crate) fn write_header(out: &mut impl Write, magic: &[u8; 4]) -> StorageResult<u64> {
    out.write_all(magic)?;
    out.write_all(&FORMAT_VERSION.to_be_bytes())?;
    Ok(HEADER_LEN)
}

/// Read the first four bytes of a file.
pub(crate) fn sniff_magic(path: &Path) -> StorageResult<[u8; 4]> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).map_err(|_| StorageError::InvalidMagic {
        expected: "a fire event file".into(),
        actual: "a file shorter than 4 bytes".into(),
    })?;
    Ok(magic)
}

pub(crate) fn check_header(file: &mut File, magic: &[u8; 4]) -> StorageResult<()> {
    let mut header = [0u8; HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)
        .map_err(|_| StorageError::InvalidMagic {
            expected: String::from_utf8_lossy(magic).into_owned(),
            actual: "truncated header".into(),
        })?;
    if &header[0..4] != magic {
        return Err(StorageError::InvalidMagic {
            expected: String::from_utf8_lossy(magic).into_owned(),
            actual: String::from_utf8_lossy(&header[0..4]).into_owned(),
        });
    }
    let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(StorageError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Append the footer and trailer; returns the bytes written.
pub(crate) fn write_footer(
    out: &mut impl Write,
    footer_offset: u64,
    footer: &impl Serialize,
) -> StorageResult<u64> {
    let bytes = bincode::serialize(footer)?;
    out.write_all(&bytes)?;
    out.write_all(&footer_offset.to_be_bytes())?;
    out.write_all(&crc32fast::hash(&bytes).to_be_bytes())?;
    out.write_all(TRAILER_MAGIC)?;
    Ok(bytes.len() as u64 + TRAILER_LEN)
}

pub(crate) fn read_footer<T: DeserializeOwned>(file: &mut File, path: &str) -> StorageResult<T> {
    let missing = || StorageError::MissingFooter {
        path: path.to_string(),
    };
    let len = file.metadata()?.len();
    if len < HEADER_LEN + TRAILER_LEN {
        return Err(missing());
    }
    let mut trailer = [0u8; TRAILER_LEN as usize];
    file.seek(SeekFrom::Start(len - TRAILER_LEN))?;
    file.read_exact(&mut trailer)?;
    if &trailer[12..16] != TRAILER_MAGIC {
        return Err(missing());
    }
    let mut offset_bytes = [0u8; 8];
    offset_bytes.copy_from_slice(&trailer[0..8]);
    let offset = u64::from_be_bytes(offset_bytes);
    let crc = u32::from_be_bytes([trailer[8], trailer[9], trailer[10], trailer[11]]);
    let footer_end = len - TRAILER_LEN;
    if offset < HEADER_LEN || offset > footer_end {
        return Err(StorageError::Corrupt {
            offset,
            reason: "footer offset outside the file".into(),
        });
    }
    let mut bytes = vec![0u8; (footer_end - offset) as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut bytes)?;
    if crc32fast::hash(&bytes) != crc {
        return Err(StorageError::ChecksumMismatch { offset });
    }
    Ok(bincode::deserialize(&bytes)?)
}

pub(crate) fn compress(data: &[u8], level: i32) -> StorageResult<Vec<u8>> {
    zstd::encode_all(data, level).map_err(|e| StorageError::CompressionFailed(e.to_string()))
}

pub(crate) fn decompress(data: &[u8]) -> StorageResult<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| StorageError::DecompressionFailed(e.to_string()))
}

/// Read a compressed block at `offset`, verify its CRC and decompress it.
pub(crate) fn read_block(file: &mut File, offset: u64, length: u64, crc: u32) -> StorageResult<Vec<u8>> {
    let mut compressed = vec![0u8; length as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut compressed)?;
    if crc32fast::hash(&compressed) != crc {
        return Err(StorageError::ChecksumMismatch { offset });
    }
    decompress(&compressed)
}

/// Append a `[len][crc][payload]` record; returns the bytes written.
pub(crate) fn write_record(out: &mut impl Write, payload: &[u8]) -> StorageResult<u64> {
    let length = u32::try_from(payload.len()).map_err(|_| StorageError::Corrupt {
        offset: 0,
        reason: format!("record of {} bytes is too large", payload.len()),
    })?;
    out.write_all(&length.to_le_bytes())?;
    out.write_all(&crc32fast::hash(payload).to_le_bytes())?;
    out.write_all(payload)?;
    Ok(RECORD_HEADER_LEN + payload.len() as u64)
}

/// Read the record at `offset` and verify its CRC.
pub(crate) fn read_record(file: &mut File, offset: u64) -> StorageResult<Vec<u8>> {
    let mut header = [0u8; RECORD_HEADER_LEN as usize];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut header)?;
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let mut payload = vec![0u8; length as usize];
    file.read_exact(&mut payload)?;
    if crc32fast::hash(&payload) != crc {
        return Err(StorageError::ChecksumMismatch { offset });
    }
    Ok(payload)
}
