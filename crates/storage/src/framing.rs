//! Framed file format shared by segment and commit files
//!
//! ```text
//! magic      4B
//! version    u32 LE
//! payload    MessagePack (rmp-serde)
//! crc32      u32 LE    → over magic + version + payload
//! ```
//!
//! Every validation failure is reported as `IndexError::Corruption` so the
//! engine can tell a damaged file apart from an ordinary I/O error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use shadow_core::{IndexError, IndexResult};

/// Magic + version
const HEADER_SIZE: usize = 8;
/// Trailing CRC32
const FOOTER_SIZE: usize = 4;

/// Encode `value` into a framed buffer
pub(crate) fn encode<T: Serialize>(
    magic: &[u8; 4],
    version: u32,
    resource: &str,
    value: &T,
) -> IndexResult<Vec<u8>> {
    let payload = rmp_serde::to_vec(value).map_err(|e| {
        IndexError::InvalidState(format!("failed to encode [{}]: {}", resource, e))
    })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + FOOTER_SIZE);
    buf.extend_from_slice(magic);
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&payload);

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Validate and decode a framed buffer
pub(crate) fn decode<T: DeserializeOwned>(
    magic: &[u8; 4],
    version: u32,
    resource: &str,
    buf: &[u8],
) -> IndexResult<T> {
    if buf.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(IndexError::corruption(
            resource,
            format!("file truncated: {} bytes", buf.len()),
        ));
    }
    if &buf[0..4] != magic {
        return Err(IndexError::corruption(resource, "bad magic"));
    }

    let body_end = buf.len() - FOOTER_SIZE;
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&buf[body_end..]);
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = crc32fast::hash(&buf[..body_end]);
    if stored != computed {
        return Err(IndexError::corruption(
            resource,
            format!(
                "checksum failed (hardware problem?): expected={:#010x} actual={:#010x}",
                stored, computed
            ),
        ));
    }

    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&buf[4..8]);
    let found = u32::from_le_bytes(version_bytes);
    if found != version {
        return Err(IndexError::corruption(
            resource,
            format!("unsupported format version {} (expected {})", found, version),
        ));
    }

    rmp_serde::from_slice(&buf[HEADER_SIZE..body_end])
        .map_err(|e| IndexError::corruption(resource, format!("decode error: {}", e)))
}
