use crate::CachedEntry;
use bincode::Options;
use std::io::{self, Write};

// Snapshot format constants
pub const RCSN_MAGIC: [u8; 4] = [0x52, 0x43, 0x53, 0x4E]; // "RCSN"
pub const RCSN_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 32;

/// Largest single entry the codec accepts (64MB)
pub const MAX_ENTRY_SIZE: u32 = 64 * 1024 * 1024;

/// Header written in front of every encoded entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub created_at: u64, // Unix timestamp in milliseconds
    pub reserved: [u8; 16],
}

impl SnapshotHeader {
    pub fn with_timestamp(created_at: u64) -> Self {
        Self {
            magic: RCSN_MAGIC,
            version: RCSN_VERSION,
            created_at,
            reserved: [0; 16],
        }
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_be_bytes())?;
        writer.write_all(&self.created_at.to_be_bytes())?;
        writer.write_all(&self.reserved)
    }
}

pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

/// Milliseconds since the Unix epoch, saturating to 0 if the clock is before it
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Encode one entry as a self-contained blob
///
/// Layout: the 32-byte RCSN header, a big-endian u32 length, then the
/// bincode payload.
pub fn encode_entry(entry: &CachedEntry) -> io::Result<Vec<u8>> {
    let encoded = codec()
        .serialize(entry)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let len = u32::try_from(encoded.len())
        .ok()
        .filter(|len| *len <= MAX_ENTRY_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Entry too large: {} bytes", encoded.len()),
            )
        })?;

    let mut blob = Vec::with_capacity(HEADER_SIZE + 4 + encoded.len());
    SnapshotHeader::with_timestamp(entry.stored_at).write_to(&mut blob)?;
    blob.write_all(&len.to_be_bytes())?;
    blob.write_all(&encoded)?;
    Ok(blob)
}
