use std::io::{self, Read};
use bincode::Options;
use crate::CachedEntry;
use crate::writer::{codec, HEADER_SIZE, MAX_ENTRY_SIZE, RCSN_MAGIC, RCSN_VERSION};

/// Read and validate the RCSN header
fn read_header<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf)?;

    if header_buf[0..4] != RCSN_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Invalid RCSN magic bytes - not a cache snapshot",
        ));
    }

    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&header_buf[4..8]);
    let version = u32::from_be_bytes(version_bytes);

    if version != RCSN_VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Unsupported RCSN version: {} (expected {})", version, RCSN_VERSION),
        ));
    }

    Ok(())
}

/// Decode a blob produced by [`crate::encode_entry`]
///
/// The blob must hold exactly one entry; missing or trailing bytes are errors.
pub fn decode_entry(blob: &[u8]) -> io::Result<CachedEntry> {
    let mut reader = blob;
    read_header(&mut reader)?;

    if reader.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Snapshot contains no entry",
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_be_bytes(len_bytes);

    if len > MAX_ENTRY_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Entry length {} exceeds limit {}", len, MAX_ENTRY_SIZE),
        ));
    }

    let len = len as usize;
    if reader.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Entry truncated: {} of {} bytes", reader.len(), len),
        ));
    }
    if reader.len() > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} trailing bytes after entry", reader.len() - len),
        ));
    }

    codec().deserialize(reader).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to decode entry: {}", e),
        )
    })
}
