//! Per-block compression.
//!
//! Data blocks record the codec they were written with and their raw length,
//! so decompression never has to guess. Compression effort ranges from -1
//! (store raw) to 9; a block that does not shrink is stored raw.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Stored-raw compression level.
pub const NO_COMPRESSION: i32 = -1;

/// Codec tag persisted with every data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Codec {
    Raw = 0,
    Zlib = 1,
}

impl Codec {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Zlib),
            other => Err(Error::corrupt(format!("unknown block codec {}", other))),
        }
    }
}

/// Clamp a requested level into `-1..=9`.
#[inline]
pub fn clamp_level(level: i32) -> i32 {
    level.clamp(NO_COMPRESSION, 9)
}

/// Encode a block. Returns the codec used and the payload bytes.
pub fn compress(data: &[u8], level: i32) -> Result<(Codec, Vec<u8>)> {
    let level = clamp_level(level);
    if level < 0 || data.is_empty() {
        return Ok((Codec::Raw, data.to_vec()));
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level as u32));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if compressed.len() >= data.len() {
        return Ok((Codec::Raw, data.to_vec()));
    }
    Ok((Codec::Zlib, compressed))
}

/// Decode a block back into exactly `raw_len` bytes.
pub fn decompress(codec: Codec, payload: &[u8], raw_len: u64) -> Result<Vec<u8>> {
    let raw = match codec {
        Codec::Raw => payload.to_vec(),
        Codec::Zlib => {
            let mut out = Vec::with_capacity(raw_len.min(payload.len() as u64 * 64) as usize);
            ZlibDecoder::new(payload)
                .take(raw_len.saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| Error::corrupt(format!("zlib block: {}", e)))?;
            out
        }
    };
    if raw.len() as u64 != raw_len {
        return Err(Error::corrupt(format!(
            "block decodes to {} bytes, header says {}",
            raw.len(),
            raw_len
        )));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ErrorKind;

    #[test]
    fn test_compress_decompress() {
        let original = b"frame data that repeats nicely. ".repeat(100);
        let (codec, payload) = compress(&original, 6).unwrap();
        assert_eq!(codec, Codec::Zlib);
        assert!(payload.len() < original.len());
        assert_eq!(decompress(codec, &payload, original.len() as u64).unwrap(), original);
    }

    #[test]
    fn test_raw_level() {
        let original = b"frame data that repeats nicely. ".repeat(10);
        let (codec, payload) = compress(&original, NO_COMPRESSION).unwrap();
        assert_eq!(codec, Codec::Raw);
        assert_eq!(payload, original);
    }

    #[test]
    fn test_falls_back_when_not_smaller() {
        let (codec, payload) = compress(b"Hi", 9).unwrap();
        assert_eq!(codec, Codec::Raw);
        assert_eq!(payload, b"Hi");
    }

    #[test]
    fn test_levels_clamped() {
        assert_eq!(clamp_level(-7), -1);
        assert_eq!(clamp_level(42), 9);
        let data = vec![7u8; 4096];
        let (codec, payload) = compress(&data, 42).unwrap();
        assert_eq!(codec, Codec::Zlib);
        assert_eq!(decompress(codec, &payload, 4096).unwrap(), data);
    }

    #[test]
    fn test_corrupt_payloads() {
        let data = vec![7u8; 4096];
        let (codec, payload) = compress(&data, 6).unwrap();

        let err = decompress(codec, &payload, 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);

        let err = decompress(Codec::Zlib, b"not zlib at all", 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);

        assert_eq!(Codec::from_u8(5).unwrap_err().kind(), ErrorKind::CorruptContainer);
    }
}
