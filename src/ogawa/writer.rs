//! Ogawa container writer.
//!
//! Blocks are appended through a buffered [`OStream`]. The only bytes ever
//! rewritten are the root location and frozen flag in the header, once, when
//! the container is finalized.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::core::compression;
use crate::core::{ContainerWriter, Location};
use crate::util::{Error, Result};

/// Position-tracking output stream.
pub struct OStream<W: Write + Seek> {
    writer: W,
    pos: u64,
}

impl OStream<BufWriter<File>> {
    /// Create (truncating) a file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(BufWriter::with_capacity(2 * 1024 * 1024, file)))
    }
}

impl<W: Write + Seek> OStream<W> {
    /// Wrap a writer positioned at its start.
    pub fn new(writer: W) -> Self {
        Self { writer, pos: 0 }
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.writer.flush()?;
        self.pos = self.writer.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn seek_end(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.pos = self.writer.seek(SeekFrom::End(0))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
    Open,
    Finalized,
    /// A write failed; the container is unusable.
    Failed,
}

/// [`ContainerWriter`] producing an Ogawa container.
pub struct OgawaWriter<W: Write + Seek + Send = BufWriter<File>> {
    stream: OStream<W>,
    state: WriterState,
}

impl OgawaWriter<BufWriter<File>> {
    /// Create a container file, writing its (unfrozen) header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_stream(OStream::create(path)?)
    }
}

impl<W: Write + Seek + Send> OgawaWriter<W> {
    /// Write a container into any seekable sink, e.g. `Cursor<Vec<u8>>`.
    pub fn new(writer: W) -> Result<Self> {
        Self::from_stream(OStream::new(writer))
    }

    fn from_stream(mut stream: OStream<W>) -> Result<Self> {
        stream.write_bytes(OGAWA_MAGIC)?;
        stream.write_u8(NOT_FROZEN_FLAG)?;
        stream.write_u16(CURRENT_VERSION)?;
        stream.write_u64(0)?;
        Ok(Self { stream, state: WriterState::Open })
    }

    /// Recover the sink after finalization.
    pub fn into_inner(self) -> W {
        self.stream.into_inner()
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Finalized => Err(Error::Closed("ogawa container".into())),
            WriterState::Failed => Err(Error::Closed("failed ogawa container".into())),
        }
    }

    /// Mark the container failed when a write errors.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = WriterState::Failed;
        }
        result
    }

    fn write_data_block(&mut self, bytes: &[u8], level: i32) -> Result<Location> {
        let (codec, payload) = compression::compress(bytes, level)?;
        let pos = self.stream.pos();
        self.stream.write_u64(DATA_PREFIX_SIZE + payload.len() as u64)?;
        self.stream.write_u8(codec as u8)?;
        self.stream.write_u64(bytes.len() as u64)?;
        self.stream.write_bytes(&payload)?;
        Ok(Location::data(pos))
    }

    fn write_group_block(&mut self, children: &[Location]) -> Result<Location> {
        let pos = self.stream.pos();
        self.stream.write_u64(children.len() as u64)?;
        for child in children {
            self.stream.write_u64(child.raw())?;
        }
        Ok(Location::group(pos))
    }

    fn write_header_fields(&mut self, root: Location) -> Result<()> {
        // Root first: a crash before the flag leaves an unfrozen container.
        self.stream.seek(ROOT_POS_OFFSET)?;
        self.stream.write_u64(root.raw())?;
        self.stream.seek(FROZEN_OFFSET)?;
        self.stream.write_u8(FROZEN_FLAG)?;
        self.stream.seek_end()?;
        self.stream.flush()
    }
}

impl<W: Write + Seek + Send> ContainerWriter for OgawaWriter<W> {
    fn backend_name(&self) -> &'static str {
        "ogawa"
    }

    fn add_data(&mut self, bytes: &[u8], level: i32) -> Result<Location> {
        self.check_open()?;
        if bytes.is_empty() {
            return Ok(Location::EMPTY_DATA);
        }
        let result = self.write_data_block(bytes, level);
        self.guard(result)
    }

    fn add_group(&mut self, children: &[Location]) -> Result<Location> {
        self.check_open()?;
        if children.is_empty() {
            return Ok(Location::EMPTY_GROUP);
        }
        let result = self.write_group_block(children);
        self.guard(result)
    }

    fn finalize(&mut self, root: Location) -> Result<()> {
        self.check_open()?;
        if !root.is_group() {
            return Err(Error::invalid(format!("root {:?} is not a group", root)));
        }
        let result = self.write_header_fields(root);
        self.guard(result)?;
        self.state = WriterState::Finalized;
        tracing::debug!(bytes = self.stream.pos(), "finalized Ogawa container");
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.state == WriterState::Open
    }

    fn bytes_written(&self) -> u64 {
        self.stream.pos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContainerReader;
    use crate::ogawa::OgawaReader;
    use crate::util::ErrorKind;
    use std::io::Cursor;

    fn finished(build: impl FnOnce(&mut OgawaWriter<Cursor<Vec<u8>>>) -> Location) -> Vec<u8> {
        let mut w = OgawaWriter::new(Cursor::new(Vec::new())).unwrap();
        let root = build(&mut w);
        w.finalize(root).unwrap();
        w.into_inner().into_inner()
    }

    #[test]
    fn test_blocks_roundtrip() -> Result<()> {
        let payload = b"compressible payload ".repeat(64);
        let bytes = finished(|w| {
            let a = w.add_data(b"hello", -1).unwrap();
            let b = w.add_data(&payload, 6).unwrap();
            let empty = w.add_data(&[], 6).unwrap();
            let inner = w.add_group(&[a]).unwrap();
            w.add_group(&[a, b, empty, inner, Location::EMPTY_GROUP]).unwrap()
        });

        let r = OgawaReader::from_bytes(bytes, 2)?;
        let root = r.root();
        assert_eq!(r.num_children(root, 0)?, 5);
        let kids = r.children(root, 1)?;
        assert_eq!(r.read_data(kids[0], 0)?, b"hello");
        assert_eq!(r.read_data(kids[1], 1)?, payload);
        assert_eq!(r.data_size(kids[1], 0)?, payload.len() as u64);
        assert_eq!(kids[2], Location::EMPTY_DATA);
        assert!(r.read_data(kids[2], 0)?.is_empty());
        assert_eq!(r.child(kids[3], 0, 0)?, kids[0]);
        assert_eq!(r.num_children(kids[4], 0)?, 0);
        Ok(())
    }

    #[test]
    fn test_compressed_block_is_smaller() {
        let payload = vec![0u8; 10_000];
        let raw = finished(|w| {
            let d = w.add_data(&payload, -1).unwrap();
            w.add_group(&[d]).unwrap()
        });
        let packed = finished(|w| {
            let d = w.add_data(&payload, 9).unwrap();
            w.add_group(&[d]).unwrap()
        });
        assert!(packed.len() < raw.len() / 10);
    }

    #[test]
    fn test_no_writes_after_finalize() {
        let mut w = OgawaWriter::new(Cursor::new(Vec::new())).unwrap();
        let d = w.add_data(b"x", -1).unwrap();
        let root = w.add_group(&[d]).unwrap();
        w.finalize(root).unwrap();
        assert!(!w.is_valid());
        assert_eq!(w.add_data(b"y", -1).unwrap_err().kind(), ErrorKind::Closed);
        assert_eq!(w.finalize(root).unwrap_err().kind(), ErrorKind::Closed);
    }

    #[test]
    fn test_corrupt_inputs() {
        let good = finished(|w| {
            let d = w.add_data(b"abc", -1).unwrap();
            w.add_group(&[d]).unwrap()
        });

        let mut bad_magic = good.clone();
        bad_magic[0] = b'X';
        let err = OgawaReader::from_bytes(bad_magic, 1).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);

        let mut unfrozen = good.clone();
        unfrozen[FROZEN_OFFSET as usize] = NOT_FROZEN_FLAG;
        let err = OgawaReader::from_bytes(unfrozen, 1).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);

        let err = OgawaReader::from_bytes(good[..10].to_vec(), 1).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);

        // The first block after the header is the data block.
        let mut oversized = good.clone();
        oversized[HEADER_SIZE..HEADER_SIZE + 8].copy_from_slice(&1_000_000u64.to_le_bytes());
        let r = OgawaReader::from_bytes(oversized, 1).unwrap();
        let data = r.child(r.root(), 0, 0).unwrap();
        assert_eq!(r.read_data(data, 0).unwrap_err().kind(), ErrorKind::CorruptContainer);

        let mut bad_group = good.clone();
        let root_pos = r.root().pos() as usize;
        bad_group[root_pos..root_pos + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        let r = OgawaReader::from_bytes(bad_group, 1).unwrap();
        assert_eq!(r.num_children(r.root(), 0).unwrap_err().kind(), ErrorKind::CorruptContainer);
    }

    #[test]
    fn test_cursor_out_of_range() {
        let bytes = finished(|w| {
            let d = w.add_data(b"abc", -1).unwrap();
            w.add_group(&[d]).unwrap()
        });
        let r = OgawaReader::from_bytes(bytes, 2).unwrap();
        let err = r.num_children(r.root(), 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }
}
