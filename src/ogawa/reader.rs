//! Ogawa container reader.
//!
//! [`IStreams`] owns the bytes (memory map, in-memory buffer or one file
//! handle per cursor) and [`OgawaReader`] decodes blocks on top of it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
#[cfg(feature = "mmap")]
use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::core::compression::{self, Codec};
use crate::core::{ContainerReader, Location};
use crate::util::{Error, Result};

/// Random-access byte source with independent read cursors.
pub struct IStreams {
    inner: StreamsInner,
    num_cursors: usize,
    size: u64,
}

enum StreamsInner {
    #[cfg(feature = "mmap")]
    Mmap(Mmap),
    Bytes(Vec<u8>),
    /// One handle per cursor; a cursor's seek position is its own.
    Files(Vec<Mutex<File>>),
}

impl IStreams {
    /// Open a file with `num_cursors` cursors.
    ///
    /// With `use_mmap` the file is mapped once and cursors share the
    /// read-only mapping; otherwise every cursor opens its own handle.
    pub fn open(path: impl AsRef<Path>, num_cursors: usize, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let num_cursors = num_cursors.max(1);
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        #[cfg(feature = "mmap")]
        if use_mmap {
            // Safety: the mapping is read-only and containers are never
            // modified after they are frozen.
            let mmap = unsafe { Mmap::map(&file) }?;
            return Ok(Self { inner: StreamsInner::Mmap(mmap), num_cursors, size });
        }
        #[cfg(not(feature = "mmap"))]
        let _ = use_mmap;

        let mut files = Vec::with_capacity(num_cursors);
        files.push(Mutex::new(file));
        for _ in 1..num_cursors {
            files.push(Mutex::new(File::open(path)?));
        }
        Ok(Self { inner: StreamsInner::Files(files), num_cursors, size })
    }

    /// Wrap an in-memory container image.
    pub fn from_bytes(bytes: Vec<u8>, num_cursors: usize) -> Self {
        let size = bytes.len() as u64;
        Self { inner: StreamsInner::Bytes(bytes), num_cursors: num_cursors.max(1), size }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn num_cursors(&self) -> usize {
        self.num_cursors
    }

    pub fn mode_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(feature = "mmap")]
            StreamsInner::Mmap(_) => "mmap",
            StreamsInner::Bytes(_) => "memory",
            StreamsInner::Files(_) => "file",
        }
    }

    /// Fill `buf` from `pos` through `cursor`.
    ///
    /// Reads past the end of the container fail `CorruptContainer`, since
    /// every position comes from the container itself.
    pub fn read_into(&self, pos: u64, buf: &mut [u8], cursor: usize) -> Result<()> {
        if cursor >= self.num_cursors {
            return Err(Error::out_of_range(cursor, self.num_cursors));
        }
        let end = pos
            .checked_add(buf.len() as u64)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "read of {} bytes at {} past end of container ({} bytes)",
                    buf.len(),
                    pos,
                    self.size
                ))
            })?;

        match &self.inner {
            #[cfg(feature = "mmap")]
            StreamsInner::Mmap(mmap) => buf.copy_from_slice(&mmap[pos as usize..end as usize]),
            StreamsInner::Bytes(bytes) => buf.copy_from_slice(&bytes[pos as usize..end as usize]),
            StreamsInner::Files(files) => {
                let mut f = files[cursor].lock();
                f.seek(SeekFrom::Start(pos))?;
                f.read_exact(buf)?;
            }
        }
        Ok(())
    }

    pub fn read_vec(&self, pos: u64, len: u64, cursor: usize) -> Result<Vec<u8>> {
        if pos.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(Error::corrupt(format!(
                "block of {} bytes at {} runs past end of container",
                len, pos
            )));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_into(pos, &mut buf, cursor)?;
        Ok(buf)
    }

    pub fn read_u64(&self, pos: u64, cursor: usize) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf, cursor)?;
        Ok(LittleEndian::read_u64(&buf))
    }
}

/// Validated header fields.
#[derive(Clone, Copy, Debug)]
pub struct OgawaHeader {
    pub version: u16,
    pub frozen: bool,
    pub root: Location,
}

impl OgawaHeader {
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if &bytes[..OGAWA_MAGIC.len()] != OGAWA_MAGIC {
            return Err(Error::corrupt("missing Ogawa magic"));
        }
        let version = LittleEndian::read_u16(&bytes[VERSION_OFFSET as usize..]);
        let frozen = bytes[FROZEN_OFFSET as usize] == FROZEN_FLAG;
        let root = Location::from_raw(LittleEndian::read_u64(&bytes[ROOT_POS_OFFSET as usize..]));
        Ok(Self { version, frozen, root })
    }
}

/// [`ContainerReader`] over an Ogawa container.
pub struct OgawaReader {
    streams: IStreams,
    header: OgawaHeader,
}

impl OgawaReader {
    /// Open a file with memory mapping and `num_cursors` cursors.
    pub fn open(path: impl AsRef<Path>, num_cursors: usize) -> Result<Self> {
        Self::from_streams(IStreams::open(path, num_cursors, true)?)
    }

    pub fn open_with(path: impl AsRef<Path>, num_cursors: usize, use_mmap: bool) -> Result<Self> {
        Self::from_streams(IStreams::open(path, num_cursors, use_mmap)?)
    }

    pub fn from_bytes(bytes: Vec<u8>, num_cursors: usize) -> Result<Self> {
        Self::from_streams(IStreams::from_bytes(bytes, num_cursors))
    }

    /// Validate the header and root location.
    pub fn from_streams(streams: IStreams) -> Result<Self> {
        if streams.size() < HEADER_SIZE as u64 {
            return Err(Error::corrupt(format!(
                "container is {} bytes, shorter than its header",
                streams.size()
            )));
        }
        let mut bytes = [0u8; HEADER_SIZE];
        streams.read_into(0, &mut bytes, 0)?;
        let header = OgawaHeader::parse(&bytes)?;

        if header.version != CURRENT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported container version {}",
                header.version
            )));
        }
        if !header.frozen {
            return Err(Error::corrupt("container was never finalized"));
        }
        if !header.root.is_group() || header.root.pos() >= streams.size() {
            return Err(Error::corrupt(format!("invalid root location {:?}", header.root)));
        }

        tracing::debug!(
            mode = streams.mode_name(),
            size = streams.size(),
            cursors = streams.num_cursors(),
            "opened Ogawa container"
        );
        Ok(Self { streams, header })
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.header.version
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        self.streams.size()
    }

    fn check_group(&self, group: Location) -> Result<()> {
        if !group.is_group() {
            return Err(Error::invalid(format!("{:?} is not a group", group)));
        }
        Ok(())
    }

    fn check_child(&self, loc: Location) -> Result<Location> {
        if !loc.is_empty() && (loc.pos() < HEADER_SIZE as u64 || loc.pos() >= self.streams.size()) {
            return Err(Error::corrupt(format!("child location {:?} outside container", loc)));
        }
        Ok(loc)
    }

    /// Read a data block header: (codec, raw_len, payload_len).
    fn data_header(&self, data: Location, cursor: usize) -> Result<(Codec, u64, u64)> {
        let mut buf = [0u8; DATA_HEADER_SIZE];
        self.streams.read_into(data.pos(), &mut buf, cursor)?;
        let size = LittleEndian::read_u64(&buf[..8]);
        let payload_len = size.checked_sub(DATA_PREFIX_SIZE).ok_or_else(|| {
            Error::corrupt(format!("data block at {} has size {}", data.pos(), size))
        })?;
        let codec = Codec::from_u8(buf[8])?;
        let raw_len = LittleEndian::read_u64(&buf[9..]);
        Ok((codec, raw_len, payload_len))
    }
}

impl ContainerReader for OgawaReader {
    fn backend_name(&self) -> &'static str {
        "ogawa"
    }

    fn root(&self) -> Location {
        self.header.root
    }

    fn num_cursors(&self) -> usize {
        self.streams.num_cursors()
    }

    fn num_children(&self, group: Location, cursor: usize) -> Result<usize> {
        self.check_group(group)?;
        if group.is_empty() {
            return Ok(0);
        }
        let count = self.streams.read_u64(group.pos(), cursor)?;
        let fits = count
            .checked_mul(8)
            .and_then(|bytes| bytes.checked_add(group.pos() + 8))
            .map_or(false, |end| end <= self.streams.size());
        if !fits {
            return Err(Error::corrupt(format!(
                "group at {} claims {} children",
                group.pos(),
                count
            )));
        }
        Ok(count as usize)
    }

    fn child(&self, group: Location, index: usize, cursor: usize) -> Result<Location> {
        let count = self.num_children(group, cursor)?;
        if index >= count {
            return Err(Error::out_of_range(index, count));
        }
        let raw = self.streams.read_u64(group.pos() + 8 + 8 * index as u64, cursor)?;
        self.check_child(Location::from_raw(raw))
    }

    fn children(&self, group: Location, cursor: usize) -> Result<Vec<Location>> {
        let count = self.num_children(group, cursor)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.streams.read_vec(group.pos() + 8, count as u64 * 8, cursor)?;
        bytes
            .chunks_exact(8)
            .map(|c| self.check_child(Location::from_raw(LittleEndian::read_u64(c))))
            .collect()
    }

    fn read_data(&self, data: Location, cursor: usize) -> Result<Vec<u8>> {
        if !data.is_data() {
            return Err(Error::invalid(format!("{:?} is not a data block", data)));
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let (codec, raw_len, payload_len) = self.data_header(data, cursor)?;
        let payload = self.streams.read_vec(
            data.pos() + DATA_HEADER_SIZE as u64,
            payload_len,
            cursor,
        )?;
        compression::decompress(codec, &payload, raw_len)
    }

    fn data_size(&self, data: Location, cursor: usize) -> Result<u64> {
        if !data.is_data() {
            return Err(Error::invalid(format!("{:?} is not a data block", data)));
        }
        if data.is_empty() {
            return Ok(0);
        }
        Ok(self.data_header(data, cursor)?.1)
    }
}
