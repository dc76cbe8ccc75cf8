//! Encoding of the archive-level structures stored in data blocks.
//!
//! Archive root group children:
//!
//! | # | kind  | content |
//! |---|-------|---------|
//! | 0 | data  | format version (i32) |
//! | 1 | data  | library version (i32) |
//! | 2 | group | top object |
//! | 3 | data  | archive metadata (serialized) |
//! | 4 | data  | time sampling table |
//! | 5 | data  | indexed metadata table |
//! | 6 | data  | hierarchy index (optional) |
//!
//! Object groups hold `[properties, children..., headers]`, compound groups
//! `[children..., headers]`. Scalar groups hold one data block per stored
//! sample; array groups hold a `(payload, dims)` pair per stored sample.

use std::collections::HashMap;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::core::{Location, MetaData, PropertyHeader, PropertyType, TimeSampling};
use crate::util::{DataType, Dimensions, Error, PlainOldDataType, Result};

/// Version of the object-model layout.
pub const FORMAT_VERSION: i32 = 1;

pub const ROOT_FORMAT_VERSION: usize = 0;
pub const ROOT_LIBRARY_VERSION: usize = 1;
pub const ROOT_TOP_OBJECT: usize = 2;
pub const ROOT_ARCHIVE_METADATA: usize = 3;
pub const ROOT_TIME_SAMPLINGS: usize = 4;
pub const ROOT_METADATA_TABLE: usize = 5;
pub const ROOT_HIERARCHY_INDEX: usize = 6;
/// Minimum root children a reader accepts (the index is optional).
pub const ROOT_REQUIRED_CHILDREN: usize = 6;

/// Metadata reference byte meaning "serialized inline".
pub const INLINE_METADATA: u8 = 0xFF;
/// Indexed metadata entries, excluding the implicit empty entry 0.
pub const MAX_INDEXED_METADATA: usize = 254;

/// Bytes of content digest prefixed to every array payload.
pub const DIGEST_SIZE: usize = 16;

/// Library version as `major * 10000 + minor * 100 + patch`.
pub fn library_version() -> i32 {
    let part = |s: &str| s.parse::<i32>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Human readable library version stamped into archive metadata.
pub fn library_version_string() -> String {
    let date = option_env!("ABC_CORE_BUILD_DATE").unwrap_or("unknown");
    let time = option_env!("ABC_CORE_BUILD_TIME").unwrap_or("unknown");
    format!(
        "alembic-core {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        date,
        time
    )
}

// ============================================================================
// Byte helpers
// ============================================================================

/// Little-endian reader over one decoded data block.
pub struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
    what: &'static str,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8], what: &'static str) -> Self {
        Self { cursor: Cursor::new(bytes), what }
    }

    pub fn is_done(&self) -> bool {
        self.cursor.position() as usize >= self.cursor.get_ref().len()
    }

    fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.cursor.position() as usize)
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.cursor.read_u8().map_err(|e| Error::from_decode(e, self.what))
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::from_decode(e, self.what))
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|e| Error::from_decode(e, self.what))
    }

    pub fn i32(&mut self) -> Result<i32> {
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|e| Error::from_decode(e, self.what))
    }

    pub fn f64(&mut self) -> Result<f64> {
        self.cursor
            .read_f64::<LittleEndian>()
            .map_err(|e| Error::from_decode(e, self.what))
    }

    /// Length-prefixed UTF-8 string.
    pub fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        if len > self.remaining() {
            return Err(Error::corrupt(format!("truncated {}", self.what)));
        }
        let start = self.cursor.position() as usize;
        let bytes = &self.cursor.get_ref()[start..start + len];
        self.cursor.set_position((start + len) as u64);
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::corrupt(format!("invalid UTF-8 in {}", self.what)))
    }

    /// A count that must fit in the remaining bytes at `min_item` bytes each.
    pub fn count(&mut self, min_item: usize) -> Result<usize> {
        let n = self.u32()? as usize;
        if n.saturating_mul(min_item) > self.remaining() {
            return Err(Error::corrupt(format!("{} claims {} entries", self.what, n)));
        }
        Ok(n)
    }
}

/// Little-endian writer producing one data block.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    // Writes into a Vec cannot fail.
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(v);
    }

    pub fn u64(&mut self, v: u64) {
        let _ = self.buf.write_u64::<LittleEndian>(v);
    }

    pub fn i32(&mut self, v: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(v);
    }

    pub fn f64(&mut self, v: f64) {
        let _ = self.buf.write_f64::<LittleEndian>(v);
    }

    pub fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub fn encode_i32(v: i32) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn decode_i32(bytes: &[u8], what: &'static str) -> Result<i32> {
    Decoder::new(bytes, what).i32()
}

// ============================================================================
// Metadata table
// ============================================================================

/// Write-side interning of metadata strings.
///
/// Entry 0 is the implicit empty metadata. Once the table is full, further
/// distinct metadata is stored inline in the referencing header.
#[derive(Debug, Default)]
pub struct MetaDataTable {
    entries: Vec<String>,
    index: HashMap<String, u8>,
}

impl MetaDataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference to `md` to a header being encoded.
    pub fn encode_ref(&mut self, enc: &mut Encoder, md: &MetaData) {
        if md.is_empty() {
            enc.u8(0);
            return;
        }
        let serialized = md.serialize();
        if let Some(idx) = self.index.get(&serialized) {
            enc.u8(*idx);
            return;
        }
        if self.entries.len() < MAX_INDEXED_METADATA {
            let idx = (self.entries.len() + 1) as u8;
            self.entries.push(serialized.clone());
            self.index.insert(serialized, idx);
            enc.u8(idx);
        } else {
            enc.u8(INLINE_METADATA);
            enc.string(&serialized);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.u32(self.entries.len() as u32);
        for entry in &self.entries {
            enc.string(entry);
        }
        enc.finish()
    }
}

/// Decode the metadata table; index 0 of the result is the empty metadata.
pub fn decode_metadata_table(bytes: &[u8]) -> Result<Vec<MetaData>> {
    let mut table = vec![MetaData::new()];
    if bytes.is_empty() {
        return Ok(table);
    }
    let mut dec = Decoder::new(bytes, "metadata table");
    let n = dec.count(4)?;
    if n > MAX_INDEXED_METADATA {
        return Err(Error::corrupt(format!("metadata table has {} entries", n)));
    }
    for _ in 0..n {
        table.push(MetaData::parse(&dec.string()?));
    }
    Ok(table)
}

fn decode_ref(dec: &mut Decoder, table: &[MetaData]) -> Result<MetaData> {
    match dec.u8()? {
        INLINE_METADATA => Ok(MetaData::parse(&dec.string()?)),
        idx => table
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| Error::corrupt(format!("metadata index {} not in table", idx))),
    }
}

// ============================================================================
// Time samplings
// ============================================================================

pub fn encode_time_samplings(pool: &[TimeSampling], max_samples: &[u32]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.u32(pool.len() as u32);
    for (ts, max) in pool.iter().zip(max_samples) {
        let times = ts.stored_times();
        enc.u32(*max);
        enc.u8(ts.sampling_type().tag());
        enc.f64(ts.time_per_cycle());
        enc.u32(times.len() as u32);
        for t in times {
            enc.f64(t);
        }
    }
    enc.finish()
}

pub fn decode_time_samplings(bytes: &[u8]) -> Result<(Vec<TimeSampling>, Vec<u32>)> {
    let mut dec = Decoder::new(bytes, "time sampling table");
    let n = dec.count(17)?;
    let mut pool = Vec::with_capacity(n);
    let mut max_samples = Vec::with_capacity(n);
    for _ in 0..n {
        let max = dec.u32()?;
        let tag = dec.u8()?;
        let tpc = dec.f64()?;
        let num_times = dec.count(8)?;
        let times = (0..num_times).map(|_| dec.f64()).collect::<Result<Vec<_>>>()?;
        let ts = TimeSampling::from_parts(tag, tpc, times)
            .map_err(|e| Error::corrupt(format!("time sampling table: {}", e)))?;
        pool.push(ts);
        max_samples.push(max);
    }
    if pool.is_empty() {
        return Err(Error::corrupt("time sampling table is empty"));
    }
    Ok((pool, max_samples))
}

// ============================================================================
// Object and property headers
// ============================================================================

/// Child object entry as stored in an object's header block.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRecord {
    pub name: String,
    pub meta_data: MetaData,
}

pub fn encode_object_headers<'a>(
    children: impl IntoIterator<Item = (&'a str, &'a MetaData)>,
    table: &mut MetaDataTable,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    for (name, md) in children {
        enc.string(name);
        table.encode_ref(&mut enc, md);
    }
    enc.finish()
}

pub fn decode_object_headers(bytes: &[u8], table: &[MetaData]) -> Result<Vec<ObjectRecord>> {
    let mut dec = Decoder::new(bytes, "object headers");
    let mut out = Vec::new();
    while !dec.is_done() {
        let name = dec.string()?;
        let meta_data = decode_ref(&mut dec, table)?;
        out.push(ObjectRecord { name, meta_data });
    }
    Ok(out)
}

/// Sample bookkeeping of a scalar or array property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleInfo {
    pub num_samples: u32,
    /// First index whose sample differs from its predecessor (0 if none).
    pub first_changed: u32,
    /// Last index whose sample differs from its predecessor (0 if none).
    pub last_changed: u32,
}

impl SampleInfo {
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.last_changed == 0
    }

    /// Number of samples physically stored in the property group.
    pub fn num_stored(&self) -> usize {
        match self.num_samples {
            0 => 0,
            _ if self.is_constant() => 1,
            _ => (self.last_changed - self.first_changed + 2) as usize,
        }
    }

    /// Stored slot holding logical sample `index`.
    ///
    /// Samples before `first_changed` repeat sample 0; samples after
    /// `last_changed` repeat `last_changed`.
    pub fn stored_index(&self, index: usize) -> usize {
        let index = index as u32;
        if self.is_constant() || index < self.first_changed {
            0
        } else {
            (index.min(self.last_changed) - self.first_changed + 1) as usize
        }
    }
}

/// Property entry as stored in a compound's header block.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyRecord {
    pub header: PropertyHeader,
    pub samples: SampleInfo,
}

pub fn encode_property_headers<'a>(
    records: impl IntoIterator<Item = (&'a PropertyHeader, SampleInfo)>,
    table: &mut MetaDataTable,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    for (header, info) in records {
        enc.string(&header.name);
        enc.u8(header.property_type as u8);
        table.encode_ref(&mut enc, &header.meta_data);
        if header.property_type != PropertyType::Compound {
            enc.u8(header.data_type.pod as u8);
            enc.u8(header.data_type.extent);
            enc.u32(header.time_sampling_index);
            enc.u32(info.num_samples);
            enc.u32(info.first_changed);
            enc.u32(info.last_changed);
        }
    }
    enc.finish()
}

pub fn decode_property_headers(bytes: &[u8], table: &[MetaData]) -> Result<Vec<PropertyRecord>> {
    let mut dec = Decoder::new(bytes, "property headers");
    let mut out = Vec::new();
    while !dec.is_done() {
        let name = dec.string()?;
        let property_type = PropertyType::from_u8(dec.u8()?)
            .ok_or_else(|| Error::corrupt(format!("property '{}' has unknown type", name)))?;
        let meta_data = decode_ref(&mut dec, table)?;

        let (data_type, time_sampling_index, samples) = if property_type == PropertyType::Compound {
            (DataType::UNKNOWN, 0, SampleInfo::default())
        } else {
            let pod = PlainOldDataType::from_u8(dec.u8()?);
            let data_type = DataType::new(pod, dec.u8()?);
            if !data_type.is_valid() {
                return Err(Error::corrupt(format!(
                    "property '{}' has invalid data type {}",
                    name, data_type
                )));
            }
            let ts_index = dec.u32()?;
            let samples = SampleInfo {
                num_samples: dec.u32()?,
                first_changed: dec.u32()?,
                last_changed: dec.u32()?,
            };
            let consistent = samples.first_changed <= samples.last_changed
                && (samples.num_samples == 0 || samples.last_changed < samples.num_samples)
                && (samples.last_changed == 0) == (samples.first_changed == 0);
            if !consistent {
                return Err(Error::corrupt(format!(
                    "property '{}' has inconsistent sample info {:?}",
                    name, samples
                )));
            }
            (data_type, ts_index, samples)
        };

        out.push(PropertyRecord {
            header: PropertyHeader {
                name,
                property_type,
                data_type,
                time_sampling_index,
                meta_data,
            },
            samples,
        });
    }
    Ok(out)
}

// ============================================================================
// Array dimensions
// ============================================================================

/// Whether dims must be stored, or can be inferred from the payload length.
pub fn dims_are_inferable(data_type: DataType, dims: &Dimensions) -> bool {
    dims.rank() == 1 && !data_type.is_string()
}

pub fn encode_dims(dims: &Dimensions) -> Vec<u8> {
    let mut enc = Encoder::new();
    for d in dims.sizes() {
        enc.u64(*d as u64);
    }
    enc.finish()
}

pub fn decode_dims(bytes: &[u8]) -> Result<Dimensions> {
    if bytes.len() % 8 != 0 {
        return Err(Error::corrupt("dimensions block is not whole u64 values"));
    }
    let mut dec = Decoder::new(bytes, "dimensions");
    let mut dims = Dimensions::empty();
    while !dec.is_done() {
        dims.push(dec.u64()? as usize);
    }
    Ok(dims)
}

// ============================================================================
// Hierarchy index
// ============================================================================

/// Child entry of the hierarchy index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedChild {
    pub name: String,
    pub meta_data: MetaData,
    pub group: Location,
}

/// Flattened `object group -> children` table written at close.
///
/// Lets a reader list an object's children without reading the object's
/// header block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HierarchyIndex {
    entries: HashMap<Location, Vec<IndexedChild>>,
}

impl HierarchyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: Location, children: Vec<IndexedChild>) {
        self.entries.insert(parent, children);
    }

    pub fn children(&self, parent: Location) -> Option<&[IndexedChild]> {
        self.entries.get(&parent).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn encode(&self, table: &mut MetaDataTable) -> Vec<u8> {
        // Sorted so identical archives produce identical bytes.
        let mut parents: Vec<_> = self.entries.iter().collect();
        parents.sort_by_key(|(loc, _)| **loc);

        let mut enc = Encoder::new();
        enc.u32(parents.len() as u32);
        for (parent, children) in parents {
            enc.u64(parent.raw());
            enc.u32(children.len() as u32);
            for child in children {
                enc.u64(child.group.raw());
                enc.string(&child.name);
                table.encode_ref(&mut enc, &child.meta_data);
            }
        }
        enc.finish()
    }

    pub fn decode(bytes: &[u8], table: &[MetaData]) -> Result<Self> {
        let mut dec = Decoder::new(bytes, "hierarchy index");
        let mut index = Self::new();
        let n = dec.count(12)?;
        for _ in 0..n {
            let parent = Location::from_raw(dec.u64()?);
            let m = dec.count(13)?;
            let mut children = Vec::with_capacity(m);
            for _ in 0..m {
                let group = Location::from_raw(dec.u64()?);
                let name = dec.string()?;
                if !group.is_group() || group.is_empty() {
                    return Err(Error::corrupt(format!(
                        "indexed child '{}' has invalid location {:?}",
                        name, group
                    )));
                }
                let meta_data = decode_ref(&mut dec, table)?;
                children.push(IndexedChild { name, meta_data, group });
            }
            index.insert(parent, children);
        }
        Ok(index)
    }
}
