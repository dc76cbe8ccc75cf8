//! Write session: archive, objects and the node arena.
//!
//! [`OArchive`] owns every node written in a session. Objects and properties
//! are addressed by small `Copy` handles ([`OObject`], [`OCompoundProperty`],
//! ...) that index into the session's arena, so there are no borrows to
//! juggle while building a tree.
//!
//! Sample data blocks are appended as samples arrive. Groups are written
//! bottom-up when a subtree is closed, either early with
//! [`OArchive::close_object`] or for the whole tree by [`OArchive::close`].

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::layout::{self, HierarchyIndex, IndexedChild, MetaDataTable, SampleInfo};
use crate::core::compression::NO_COMPRESSION;
use crate::core::{
    ContainerWriter, DedupMap, DedupStats, ErrorHandler, ErrorPolicy, Location, MetaData,
    ObjectHeader, PropertyHeader, SampleKey, TimeSampling,
};
use crate::ogawa::OgawaWriter;
use crate::util::{Dimensions, Error, Result};

/// Name of the top object of every archive.
pub const TOP_OBJECT_NAME: &str = "ABC";

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Options and statistics
// ============================================================================

/// Settings of a write session.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// Compression effort for data blocks, -1 (raw) to 9.
    pub compression: i32,
    /// Store byte-identical array samples once.
    pub dedup: bool,
    /// Write the hierarchy index at close.
    pub hierarchy_index: bool,
    /// Policy for failing sample writes.
    pub policy: ErrorPolicy,
    /// Stored as `_ai_Application` in the archive metadata.
    pub application: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: NO_COMPRESSION,
            dedup: true,
            hierarchy_index: true,
            policy: ErrorPolicy::Throw,
            application: None,
        }
    }
}

/// Counters of a write session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Samples accepted, including repeats.
    pub samples: u64,
    /// Samples stored as a reference to the previous sample.
    pub repeated: u64,
    /// Data blocks holding sample content.
    pub sample_blocks: u64,
    /// Bytes handed to the container so far.
    pub bytes_written: u64,
    pub dedup: DedupStats,
}

// ============================================================================
// Handles
// ============================================================================

/// Handle to an object of an [`OArchive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OObject {
    pub(super) session: u64,
    pub(super) id: usize,
}

// ============================================================================
// Arena nodes
// ============================================================================

pub(super) struct ObjectNode {
    pub(super) header: ObjectHeader,
    pub(super) parent: Option<usize>,
    pub(super) children: Vec<usize>,
    /// Root compound property.
    pub(super) properties: usize,
    pub(super) handler: ErrorHandler,
    /// Group location once the object is closed.
    pub(super) written: Option<Location>,
}

pub(super) struct PropertyNode {
    pub(super) header: PropertyHeader,
    /// Full path used in error messages.
    pub(super) path: String,
    pub(super) object: usize,
    /// Enclosing compound; `None` for an object's root compound.
    pub(super) parent: Option<usize>,
    pub(super) body: PropertyBody,
    pub(super) written: Option<Location>,
}

pub(super) enum PropertyBody {
    Compound { children: Vec<usize> },
    Sampled(SampleWriter),
}

/// Content identity of the last sample, for detecting repeats.
#[derive(PartialEq)]
pub(super) enum SampleIdentity {
    Bytes(Vec<u8>),
    Keyed(SampleKey, Dimensions),
}

/// Stored-sample bookkeeping of a scalar or array property.
///
/// Stored slots are sample 0 plus every index in
/// `first_changed..=last_changed`; a repeat inside that range stores the
/// previous sample's locations again, a repeat outside it stores nothing.
#[derive(Default)]
pub(super) struct SampleWriter {
    pub(super) info: SampleInfo,
    /// Group children: one location per slot for scalars, a
    /// `(payload, dims)` pair per slot for arrays.
    pub(super) stored: Vec<Location>,
    previous: SmallVec<[Location; 2]>,
    previous_identity: Option<SampleIdentity>,
}

impl SampleWriter {
    pub(super) fn is_repeat(&self, identity: &SampleIdentity) -> bool {
        self.info.num_samples > 0 && self.previous_identity.as_ref() == Some(identity)
    }

    pub(super) fn push_repeat(&mut self) {
        self.info.num_samples += 1;
    }

    pub(super) fn push_change(&mut self, locations: SmallVec<[Location; 2]>, identity: SampleIdentity) {
        let index = self.info.num_samples;
        if index > 0 {
            if self.info.first_changed == 0 {
                self.info.first_changed = index;
            } else {
                for _ in self.info.last_changed + 1..index {
                    self.stored.extend_from_slice(&self.previous);
                }
            }
            self.info.last_changed = index;
        }
        self.stored.extend_from_slice(&locations);
        self.previous = locations;
        self.previous_identity = Some(identity);
        self.info.num_samples += 1;
    }
}

// ============================================================================
// Archive
// ============================================================================

/// An archive open for writing.
///
/// Dropping an archive that was not closed finalizes it; failures during
/// that implicit close are logged.
pub struct OArchive {
    name: String,
    session: u64,
    pub(super) writer: Box<dyn ContainerWriter>,
    pub(super) options: WriteOptions,
    closed: bool,
    pub(super) objects: Vec<ObjectNode>,
    pub(super) properties: Vec<PropertyNode>,
    pub(super) time_samplings: Vec<TimeSampling>,
    archive_metadata: MetaData,
    pub(super) metadata_table: MetaDataTable,
    pub(super) dedup: DedupMap,
    index: HierarchyIndex,
    pub(super) stats: WriteStats,
}

impl OArchive {
    /// Create an archive file with default options.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with(path, WriteOptions::default())
    }

    pub fn create_with(path: impl AsRef<Path>, options: WriteOptions) -> Result<Self> {
        let name = path.as_ref().to_string_lossy().to_string();
        let writer = OgawaWriter::create(path)?;
        Ok(Self::with_writer(Box::new(writer), name, options))
    }

    /// Write through any container backend.
    pub fn with_writer(
        writer: Box<dyn ContainerWriter>,
        name: impl Into<String>,
        options: WriteOptions,
    ) -> Self {
        let name = name.into();
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        let handler = ErrorHandler::new(options.policy);

        let mut archive_metadata = MetaData::new();
        if let Some(app) = &options.application {
            archive_metadata.set(MetaData::APPLICATION_KEY, app.as_str());
        }
        archive_metadata.set(MetaData::LIBRARY_VERSION_KEY, layout::library_version_string());

        let top = ObjectNode {
            header: ObjectHeader::new(TOP_OBJECT_NAME, "/", MetaData::new()),
            parent: None,
            children: Vec::new(),
            properties: 0,
            handler,
            written: None,
        };
        let top_props = PropertyNode {
            header: PropertyHeader::compound(""),
            path: "/".to_string(),
            object: 0,
            parent: None,
            body: PropertyBody::Compound { children: Vec::new() },
            written: None,
        };

        tracing::debug!(archive = %name, backend = writer.backend_name(), "created archive");
        Self {
            name,
            session,
            writer,
            options,
            closed: false,
            objects: vec![top],
            properties: vec![top_props],
            time_samplings: vec![TimeSampling::STATIC],
            archive_metadata,
            metadata_table: MetaDataTable::new(),
            dedup: DedupMap::new(),
            index: HierarchyIndex::new(),
            stats: WriteStats::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        !self.closed
    }

    pub(super) fn session(&self) -> u64 {
        self.session
    }

    pub(super) fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed(format!("archive '{}'", self.name)));
        }
        Ok(())
    }

    pub fn stats(&self) -> WriteStats {
        WriteStats {
            bytes_written: self.writer.bytes_written(),
            dedup: self.dedup.stats(),
            ..self.stats
        }
    }

    // ------------------------------------------------------------------
    // Archive metadata
    // ------------------------------------------------------------------

    pub fn archive_metadata(&self) -> &MetaData {
        &self.archive_metadata
    }

    pub fn set_archive_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_open()?;
        self.archive_metadata.set(key, value);
        Ok(())
    }

    pub fn set_date_written(&mut self, date: &str) -> Result<()> {
        self.set_archive_metadata(MetaData::DATE_WRITTEN_KEY, date)
    }

    pub fn set_description(&mut self, description: &str) -> Result<()> {
        self.set_archive_metadata(MetaData::DESCRIPTION_KEY, description)
    }

    // ------------------------------------------------------------------
    // Time samplings
    // ------------------------------------------------------------------

    /// Append a time sampling and return its index.
    ///
    /// Equal samplings are not coalesced.
    pub fn add_time_sampling(&mut self, ts: TimeSampling) -> Result<u32> {
        self.check_open()?;
        self.time_samplings.push(ts);
        Ok((self.time_samplings.len() - 1) as u32)
    }

    pub fn num_time_samplings(&self) -> usize {
        self.time_samplings.len()
    }

    pub fn time_sampling(&self, index: u32) -> Option<&TimeSampling> {
        self.time_samplings.get(index as usize)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// The top object (`ABC`, full name `/`).
    pub fn top(&self) -> OObject {
        OObject { session: self.session, id: 0 }
    }

    pub(super) fn object_node(&self, obj: OObject) -> Result<&ObjectNode> {
        if obj.session != self.session {
            return Err(Error::invalid("object handle belongs to another archive"));
        }
        self.objects
            .get(obj.id)
            .ok_or_else(|| Error::invalid(format!("unknown object handle {}", obj.id)))
    }

    fn open_object(&self, obj: OObject) -> Result<&ObjectNode> {
        self.check_open()?;
        let node = self.object_node(obj)?;
        if node.written.is_some() {
            return Err(Error::Closed(format!("object '{}'", node.header.full_name)));
        }
        Ok(node)
    }

    /// Create a child object.
    ///
    /// Names must be non-empty and free of `/`; a sibling with the same name
    /// fails `DuplicateName`. The child inherits the parent's error policy.
    pub fn create_child(&mut self, parent: OObject, name: &str, meta_data: MetaData) -> Result<OObject> {
        let node = self.open_object(parent)?;
        validate_name(name)?;
        if node.children.iter().any(|c| self.objects[*c].header.name == name) {
            return Err(Error::DuplicateName {
                name: name.to_string(),
                parent: node.header.full_name.clone(),
            });
        }

        let full_name = ObjectHeader::child_path(&node.header.full_name, name);
        let handler = node.handler;
        let id = self.objects.len();
        let props = self.properties.len();

        self.properties.push(PropertyNode {
            header: PropertyHeader::compound(""),
            path: full_name.clone(),
            object: id,
            parent: None,
            body: PropertyBody::Compound { children: Vec::new() },
            written: None,
        });
        self.objects.push(ObjectNode {
            header: ObjectHeader::new(name, full_name, meta_data),
            parent: Some(parent.id),
            children: Vec::new(),
            properties: props,
            handler,
            written: None,
        });
        self.objects[parent.id].children.push(id);
        Ok(OObject { session: self.session, id })
    }

    pub fn object_header(&self, obj: OObject) -> Result<&ObjectHeader> {
        Ok(&self.object_node(obj)?.header)
    }

    pub fn object_parent(&self, obj: OObject) -> Result<Option<OObject>> {
        Ok(self
            .object_node(obj)?
            .parent
            .map(|id| OObject { session: self.session, id }))
    }

    pub fn object_children(&self, obj: OObject) -> Result<Vec<OObject>> {
        Ok(self
            .object_node(obj)?
            .children
            .iter()
            .map(|&id| OObject { session: self.session, id })
            .collect())
    }

    pub fn child_by_name(&self, obj: OObject, name: &str) -> Result<Option<OObject>> {
        Ok(self
            .object_node(obj)?
            .children
            .iter()
            .find(|c| self.objects[**c].header.name == name)
            .map(|&id| OObject { session: self.session, id }))
    }

    /// Set the policy for sample writes under `obj`.
    ///
    /// Applies to the object and to children created afterwards.
    pub fn set_object_policy(&mut self, obj: OObject, policy: ErrorPolicy) -> Result<()> {
        self.object_node(obj)?;
        self.objects[obj.id].handler = ErrorHandler::new(policy);
        Ok(())
    }

    pub fn object_policy(&self, obj: OObject) -> Result<ErrorPolicy> {
        Ok(self.object_node(obj)?.handler.policy())
    }

    pub fn is_object_closed(&self, obj: OObject) -> Result<bool> {
        Ok(self.object_node(obj)?.written.is_some())
    }

    /// Write `obj` and its subtree now.
    ///
    /// Later writes anywhere in the subtree fail `Closed`.
    pub fn close_object(&mut self, obj: OObject) -> Result<()> {
        self.open_object(obj)?;
        let loc = self.write_object(obj.id)?;
        tracing::debug!(object = %self.objects[obj.id].header.full_name, ?loc, "closed object");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    fn write_object(&mut self, id: usize) -> Result<Location> {
        if let Some(loc) = self.objects[id].written {
            return Ok(loc);
        }

        let children = self.objects[id].children.clone();
        let mut child_groups = Vec::with_capacity(children.len());
        for &child in &children {
            child_groups.push(self.write_object(child)?);
        }
        let props_group = self.write_property(self.objects[id].properties)?;

        let objects = &self.objects;
        let headers = layout::encode_object_headers(
            children
                .iter()
                .map(|&c| (objects[c].header.name.as_str(), &objects[c].header.meta_data)),
            &mut self.metadata_table,
        );
        let headers_loc = self.writer.add_data(&headers, self.options.compression)?;

        let mut group = Vec::with_capacity(children.len() + 2);
        group.push(props_group);
        group.extend_from_slice(&child_groups);
        group.push(headers_loc);
        let loc = self.writer.add_group(&group)?;

        if self.options.hierarchy_index {
            let entries = children
                .iter()
                .zip(&child_groups)
                .map(|(&c, &group)| IndexedChild {
                    name: self.objects[c].header.name.clone(),
                    meta_data: self.objects[c].header.meta_data.clone(),
                    group,
                })
                .collect();
            self.index.insert(loc, entries);
        }
        self.objects[id].written = Some(loc);
        Ok(loc)
    }

    fn write_property(&mut self, id: usize) -> Result<Location> {
        if let Some(loc) = self.properties[id].written {
            return Ok(loc);
        }
        let loc = match &self.properties[id].body {
            PropertyBody::Sampled(samples) => self.writer.add_group(&samples.stored)?,
            PropertyBody::Compound { children } => {
                let children = children.clone();
                let mut group = Vec::with_capacity(children.len() + 1);
                for &child in &children {
                    group.push(self.write_property(child)?);
                }
                let props = &self.properties;
                let headers = layout::encode_property_headers(
                    children.iter().map(|&c| {
                        let info = match &props[c].body {
                            PropertyBody::Sampled(s) => s.info,
                            PropertyBody::Compound { .. } => SampleInfo::default(),
                        };
                        (&props[c].header, info)
                    }),
                    &mut self.metadata_table,
                );
                group.push(self.writer.add_data(&headers, self.options.compression)?);
                self.writer.add_group(&group)?
            }
        };
        self.properties[id].written = Some(loc);
        Ok(loc)
    }

    /// Largest sample count per time sampling; constant properties count one.
    fn max_samples(&self) -> Vec<u32> {
        let mut max = vec![0u32; self.time_samplings.len()];
        for prop in &self.properties {
            if let PropertyBody::Sampled(s) = &prop.body {
                let n = match s.info.num_samples {
                    0 => 0,
                    _ if s.info.is_constant() => 1,
                    n => n,
                };
                let slot = &mut max[prop.header.time_sampling_index as usize];
                *slot = (*slot).max(n);
            }
        }
        max
    }

    fn finish(&mut self) -> Result<()> {
        self.check_open()?;
        // Marked first so a failed close is not retried on drop.
        self.closed = true;

        let level = self.options.compression;
        let top = self.write_object(0)?;
        let archive_md = self
            .writer
            .add_data(self.archive_metadata.serialize().as_bytes(), level)?;
        let ts_table = self.writer.add_data(
            &layout::encode_time_samplings(&self.time_samplings, &self.max_samples()),
            level,
        )?;
        let index = if self.options.hierarchy_index {
            let bytes = self.index.encode(&mut self.metadata_table);
            self.writer.add_data(&bytes, level)?
        } else {
            Location::EMPTY_DATA
        };
        let md_table = self.writer.add_data(&self.metadata_table.encode(), level)?;
        let format_version = self
            .writer
            .add_data(&layout::encode_i32(layout::FORMAT_VERSION), NO_COMPRESSION)?;
        let library_version = self
            .writer
            .add_data(&layout::encode_i32(layout::library_version()), NO_COMPRESSION)?;

        let root = self.writer.add_group(&[
            format_version,
            library_version,
            top,
            archive_md,
            ts_table,
            md_table,
            index,
        ])?;
        self.writer.finalize(root)?;

        let stats = self.stats();
        tracing::debug!(
            archive = %self.name,
            objects = self.objects.len(),
            properties = self.properties.len(),
            bytes = stats.bytes_written,
            dedup_hits = stats.dedup.hits,
            "closed archive"
        );
        Ok(())
    }

    /// Finalize the archive.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }
}

impl Drop for OArchive {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.finish() {
                tracing::error!(archive = %self.name, "failed to finalize archive on drop: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for OArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OArchive")
            .field("name", &self.name)
            .field("backend", &self.writer.backend_name())
            .field("closed", &self.closed)
            .field("objects", &self.objects.len())
            .field("properties", &self.properties.len())
            .finish()
    }
}

/// Object and property names: non-empty, no `/`.
pub(super) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid("empty name"));
    }
    if name.contains('/') {
        return Err(Error::invalid(format!("name '{}' contains '/'", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::util::ErrorKind;

    fn memory_archive() -> (MemoryStore, OArchive) {
        let store = MemoryStore::new();
        let writer = store.writer().unwrap();
        let archive = OArchive::with_writer(Box::new(writer), "mem", WriteOptions::default());
        (store, archive)
    }

    #[test]
    fn test_top_object() {
        let (_store, archive) = memory_archive();
        let top = archive.top();
        let header = archive.object_header(top).unwrap();
        assert_eq!(header.name, TOP_OBJECT_NAME);
        assert_eq!(header.full_name, "/");
        assert_eq!(archive.object_parent(top).unwrap(), None);
    }

    #[test]
    fn test_children_and_duplicates() {
        let (_store, mut archive) = memory_archive();
        let top = archive.top();
        let a = archive.create_child(top, "A", MetaData::new()).unwrap();
        let b = archive.create_child(a, "B", MetaData::new()).unwrap();
        assert_eq!(archive.object_header(b).unwrap().full_name, "/A/B");
        assert_eq!(archive.object_parent(b).unwrap(), Some(a));

        let err = archive.create_child(top, "A", MetaData::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
        assert_eq!(archive.object_children(top).unwrap(), vec![a]);

        assert_eq!(
            archive.create_child(top, "x/y", MetaData::new()).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            archive.create_child(top, "", MetaData::new()).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
    }

    #[test]
    fn test_close_object_rejects_children() {
        let (_store, mut archive) = memory_archive();
        let top = archive.top();
        let a = archive.create_child(top, "A", MetaData::new()).unwrap();
        archive.close_object(a).unwrap();
        assert!(archive.is_object_closed(a).unwrap());
        let err = archive.create_child(a, "B", MetaData::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        // Siblings can still be added.
        archive.create_child(top, "C", MetaData::new()).unwrap();
    }

    #[test]
    fn test_policy_inherited() {
        let (_store, mut archive) = memory_archive();
        let top = archive.top();
        archive.set_object_policy(top, ErrorPolicy::QuietDefault).unwrap();
        let a = archive.create_child(top, "A", MetaData::new()).unwrap();
        assert_eq!(archive.object_policy(a).unwrap(), ErrorPolicy::QuietDefault);
    }

    #[test]
    fn test_time_samplings_not_coalesced() {
        let (_store, mut archive) = memory_archive();
        let ts = TimeSampling::uniform(1.0 / 24.0, 0.0).unwrap();
        assert_eq!(archive.add_time_sampling(ts.clone()).unwrap(), 1);
        assert_eq!(archive.add_time_sampling(ts).unwrap(), 2);
        assert_eq!(archive.num_time_samplings(), 3);
        assert!(archive.time_sampling(0).unwrap().is_static());
    }

    #[test]
    fn test_foreign_handle() {
        let (_s1, a1) = memory_archive();
        let (_s2, mut a2) = memory_archive();
        let err = a2.create_child(a1.top(), "A", MetaData::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_drop_finalizes() {
        let (store, archive) = memory_archive();
        drop(archive);
        assert!(store.is_finalized());
    }

    #[test]
    fn test_sample_writer_slots() {
        let mut w = SampleWriter::default();
        let loc = |p| SmallVec::from_slice(&[Location::data(p)]);
        let id = |b: u8| SampleIdentity::Bytes(vec![b]);

        w.push_change(loc(1), id(0));
        w.push_repeat();
        w.push_change(loc(2), id(1));
        w.push_repeat();
        w.push_change(loc(3), id(2));
        w.push_repeat();

        assert_eq!(w.info, SampleInfo { num_samples: 6, first_changed: 2, last_changed: 4 });
        let stored: Vec<_> = w.stored.iter().map(|l| l.pos()).collect();
        assert_eq!(stored, vec![1, 2, 2, 3]);
        assert_eq!(w.info.num_stored(), stored.len());
    }
}
