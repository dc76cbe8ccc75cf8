//! Read side: archives.
//!
//! Opening an archive parses the root group eagerly (versions, time
//! samplings, metadata tables and the hierarchy index). Objects and
//! properties below the top object are materialized on first access and
//! shared by every handle afterwards.

use std::path::Path;
use std::sync::Arc;

use super::iobject::{IObject, ObjectData};
use super::layout::{self, HierarchyIndex};
use crate::core::{ContainerReader, ErrorHandler, ErrorPolicy, Location, MetaData, TimeSampling};
use crate::ogawa::OgawaReader;
use crate::util::{Error, Result};

/// Settings for opening an archive.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Independent read cursors; defaults to the available parallelism.
    pub num_cursors: usize,
    /// Map the file instead of reading through file handles.
    pub use_mmap: bool,
    /// Use the stored hierarchy index to list object children.
    pub use_hierarchy_index: bool,
    /// Policy for lenient lookups and sample reads.
    pub policy: ErrorPolicy,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            num_cursors: std::thread::available_parallelism().map_or(4, |n| n.get()),
            use_mmap: cfg!(feature = "mmap"),
            use_hierarchy_index: true,
            policy: ErrorPolicy::Throw,
        }
    }
}

/// State shared by every handle of one open archive.
pub(super) struct ArchiveShared {
    pub(super) name: String,
    pub(super) reader: Arc<dyn ContainerReader>,
    format_version: i32,
    library_version: i32,
    archive_metadata: MetaData,
    pub(super) time_samplings: Vec<Arc<TimeSampling>>,
    max_samples: Vec<u32>,
    pub(super) metadata_table: Vec<MetaData>,
    pub(super) index: Option<HierarchyIndex>,
    pub(super) top: Arc<ObjectData>,
}

impl ArchiveShared {
    /// Read a data block that the layout requires to be data.
    pub(super) fn read_block(&self, loc: Location, cursor: usize, what: &str) -> Result<Vec<u8>> {
        read_block(self.reader.as_ref(), loc, cursor, what)
    }

    pub(super) fn time_sampling(&self, index: u32) -> Result<Arc<TimeSampling>> {
        self.time_samplings
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "time sampling {} not in table of {}",
                    index,
                    self.time_samplings.len()
                ))
            })
    }
}

pub(super) fn read_block(
    reader: &dyn ContainerReader,
    loc: Location,
    cursor: usize,
    what: &str,
) -> Result<Vec<u8>> {
    if !loc.is_data() {
        return Err(Error::corrupt(format!("{} at {:?} is not a data block", what, loc)));
    }
    reader.read_data(loc, cursor)
}

/// An archive open for reading.
///
/// Cloning is cheap; clones share the parsed state and materialized tree.
#[derive(Clone)]
pub struct IArchive {
    shared: Arc<ArchiveShared>,
    cursor: usize,
    handler: ErrorHandler,
}

impl IArchive {
    /// Open an archive file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let name = path.as_ref().to_string_lossy().to_string();
        let reader = OgawaReader::open_with(path, options.num_cursors, options.use_mmap)?;
        Self::from_reader(Arc::new(reader), name, options)
    }

    /// Read through any container backend.
    ///
    /// `options.num_cursors` and `options.use_mmap` are properties of the
    /// backend and are ignored here.
    pub fn from_reader(
        reader: Arc<dyn ContainerReader>,
        name: impl Into<String>,
        options: ReadOptions,
    ) -> Result<Self> {
        let name = name.into();
        let cursor = 0;
        let root = reader.children(reader.root(), cursor)?;
        if root.len() < layout::ROOT_REQUIRED_CHILDREN {
            return Err(Error::corrupt(format!(
                "archive root has {} children, expected at least {}",
                root.len(),
                layout::ROOT_REQUIRED_CHILDREN
            )));
        }

        let r = reader.as_ref();
        let format_version = layout::decode_i32(
            &read_block(r, root[layout::ROOT_FORMAT_VERSION], cursor, "format version")?,
            "format version",
        )?;
        if format_version != layout::FORMAT_VERSION {
            return Err(Error::corrupt(format!("unsupported format version {}", format_version)));
        }
        let library_version = layout::decode_i32(
            &read_block(r, root[layout::ROOT_LIBRARY_VERSION], cursor, "library version")?,
            "library version",
        )?;

        let top_group = root[layout::ROOT_TOP_OBJECT];
        if !top_group.is_group() || top_group.is_empty() {
            return Err(Error::corrupt(format!("invalid top object location {:?}", top_group)));
        }

        let md_bytes = read_block(r, root[layout::ROOT_ARCHIVE_METADATA], cursor, "archive metadata")?;
        let archive_metadata = MetaData::parse(
            std::str::from_utf8(&md_bytes)
                .map_err(|_| Error::corrupt("archive metadata is not UTF-8"))?,
        );

        let (time_samplings, max_samples) = layout::decode_time_samplings(&read_block(
            r,
            root[layout::ROOT_TIME_SAMPLINGS],
            cursor,
            "time sampling table",
        )?)?;
        let metadata_table = layout::decode_metadata_table(&read_block(
            r,
            root[layout::ROOT_METADATA_TABLE],
            cursor,
            "metadata table",
        )?)?;

        let index = match root.get(layout::ROOT_HIERARCHY_INDEX) {
            Some(loc) if options.use_hierarchy_index && !loc.is_empty() => {
                let bytes = read_block(r, *loc, cursor, "hierarchy index")?;
                Some(HierarchyIndex::decode(&bytes, &metadata_table)?)
            }
            _ => None,
        };

        tracing::debug!(
            archive = %name,
            backend = reader.backend_name(),
            cursors = reader.num_cursors(),
            time_samplings = time_samplings.len(),
            indexed = index.is_some(),
            "opened archive"
        );

        let shared = ArchiveShared {
            name,
            reader,
            format_version,
            library_version,
            archive_metadata,
            time_samplings: time_samplings.into_iter().map(Arc::new).collect(),
            max_samples,
            metadata_table,
            index,
            top: ObjectData::top(top_group),
        };
        Ok(Self {
            shared: Arc::new(shared),
            cursor,
            handler: ErrorHandler::new(options.policy),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn backend_name(&self) -> &'static str {
        self.shared.reader.backend_name()
    }

    pub fn format_version(&self) -> i32 {
        self.shared.format_version
    }

    pub fn library_version(&self) -> i32 {
        self.shared.library_version
    }

    pub fn archive_metadata(&self) -> &MetaData {
        &self.shared.archive_metadata
    }

    pub fn application(&self) -> Option<&str> {
        self.shared.archive_metadata.get(MetaData::APPLICATION_KEY)
    }

    pub fn date_written(&self) -> Option<&str> {
        self.shared.archive_metadata.get(MetaData::DATE_WRITTEN_KEY)
    }

    pub fn description(&self) -> Option<&str> {
        self.shared.archive_metadata.get(MetaData::DESCRIPTION_KEY)
    }

    /// Version string of the library that wrote the archive.
    pub fn writer_version(&self) -> Option<&str> {
        self.shared.archive_metadata.get(MetaData::LIBRARY_VERSION_KEY)
    }

    pub fn num_time_samplings(&self) -> usize {
        self.shared.time_samplings.len()
    }

    pub fn time_sampling(&self, index: u32) -> Option<Arc<TimeSampling>> {
        self.shared.time_samplings.get(index as usize).cloned()
    }

    /// Largest sample count of any property using time sampling `index`.
    ///
    /// Constant properties count as one sample.
    pub fn max_num_samples_for_time_sampling(&self, index: u32) -> Option<usize> {
        self.shared.max_samples.get(index as usize).map(|n| *n as usize)
    }

    pub fn has_hierarchy_index(&self) -> bool {
        self.shared.index.is_some()
    }

    #[inline]
    pub fn num_cursors(&self) -> usize {
        self.shared.reader.num_cursors()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Same archive, reading through `cursor`.
    pub fn with_cursor(&self, cursor: usize) -> Result<Self> {
        check_cursor(cursor, self.num_cursors())?;
        Ok(Self { cursor, ..self.clone() })
    }

    pub fn with_policy(&self, policy: ErrorPolicy) -> Self {
        Self { handler: ErrorHandler::new(policy), ..self.clone() }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.handler.policy()
    }

    /// The top object.
    pub fn top(&self) -> IObject {
        IObject::new(self.shared.clone(), self.shared.top.clone(), self.cursor, self.handler)
    }

    /// Look up an object by full name, e.g. `/A/B`.
    ///
    /// Returns `None` when some component does not exist.
    pub fn find_object(&self, path: &str) -> Result<Option<IObject>> {
        let mut obj = self.top();
        for name in path.split('/').filter(|s| !s.is_empty()) {
            match obj.find_child(name)? {
                Some(child) => obj = child,
                None => return Ok(None),
            }
        }
        Ok(Some(obj))
    }
}

impl std::fmt::Debug for IArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IArchive")
            .field("name", &self.shared.name)
            .field("backend", &self.backend_name())
            .field("cursor", &self.cursor)
            .finish()
    }
}

pub(super) fn check_cursor(cursor: usize, num_cursors: usize) -> Result<()> {
    if cursor >= num_cursors {
        return Err(Error::out_of_range(cursor, num_cursors));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::{OArchive, WriteOptions};
    use crate::core::ContainerWriter;
    use crate::memory::MemoryStore;
    use crate::util::ErrorKind;

    fn written(options: WriteOptions) -> MemoryStore {
        let store = MemoryStore::new();
        let mut archive =
            OArchive::with_writer(Box::new(store.writer().unwrap()), "mem", options);
        archive.set_description("unit test").unwrap();
        let top = archive.top();
        let a = archive.create_child(top, "A", MetaData::new()).unwrap();
        archive.create_child(a, "B", MetaData::new()).unwrap();
        archive.close().unwrap();
        store
    }

    fn open(store: &MemoryStore, cursors: usize) -> IArchive {
        let reader = store.reader(cursors).unwrap();
        IArchive::from_reader(Arc::new(reader), "mem", ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_archive_fields() {
        let archive = open(&written(WriteOptions::default()), 2);
        assert_eq!(archive.format_version(), layout::FORMAT_VERSION);
        assert_eq!(archive.library_version(), layout::library_version());
        assert_eq!(archive.description(), Some("unit test"));
        assert!(archive.writer_version().unwrap().starts_with("alembic-core"));
        assert_eq!(archive.num_time_samplings(), 1);
        assert!(archive.has_hierarchy_index());
        assert_eq!(archive.num_cursors(), 2);
    }

    #[test]
    fn test_find_object() {
        for hierarchy_index in [true, false] {
            let store = written(WriteOptions { hierarchy_index, ..Default::default() });
            let archive = open(&store, 1);
            assert_eq!(archive.has_hierarchy_index(), hierarchy_index);
            let b = archive.find_object("/A/B").unwrap().unwrap();
            assert_eq!(b.full_name(), "/A/B");
            assert!(archive.find_object("/A/C").unwrap().is_none());
            assert_eq!(archive.find_object("/").unwrap().unwrap().full_name(), "/");
        }
    }

    #[test]
    fn test_cursor_range() {
        let archive = open(&written(WriteOptions::default()), 2);
        assert_eq!(archive.with_cursor(1).unwrap().cursor(), 1);
        let err = archive.with_cursor(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_truncated_root_is_corrupt() {
        let store = MemoryStore::new();
        let mut writer = store.writer().unwrap();
        let data = writer.add_data(&[1, 0, 0, 0], -1).unwrap();
        let root = writer.add_group(&[data, data]).unwrap();
        writer.finalize(root).unwrap();

        let reader = store.reader(1).unwrap();
        let err = IArchive::from_reader(Arc::new(reader), "bad", ReadOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptContainer);
    }
}
