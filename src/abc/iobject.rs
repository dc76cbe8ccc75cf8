//! Read side: objects.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::iarchive::{check_cursor, ArchiveShared};
use super::iproperty::{ICompoundProperty, PropertyData};
use super::layout::{self, IndexedChild};
use crate::core::{ErrorHandler, ErrorPolicy, Location, MetaData, ObjectHeader};
use crate::util::{Error, Result};

/// Shared, lazily filled node of the object tree.
pub(super) struct ObjectData {
    pub(super) header: ObjectHeader,
    group: Location,
    parent: Weak<ObjectData>,
    children: RwLock<Option<Arc<[Arc<ObjectData>]>>>,
    properties: RwLock<Option<Arc<PropertyData>>>,
}

impl ObjectData {
    pub(super) fn top(group: Location) -> Arc<Self> {
        Arc::new(Self {
            header: ObjectHeader::new(super::TOP_OBJECT_NAME, "/", MetaData::new()),
            group,
            parent: Weak::new(),
            children: RwLock::new(None),
            properties: RwLock::new(None),
        })
    }

    fn children(this: &Arc<Self>, archive: &ArchiveShared, cursor: usize) -> Result<Arc<[Arc<Self>]>> {
        if let Some(children) = this.children.read().as_ref() {
            return Ok(children.clone());
        }

        // Computed outside the lock; a concurrent loader may win the race.
        let loaded: Arc<[Arc<Self>]> = this
            .load_children(archive, cursor)?
            .into_iter()
            .map(|entry| {
                Arc::new(Self {
                    header: ObjectHeader::new(
                        entry.name.as_str(),
                        ObjectHeader::child_path(&this.header.full_name, &entry.name),
                        entry.meta_data,
                    ),
                    group: entry.group,
                    parent: Arc::downgrade(this),
                    children: RwLock::new(None),
                    properties: RwLock::new(None),
                })
            })
            .collect();
        tracing::debug!(object = %this.header.full_name, children = loaded.len(), "loaded children");

        let mut slot = this.children.write();
        Ok(slot.get_or_insert(loaded).clone())
    }

    fn load_children(&self, archive: &ArchiveShared, cursor: usize) -> Result<Vec<IndexedChild>> {
        if let Some(entries) = archive.index.as_ref().and_then(|index| index.children(self.group)) {
            return Ok(entries.to_vec());
        }

        let locs = archive.reader.children(self.group, cursor)?;
        if locs.len() < 2 {
            return Err(Error::corrupt(format!(
                "object group at {:?} has {} children",
                self.group,
                locs.len()
            )));
        }
        let headers = archive.read_block(locs[locs.len() - 1], cursor, "object headers")?;
        let records = layout::decode_object_headers(&headers, &archive.metadata_table)?;
        let groups = &locs[1..locs.len() - 1];
        if records.len() != groups.len() {
            return Err(Error::corrupt(format!(
                "object '{}' lists {} children but stores {}",
                self.header.full_name,
                records.len(),
                groups.len()
            )));
        }
        records
            .into_iter()
            .zip(groups)
            .map(|(record, &group)| {
                if !group.is_group() || group.is_empty() {
                    return Err(Error::corrupt(format!(
                        "child '{}' has invalid location {:?}",
                        record.name, group
                    )));
                }
                Ok(IndexedChild { name: record.name, meta_data: record.meta_data, group })
            })
            .collect()
    }

    fn properties(this: &Arc<Self>, archive: &ArchiveShared, cursor: usize) -> Result<Arc<PropertyData>> {
        if let Some(props) = this.properties.read().as_ref() {
            return Ok(props.clone());
        }
        let group = archive.reader.child(this.group, 0, cursor)?;
        if !group.is_group() {
            return Err(Error::corrupt(format!(
                "object '{}' has no property group",
                this.header.full_name
            )));
        }
        let loaded = PropertyData::root(this, group, archive);
        let mut slot = this.properties.write();
        Ok(slot.get_or_insert(loaded).clone())
    }
}

/// Handle to an object of an [`IArchive`](super::IArchive).
#[derive(Clone)]
pub struct IObject {
    archive: Arc<ArchiveShared>,
    data: Arc<ObjectData>,
    cursor: usize,
    handler: ErrorHandler,
}

impl IObject {
    pub(super) fn new(
        archive: Arc<ArchiveShared>,
        data: Arc<ObjectData>,
        cursor: usize,
        handler: ErrorHandler,
    ) -> Self {
        Self { archive, data, cursor, handler }
    }

    fn wrap(&self, data: Arc<ObjectData>) -> Self {
        Self { archive: self.archive.clone(), data, cursor: self.cursor, handler: self.handler }
    }

    #[inline]
    pub fn header(&self) -> &ObjectHeader {
        &self.data.header
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.data.header.name
    }

    #[inline]
    pub fn full_name(&self) -> &str {
        &self.data.header.full_name
    }

    #[inline]
    pub fn meta_data(&self) -> &MetaData {
        &self.data.header.meta_data
    }

    pub fn is_top(&self) -> bool {
        self.data.parent.upgrade().is_none()
    }

    pub fn parent(&self) -> Option<IObject> {
        self.data.parent.upgrade().map(|p| self.wrap(p))
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Same object, reading through `cursor`; children inherit it.
    pub fn with_cursor(&self, cursor: usize) -> Result<Self> {
        check_cursor(cursor, self.archive.reader.num_cursors())?;
        Ok(Self { cursor, ..self.clone() })
    }

    pub fn with_policy(&self, policy: ErrorPolicy) -> Self {
        Self { handler: ErrorHandler::new(policy), ..self.clone() }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.handler.policy()
    }

    fn loaded_children(&self) -> Result<Arc<[Arc<ObjectData>]>> {
        ObjectData::children(&self.data, &self.archive, self.cursor)
            .map_err(|e| e.at(self.full_name()))
    }

    pub fn num_children(&self) -> Result<usize> {
        Ok(self.loaded_children()?.len())
    }

    /// Headers of the children, in write order.
    pub fn child_headers(&self) -> Result<Vec<ObjectHeader>> {
        Ok(self.loaded_children()?.iter().map(|c| c.header.clone()).collect())
    }

    pub fn children(&self) -> Result<Vec<IObject>> {
        Ok(self.loaded_children()?.iter().map(|c| self.wrap(c.clone())).collect())
    }

    /// Child by position; fails `IndexOutOfRange`.
    pub fn child_at(&self, index: usize) -> Result<IObject> {
        let children = self.loaded_children()?;
        children
            .get(index)
            .map(|c| self.wrap(c.clone()))
            .ok_or_else(|| Error::out_of_range(index, children.len()).at(self.full_name()))
    }

    /// Child by name, `None` when absent.
    pub fn find_child(&self, name: &str) -> Result<Option<IObject>> {
        Ok(self
            .loaded_children()?
            .iter()
            .find(|c| c.header.name == name)
            .map(|c| self.wrap(c.clone())))
    }

    /// Child by name under the handle's error policy.
    ///
    /// A missing child is `NotFound` under [`ErrorPolicy::Throw`] and
    /// `Ok(None)` otherwise.
    pub fn child(&self, name: &str) -> Result<Option<IObject>> {
        let result = self.find_child(name).and_then(|found| {
            found.ok_or_else(|| Error::not_found(format!("child object '{}'", name)))
        });
        self.handler.handle(self.full_name(), result)
    }

    /// Root compound property.
    pub fn properties(&self) -> Result<ICompoundProperty> {
        let data = ObjectData::properties(&self.data, &self.archive, self.cursor)
            .map_err(|e| e.at(self.full_name()))?;
        Ok(ICompoundProperty::new(self.archive.clone(), data, self.cursor, self.handler))
    }
}

impl std::fmt::Debug for IObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IObject")
            .field("full_name", &self.data.header.full_name)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::{IArchive, OArchive, ReadOptions, WriteOptions};
    use crate::memory::MemoryStore;
    use crate::util::ErrorKind;

    fn archive() -> IArchive {
        let store = MemoryStore::new();
        let mut out = OArchive::with_writer(
            Box::new(store.writer().unwrap()),
            "mem",
            WriteOptions { hierarchy_index: false, ..Default::default() },
        );
        let top = out.top();
        let md: MetaData = [("kind", "group")].into_iter().collect();
        let a = out.create_child(top, "A", md).unwrap();
        out.create_child(a, "B", MetaData::new()).unwrap();
        out.create_child(a, "C", MetaData::new()).unwrap();
        out.create_child(top, "D", MetaData::new()).unwrap();
        out.close().unwrap();
        IArchive::from_reader(Arc::new(store.reader(2).unwrap()), "mem", ReadOptions::default())
            .unwrap()
    }

    #[test]
    fn test_children_in_write_order() {
        let archive = archive();
        let top = archive.top();
        assert!(top.is_top());
        let names: Vec<_> = top.children().unwrap().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["A", "D"]);

        let a = top.child_at(0).unwrap();
        assert_eq!(a.meta_data().get("kind"), Some("group"));
        let headers = a.child_headers().unwrap();
        assert_eq!(headers[1].full_name, "/A/C");
        assert_eq!(a.child_at(1).unwrap().parent().unwrap().full_name(), "/A");

        let err = a.child_at(5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_children_shared_between_handles() {
        let archive = archive();
        let first = archive.top().child_at(0).unwrap();
        let second = archive.with_cursor(1).unwrap().top().child_at(0).unwrap();
        assert!(Arc::ptr_eq(&first.data, &second.data));
        assert_eq!(second.cursor(), 1);
    }

    #[test]
    fn test_child_policy() {
        let archive = archive();
        let top = archive.top();
        let err = top.child("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.path(), Some("/"));

        let quiet = top.with_policy(ErrorPolicy::QuietDefault);
        assert!(quiet.child("missing").unwrap().is_none());
        assert!(quiet.child("A").unwrap().is_some());
        // Children inherit the policy.
        let a = quiet.child("A").unwrap().unwrap();
        assert_eq!(a.policy(), ErrorPolicy::QuietDefault);
    }

    #[test]
    fn test_parent_does_not_keep_tree_alive() {
        let archive = archive();
        let b = archive.find_object("/A/B").unwrap().unwrap();
        let weak = Arc::downgrade(&b.data);
        drop(archive);
        // The handle keeps the archive, and with it the tree, alive.
        assert_eq!(b.parent().unwrap().full_name(), "/A");
        drop(b);
        assert!(weak.upgrade().is_none());
    }
}
