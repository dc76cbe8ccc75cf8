//! Read side: properties.
//!
//! [`IProperty`] is a closed union over the three handle types. Operations
//! every property supports (`header`, `object`, `parent`) live on the union
//! and on each handle; sample access lives only on the sampled handles and
//! child lookup only on [`ICompoundProperty`].

use std::collections::HashSet;
use std::ops::Range;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rayon::prelude::*;

use super::iarchive::{check_cursor, ArchiveShared};
use super::iobject::{IObject, ObjectData};
use super::layout::{self, SampleInfo, DIGEST_SIZE};
use crate::core::{
    element_count, ArraySample, ErrorHandler, ErrorPolicy, Location, MetaData, PropertyHeader,
    SampleDigest, SampleKey, SampleSelector, ScalarSample, SchemaMatching, TimeSampling,
};
use crate::util::{can_convert, convert_pod_buffer, Chrono, DataType, Dimensions, Error};
use crate::util::{PlainOldDataType, Result};

/// Shared, lazily filled node of a property tree.
pub(super) struct PropertyData {
    header: PropertyHeader,
    samples: SampleInfo,
    time_sampling: Arc<TimeSampling>,
    group: Location,
    path: String,
    object: Weak<ObjectData>,
    parent: Weak<PropertyData>,
    children: RwLock<Option<Arc<[Arc<PropertyData>]>>>,
}

impl PropertyData {
    /// Root compound of an object.
    pub(super) fn root(object: &Arc<ObjectData>, group: Location, archive: &ArchiveShared) -> Arc<Self> {
        Arc::new(Self {
            header: PropertyHeader::compound(""),
            samples: SampleInfo::default(),
            time_sampling: archive
                .time_samplings
                .first()
                .cloned()
                .unwrap_or_else(|| Arc::new(TimeSampling::STATIC)),
            group,
            path: object.header.full_name.clone(),
            object: Arc::downgrade(object),
            parent: Weak::new(),
            children: RwLock::new(None),
        })
    }

    fn children(this: &Arc<Self>, archive: &ArchiveShared, cursor: usize) -> Result<Arc<[Arc<Self>]>> {
        if let Some(children) = this.children.read().as_ref() {
            return Ok(children.clone());
        }

        let locs = archive.reader.children(this.group, cursor)?;
        let Some((&headers, groups)) = locs.split_last() else {
            return Err(Error::corrupt(format!("compound '{}' has no header block", this.path)));
        };
        let records = layout::decode_property_headers(
            &archive.read_block(headers, cursor, "property headers")?,
            &archive.metadata_table,
        )?;
        if records.len() != groups.len() {
            return Err(Error::corrupt(format!(
                "compound '{}' lists {} properties but stores {}",
                this.path,
                records.len(),
                groups.len()
            )));
        }

        let prefix = this.path.trim_end_matches('/');
        let loaded = records
            .into_iter()
            .zip(groups)
            .map(|(record, &group)| {
                if !group.is_group() {
                    return Err(Error::corrupt(format!(
                        "property '{}' has invalid location {:?}",
                        record.header.name, group
                    )));
                }
                let time_sampling = archive.time_sampling(record.header.time_sampling_index)?;
                Ok(Arc::new(Self {
                    path: format!("{}/{}", prefix, record.header.name),
                    header: record.header,
                    samples: record.samples,
                    time_sampling,
                    group,
                    object: this.object.clone(),
                    parent: Arc::downgrade(this),
                    children: RwLock::new(None),
                }))
            })
            .collect::<Result<Arc<[_]>>>()?;
        tracing::debug!(compound = %this.path, properties = loaded.len(), "loaded properties");

        let mut slot = this.children.write();
        Ok(slot.get_or_insert(loaded).clone())
    }
}

// ============================================================================
// Shared handle state
// ============================================================================

#[derive(Clone)]
struct PropertyRef {
    archive: Arc<ArchiveShared>,
    data: Arc<PropertyData>,
    cursor: usize,
    handler: ErrorHandler,
}

impl PropertyRef {
    fn object(&self) -> Option<IObject> {
        self.data
            .object
            .upgrade()
            .map(|o| IObject::new(self.archive.clone(), o, self.cursor, self.handler))
    }

    fn parent(&self) -> Option<ICompoundProperty> {
        self.data.parent.upgrade().map(|p| {
            ICompoundProperty(PropertyRef { data: p, ..self.clone() })
        })
    }

    fn child(&self, data: Arc<PropertyData>) -> IProperty {
        let r = PropertyRef { data, ..self.clone() };
        if r.data.header.is_scalar() {
            IProperty::Scalar(IScalarProperty(r))
        } else if r.data.header.is_array() {
            IProperty::Array(IArrayProperty(r))
        } else {
            IProperty::Compound(ICompoundProperty(r))
        }
    }

    fn resolve(&self, selector: SampleSelector) -> Result<usize> {
        selector.resolve(&self.data.time_sampling, self.data.samples.num_samples as usize)
    }

    /// Locations of the stored slot backing sample `index`.
    fn slot(&self, index: usize, width: usize) -> Result<Vec<Location>> {
        let info = &self.data.samples;
        let reader = &self.archive.reader;
        let stored = reader.num_children(self.data.group, self.cursor)?;
        if stored != info.num_stored() * width {
            return Err(Error::corrupt(format!(
                "property stores {} blocks for {} samples",
                stored,
                info.num_stored()
            )));
        }
        let first = info.stored_index(index) * width;
        (first..first + width)
            .map(|i| reader.child(self.data.group, i, self.cursor))
            .collect()
    }
}

macro_rules! property_common {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub fn header(&self) -> &PropertyHeader {
                &self.0.data.header
            }

            #[inline]
            pub fn name(&self) -> &str {
                &self.0.data.header.name
            }

            #[inline]
            pub fn meta_data(&self) -> &MetaData {
                &self.0.data.header.meta_data
            }

            /// Full path, e.g. `/A/pos`.
            #[inline]
            pub fn path(&self) -> &str {
                &self.0.data.path
            }

            /// Object owning the property.
            pub fn object(&self) -> Option<IObject> {
                self.0.object()
            }

            /// Enclosing compound; `None` for an object's root compound.
            pub fn parent(&self) -> Option<ICompoundProperty> {
                self.0.parent()
            }

            #[inline]
            pub fn cursor(&self) -> usize {
                self.0.cursor
            }

            pub fn with_cursor(&self, cursor: usize) -> Result<Self> {
                check_cursor(cursor, self.0.archive.reader.num_cursors())?;
                Ok(Self(PropertyRef { cursor, ..self.0.clone() }))
            }

            pub fn with_policy(&self, policy: ErrorPolicy) -> Self {
                Self(PropertyRef { handler: ErrorHandler::new(policy), ..self.0.clone() })
            }

            pub fn policy(&self) -> ErrorPolicy {
                self.0.handler.policy()
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("path", &self.0.data.path)
                    .field("cursor", &self.0.cursor)
                    .finish()
            }
        }
    };
}

macro_rules! sampled_common {
    ($ty:ident) => {
        impl $ty {
            #[inline]
            pub fn num_samples(&self) -> usize {
                self.0.data.samples.num_samples as usize
            }

            /// True when every sample repeats sample 0.
            #[inline]
            pub fn is_constant(&self) -> bool {
                self.0.data.samples.is_constant()
            }

            pub fn time_sampling(&self) -> &Arc<TimeSampling> {
                &self.0.data.time_sampling
            }

            pub fn data_type(&self) -> DataType {
                self.0.data.header.data_type
            }

            /// Time of sample `index`.
            pub fn sample_time(&self, index: usize) -> Chrono {
                self.0.data.time_sampling.sample_time(index)
            }
        }
    };
}

// ============================================================================
// Compound
// ============================================================================

/// Handle to a compound property.
#[derive(Clone)]
pub struct ICompoundProperty(PropertyRef);

property_common!(ICompoundProperty);

impl ICompoundProperty {
    pub(super) fn new(
        archive: Arc<ArchiveShared>,
        data: Arc<PropertyData>,
        cursor: usize,
        handler: ErrorHandler,
    ) -> Self {
        Self(PropertyRef { archive, data, cursor, handler })
    }

    fn loaded(&self) -> Result<Arc<[Arc<PropertyData>]>> {
        PropertyData::children(&self.0.data, &self.0.archive, self.0.cursor)
            .map_err(|e| e.at(self.path()))
    }

    pub fn num_properties(&self) -> Result<usize> {
        Ok(self.loaded()?.len())
    }

    /// Headers of the children, in write order.
    pub fn property_headers(&self) -> Result<Vec<PropertyHeader>> {
        Ok(self.loaded()?.iter().map(|p| p.header.clone()).collect())
    }

    pub fn properties(&self) -> Result<Vec<IProperty>> {
        Ok(self.loaded()?.iter().map(|p| self.0.child(p.clone())).collect())
    }

    /// Child by position; fails `IndexOutOfRange`.
    pub fn property_at(&self, index: usize) -> Result<IProperty> {
        let children = self.loaded()?;
        children
            .get(index)
            .map(|p| self.0.child(p.clone()))
            .ok_or_else(|| Error::out_of_range(index, children.len()).at(self.path()))
    }

    /// Child by name, `None` when absent.
    pub fn find_property(&self, name: &str) -> Result<Option<IProperty>> {
        Ok(self
            .loaded()?
            .iter()
            .find(|p| p.header.name == name)
            .map(|p| self.0.child(p.clone())))
    }

    fn lookup(&self, name: &str) -> Result<IProperty> {
        self.find_property(name)?
            .ok_or_else(|| Error::not_found(format!("property '{}'", name)))
    }

    /// Child by name under the handle's error policy.
    pub fn property(&self, name: &str) -> Result<Option<IProperty>> {
        self.0.handler.handle(self.path(), self.lookup(name))
    }

    /// Scalar child validated against an expected header.
    ///
    /// A missing child is `NotFound`; another property kind or a failed
    /// [`PropertyHeader::check`] is `SchemaMismatch`. Both go through the
    /// handle's error policy.
    pub fn scalar_property_matching(
        &self,
        name: &str,
        meta_data: &MetaData,
        data_type: Option<DataType>,
        matching: SchemaMatching,
    ) -> Result<Option<IScalarProperty>> {
        let result = self.lookup(name).and_then(|p| match p {
            IProperty::Scalar(s) => {
                s.header().check(meta_data, data_type, matching)?;
                Ok(s)
            }
            other => Err(kind_mismatch("scalar", &other)),
        });
        self.0.handler.handle(self.path(), result)
    }

    /// Array child validated against an expected header.
    pub fn array_property_matching(
        &self,
        name: &str,
        meta_data: &MetaData,
        data_type: Option<DataType>,
        matching: SchemaMatching,
    ) -> Result<Option<IArrayProperty>> {
        let result = self.lookup(name).and_then(|p| match p {
            IProperty::Array(a) => {
                a.header().check(meta_data, data_type, matching)?;
                Ok(a)
            }
            other => Err(kind_mismatch("array", &other)),
        });
        self.0.handler.handle(self.path(), result)
    }

    pub fn scalar_property(&self, name: &str) -> Result<Option<IScalarProperty>> {
        self.scalar_property_matching(name, &MetaData::new(), None, SchemaMatching::None)
    }

    pub fn array_property(&self, name: &str) -> Result<Option<IArrayProperty>> {
        self.array_property_matching(name, &MetaData::new(), None, SchemaMatching::None)
    }

    pub fn compound_property(&self, name: &str) -> Result<Option<ICompoundProperty>> {
        let result = self.lookup(name).and_then(|p| match p {
            IProperty::Compound(c) => Ok(c),
            other => Err(kind_mismatch("compound", &other)),
        });
        self.0.handler.handle(self.path(), result)
    }
}

fn kind_mismatch(expected: &str, actual: &IProperty) -> Error {
    Error::SchemaMismatch {
        expected: format!("{} property", expected),
        actual: format!("{} property '{}'", actual.header().property_type.name(), actual.name()),
    }
}

// ============================================================================
// Scalar
// ============================================================================

/// Handle to a scalar property.
#[derive(Clone)]
pub struct IScalarProperty(PropertyRef);

property_common!(IScalarProperty);
sampled_common!(IScalarProperty);

impl IScalarProperty {
    fn read(&self, selector: SampleSelector) -> Result<ScalarSample> {
        let index = self.0.resolve(selector)?;
        let slot = self.0.slot(index, 1)?;
        let bytes = self.0.archive.read_block(slot[0], self.0.cursor, "scalar sample")?;
        let sample = ScalarSample::new(self.data_type(), bytes);
        sample
            .validate()
            .map_err(|_| Error::corrupt(format!("scalar sample {} is malformed", index)))?;
        Ok(sample)
    }

    /// Sample by index or time; an index past the end fails
    /// `IndexOutOfRange`.
    pub fn sample(&self, selector: impl Into<SampleSelector>) -> Result<ScalarSample> {
        self.read(selector.into()).map_err(|e| e.at(self.path()))
    }

    /// [`sample`](Self::sample) under the handle's error policy.
    pub fn get_sample(&self, selector: impl Into<SampleSelector>) -> Result<Option<ScalarSample>> {
        self.0.handler.handle(self.path(), self.read(selector.into()))
    }
}

// ============================================================================
// Array
// ============================================================================

/// Handle to an array property.
#[derive(Clone)]
pub struct IArrayProperty(PropertyRef);

property_common!(IArrayProperty);
sampled_common!(IArrayProperty);

impl IArrayProperty {
    fn read(&self, selector: SampleSelector) -> Result<(SampleKey, ArraySample)> {
        let index = self.0.resolve(selector)?;
        let slot = self.0.slot(index, 2)?;
        let data_type = self.data_type();

        let mut bytes = self.0.archive.read_block(slot[0], self.0.cursor, "array sample")?;
        if bytes.len() < DIGEST_SIZE {
            return Err(Error::corrupt(format!("array sample {} has no digest", index)));
        }
        let data = bytes.split_off(DIGEST_SIZE);
        let digest: SampleDigest = bytes
            .try_into()
            .map_err(|_| Error::corrupt("array sample digest"))?;

        let dims = if slot[1].is_empty() {
            element_count(data_type, &data).map(Dimensions::d1).ok_or_else(|| {
                Error::corrupt(format!("array sample {} is not whole elements", index))
            })?
        } else {
            layout::decode_dims(&self.0.archive.read_block(slot[1], self.0.cursor, "dimensions")?)?
        };

        let key = SampleKey::from_digest(digest, data.len() as u64, data_type.pod);
        let sample = ArraySample::new(data_type, dims, data);
        sample
            .validate()
            .map_err(|_| Error::corrupt(format!("array sample {} does not fill its dimensions", index)))?;
        Ok((key, sample))
    }

    /// Sample by index or time; an index past the end fails
    /// `IndexOutOfRange`.
    pub fn sample(&self, selector: impl Into<SampleSelector>) -> Result<ArraySample> {
        self.read(selector.into())
            .map(|(_, sample)| sample)
            .map_err(|e| e.at(self.path()))
    }

    /// [`sample`](Self::sample) under the handle's error policy.
    pub fn get_sample(&self, selector: impl Into<SampleSelector>) -> Result<Option<ArraySample>> {
        let result = self.read(selector.into()).map(|(_, sample)| sample);
        self.0.handler.handle(self.path(), result)
    }

    /// Content key of a sample as stored.
    pub fn sample_key(&self, selector: impl Into<SampleSelector>) -> Result<SampleKey> {
        self.read(selector.into())
            .map(|(key, _)| key)
            .map_err(|e| e.at(self.path()))
    }

    fn check_conversion(&self, pod: PlainOldDataType) -> Result<()> {
        let from = self.data_type().pod;
        if !can_convert(from, pod) {
            return Err(Error::invalid(format!("cannot read {} samples as {}", from, pod)).at(self.path()));
        }
        Ok(())
    }

    /// Sample converted to another numeric POD.
    pub fn sample_as(&self, selector: impl Into<SampleSelector>, pod: PlainOldDataType) -> Result<ArraySample> {
        self.check_conversion(pod)?;
        let sample = self.sample(selector)?;
        let data_type = sample.data_type();
        let bytes = convert_pod_buffer(sample.bytes(), data_type.pod, pod)?;
        Ok(ArraySample::new(DataType::new(pod, data_type.extent), sample.dims().clone(), bytes))
    }

    /// Content key of a sample read as `pod`.
    pub fn sample_key_as(&self, selector: impl Into<SampleSelector>, pod: PlainOldDataType) -> Result<SampleKey> {
        self.check_conversion(pod)?;
        Ok(self.sample_key(selector)?.read_as(pod))
    }

    /// Number of distinct payload blocks backing the samples.
    pub fn num_unique_payloads(&self) -> Result<usize> {
        let locs = self
            .0
            .archive
            .reader
            .children(self.0.data.group, self.0.cursor)
            .map_err(|e| e.at(self.path()))?;
        let unique: HashSet<Location> = locs.iter().step_by(2).copied().collect();
        Ok(unique.len())
    }

    /// Read samples `range` in parallel.
    ///
    /// The range is split into one chunk per cursor; chunk `i` reads through
    /// cursor `i`. Results are in index order.
    pub fn read_samples_parallel(&self, range: Range<usize>) -> Result<Vec<ArraySample>> {
        let n = self.num_samples();
        if range.end > n {
            return Err(Error::out_of_range(range.end - 1, n).at(self.path()));
        }
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let indices: Vec<usize> = range.collect();
        let chunk_len = indices.len().div_ceil(self.0.archive.reader.num_cursors());

        let chunks = indices
            .par_chunks(chunk_len)
            .enumerate()
            .map(|(cursor, chunk)| {
                let handle = self.with_cursor(cursor)?;
                chunk.iter().map(|&i| handle.sample(i)).collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(chunks.into_iter().flatten().collect())
    }
}

// ============================================================================
// Any property
// ============================================================================

/// Any read-side property handle.
#[derive(Clone, Debug)]
pub enum IProperty {
    Scalar(IScalarProperty),
    Array(IArrayProperty),
    Compound(ICompoundProperty),
}

impl IProperty {
    fn inner(&self) -> &PropertyRef {
        match self {
            Self::Scalar(p) => &p.0,
            Self::Array(p) => &p.0,
            Self::Compound(p) => &p.0,
        }
    }

    pub fn header(&self) -> &PropertyHeader {
        &self.inner().data.header
    }

    pub fn name(&self) -> &str {
        &self.inner().data.header.name
    }

    pub fn object(&self) -> Option<IObject> {
        self.inner().object()
    }

    pub fn parent(&self) -> Option<ICompoundProperty> {
        self.inner().parent()
    }

    pub fn as_scalar(&self) -> Option<&IScalarProperty> {
        match self {
            Self::Scalar(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&IArrayProperty> {
        match self {
            Self::Array(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&ICompoundProperty> {
        match self {
            Self::Compound(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abc::{IArchive, OArchive, ReadOptions, WriteOptions};
    use crate::memory::MemoryStore;
    use crate::util::ErrorKind;

    fn point_md() -> MetaData {
        [(MetaData::INTERPRETATION_KEY, "point")].into_iter().collect()
    }

    fn archive() -> IArchive {
        let store = MemoryStore::new();
        let mut out =
            OArchive::with_writer(Box::new(store.writer().unwrap()), "mem", WriteOptions::default());
        let ts = out
            .add_time_sampling(TimeSampling::uniform(1.0, 0.0).unwrap())
            .unwrap();
        let a = out.create_child(out.top(), "A", MetaData::new()).unwrap();
        let props = out.properties(a).unwrap();

        let pos = out
            .create_array_property(props, "pos", point_md(), DataType::VEC3F, ts)
            .unwrap();
        for i in 0..4 {
            let v = (i / 2) as f32;
            out.set_array_sample(pos, i, i as f64, &ArraySample::from_values(&[v; 6], 3).unwrap())
                .unwrap();
        }

        let user = out.create_compound_property(props, "user", MetaData::new()).unwrap();
        let label = out
            .create_scalar_property(user, "label", MetaData::new(), DataType::STRING, 0)
            .unwrap();
        out.set_scalar_sample(label, 0, 0.0, &ScalarSample::from_string("hello").unwrap())
            .unwrap();

        let grid = out
            .create_array_property(props, "grid", MetaData::new(), DataType::INT16, 0)
            .unwrap();
        let sample = ArraySample::from_values(&[1i16, 2, 3, 4, 5, 6], 1).unwrap().with_dims((2, 3));
        out.set_array_sample(grid, 0, 0.0, &sample).unwrap();
        out.close().unwrap();

        IArchive::from_reader(Arc::new(store.reader(3).unwrap()), "mem", ReadOptions::default())
            .unwrap()
    }

    fn props(archive: &IArchive) -> ICompoundProperty {
        archive.find_object("/A").unwrap().unwrap().properties().unwrap()
    }

    #[test]
    fn test_enumeration_and_links() {
        let archive = archive();
        let props = props(&archive);
        let names: Vec<_> = props.property_headers().unwrap().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["pos", "user", "grid"]);

        let user = props.compound_property("user").unwrap().unwrap();
        let label = user.find_property("label").unwrap().unwrap();
        assert_eq!(label.parent().unwrap().name(), "user");
        assert_eq!(label.object().unwrap().full_name(), "/A");
        assert_eq!(label.as_scalar().unwrap().path(), "/A/user/label");
        assert!(props.parent().is_none());
    }

    #[test]
    fn test_array_samples() {
        let archive = archive();
        let pos = props(&archive).array_property("pos").unwrap().unwrap();
        assert_eq!(pos.num_samples(), 4);
        assert!(!pos.is_constant());
        assert_eq!(pos.num_unique_payloads().unwrap(), 2);

        let s1 = pos.sample(1).unwrap();
        assert_eq!(s1.values::<f32>().unwrap(), vec![0.0; 6]);
        assert_eq!(s1.dims(), &Dimensions::d1(2));
        let s3 = pos.sample(SampleSelector::TimeFloor(3.7)).unwrap();
        assert_eq!(s3.values::<f32>().unwrap(), vec![1.0; 6]);
        assert_eq!(pos.sample_key(0).unwrap(), pos.sample_key(1).unwrap());
        assert_ne!(pos.sample_key(1).unwrap(), pos.sample_key(2).unwrap());

        let err = pos.sample(4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
        assert_eq!(err.path(), Some("/A/pos"));
    }

    #[test]
    fn test_rank2_and_strings() {
        let archive = archive();
        let props = props(&archive);
        let grid = props.array_property("grid").unwrap().unwrap();
        let s = grid.sample(0).unwrap();
        assert_eq!(s.dims(), &Dimensions::d2(2, 3));
        assert_eq!(s.values::<i16>().unwrap(), vec![1, 2, 3, 4, 5, 6]);

        let label = props
            .compound_property("user")
            .unwrap()
            .unwrap()
            .scalar_property("label")
            .unwrap()
            .unwrap();
        assert!(label.is_constant());
        assert_eq!(label.sample(0).unwrap().strings().unwrap(), vec!["hello"]);
    }

    #[test]
    fn test_conversion() {
        let archive = archive();
        let grid = props(&archive).array_property("grid").unwrap().unwrap();
        let converted = grid.sample_as(0, PlainOldDataType::Float64).unwrap();
        assert_eq!(converted.values::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(converted.dims(), &Dimensions::d2(2, 3));

        let key = grid.sample_key_as(0, PlainOldDataType::Float64).unwrap();
        assert_eq!(key.orig_pod, PlainOldDataType::Int16);
        assert_eq!(key.read_pod, PlainOldDataType::Float64);

        let err = grid.sample_as(0, PlainOldDataType::String).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_matching() {
        let archive = archive();
        let props = props(&archive);
        let pos = props
            .array_property_matching("pos", &point_md(), Some(DataType::VEC3F), SchemaMatching::Strict)
            .unwrap();
        assert!(pos.is_some());

        let other: MetaData = [(MetaData::INTERPRETATION_KEY, "normal")].into_iter().collect();
        let err = props
            .array_property_matching("pos", &other, None, SchemaMatching::Overlap)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let err = props.scalar_property("pos").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let lenient = props.with_policy(ErrorPolicy::NoisyDefault);
        assert!(lenient.scalar_property("pos").unwrap().is_none());
        assert!(lenient.property("nope").unwrap().is_none());
    }

    #[test]
    fn test_parallel_reads() {
        let archive = archive();
        let pos = props(&archive).array_property("pos").unwrap().unwrap();
        let all = pos.read_samples_parallel(0..4).unwrap();
        assert_eq!(all.len(), 4);
        for (i, s) in all.iter().enumerate() {
            assert_eq!(s, &pos.sample(i).unwrap());
        }
        assert!(pos.read_samples_parallel(2..2).unwrap().is_empty());
        let err = pos.read_samples_parallel(0..5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn test_get_sample_policy() {
        let archive = archive();
        let pos = props(&archive).array_property("pos").unwrap().unwrap();
        assert!(pos.get_sample(9).is_err());
        let quiet = pos.with_policy(ErrorPolicy::QuietDefault);
        assert!(quiet.get_sample(9).unwrap().is_none());
        assert!(quiet.get_sample(0).unwrap().is_some());
    }
}
