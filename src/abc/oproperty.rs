//! Write-side properties.
//!
//! Property handles are `Copy` ids into an [`OArchive`]. Creation and sample
//! writes are methods of the archive; [`OProperty`] wraps the three handle
//! types for the operations they share.

use smallvec::{smallvec, SmallVec};

use super::layout::{self, DIGEST_SIZE};
use super::oarchive::{OArchive, OObject, PropertyBody, PropertyNode, SampleIdentity, SampleWriter};
use super::oarchive::validate_name;
use crate::core::{
    ArraySample, Location, MetaData, PropertyHeader, PropertyType, SampleKey, ScalarSample,
};
use crate::util::{Chrono, DataType, Error, Result};

macro_rules! property_handle {
    ($(#[$doc:meta])* $name:ident, $variant:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(super) session: u64,
            pub(super) id: usize,
        }

        impl From<$name> for OProperty {
            fn from(p: $name) -> Self {
                OProperty::$variant(p)
            }
        }
    };
}

property_handle!(
    /// Handle to a compound property.
    OCompoundProperty,
    Compound
);
property_handle!(
    /// Handle to a scalar property.
    OScalarProperty,
    Scalar
);
property_handle!(
    /// Handle to an array property.
    OArrayProperty,
    Array
);

/// Any property handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OProperty {
    Scalar(OScalarProperty),
    Array(OArrayProperty),
    Compound(OCompoundProperty),
}

impl OProperty {
    fn ids(self) -> (u64, usize) {
        match self {
            Self::Scalar(p) => (p.session, p.id),
            Self::Array(p) => (p.session, p.id),
            Self::Compound(p) => (p.session, p.id),
        }
    }

    pub fn header(self, archive: &OArchive) -> Result<&PropertyHeader> {
        archive.property_header(self)
    }

    /// Object owning the property.
    pub fn object(self, archive: &OArchive) -> Result<OObject> {
        let node = archive.property_node(self)?;
        Ok(OObject { session: archive.session(), id: node.object })
    }

    /// Enclosing compound; `None` for an object's root compound.
    pub fn parent(self, archive: &OArchive) -> Result<Option<OCompoundProperty>> {
        let node = archive.property_node(self)?;
        Ok(node
            .parent
            .map(|id| OCompoundProperty { session: archive.session(), id }))
    }

    pub fn as_scalar(self) -> Option<OScalarProperty> {
        match self {
            Self::Scalar(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_array(self) -> Option<OArrayProperty> {
        match self {
            Self::Array(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_compound(self) -> Option<OCompoundProperty> {
        match self {
            Self::Compound(p) => Some(p),
            _ => None,
        }
    }
}

/// Caller-supplied and table times agree within a relative tolerance.
fn times_match(time: Chrono, expected: Chrono) -> bool {
    (time - expected).abs() <= 1e-9 * time.abs().max(expected.abs()).max(1.0)
}

impl OArchive {
    pub(super) fn property_node(&self, prop: impl Into<OProperty>) -> Result<&PropertyNode> {
        let (session, id) = prop.into().ids();
        if session != self.session() {
            return Err(Error::invalid("property handle belongs to another archive"));
        }
        self.properties
            .get(id)
            .ok_or_else(|| Error::invalid(format!("unknown property handle {}", id)))
    }

    fn wrap(&self, id: usize) -> OProperty {
        let session = self.session();
        match self.properties[id].header.property_type {
            PropertyType::Scalar => OProperty::Scalar(OScalarProperty { session, id }),
            PropertyType::Array => OProperty::Array(OArrayProperty { session, id }),
            PropertyType::Compound => OProperty::Compound(OCompoundProperty { session, id }),
        }
    }

    /// Root compound of an object.
    pub fn properties(&self, obj: OObject) -> Result<OCompoundProperty> {
        let node = self.object_node(obj)?;
        Ok(OCompoundProperty { session: self.session(), id: node.properties })
    }

    pub fn property_header(&self, prop: impl Into<OProperty>) -> Result<&PropertyHeader> {
        Ok(&self.property_node(prop)?.header)
    }

    pub fn num_properties(&self, compound: OCompoundProperty) -> Result<usize> {
        match &self.property_node(compound)?.body {
            PropertyBody::Compound { children } => Ok(children.len()),
            PropertyBody::Sampled(_) => Err(Error::invalid("not a compound property")),
        }
    }

    pub fn property_by_name(&self, compound: OCompoundProperty, name: &str) -> Result<Option<OProperty>> {
        match &self.property_node(compound)?.body {
            PropertyBody::Compound { children } => Ok(children
                .iter()
                .find(|c| self.properties[**c].header.name == name)
                .map(|&c| self.wrap(c))),
            PropertyBody::Sampled(_) => Err(Error::invalid("not a compound property")),
        }
    }

    pub fn num_samples(&self, prop: impl Into<OProperty>) -> Result<usize> {
        Ok(self.sample_info(prop)?.num_samples as usize)
    }

    pub fn is_constant(&self, prop: impl Into<OProperty>) -> Result<bool> {
        Ok(self.sample_info(prop)?.is_constant())
    }

    fn sample_info(&self, prop: impl Into<OProperty>) -> Result<layout::SampleInfo> {
        match &self.property_node(prop)?.body {
            PropertyBody::Sampled(s) => Ok(s.info),
            PropertyBody::Compound { .. } => Err(Error::invalid("compound properties have no samples")),
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    fn add_property(&mut self, parent: OCompoundProperty, header: PropertyHeader) -> Result<usize> {
        self.check_open()?;
        let node = self.property_node(parent)?;
        if node.written.is_some() {
            return Err(Error::Closed(format!("property '{}'", node.path)));
        }
        let PropertyBody::Compound { children } = &node.body else {
            return Err(Error::invalid("not a compound property"));
        };
        validate_name(&header.name)?;
        if children.iter().any(|c| self.properties[*c].header.name == header.name) {
            return Err(Error::DuplicateName { name: header.name, parent: node.path.clone() });
        }
        if header.property_type != PropertyType::Compound {
            if !header.data_type.is_valid() {
                return Err(Error::invalid(format!(
                    "property '{}' has invalid data type {}",
                    header.name, header.data_type
                )));
            }
            let count = self.time_samplings.len();
            if header.time_sampling_index as usize >= count {
                return Err(Error::out_of_range(header.time_sampling_index as usize, count));
            }
        }

        let path = format!("{}/{}", node.path.trim_end_matches('/'), header.name);
        let object = node.object;
        let body = match header.property_type {
            PropertyType::Compound => PropertyBody::Compound { children: Vec::new() },
            _ => PropertyBody::Sampled(SampleWriter::default()),
        };
        let id = self.properties.len();
        self.properties.push(PropertyNode {
            header,
            path,
            object,
            parent: Some(parent.id),
            body,
            written: None,
        });
        if let PropertyBody::Compound { children } = &mut self.properties[parent.id].body {
            children.push(id);
        }
        Ok(id)
    }

    pub fn create_compound_property(
        &mut self,
        parent: OCompoundProperty,
        name: &str,
        meta_data: MetaData,
    ) -> Result<OCompoundProperty> {
        let header = PropertyHeader::compound(name).with_meta_data(meta_data);
        let id = self.add_property(parent, header)?;
        Ok(OCompoundProperty { session: self.session(), id })
    }

    /// Create a scalar property sampled by time sampling `ts_index`.
    pub fn create_scalar_property(
        &mut self,
        parent: OCompoundProperty,
        name: &str,
        meta_data: MetaData,
        data_type: DataType,
        ts_index: u32,
    ) -> Result<OScalarProperty> {
        let header = PropertyHeader::scalar(name, data_type)
            .with_time_sampling(ts_index)
            .with_meta_data(meta_data);
        let id = self.add_property(parent, header)?;
        Ok(OScalarProperty { session: self.session(), id })
    }

    /// Create an array property sampled by time sampling `ts_index`.
    pub fn create_array_property(
        &mut self,
        parent: OCompoundProperty,
        name: &str,
        meta_data: MetaData,
        data_type: DataType,
        ts_index: u32,
    ) -> Result<OArrayProperty> {
        let header = PropertyHeader::array(name, data_type)
            .with_time_sampling(ts_index)
            .with_meta_data(meta_data);
        let id = self.add_property(parent, header)?;
        Ok(OArrayProperty { session: self.session(), id })
    }

    // ------------------------------------------------------------------
    // Samples
    // ------------------------------------------------------------------

    /// Checks shared by every sample write.
    fn begin_sample(&self, id: usize, index: usize, time: Chrono) -> Result<()> {
        self.check_open()?;
        let node = &self.properties[id];
        if node.written.is_some() {
            return Err(Error::Closed(format!("property '{}'", node.path)));
        }
        let PropertyBody::Sampled(samples) = &node.body else {
            return Err(Error::invalid("compound properties have no samples"));
        };
        let expected = samples.info.num_samples as usize;
        if index != expected {
            return Err(Error::OutOfOrder { index, expected });
        }
        let ts = &self.time_samplings[node.header.time_sampling_index as usize];
        if ts.is_time_checked() {
            let table_time = ts.sample_time(index);
            if !times_match(time, table_time) {
                return Err(Error::TimeMismatch { index, time, expected: table_time });
            }
        }
        Ok(())
    }

    fn samples_mut(&mut self, id: usize) -> Result<&mut SampleWriter> {
        match &mut self.properties[id].body {
            PropertyBody::Sampled(s) => Ok(s),
            PropertyBody::Compound { .. } => Err(Error::invalid("compound properties have no samples")),
        }
    }

    /// Route a sample write's result through the owning object's policy.
    fn apply_policy(&self, id: usize, result: Result<()>) -> Result<()> {
        let node = &self.properties[id];
        self.objects[node.object].handler.handle_unit(&node.path, result)
    }

    fn push_repeat(&mut self, id: usize) -> Result<()> {
        self.samples_mut(id)?.push_repeat();
        self.stats.samples += 1;
        self.stats.repeated += 1;
        Ok(())
    }

    /// Write sample `index` at `time`.
    ///
    /// Fails `OutOfOrder` unless `index` equals the number of samples
    /// written so far, `TimeMismatch` when a uniform or cyclic sampling
    /// puts sample `index` at another time, and `InvalidValue` when the
    /// sample does not fit the property's data type.
    pub fn set_scalar_sample(
        &mut self,
        prop: OScalarProperty,
        index: usize,
        time: Chrono,
        sample: &ScalarSample,
    ) -> Result<()> {
        self.property_node(prop)?;
        let result = self.write_scalar(prop.id, index, time, sample);
        self.apply_policy(prop.id, result)
    }

    fn write_scalar(&mut self, id: usize, index: usize, time: Chrono, sample: &ScalarSample) -> Result<()> {
        self.begin_sample(id, index, time)?;
        let expected = self.properties[id].header.data_type;
        if sample.data_type() != expected {
            return Err(Error::invalid(format!(
                "sample of {} written to {} property",
                sample.data_type(),
                expected
            )));
        }
        sample.validate()?;

        let identity = SampleIdentity::Bytes(sample.bytes().to_vec());
        if self.samples_mut(id)?.is_repeat(&identity) {
            return self.push_repeat(id);
        }
        let loc = self.writer.add_data(sample.bytes(), self.options.compression)?;
        self.samples_mut(id)?.push_change(smallvec![loc], identity);
        self.stats.samples += 1;
        self.stats.sample_blocks += 1;
        Ok(())
    }

    /// Write sample `index` as a repeat of sample `index - 1`.
    pub fn set_scalar_from_previous(&mut self, prop: OScalarProperty, index: usize, time: Chrono) -> Result<()> {
        self.property_node(prop)?;
        let result = self.write_from_previous(prop.id, index, time);
        self.apply_policy(prop.id, result)
    }

    fn write_from_previous(&mut self, id: usize, index: usize, time: Chrono) -> Result<()> {
        self.begin_sample(id, index, time)?;
        if index == 0 {
            return Err(Error::invalid("sample 0 has no previous sample"));
        }
        self.push_repeat(id)
    }

    /// Write array sample `index` at `time`.
    ///
    /// Same rules as [`set_scalar_sample`](Self::set_scalar_sample). The
    /// payload is stored once per distinct content when deduplication is
    /// enabled; a sample equal to its predecessor stores nothing new.
    pub fn set_array_sample(
        &mut self,
        prop: OArrayProperty,
        index: usize,
        time: Chrono,
        sample: &ArraySample,
    ) -> Result<()> {
        self.property_node(prop)?;
        let result = self.write_array(prop.id, index, time, sample);
        self.apply_policy(prop.id, result)
    }

    fn write_array(&mut self, id: usize, index: usize, time: Chrono, sample: &ArraySample) -> Result<()> {
        self.begin_sample(id, index, time)?;
        let data_type = self.properties[id].header.data_type;
        if sample.data_type() != data_type {
            return Err(Error::invalid(format!(
                "sample of {} written to {} property",
                sample.data_type(),
                data_type
            )));
        }
        if sample.dims().rank() == 0 {
            return Err(Error::invalid("array samples need at least one dimension"));
        }
        sample.validate()?;

        let key = SampleKey::from_data(sample.bytes(), data_type.pod);
        let identity = SampleIdentity::Keyed(key, sample.dims().clone());
        if self.samples_mut(id)?.is_repeat(&identity) {
            return self.push_repeat(id);
        }

        let level = self.options.compression;
        let existing = if self.options.dedup { self.dedup.lookup(&key) } else { None };
        let payload = match existing {
            Some(loc) => {
                tracing::trace!(key = %key.digest_hex(), ?loc, "dedup hit");
                loc
            }
            None => {
                let mut block = Vec::with_capacity(DIGEST_SIZE + sample.bytes().len());
                block.extend_from_slice(&key.digest);
                block.extend_from_slice(sample.bytes());
                let loc = self.writer.add_data(&block, level)?;
                if self.options.dedup {
                    self.dedup.insert(key, loc);
                }
                self.stats.sample_blocks += 1;
                loc
            }
        };
        let dims = if layout::dims_are_inferable(data_type, sample.dims()) {
            Location::EMPTY_DATA
        } else {
            self.writer.add_data(&layout::encode_dims(sample.dims()), level)?
        };

        let locations: SmallVec<[Location; 2]> = smallvec![payload, dims];
        self.samples_mut(id)?.push_change(locations, identity);
        self.stats.samples += 1;
        Ok(())
    }

    /// Write array sample `index` as a repeat of sample `index - 1`.
    pub fn set_array_from_previous(&mut self, prop: OArrayProperty, index: usize, time: Chrono) -> Result<()> {
        self.property_node(prop)?;
        let result = self.write_from_previous(prop.id, index, time);
        self.apply_policy(prop.id, result)
    }
}
