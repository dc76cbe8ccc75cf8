//! Headers describing objects and properties.

use super::MetaData;
use crate::util::{DataType, Error, Result};

/// Name, path and metadata of an object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectHeader {
    /// Name within the parent (not a path).
    pub name: String,
    /// Absolute path, e.g. `/A/B`. The top object is `/`.
    pub full_name: String,
    pub meta_data: MetaData,
}

impl ObjectHeader {
    pub fn new(name: impl Into<String>, full_name: impl Into<String>, meta_data: MetaData) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
            meta_data,
        }
    }

    /// Full path of a child named `name` under `parent_full_name`.
    pub fn child_path(parent_full_name: &str, name: &str) -> String {
        if parent_full_name.ends_with('/') {
            format!("{}{}", parent_full_name, name)
        } else {
            format!("{}/{}", parent_full_name, name)
        }
    }
}

/// Property variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyType {
    /// Ordered set of child properties, no samples.
    Compound = 0,
    /// One fixed-size element per sample.
    Scalar = 1,
    /// Variable-length buffer plus dimensions per sample.
    Array = 2,
}

impl PropertyType {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Compound),
            1 => Some(Self::Scalar),
            2 => Some(Self::Array),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Compound => "compound",
            Self::Scalar => "scalar",
            Self::Array => "array",
        }
    }
}

/// Header of a property. Compound headers carry [`DataType::UNKNOWN`] and
/// time sampling index 0.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyHeader {
    pub name: String,
    pub property_type: PropertyType,
    pub data_type: DataType,
    /// Index into the archive's time sampling pool (0 = static).
    pub time_sampling_index: u32,
    pub meta_data: MetaData,
}

impl PropertyHeader {
    pub fn scalar(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            property_type: PropertyType::Scalar,
            data_type,
            time_sampling_index: 0,
            meta_data: MetaData::new(),
        }
    }

    pub fn array(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            property_type: PropertyType::Array,
            ..Self::scalar(name, data_type)
        }
    }

    pub fn compound(name: impl Into<String>) -> Self {
        Self {
            property_type: PropertyType::Compound,
            ..Self::scalar(name, DataType::UNKNOWN)
        }
    }

    pub fn with_time_sampling(mut self, index: u32) -> Self {
        self.time_sampling_index = index;
        self
    }

    pub fn with_meta_data(mut self, meta_data: MetaData) -> Self {
        self.meta_data = meta_data;
        self
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.property_type == PropertyType::Scalar
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.property_type == PropertyType::Array
    }

    #[inline]
    pub fn is_compound(&self) -> bool {
        self.property_type == PropertyType::Compound
    }

    /// Validate against a reader's expectation.
    ///
    /// `data_type` is only compared when given. Fails with
    /// `SchemaMismatch`.
    pub fn check(
        &self,
        meta_data: &MetaData,
        data_type: Option<DataType>,
        matching: SchemaMatching,
    ) -> Result<()> {
        let md_ok = match matching {
            SchemaMatching::Strict => self.meta_data.matches_exactly(meta_data),
            SchemaMatching::Overlap => self.meta_data.matches_overlap(meta_data),
            SchemaMatching::None => return Ok(()),
        };
        if !md_ok {
            return Err(Error::SchemaMismatch {
                expected: meta_data.serialize(),
                actual: self.meta_data.serialize(),
            });
        }
        match data_type {
            Some(dt) if dt != self.data_type => Err(Error::SchemaMismatch {
                expected: dt.to_string(),
                actual: self.data_type.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// How strictly a reader validates a header against its expectation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SchemaMatching {
    /// MetaData must match exactly.
    Strict,
    /// MetaData must not conflict on shared keys.
    #[default]
    Overlap,
    /// No validation.
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ErrorKind;

    #[test]
    fn test_child_path() {
        assert_eq!(ObjectHeader::child_path("/", "A"), "/A");
        assert_eq!(ObjectHeader::child_path("/A", "B"), "/A/B");
    }

    #[test]
    fn test_property_header_kinds() {
        let header = PropertyHeader::array("pos", DataType::VEC3F).with_time_sampling(1);
        assert!(header.is_array());
        assert_eq!(header.time_sampling_index, 1);
        assert!(PropertyHeader::compound("c").is_compound());
        assert_eq!(PropertyType::from_u8(PropertyType::Array as u8), Some(PropertyType::Array));
        assert_eq!(PropertyType::from_u8(3), None);
    }

    #[test]
    fn test_check_matching() {
        let md: MetaData = [("interpretation", "point")].into_iter().collect();
        let header = PropertyHeader::array("P", DataType::VEC3F).with_meta_data(md.clone());

        header.check(&md, Some(DataType::VEC3F), SchemaMatching::Strict).unwrap();
        header.check(&MetaData::new(), None, SchemaMatching::Overlap).unwrap();

        let err = header
            .check(&MetaData::new(), None, SchemaMatching::Strict)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let err = header
            .check(&md, Some(DataType::VEC3D), SchemaMatching::Overlap)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);

        let other: MetaData = [("interpretation", "normal")].into_iter().collect();
        header.check(&other, Some(DataType::INT8), SchemaMatching::None).unwrap();
        assert!(header.check(&other, None, SchemaMatching::Overlap).is_err());
    }
}
