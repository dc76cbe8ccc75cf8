//! DataType: POD type plus extent.

use super::PlainOldDataType;
use std::fmt;

/// How one element of a sample is stored.
///
/// A Vec3f is `Float32` with extent 3. Fixed at property creation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataType {
    pub pod: PlainOldDataType,
    /// Number of POD values per element, at least 1 for a valid type
    pub extent: u8,
}

impl DataType {
    #[inline]
    pub const fn new(pod: PlainOldDataType, extent: u8) -> Self {
        Self { pod, extent }
    }

    /// DataType with extent 1.
    #[inline]
    pub const fn scalar(pod: PlainOldDataType) -> Self {
        Self { pod, extent: 1 }
    }

    /// Bytes of one element; 0 for string types.
    #[inline]
    pub const fn num_bytes(&self) -> usize {
        self.pod.num_bytes() * self.extent as usize
    }

    /// A type is valid when its POD is known and the extent is non-zero.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        !matches!(self.pod, PlainOldDataType::Unknown) && self.extent > 0
    }

    #[inline]
    pub const fn is_string(&self) -> bool {
        self.pod.is_string()
    }

    pub const UNKNOWN: Self = Self::new(PlainOldDataType::Unknown, 0);

    pub const UINT8: Self = Self::scalar(PlainOldDataType::Uint8);
    pub const INT8: Self = Self::scalar(PlainOldDataType::Int8);
    pub const INT16: Self = Self::scalar(PlainOldDataType::Int16);
    pub const INT32: Self = Self::scalar(PlainOldDataType::Int32);
    pub const FLOAT32: Self = Self::scalar(PlainOldDataType::Float32);
    pub const FLOAT64: Self = Self::scalar(PlainOldDataType::Float64);
    pub const STRING: Self = Self::scalar(PlainOldDataType::String);
    pub const WSTRING: Self = Self::scalar(PlainOldDataType::Wstring);

    pub const VEC3F: Self = Self::new(PlainOldDataType::Float32, 3);
    pub const VEC3D: Self = Self::new(PlainOldDataType::Float64, 3);
}

impl Default for DataType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extent == 1 {
            write!(f, "{}", self.pod.name())
        } else {
            write!(f, "{}[{}]", self.pod.name(), self.extent)
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
