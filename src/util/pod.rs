//! Plain Old Data types: the element types a sample can be made of.

use bytemuck::{Pod, Zeroable};
use half::f16;
use std::fmt;

/// Element type tag of a property.
///
/// The discriminant is the tag persisted in property headers, so the
/// numbering must never change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PlainOldDataType {
    /// Boolean stored as one byte (0 = false)
    Boolean = 0,
    Uint8 = 1,
    Int8 = 2,
    Uint16 = 3,
    Int16 = 4,
    Uint32 = 5,
    Int32 = 6,
    Uint64 = 7,
    Int64 = 8,
    /// IEEE 754 half precision
    Float16 = 9,
    Float32 = 10,
    Float64 = 11,
    /// UTF-8 string, null-terminated in encoded samples
    String = 12,
    /// Wide string, UTF-32 code units, null-terminated in encoded samples
    Wstring = 13,
    /// Unknown/invalid type
    #[default]
    Unknown = 127,
}

impl PlainOldDataType {
    /// Size in bytes of one element.
    ///
    /// Strings have no fixed size and report 0; their encoded length is
    /// determined by the null terminators.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Boolean | Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 | Self::Float16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Uint64 | Self::Int64 | Self::Float64 => 8,
            Self::String | Self::Wstring | Self::Unknown => 0,
        }
    }

    /// Returns the name of this type as a string.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Boolean => "bool_t",
            Self::Uint8 => "uint8_t",
            Self::Int8 => "int8_t",
            Self::Uint16 => "uint16_t",
            Self::Int16 => "int16_t",
            Self::Uint32 => "uint32_t",
            Self::Int32 => "int32_t",
            Self::Uint64 => "uint64_t",
            Self::Int64 => "int64_t",
            Self::Float16 => "float16_t",
            Self::Float32 => "float32_t",
            Self::Float64 => "float64_t",
            Self::String => "string",
            Self::Wstring => "wstring",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Convert from the persisted tag.
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Boolean,
            1 => Self::Uint8,
            2 => Self::Int8,
            3 => Self::Uint16,
            4 => Self::Int16,
            5 => Self::Uint32,
            6 => Self::Int32,
            7 => Self::Uint64,
            8 => Self::Int64,
            9 => Self::Float16,
            10 => Self::Float32,
            11 => Self::Float64,
            12 => Self::String,
            13 => Self::Wstring,
            _ => Self::Unknown,
        }
    }

    /// Integer and floating point types; bool excluded.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Uint8
                | Self::Int8
                | Self::Uint16
                | Self::Int16
                | Self::Uint32
                | Self::Int32
                | Self::Uint64
                | Self::Int64
                | Self::Float16
                | Self::Float32
                | Self::Float64
        )
    }

    #[inline]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::String | Self::Wstring)
    }
}

impl fmt::Display for PlainOldDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Typed element access
// ============================================================================

/// Rust types that map one-to-one onto a fixed-size POD tag.
pub trait SamplePod: Pod + Zeroable + Copy + Default {
    /// The corresponding PlainOldDataType enum value.
    const POD_TYPE: PlainOldDataType;

    /// Size of this type in bytes.
    const SIZE: usize = std::mem::size_of::<Self>();
}

macro_rules! impl_sample_pod {
    ($($ty:ty => $pod:ident),* $(,)?) => {
        $(
            impl SamplePod for $ty {
                const POD_TYPE: PlainOldDataType = PlainOldDataType::$pod;
            }
        )*
    };
}

impl_sample_pod! {
    u8 => Uint8,
    i8 => Int8,
    u16 => Uint16,
    i16 => Int16,
    u32 => Uint32,
    i32 => Int32,
    u64 => Uint64,
    i64 => Int64,
    f16 => Float16,
    f32 => Float32,
    f64 => Float64,
}

/// Boolean with guaranteed 1-byte storage.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Bool(u8);

impl Bool {
    #[inline]
    pub const fn new(v: bool) -> Self {
        Self(v as u8)
    }

    #[inline]
    pub const fn get(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Bool {
    #[inline]
    fn from(v: bool) -> Self {
        Self::new(v)
    }
}

impl From<Bool> for bool {
    #[inline]
    fn from(v: Bool) -> Self {
        v.get()
    }
}

impl fmt::Debug for Bool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl SamplePod for Bool {
    const POD_TYPE: PlainOldDataType = PlainOldDataType::Boolean;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_sizes() {
        assert_eq!(PlainOldDataType::Boolean.num_bytes(), 1);
        assert_eq!(PlainOldDataType::Int32.num_bytes(), 4);
        assert_eq!(PlainOldDataType::Float16.num_bytes(), 2);
        assert_eq!(PlainOldDataType::Float64.num_bytes(), 8);
        assert_eq!(PlainOldDataType::String.num_bytes(), 0);
    }

    #[test]
    fn test_trait_sizes_match_tags() {
        fn check<T: SamplePod>() {
            assert_eq!(T::SIZE, T::POD_TYPE.num_bytes(), "{}", T::POD_TYPE);
        }
        check::<Bool>();
        check::<u8>();
        check::<i16>();
        check::<u32>();
        check::<i64>();
        check::<f16>();
        check::<f32>();
        check::<f64>();
    }

    #[test]
    fn test_tag_roundtrip() {
        for i in 0..=PlainOldDataType::Wstring as u8 {
            let pod = PlainOldDataType::from_u8(i);
            assert_ne!(pod, PlainOldDataType::Unknown);
            assert_eq!(pod as u8, i);
        }
        assert_eq!(PlainOldDataType::from_u8(200), PlainOldDataType::Unknown);
    }

    #[test]
    fn test_classification() {
        assert!(PlainOldDataType::Float16.is_numeric());
        assert!(!PlainOldDataType::Boolean.is_numeric());
        assert!(bool::from(Bool::from(true)));
        assert!(PlainOldDataType::Wstring.is_string());
        assert!(!PlainOldDataType::String.is_numeric());
    }
}
