//! Samples and sample selection.
//!
//! A sample is the value of a property at one index. Scalar samples hold one
//! element; array samples hold a buffer of elements plus its
//! [`Dimensions`]. Both keep the encoded little-endian bytes as stored in
//! the archive; strings are null-terminated (UTF-8 for `String`, UTF-32
//! code units for `Wstring`).

use super::TimeSampling;
use crate::util::{Chrono, DataType, Dimensions, Error, PlainOldDataType, Result, SamplePod};

/// Selects one sample of a property by index or by time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleSelector {
    Index(usize),
    /// Largest index whose time is `<= t`.
    TimeFloor(Chrono),
    /// Smallest index whose time is `>= t`.
    TimeCeil(Chrono),
    /// Closest index; ties go to the floor.
    TimeNear(Chrono),
}

impl SampleSelector {
    /// Resolve to a concrete index.
    ///
    /// An index past the end fails `IndexOutOfRange`; a time query on a
    /// property without samples fails `InvalidValue`.
    pub fn resolve(&self, ts: &TimeSampling, num_samples: usize) -> Result<usize> {
        match *self {
            Self::Index(i) if i < num_samples => Ok(i),
            Self::Index(i) => Err(Error::out_of_range(i, num_samples)),
            Self::TimeFloor(t) => Ok(ts.floor_index(t, num_samples)?.0),
            Self::TimeCeil(t) => Ok(ts.ceil_index(t, num_samples)?.0),
            Self::TimeNear(t) => Ok(ts.near_index(t, num_samples)?.0),
        }
    }
}

impl Default for SampleSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl From<usize> for SampleSelector {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

// ============================================================================
// String encoding
// ============================================================================

/// Encode strings of a string POD as null-terminated code units.
pub fn encode_strings<S: AsRef<str>>(pod: PlainOldDataType, strings: &[S]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for s in strings {
        let s = s.as_ref();
        if s.contains('\0') {
            return Err(Error::invalid(format!("string {:?} contains a null character", s)));
        }
        match pod {
            PlainOldDataType::String => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            PlainOldDataType::Wstring => {
                for c in s.chars() {
                    out.extend_from_slice(&(c as u32).to_le_bytes());
                }
                out.extend_from_slice(&0u32.to_le_bytes());
            }
            other => return Err(Error::invalid(format!("{} is not a string type", other))),
        }
    }
    Ok(out)
}

/// Decode null-terminated strings. Unterminated trailing bytes are rejected.
pub fn decode_strings(pod: PlainOldDataType, bytes: &[u8]) -> Result<Vec<String>> {
    match pod {
        PlainOldDataType::String => {
            let Some(body) = bytes.strip_suffix(&[0]) else {
                return if bytes.is_empty() {
                    Ok(Vec::new())
                } else {
                    Err(Error::invalid("unterminated string sample"))
                };
            };
            body.split(|b| *b == 0)
                .map(|s| {
                    String::from_utf8(s.to_vec())
                        .map_err(|e| Error::invalid(format!("invalid UTF-8 in string sample: {}", e)))
                })
                .collect()
        }
        PlainOldDataType::Wstring => {
            if bytes.len() % 4 != 0 {
                return Err(Error::invalid("wide string sample is not whole code units"));
            }
            let mut out = Vec::new();
            let mut current = String::new();
            for unit in bytes.chunks_exact(4) {
                let code = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
                if code == 0 {
                    out.push(std::mem::take(&mut current));
                } else {
                    let c = char::from_u32(code).ok_or_else(|| {
                        Error::invalid(format!("invalid code point {:#x} in wide string", code))
                    })?;
                    current.push(c);
                }
            }
            if !current.is_empty() {
                return Err(Error::invalid("unterminated wide string sample"));
            }
            Ok(out)
        }
        other => Err(Error::invalid(format!("{} is not a string type", other))),
    }
}

/// Number of terminated strings in an encoded buffer.
pub fn count_strings(pod: PlainOldDataType, bytes: &[u8]) -> usize {
    match pod {
        PlainOldDataType::String => bytes.iter().filter(|b| **b == 0).count(),
        PlainOldDataType::Wstring => bytes
            .chunks_exact(4)
            .filter(|u| u.iter().all(|b| *b == 0))
            .count(),
        _ => 0,
    }
}

/// Number of elements an encoded buffer holds, or `None` when the length
/// is not a whole number of elements.
pub fn element_count(data_type: DataType, bytes: &[u8]) -> Option<usize> {
    let extent = data_type.extent.max(1) as usize;
    let units = if data_type.is_string() {
        let units = count_strings(data_type.pod, bytes);
        let terminated = match data_type.pod {
            PlainOldDataType::String => bytes.last().map_or(true, |b| *b == 0),
            _ => bytes.len() % 4 == 0 && bytes.rchunks(4).next().map_or(true, |u| u == [0; 4]),
        };
        if !terminated {
            return None;
        }
        units
    } else {
        let size = data_type.pod.num_bytes();
        if size == 0 || bytes.len() % size != 0 {
            return None;
        }
        bytes.len() / size
    };
    (units % extent == 0).then_some(units / extent)
}

fn typed_values<T: SamplePod>(data_type: DataType, bytes: &[u8]) -> Result<Vec<T>> {
    if T::POD_TYPE != data_type.pod {
        return Err(Error::SchemaMismatch {
            expected: T::POD_TYPE.to_string(),
            actual: data_type.pod.to_string(),
        });
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

// ============================================================================
// Scalar samples
// ============================================================================

/// One element of a scalar property (`extent` PODs).
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarSample {
    data_type: DataType,
    bytes: Vec<u8>,
}

impl ScalarSample {
    pub fn new(data_type: DataType, bytes: Vec<u8>) -> Self {
        Self { data_type, bytes }
    }

    pub fn from_value<T: SamplePod>(value: T) -> Self {
        Self {
            data_type: DataType::scalar(T::POD_TYPE),
            bytes: bytemuck::bytes_of(&value).to_vec(),
        }
    }

    /// One element with extent `values.len()`, which must be in `1..=255`.
    pub fn from_values<T: SamplePod>(values: &[T]) -> Result<Self> {
        let extent = u8::try_from(values.len())
            .ok()
            .filter(|e| *e > 0)
            .ok_or_else(|| Error::invalid(format!("scalar extent {} is not in 1..=255", values.len())))?;
        Ok(Self {
            data_type: DataType::new(T::POD_TYPE, extent),
            bytes: bytemuck::cast_slice(values).to_vec(),
        })
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self {
            data_type: DataType::STRING,
            bytes: encode_strings(PlainOldDataType::String, &[s])?,
        })
    }

    pub fn from_wstring(s: &str) -> Result<Self> {
        Ok(Self {
            data_type: DataType::WSTRING,
            bytes: encode_strings(PlainOldDataType::Wstring, &[s])?,
        })
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn values<T: SamplePod>(&self) -> Result<Vec<T>> {
        typed_values(self.data_type, &self.bytes)
    }

    /// First POD of the element.
    pub fn value<T: SamplePod>(&self) -> Result<T> {
        self.values::<T>()?
            .first()
            .copied()
            .ok_or_else(|| Error::invalid("empty scalar sample"))
    }

    pub fn strings(&self) -> Result<Vec<String>> {
        decode_strings(self.data_type.pod, &self.bytes)
    }

    /// Checks that the bytes hold exactly one element of the data type.
    pub fn validate(&self) -> Result<()> {
        match element_count(self.data_type, &self.bytes) {
            Some(1) => Ok(()),
            _ => Err(Error::invalid(format!(
                "scalar sample of {} bytes is not one {} element",
                self.bytes.len(),
                self.data_type
            ))),
        }
    }
}

// ============================================================================
// Array samples
// ============================================================================

/// A buffer of elements with its shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ArraySample {
    data_type: DataType,
    dims: Dimensions,
    bytes: Vec<u8>,
}

impl ArraySample {
    pub fn new(data_type: DataType, dims: Dimensions, bytes: Vec<u8>) -> Self {
        Self { data_type, dims, bytes }
    }

    /// Rank-1 sample of `values.len() / extent` elements.
    ///
    /// Fails `InvalidValue` for a zero extent or a length that is not a
    /// whole number of elements.
    pub fn from_values<T: SamplePod>(values: &[T], extent: u8) -> Result<Self> {
        if extent == 0 || values.len() % extent as usize != 0 {
            return Err(Error::invalid(format!(
                "{} values do not make whole elements of extent {}",
                values.len(),
                extent
            )));
        }
        Ok(Self {
            data_type: DataType::new(T::POD_TYPE, extent),
            dims: Dimensions::d1(values.len() / extent as usize),
            bytes: bytemuck::cast_slice(values).to_vec(),
        })
    }

    pub fn from_strings<S: AsRef<str>>(strings: &[S]) -> Result<Self> {
        Ok(Self {
            data_type: DataType::STRING,
            dims: Dimensions::d1(strings.len()),
            bytes: encode_strings(PlainOldDataType::String, strings)?,
        })
    }

    pub fn from_wstrings<S: AsRef<str>>(strings: &[S]) -> Result<Self> {
        Ok(Self {
            data_type: DataType::WSTRING,
            dims: Dimensions::d1(strings.len()),
            bytes: encode_strings(PlainOldDataType::Wstring, strings)?,
        })
    }

    /// Replace the shape, e.g. to make a rank-2 sample.
    pub fn with_dims(mut self, dims: impl Into<Dimensions>) -> Self {
        self.dims = dims.into();
        self
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    #[inline]
    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.dims.num_points()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Flat list of PODs (`num_points * extent` values).
    pub fn values<T: SamplePod>(&self) -> Result<Vec<T>> {
        typed_values(self.data_type, &self.bytes)
    }

    pub fn strings(&self) -> Result<Vec<String>> {
        decode_strings(self.data_type.pod, &self.bytes)
    }

    /// Checks that the byte length agrees with the dimensions.
    pub fn validate(&self) -> Result<()> {
        match element_count(self.data_type, &self.bytes) {
            Some(n) if n == self.dims.num_points() => Ok(()),
            _ => Err(Error::invalid(format!(
                "{} bytes of {} do not fill dimensions {}",
                self.bytes.len(),
                self.data_type,
                self.dims
            ))),
        }
    }
}
