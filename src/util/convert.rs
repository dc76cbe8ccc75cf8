//! Element-wise conversion between numeric POD buffers.
//!
//! Used when a reader asks for a sample in a different POD than it was
//! written with. Integer targets follow `as` cast semantics (floats saturate,
//! integers wrap); bool maps non-zero to 1.

use super::{Error, PlainOldDataType, Result};
use byteorder::{ByteOrder, LittleEndian};
use half::f16;

#[derive(Clone, Copy)]
enum Value {
    Int(i128),
    Float(f64),
}

fn read_value(bytes: &[u8], pod: PlainOldDataType) -> Value {
    use PlainOldDataType as P;
    match pod {
        P::Boolean => Value::Int((bytes[0] != 0) as i128),
        P::Uint8 => Value::Int(bytes[0] as i128),
        P::Int8 => Value::Int(bytes[0] as i8 as i128),
        P::Uint16 => Value::Int(LittleEndian::read_u16(bytes) as i128),
        P::Int16 => Value::Int(LittleEndian::read_i16(bytes) as i128),
        P::Uint32 => Value::Int(LittleEndian::read_u32(bytes) as i128),
        P::Int32 => Value::Int(LittleEndian::read_i32(bytes) as i128),
        P::Uint64 => Value::Int(LittleEndian::read_u64(bytes) as i128),
        P::Int64 => Value::Int(LittleEndian::read_i64(bytes) as i128),
        P::Float16 => Value::Float(f16::from_bits(LittleEndian::read_u16(bytes)).to_f64()),
        P::Float32 => Value::Float(LittleEndian::read_f32(bytes) as f64),
        P::Float64 => Value::Float(LittleEndian::read_f64(bytes)),
        P::String | P::Wstring | P::Unknown => Value::Int(0),
    }
}

fn write_value(out: &mut Vec<u8>, value: Value, pod: PlainOldDataType) {
    use PlainOldDataType as P;
    macro_rules! int {
        ($ty:ty) => {
            match value {
                Value::Int(v) => v as $ty,
                Value::Float(v) => v as $ty,
            }
        };
    }
    let float = match value {
        Value::Int(v) => v as f64,
        Value::Float(v) => v,
    };
    match pod {
        P::Boolean => out.push(match value {
            Value::Int(v) => (v != 0) as u8,
            Value::Float(v) => (v != 0.0) as u8,
        }),
        P::Uint8 => out.push(int!(u8)),
        P::Int8 => out.push(int!(i8) as u8),
        P::Uint16 => out.extend_from_slice(&int!(u16).to_le_bytes()),
        P::Int16 => out.extend_from_slice(&int!(i16).to_le_bytes()),
        P::Uint32 => out.extend_from_slice(&int!(u32).to_le_bytes()),
        P::Int32 => out.extend_from_slice(&int!(i32).to_le_bytes()),
        P::Uint64 => out.extend_from_slice(&int!(u64).to_le_bytes()),
        P::Int64 => out.extend_from_slice(&int!(i64).to_le_bytes()),
        P::Float16 => out.extend_from_slice(&f16::from_f64(float).to_bits().to_le_bytes()),
        P::Float32 => out.extend_from_slice(&(float as f32).to_le_bytes()),
        P::Float64 => out.extend_from_slice(&float.to_le_bytes()),
        P::String | P::Wstring | P::Unknown => {}
    }
}

/// Returns true when `from` can be converted to `to` by [`convert_pod_buffer`].
pub fn can_convert(from: PlainOldDataType, to: PlainOldDataType) -> bool {
    let numeric = |p: PlainOldDataType| p.is_numeric() || p == PlainOldDataType::Boolean;
    from == to || (numeric(from) && numeric(to))
}

/// Convert a packed little-endian buffer of `from` values into `to` values.
///
/// Identity conversions return a copy. Strings only convert to themselves.
pub fn convert_pod_buffer(
    bytes: &[u8],
    from: PlainOldDataType,
    to: PlainOldDataType,
) -> Result<Vec<u8>> {
    if from == to {
        return Ok(bytes.to_vec());
    }
    if !can_convert(from, to) {
        return Err(Error::invalid(format!("cannot convert {} samples to {}", from, to)));
    }

    let src_size = from.num_bytes();
    if bytes.len() % src_size != 0 {
        return Err(Error::invalid(format!(
            "{} bytes is not a whole number of {} values",
            bytes.len(),
            from
        )));
    }

    let count = bytes.len() / src_size;
    let mut out = Vec::with_capacity(count * to.num_bytes());
    for chunk in bytes.chunks_exact(src_size) {
        write_value(&mut out, read_value(chunk, from), to);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ErrorKind;

    #[test]
    fn test_widen_int_to_float() {
        let src: Vec<u8> = [1i32, -2, 300].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = convert_pod_buffer(&src, PlainOldDataType::Int32, PlainOldDataType::Float64)
            .unwrap();
        let vals: Vec<f64> = bytemuck::pod_collect_to_vec(&out);
        assert_eq!(vals, vec![1.0, -2.0, 300.0]);
    }

    #[test]
    fn test_narrow_float_to_half() {
        let src: Vec<u8> = [0.5f32, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = convert_pod_buffer(&src, PlainOldDataType::Float32, PlainOldDataType::Float16)
            .unwrap();
        let vals: Vec<f16> = bytemuck::pod_collect_to_vec(&out);
        assert_eq!(vals, vec![f16::from_f32(0.5), f16::from_f32(2.0)]);
    }

    #[test]
    fn test_float_to_int_saturates() {
        let src = 1000.7f64.to_le_bytes();
        let out = convert_pod_buffer(&src, PlainOldDataType::Float64, PlainOldDataType::Uint8)
            .unwrap();
        assert_eq!(out, vec![255]);
    }

    #[test]
    fn test_bool_conversion() {
        let out = convert_pod_buffer(&[0, 7], PlainOldDataType::Uint8, PlainOldDataType::Boolean)
            .unwrap();
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_string_rejected() {
        let err = convert_pod_buffer(b"a\0", PlainOldDataType::String, PlainOldDataType::Int8)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert!(can_convert(PlainOldDataType::String, PlainOldDataType::String));
    }

    #[test]
    fn test_ragged_buffer_rejected() {
        let err = convert_pod_buffer(&[0, 0, 0], PlainOldDataType::Int16, PlainOldDataType::Int32)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }
}
