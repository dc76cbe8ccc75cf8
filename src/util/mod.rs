//! Primitive types shared by every layer.
//!
//! - [`PlainOldDataType`] - element type tags
//! - [`DataType`] - POD + extent
//! - [`Dimensions`] - array sample shapes
//! - [`Error`] / [`ErrorKind`] / [`Result`] - error handling
//! - [`convert_pod_buffer`] - numeric POD conversion on read

mod pod;
mod data_type;
mod error;
mod dimensions;
mod convert;

pub use pod::*;
pub use data_type::*;
pub use error::*;
pub use dimensions::*;
pub use convert::*;

/// Time value in seconds.
pub type Chrono = f64;
