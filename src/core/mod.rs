//! Core layer: the vocabulary shared by the container backends and the
//! object model.
//!
//! - [`TimeSampling`] - index/time mapping
//! - [`MetaData`] - ordered string pairs
//! - [`ObjectHeader`] / [`PropertyHeader`] - node descriptions
//! - [`SampleSelector`], [`ScalarSample`], [`ArraySample`] - samples
//! - [`SampleKey`] / [`DedupMap`] - content keys for deduplication
//! - [`Location`], [`ContainerReader`], [`ContainerWriter`] - backend interface
//! - [`ErrorHandler`] - error policy for tree walks

mod time_sampling;
mod metadata;
mod header;
mod traits;
mod sample;
mod sample_key;
mod location;
mod error_handler;
pub mod compression;

pub use time_sampling::{TimeSampling, TimeSamplingType};
pub use metadata::MetaData;
pub use header::{ObjectHeader, PropertyHeader, PropertyType, SchemaMatching};
pub use traits::{ContainerReader, ContainerWriter};
pub use sample::{
    count_strings, decode_strings, element_count, encode_strings, ArraySample, SampleSelector,
    ScalarSample,
};
pub use sample_key::{compute_digest, DedupMap, DedupStats, SampleDigest, SampleKey};
pub use location::Location;
pub use error_handler::{ErrorHandler, ErrorPolicy};
pub use compression::Codec;
