//! # alembic-core
//!
//! Hierarchical, time-sampled, append-only cache archives in the style of
//! Alembic core: a tree of named objects, each carrying a tree of typed
//! properties whose values are recorded per time sample.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (POD, DataType, Dimensions, errors)
//! - [`core`] - Time sampling, metadata, headers, samples and the container interface
//! - [`ogawa`] - Single-file block container
//! - [`memory`] - In-memory container with the same contract
//! - [`abc`] - Object model (IArchive, OArchive, objects, properties)
//!
//! ## Example
//!
//! ```no_run
//! use alembic_core::prelude::*;
//!
//! # fn main() -> alembic_core::Result<()> {
//! let archive = IArchive::open("cache.abc")?;
//! for child in archive.top().children()? {
//!     println!("{}", child.full_name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod util;
pub mod core;
pub mod ogawa;
pub mod memory;
pub mod abc;

// Re-export commonly used types
pub use util::{DataType, Dimensions, Error, ErrorKind, PlainOldDataType, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Chrono, DataType, Dimensions, Error, ErrorKind, PlainOldDataType, Result};
    pub use crate::core::{
        ArraySample, ErrorPolicy, MetaData, SampleSelector, ScalarSample, SchemaMatching, TimeSampling,
    };
    pub use crate::abc::{
        IArchive, IArrayProperty, ICompoundProperty, IObject, IProperty, IScalarProperty, OArchive,
        OArrayProperty, OCompoundProperty, OObject, OProperty, OScalarProperty, ReadOptions,
        WriteOptions,
    };
}
