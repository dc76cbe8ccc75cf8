//! Object model: archives, objects and properties.
//!
//! The write side is a single-owner session, [`OArchive`], handing out
//! `Copy` handles ([`OObject`], [`OScalarProperty`], ...) that are passed
//! back into it. The read side is a shared tree: [`IArchive`], [`IObject`]
//! and the `I*Property` handles are cheap to clone, `Send + Sync`, and load
//! children lazily on first access.
//!
//! ## Example
//!
//! ```no_run
//! use alembic_core::abc::{IArchive, OArchive};
//! use alembic_core::core::{ArraySample, MetaData, TimeSampling};
//! use alembic_core::util::DataType;
//!
//! # fn main() -> alembic_core::Result<()> {
//! let mut out = OArchive::create("cache.abc")?;
//! let ts = out.add_time_sampling(TimeSampling::uniform(1.0 / 24.0, 0.0)?)?;
//! let obj = out.create_child(out.top(), "A", MetaData::new())?;
//! let props = out.properties(obj)?;
//! let pos = out.create_array_property(props, "pos", MetaData::new(), DataType::VEC3F, ts)?;
//! out.set_array_sample(pos, 0, 0.0, &ArraySample::from_values(&[0.0f32, 1.0, 2.0], 3)?)?;
//! out.close()?;
//!
//! let archive = IArchive::open("cache.abc")?;
//! let a = archive.find_object("/A")?.expect("written above");
//! println!("{} properties", a.properties()?.num_properties()?);
//! # Ok(())
//! # }
//! ```

mod layout;
mod oarchive;
mod oproperty;
mod iarchive;
mod iobject;
mod iproperty;

pub use layout::{library_version, library_version_string, FORMAT_VERSION};
pub use oarchive::{OArchive, OObject, WriteOptions, WriteStats, TOP_OBJECT_NAME};
pub use oproperty::{OArrayProperty, OCompoundProperty, OProperty, OScalarProperty};
pub use iarchive::{IArchive, ReadOptions};
pub use iobject::IObject;
pub use iproperty::{IArrayProperty, ICompoundProperty, IProperty, IScalarProperty};
