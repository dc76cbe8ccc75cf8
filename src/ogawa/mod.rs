//! Ogawa: the single-file block container.
//!
//! ## File Structure
//!
//! ```text
//! +------------------+
//! | Magic: "Ogawa"   |  5 bytes
//! +------------------+
//! | Frozen flag      |  1 byte (0x00 while writing, 0xFF once finalized)
//! +------------------+
//! | Version          |  2 bytes (u16 LE)
//! +------------------+
//! | Root Group Pos   |  8 bytes (u64 LE)
//! +------------------+
//! | Groups and data  |  appended in write order
//! +------------------+
//! ```

mod format;
mod reader;
mod writer;

pub use format::*;
pub use reader::{IStreams, OgawaHeader, OgawaReader};
pub use writer::{OStream, OgawaWriter};
