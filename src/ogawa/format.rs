//! Ogawa container layout constants.
//!
//! ```text
//! header   "Ogawa" | frozen u8 | version u16 | root u64        (16 bytes)
//! group    count u64 | count x child location u64
//! data     size u64 | codec u8 | raw_len u64 | payload          (size = 9 + payload)
//! ```
//!
//! All integers are little-endian. Child locations use bit 63 to tag data
//! blocks (see [`Location`](crate::core::Location)).

/// Magic bytes at the start of every container.
pub const OGAWA_MAGIC: &[u8; 5] = b"Ogawa";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

pub const FROZEN_OFFSET: u64 = 5;
pub const VERSION_OFFSET: u64 = 6;
pub const ROOT_POS_OFFSET: u64 = 8;

/// Container format version written and accepted.
pub const CURRENT_VERSION: u16 = 2;

/// Header flag of a finalized container.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Header flag while the container is still being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Bytes of data block header following the size field (codec + raw_len).
pub const DATA_PREFIX_SIZE: u64 = 9;

/// Full data block header: size, codec and raw length.
pub const DATA_HEADER_SIZE: usize = 17;
