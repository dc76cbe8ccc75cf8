//! Backend interface between the object model and a physical container.
//!
//! A container stores two kinds of blocks: Data blocks (opaque, optionally
//! compressed bytes) and Group blocks (ordered lists of child locations).
//! Blocks are append-only; a writer hands out a [`Location`] for each block
//! and names the root group once, at finalization.

use super::Location;
use crate::util::Result;

// ============================================================================
// Writer
// ============================================================================

/// Append-only block sink.
pub trait ContainerWriter: Send {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Append a data block and return its location.
    ///
    /// `level` is the compression effort, -1 (raw) to 9. Empty input returns
    /// [`Location::EMPTY_DATA`] without writing anything.
    fn add_data(&mut self, bytes: &[u8], level: i32) -> Result<Location>;

    /// Append a group of child locations and return its location.
    ///
    /// An empty list returns [`Location::EMPTY_GROUP`].
    fn add_group(&mut self, children: &[Location]) -> Result<Location>;

    /// Name the root group and flush. No blocks may be added afterwards.
    fn finalize(&mut self, root: Location) -> Result<()>;

    /// True until finalized or after an unrecoverable write failure.
    fn is_valid(&self) -> bool;

    /// Bytes appended so far, including backend framing.
    fn bytes_written(&self) -> u64;
}

// ============================================================================
// Reader
// ============================================================================

/// Random-access block source.
///
/// Every read names a cursor id in `0..num_cursors()`. Reads through
/// different cursors never contend on shared mutable state, so each thread
/// of a parallel reader should hold its own cursor.
pub trait ContainerReader: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Root group named at finalization.
    fn root(&self) -> Location;

    fn num_cursors(&self) -> usize;

    /// Number of children of a group block.
    fn num_children(&self, group: Location, cursor: usize) -> Result<usize>;

    /// Location of child `index` of a group block.
    fn child(&self, group: Location, index: usize, cursor: usize) -> Result<Location>;

    /// All children of a group block, in order.
    fn children(&self, group: Location, cursor: usize) -> Result<Vec<Location>> {
        let n = self.num_children(group, cursor)?;
        (0..n).map(|i| self.child(group, i, cursor)).collect()
    }

    /// Decoded bytes of a data block.
    fn read_data(&self, data: Location, cursor: usize) -> Result<Vec<u8>>;

    /// Raw size of a data block, without decoding its payload.
    fn data_size(&self, data: Location, cursor: usize) -> Result<u64>;

    fn is_valid(&self) -> bool {
        true
    }
}
