//! In-process container backend.
//!
//! Stores blocks in a node arena instead of a file. A [`MemoryStore`] is
//! shared between the writer that fills it and the readers opened on it
//! once it is finalized. Blocks go through the same codec as the file
//! backend so sizes and compression behave alike.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::compression::{self, Codec};
use crate::core::{ContainerReader, ContainerWriter, Location};
use crate::util::{Error, Result};

#[derive(Debug)]
enum Node {
    Group(Vec<Location>),
    Data {
        codec: Codec,
        raw_len: u64,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Default)]
struct StoreState {
    nodes: Vec<Node>,
    bytes: u64,
    writer_taken: bool,
    frozen: Option<(Arc<Vec<Node>>, Location)>,
}

/// Shared handle to an in-memory container.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The store's single writer.
    pub fn writer(&self) -> Result<MemoryWriter> {
        let mut state = self.state.lock();
        if state.writer_taken {
            return Err(Error::invalid("memory store already has a writer"));
        }
        state.writer_taken = true;
        Ok(MemoryWriter { store: self.clone(), finalized: false })
    }

    /// Open a reader on the finalized store.
    pub fn reader(&self, num_cursors: usize) -> Result<MemoryReader> {
        let state = self.state.lock();
        let (nodes, root) = state
            .frozen
            .clone()
            .ok_or_else(|| Error::corrupt("memory store was never finalized"))?;
        Ok(MemoryReader { nodes, root, num_cursors: num_cursors.max(1) })
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().frozen.is_some()
    }

    /// Number of stored blocks.
    pub fn num_blocks(&self) -> usize {
        let state = self.state.lock();
        match &state.frozen {
            Some((nodes, _)) => nodes.len(),
            None => state.nodes.len(),
        }
    }
}

/// [`ContainerWriter`] filling a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryWriter {
    store: MemoryStore,
    finalized: bool,
}

impl MemoryWriter {
    fn push(&mut self, node: Node, framing: u64) -> Result<u64> {
        if self.finalized {
            return Err(Error::Closed("memory container".into()));
        }
        let mut state = self.store.state.lock();
        state.bytes += framing;
        state.nodes.push(node);
        // Position 0 is the empty sentinel, so positions are 1-based.
        Ok(state.nodes.len() as u64)
    }
}

impl ContainerWriter for MemoryWriter {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn add_data(&mut self, bytes: &[u8], level: i32) -> Result<Location> {
        if bytes.is_empty() {
            return Ok(Location::EMPTY_DATA);
        }
        let (codec, payload) = compression::compress(bytes, level)?;
        let framing = 17 + payload.len() as u64;
        let node = Node::Data { codec, raw_len: bytes.len() as u64, payload };
        Ok(Location::data(self.push(node, framing)?))
    }

    fn add_group(&mut self, children: &[Location]) -> Result<Location> {
        if children.is_empty() {
            return Ok(Location::EMPTY_GROUP);
        }
        let framing = 8 + 8 * children.len() as u64;
        Ok(Location::group(self.push(Node::Group(children.to_vec()), framing)?))
    }

    fn finalize(&mut self, root: Location) -> Result<()> {
        if self.finalized {
            return Err(Error::Closed("memory container".into()));
        }
        if !root.is_group() {
            return Err(Error::invalid(format!("root {:?} is not a group", root)));
        }
        let mut state = self.store.state.lock();
        let nodes = std::mem::take(&mut state.nodes);
        state.frozen = Some((Arc::new(nodes), root));
        self.finalized = true;
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.finalized
    }

    fn bytes_written(&self) -> u64 {
        self.store.state.lock().bytes
    }
}

/// [`ContainerReader`] over a finalized [`MemoryStore`].
///
/// Reads are lock-free slices of the frozen arena; cursor ids are still
/// validated so code written against the file backend behaves the same.
#[derive(Clone, Debug)]
pub struct MemoryReader {
    nodes: Arc<Vec<Node>>,
    root: Location,
    num_cursors: usize,
}

impl MemoryReader {
    fn node(&self, loc: Location, cursor: usize) -> Result<&Node> {
        if cursor >= self.num_cursors {
            return Err(Error::out_of_range(cursor, self.num_cursors));
        }
        let idx = loc.pos() as usize;
        idx.checked_sub(1)
            .and_then(|i| self.nodes.get(i))
            .ok_or_else(|| Error::corrupt(format!("no block at {:?}", loc)))
    }

    fn group(&self, group: Location, cursor: usize) -> Result<&[Location]> {
        if !group.is_group() {
            return Err(Error::invalid(format!("{:?} is not a group", group)));
        }
        if group.is_empty() {
            return Ok(&[]);
        }
        match self.node(group, cursor)? {
            Node::Group(children) => Ok(children),
            Node::Data { .. } => Err(Error::corrupt(format!("{:?} holds a data block", group))),
        }
    }

    fn data(&self, data: Location, cursor: usize) -> Result<Option<(Codec, u64, &[u8])>> {
        if !data.is_data() {
            return Err(Error::invalid(format!("{:?} is not a data block", data)));
        }
        if data.is_empty() {
            return Ok(None);
        }
        match self.node(data, cursor)? {
            Node::Data { codec, raw_len, payload } => Ok(Some((*codec, *raw_len, payload))),
            Node::Group(_) => Err(Error::corrupt(format!("{:?} holds a group", data))),
        }
    }
}

impl ContainerReader for MemoryReader {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn root(&self) -> Location {
        self.root
    }

    fn num_cursors(&self) -> usize {
        self.num_cursors
    }

    fn num_children(&self, group: Location, cursor: usize) -> Result<usize> {
        Ok(self.group(group, cursor)?.len())
    }

    fn child(&self, group: Location, index: usize, cursor: usize) -> Result<Location> {
        let children = self.group(group, cursor)?;
        children
            .get(index)
            .copied()
            .ok_or_else(|| Error::out_of_range(index, children.len()))
    }

    fn children(&self, group: Location, cursor: usize) -> Result<Vec<Location>> {
        Ok(self.group(group, cursor)?.to_vec())
    }

    fn read_data(&self, data: Location, cursor: usize) -> Result<Vec<u8>> {
        match self.data(data, cursor)? {
            Some((codec, raw_len, payload)) => compression::decompress(codec, payload, raw_len),
            None => Ok(Vec::new()),
        }
    }

    fn data_size(&self, data: Location, cursor: usize) -> Result<u64> {
        Ok(self.data(data, cursor)?.map_or(0, |(_, raw_len, _)| raw_len))
    }
}
