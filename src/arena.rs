//! Slot arena for skip list nodes.
//!
//! Nodes never move and are never deallocated while the list is alive.
//! Removing a node vacates its slot (bumping the slot generation) and puts the
//! index on a free list; the next allocation may reuse it. Stale [`NodeId`]s
//! are caught by the generation check in [`Node::read`] and by the lock
//! protocol's validation step.
//!
//! # Layout
//!
//! Slots live in segments that double in size: segment `s` holds
//! `FIRST_SEGMENT << s` slots. A segment is created on first use and then
//! stays put, so `&Node<V>` borrows taken from the arena stay valid for as
//! long as the arena does.
//!
//! ```text
//! index:    0 .. 63 | 64 .. 191 | 192 .. 447 | ...
//! segment:     0    |     1     |     2      | ...
//! ```

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, AtomicUsize};

use parking_lot::Mutex;

use crate::link::NodeId;
use crate::node::{Node, NodeInit, NodeView};
use crate::ordering::RELAXED;
use crate::tracing_helpers::trace_log;

/// log2 of the first segment's slot count.
const FIRST_SEGMENT_BITS: u32 = 6;

/// Slots in segment 0.
const FIRST_SEGMENT: u64 = 1 << FIRST_SEGMENT_BITS;

/// Enough segments to address every `u32` index.
const SEGMENTS: usize = (u32::BITS - FIRST_SEGMENT_BITS + 1) as usize;

/// Largest number of slots the arena hands out.
pub const MAX_SLOTS: u64 = u32::MAX as u64;

/// Map a slot index to `(segment, offset)`.
#[inline]
#[expect(clippy::cast_possible_truncation, reason = "segment < 32, offset < 2^32")]
const fn locate(index: u32) -> (usize, usize) {
    let biased = index as u64 + FIRST_SEGMENT;
    let top_bit = u64::BITS - 1 - biased.leading_zeros();
    let segment = top_bit - FIRST_SEGMENT_BITS;
    let offset = biased - (1 << top_bit);
    (segment as usize, offset as usize)
}

/// Segmented slot arena with a free list.
pub(crate) struct NodeArena<V> {
    segments: Box<[OnceLock<Box<[Node<V>]>>]>,

    /// High-water mark: slots `0..next` have been handed out at least once.
    next: AtomicU64,

    /// Vacated slots, reused LIFO.
    free: Mutex<Vec<u32>>,

    /// Occupied slots.
    live: AtomicUsize,
}

impl<V> NodeArena<V> {
    pub(crate) fn new() -> Self {
        Self {
            segments: (0..SEGMENTS).map(|_| OnceLock::new()).collect(),
            next: AtomicU64::new(0),
            free: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
        }
    }

    /// Occupy a slot with a new node and return its handle.
    ///
    /// # Panics
    ///
    /// Panics if all `u32` slot indices are in use. Node allocation failure
    /// is fatal, the same way a failed heap allocation is.
    pub(crate) fn alloc(&self, init: NodeInit<V>) -> NodeId {
        let index: u32 = match self.free.lock().pop() {
            Some(index) => index,
            None => self.fresh_index(),
        };

        let generation: u32 = self.slot(index).init(init);
        self.live.fetch_add(1, RELAXED);
        trace_log!(index, generation, "arena: slot occupied");
        NodeId::new(index, generation)
    }

    /// Vacate the slot behind `id`. A stale handle is ignored.
    pub(crate) fn free(&self, id: NodeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        debug_assert!(node.is_live(id), "double free of {id:?}");
        if !node.is_live(id) {
            return;
        }

        let payload: Option<V> = node.retire();
        self.free.lock().push(id.index());
        self.live.fetch_sub(1, RELAXED);
        trace_log!(index = id.index(), "arena: slot vacated");

        // Drop user data after every arena lock is released.
        drop(payload);
    }

    /// The slot `id` points into. Does not check the generation.
    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> Option<&Node<V>> {
        let (segment, offset) = locate(id.index());
        self.segments.get(segment)?.get()?.get(offset)
    }

    /// Snapshot the node behind `id`, or `None` if it is gone.
    #[inline]
    pub(crate) fn read(&self, id: NodeId) -> Option<NodeView> {
        self.node(id)?.read(id)
    }

    /// Number of occupied slots.
    pub(crate) fn live(&self) -> usize {
        self.live.load(RELAXED)
    }

    /// Number of slots ever handed out (occupied or on the free list).
    pub(crate) fn high_water(&self) -> u64 {
        self.next.load(RELAXED).min(MAX_SLOTS)
    }

    fn fresh_index(&self) -> u32 {
        let raw: u64 = self.next.fetch_add(1, RELAXED);
        match u32::try_from(raw) {
            Ok(index) if raw < MAX_SLOTS => index,
            _ => panic!("node arena exhausted after {MAX_SLOTS} slots"),
        }
    }

    /// The slot for `index`, creating its segment on first use.
    fn slot(&self, index: u32) -> &Node<V> {
        let (segment, offset) = locate(index);
        let nodes = self.segments[segment].get_or_init(|| {
            let len = 1_usize << (FIRST_SEGMENT_BITS as usize + segment);
            trace_log!(segment, len, "arena: new segment");
            (0..len).map(|_| Node::vacant()).collect()
        });
        &nodes[offset]
    }
}

impl<V> std::fmt::Debug for NodeArena<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeArena")
            .field("live", &self.live())
            .field("high_water", &self.high_water())
            .field("free", &self.free.lock().len())
            .finish_non_exhaustive()
    }
}
