//! Generation-tagged node handles and the atomic links that store them.
//!
//! A [`NodeId`] names an arena slot *and* the generation the slot had when
//! the handle was taken. Slots bump their generation when freed, so a handle
//! that outlives its node is detected instead of followed.
//!
//! Links pack `(generation << 32) | index` into one `u64`. Live generations are
//! even, so the all-ones pattern can never be a live handle and serves as the
//! "no neighbor" encoding.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Encoding of an empty link.
const NIL: u64 = u64::MAX;

/// Handle to a node slot in the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index inside the arena.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was issued.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    const fn pack(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    #[inline]
    #[expect(clippy::cast_possible_truncation, reason = "unpacking two u32 halves")]
    const fn unpack(raw: u64) -> Option<Self> {
        if raw == NIL {
            None
        } else {
            Some(Self {
                index: raw as u32,
                generation: (raw >> 32) as u32,
            })
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// An atomic `Option<NodeId>`.
pub(crate) struct Link {
    raw: AtomicU64,
}

impl Link {
    pub(crate) const fn empty() -> Self {
        Self {
            raw: AtomicU64::new(NIL),
        }
    }

    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> Option<NodeId> {
        NodeId::unpack(self.raw.load(order))
    }

    #[inline]
    pub(crate) fn store(&self, target: Option<NodeId>, order: Ordering) {
        self.raw.store(target.map_or(NIL, NodeId::pack), order);
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Link")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}
