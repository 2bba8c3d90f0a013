//! Node slots: one element of one level.
//!
//! A [`Node`] lives in an arena slot for the whole lifetime of the list and is
//! recycled rather than deallocated. Its `generation` works like a seqlock
//! sequence: odd while the slot is vacant, even while a node occupies it.
//!
//! # Concurrency Model
//! 1. Readers: take a [`NodeId`] from a link, call [`Node::read`], and treat
//!    `None` as "this node is gone, restart".
//! 2. Writers: hold the node's lock (see [`Node::lock`]) to change `right` or
//!    to mark the node removed. The guard releases on drop, on every path.
//! 3. The arena owns `init`/`retire`, which only run on slots nobody else can
//!    reach through a live handle.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, fence};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::Key;
use crate::link::{Link, NodeId};
use crate::ordering::{GEN_LOAD, GEN_PUBLISH, READ_ORD, RELAXED, WRITE_ORD};

#[cfg(loom)]
mod loom_tests;

/// Guard proving a node's lock is held. Releases on drop.
pub type NodeGuard<'a> = MutexGuard<'a, ()>;

/// Key stored in head sentinels.
pub const HEAD_KEY: Key = Key::MIN;

/// Consistent copy of a node's fields, taken by [`Node::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView {
    pub key: Key,
    pub right: Option<NodeId>,
    pub down: Option<NodeId>,
    pub marked: bool,
    pub is_head: bool,
}

/// Fields a fresh node starts with.
pub(crate) struct NodeInit<V> {
    pub key: Key,
    pub right: Option<NodeId>,
    pub down: Option<NodeId>,
    pub is_head: bool,
    pub payload: Option<V>,
}

impl<V> NodeInit<V> {
    /// A boundary node: minimum key, no payload, no right neighbor.
    pub(crate) const fn head(down: Option<NodeId>) -> Self {
        Self {
            key: HEAD_KEY,
            right: None,
            down,
            is_head: true,
            payload: None,
        }
    }
}

pub(crate) struct Node<V> {
    generation: AtomicU32,
    key: AtomicI64,
    right: Link,
    down: Link,
    marked: AtomicBool,
    is_head: AtomicBool,
    lock: Mutex<()>,
    payload: RwLock<Option<V>>,
}

impl<V> Node<V> {
    pub(crate) const fn vacant() -> Self {
        Self {
            generation: AtomicU32::new(1),
            key: AtomicI64::new(0),
            right: Link::empty(),
            down: Link::empty(),
            marked: AtomicBool::new(false),
            is_head: AtomicBool::new(false),
            lock: Mutex::new(()),
            payload: RwLock::new(None),
        }
    }

    // ========================================================================
    //  Lifecycle (arena only)
    // ========================================================================

    /// Occupy a vacant slot. Returns the new (even) generation.
    ///
    /// The caller must own the slot exclusively: it came off the free list or
    /// was never handed out.
    pub(crate) fn init(&self, init: NodeInit<V>) -> u32 {
        let vacant = self.generation.load(RELAXED);
        debug_assert!(vacant & 1 == 1, "init on an occupied slot");

        self.key.store(init.key, RELAXED);
        self.right.store(init.right, RELAXED);
        self.down.store(init.down, RELAXED);
        self.marked.store(false, RELAXED);
        self.is_head.store(init.is_head, RELAXED);
        *self.payload.write() = init.payload;

        let live = vacant.wrapping_add(1);
        self.generation.store(live, GEN_PUBLISH);
        live
    }

    /// Vacate the slot. Every outstanding handle to it goes stale.
    ///
    /// Returns the payload so the caller can drop it outside the slot lock.
    pub(crate) fn retire(&self) -> Option<V> {
        let live = self.generation.fetch_add(1, RELAXED);
        debug_assert!(live & 1 == 0, "retire on a vacant slot");

        // Later field writes must not become visible before the odd generation.
        fence(std::sync::atomic::Ordering::Release);
        self.payload.write().take()
    }

    // ========================================================================
    //  Optimistic reads
    // ========================================================================

    /// Whether `id` still names the node occupying this slot.
    #[inline]
    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.generation.load(GEN_LOAD) == id.generation()
    }

    /// Snapshot the node behind `id`, or `None` if the handle is stale.
    #[inline]
    pub(crate) fn read(&self, id: NodeId) -> Option<NodeView> {
        if !self.is_live(id) {
            return None;
        }

        let view = NodeView {
            key: self.key.load(READ_ORD),
            right: self.right.load(READ_ORD),
            down: self.down.load(READ_ORD),
            marked: self.marked.load(READ_ORD),
            is_head: self.is_head.load(READ_ORD),
        };

        fence(std::sync::atomic::Ordering::Acquire);
        (self.generation.load(RELAXED) == id.generation()).then_some(view)
    }

    /// Copy the payload out of the node behind `id`.
    ///
    /// `None` means either a stale handle or a node without payload; callers
    /// only ask level-0 data nodes, where a payload is always present.
    pub(crate) fn payload(&self, id: NodeId) -> Option<V>
    where
        V: Clone,
    {
        let copy = self.payload.read().clone();
        fence(std::sync::atomic::Ordering::Acquire);
        if self.generation.load(RELAXED) == id.generation() {
            copy
        } else {
            None
        }
    }

    // ========================================================================
    //  Locking
    // ========================================================================

    /// Block until this node's lock is held.
    #[must_use = "releasing a lock without using the guard is a logic error"]
    pub(crate) fn lock(&self) -> NodeGuard<'_> {
        self.lock.lock()
    }

    /// Wait at most `timeout` for this node's lock.
    #[must_use]
    pub(crate) fn try_lock_for(&self, timeout: Duration) -> Option<NodeGuard<'_>> {
        self.lock.try_lock_for(timeout)
    }

    /// Redirect `right`. The guard is proof the lock is held.
    #[inline]
    pub(crate) fn set_right(&self, _guard: &NodeGuard<'_>, target: Option<NodeId>) {
        self.right.store(target, WRITE_ORD);
    }

    /// Mark the node logically removed.
    #[inline]
    pub(crate) fn mark(&self, _guard: &NodeGuard<'_>) {
        self.marked.store(true, WRITE_ORD);
    }
}
