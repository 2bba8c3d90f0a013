//! Memory orderings used for node access.
//!
//! Named constants keep the pairing between writers and readers visible at
//! each access point.

use std::sync::atomic::Ordering;

/// Reading links and keys during optimistic traversal.
/// Pairs with [`WRITE_ORD`].
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Publishing links under a node lock.
/// Pairs with [`READ_ORD`].
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Loads inside a locked region or on a node not yet published.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Loading a slot generation before trusting a handle.
pub const GEN_LOAD: Ordering = Ordering::Acquire;

/// Storing a slot generation when a node goes live.
pub const GEN_PUBLISH: Ordering = Ordering::Release;
