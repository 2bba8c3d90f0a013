//! # `skiplock`
//!
//! A concurrent ordered map from integer keys to values, built as a skip
//! list with one lock per node.
//!
//! ```text
//! level 2:  H ───────────────────► 9
//! level 1:  H ─────────► 4 ──────► 9
//! level 0:  H ─► 1 ────► 4 ─► 6 ─► 9 ─► 12
//! ```
//!
//! Every level is a sorted linked chain behind a head sentinel. A new key is
//! given a random number of levels (each extra level with probability `p`,
//! capped at `max_level` and at one above the current height), which yields
//! expected O(log n) search, insert and remove.
//!
//! ## Thread Safety
//!
//! `SkipList<V>` is `Send + Sync` when `V: Send + Sync`. Every operation takes
//! `&self`:
//!
//! ```rust
//! use skiplock::SkipList;
//!
//! let list: SkipList<&str> = SkipList::new();
//! assert!(list.insert("five", 5));
//! assert!(!list.insert("again", 5));
//! assert_eq!(list.get(5), Some("five"));
//! assert!(list.remove(5));
//! assert!(list.is_empty());
//! ```
//!
//! | Operation | Locks |
//! |-----------|-------|
//! | `contains`, `get` | none (generation-validated reads) |
//! | `insert` | predecessors and look-aheads on every level |
//! | `remove` | predecessors, victims and look-aheads on every level |
//!
//! Writers lock in a fixed order (top level first, left to right) with a
//! bounded wait per lock; a timeout releases the whole set and retries.
//!
//! ## Memory
//!
//! Nodes live in a slot arena. Removal recycles slots; readers that still
//! hold a handle to a recycled slot notice the generation change and
//! restart. Values are dropped when their key is removed or the list is
//! dropped.
//!
//! ## Features
//!
//! - `tracing`: structured logs of height changes, retries and contention.
//! - `mimalloc`: use mimalloc as the global allocator in the bundled driver
//!   binary and benchmarks.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod arena;
pub mod config;
mod diagnostics;
mod height;
mod link;
mod list;
mod lockset;
mod node;
pub mod ordering;
pub mod stats;
mod tracing_helpers;

/// Key type: keys compare as signed 64-bit integers.
pub type Key = i64;

pub use config::{Config, ConfigError, MAX_LEVEL_LIMIT};
pub use diagnostics::InvariantViolation;
pub use link::NodeId;
pub use list::SkipList;
pub use stats::Stats;
