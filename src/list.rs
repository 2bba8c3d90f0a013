//! The skip list: level hierarchy, search and the locked write paths.
//!
//! # Structure
//!
//! ```text
//! top ─► H2 ───────────────────► 9
//!        │                       │
//!        H1 ─────────► 4 ──────► 9
//!        │             │         │
//!        H0 ─► 1 ────► 4 ─► 6 ─► 9 ─► 12
//! ```
//!
//! Each level is a sorted singly-linked chain starting at a head sentinel.
//! `down` links connect a key's copies and the heads. Only level-0 nodes
//! carry a payload.
//!
//! # Concurrency
//!
//! - Searches take no locks. They read nodes through generation-checked
//!   handles and restart from the top if a node they hold was recycled.
//! - Writers scan, lock the nodes named by the scan (see
//!   [`lockset`](crate::lockset)), validate, then mutate. A failed lock or
//!   validation releases everything and retries after a backoff.
//! - Inserts splice bottom-up; the level-0 splice makes the key visible.
//!   Removes mark the tower (level 0 first, which makes the key invisible),
//!   then unlink top-down.
//! - `height` and the top pointer change only while holding the top head's
//!   lock.

use std::fmt as StdFmt;
use std::sync::atomic::AtomicUsize;

use crate::Key;
use crate::arena::NodeArena;
use crate::config::{Config, ConfigError};
use crate::height::HeightOracle;
use crate::link::{Link, NodeId};
use crate::lockset::{
    AcquireError, Backoff, InsertPlan, Invalid, LockSet, Path, RemovePlan, Step, plan_insert,
    plan_remove,
};
use crate::node::NodeInit;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::stats::{Stats, StatsCounters};
use crate::tracing_helpers::{debug_log, trace_log, warn_log};

/// Retries after which contention is logged at warn level.
const WARN_AFTER_RETRIES: u32 = 64;

/// Why a writer is about to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Acquire(AcquireError),
    Invalid(Invalid),
}

// ============================================================================
//  SkipList
// ============================================================================

/// A concurrent ordered map from [`Key`] to `V`, built as a skip list with
/// one lock per node.
///
/// All operations take `&self`; share the list between threads with `Arc`.
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use skiplock::SkipList;
///
/// let list = Arc::new(SkipList::new());
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let list = Arc::clone(&list);
///         thread::spawn(move || {
///             for k in 0..100 {
///                 assert!(list.insert(format!("t{t}"), t * 100 + k));
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(list.len(), 400);
/// assert_eq!(list.get(250).as_deref(), Some("t2"));
/// assert!(list.remove(250));
/// assert!(!list.contains(250));
/// ```
pub struct SkipList<V> {
    pub(crate) arena: NodeArena<V>,

    /// Head of the highest level.
    pub(crate) top: Link,

    pub(crate) height: AtomicUsize,
    pub(crate) size: AtomicUsize,

    oracle: HeightOracle,
    config: Config,
    stats: StatsCounters,
}

impl<V> Default for SkipList<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> StdFmt::Debug for SkipList<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        f.debug_struct("SkipList")
            .field("height", &self.height())
            .field("len", &self.len())
            .field("config", &self.config)
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

impl<V> SkipList<V> {
    // ========================================================================
    //  Construction
    // ========================================================================

    /// Empty list with probability 0.5 and at most 16 levels.
    #[must_use]
    pub fn new() -> Self {
        Self::build(Config::default())
    }

    /// Empty list with the given promotion probability and level cap.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if `probability` is outside (0, 1) or `max_level` is
    /// outside `1..=MAX_LEVEL_LIMIT`.
    pub fn with_params(probability: f64, max_level: usize) -> Result<Self, ConfigError> {
        Self::with_config(
            Config::default()
                .probability(probability)
                .max_level(max_level),
        )
    }

    /// Empty list from a full [`Config`].
    ///
    /// # Errors
    ///
    /// Whatever [`Config::validate`] rejects.
    pub fn with_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: Config) -> Self {
        let arena = NodeArena::new();
        let head: NodeId = arena.alloc(NodeInit::head(None));
        let top = Link::empty();
        top.store(Some(head), WRITE_ORD);

        debug_log!(
            probability = config.probability,
            max_level = config.max_level,
            "SkipList: created"
        );

        Self {
            arena,
            top,
            height: AtomicUsize::new(1),
            size: AtomicUsize::new(0),
            oracle: HeightOracle::new(config.probability, config.max_level, config.seed),
            config,
            stats: StatsCounters::default(),
        }
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Number of keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.size.load(RELAXED)
    }

    /// Whether the list holds no keys.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of levels, at least 1.
    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        self.height.load(READ_ORD)
    }

    /// The parameters this list was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot of this list's contention counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    // ========================================================================
    //  Search
    // ========================================================================

    /// Whether `key` is present.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(key = key))
    )]
    pub fn contains(&self, key: Key) -> bool {
        let path = self.search(key);
        path.bottom()
            .is_some_and(|step| step.hits(key) && !step.succ_marked)
    }

    /// A copy of the value stored under `key`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(key = key))
    )]
    pub fn get(&self, key: Key) -> Option<V>
    where
        V: Clone,
    {
        loop {
            let path = self.search(key);
            let step = path.bottom()?;
            if !step.hits(key) || step.succ_marked {
                return None;
            }
            let id = step.succ?;

            match self.arena.node(id).and_then(|node| node.payload(id)) {
                Some(value) => return Some(value),
                None => {
                    // Removed and recycled between the scan and the copy.
                    self.stats.read_restart();
                    trace_log!(key, "get: node recycled, restarting");
                }
            }
        }
    }

    /// Scan from the top until a consistent path is read.
    fn search(&self, key: Key) -> Path {
        loop {
            if let Some(path) = self.scan(key) {
                return path;
            }
            self.stats.read_restart();
            trace_log!(key, "scan: stale node, restarting from top");
            std::hint::spin_loop();
        }
    }

    /// One lock-free descent. `None` if a node on the way was recycled.
    ///
    /// At each level, moves right while the next key is below `key`, records
    /// the step, then drops down.
    fn scan(&self, key: Key) -> Option<Path> {
        let mut pred: NodeId = self.top.load(READ_ORD)?;
        let mut view = self.arena.read(pred)?;
        let mut path = Path::with_capacity(self.height());

        loop {
            let (succ, succ_view) = loop {
                let Some(next) = view.right else {
                    break (None, None);
                };
                let next_view = self.arena.read(next)?;
                if next_view.key < key {
                    pred = next;
                    view = next_view;
                } else {
                    break (Some(next), Some(next_view));
                }
            };

            path.push(Step {
                pred,
                succ,
                succ_key: succ_view.map(|v| v.key),
                succ_marked: succ_view.is_some_and(|v| v.marked),
                after: succ_view.and_then(|v| v.right),
            });

            let Some(down) = view.down else {
                return Some(path);
            };
            pred = down;
            view = self.arena.read(pred)?;
        }
    }

    // ========================================================================
    //  Insert
    // ========================================================================

    /// Insert `value` under `key`.
    ///
    /// Returns `false` and drops `value` if `key` is already present; the
    /// stored value is left untouched.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(key = key))
    )]
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn insert(&self, value: V, key: Key) -> bool {
        let mut value: Option<V> = Some(value);
        let drawn: usize = self.oracle.draw(self.height());
        let mut backoff = Backoff::new();

        loop {
            let tower: usize = self.clamp_tower(drawn);
            self.ensure_height(tower);
            let path = self.search(key);

            let targets = match plan_insert(&path, key) {
                InsertPlan::Present {
                    level,
                    removing: false,
                } => {
                    self.stats.duplicate_rejection();
                    trace_log!(key, level, "insert: key present");
                    return false;
                }
                InsertPlan::Present { removing: true, .. } => {
                    // Logically absent; wait for the remover to unlink it.
                    backoff.snooze();
                    continue;
                }
                InsertPlan::Absent(targets) => targets,
            };

            if path.height() < tower {
                // The list shrank between growing and scanning.
                continue;
            }

            let locks = match LockSet::acquire(&self.arena, &targets, self.config.lock_timeout) {
                Ok(locks) => locks,
                Err(err) => {
                    self.retry("insert", key, &mut backoff, Retry::Acquire(err));
                    continue;
                }
            };

            if let Err(invalid) = locks.validate_preds(&self.arena, &path) {
                drop(locks);
                self.retry("insert", key, &mut backoff, Retry::Invalid(invalid));
                continue;
            }

            debug_assert!(locks.len() >= path.height());

            // Bottom-up: each node is complete before its pred points at it.
            let mut below: Option<NodeId> = None;
            for level in 0..tower {
                let Some(step) = path.at_level(level) else {
                    break;
                };
                let node: NodeId = self.arena.alloc(NodeInit {
                    key,
                    right: step.succ,
                    down: below,
                    is_head: false,
                    payload: if level == 0 { value.take() } else { None },
                });
                let linked = locks.relink(&self.arena, step.pred, Some(node));
                debug_assert!(linked, "insert: pred at level {level} not locked");
                below = Some(node);
            }

            self.size.fetch_add(1, RELAXED);
            trace_log!(key, tower, locks = locks.len(), "insert: linked");
            return true;
        }
    }

    /// Cap a drawn tower at one level above the current height. Removals may
    /// have shrunk the list since the draw.
    fn clamp_tower(&self, drawn: usize) -> usize {
        drawn.min(self.height() + 1)
    }

    /// Grow until the list has at least `target` levels.
    fn ensure_height(&self, target: usize) {
        while self.height() < target {
            let Some(top) = self.top.load(READ_ORD) else {
                return;
            };
            let Some(top_node) = self.arena.node(top) else {
                return;
            };

            let guard = top_node.lock();
            if self.top.load(READ_ORD) != Some(top) || !top_node.is_live(top) {
                // Someone else grew or shrank first.
                continue;
            }

            let head: NodeId = self.arena.alloc(NodeInit::head(Some(top)));
            self.top.store(Some(head), WRITE_ORD);
            self.height.fetch_add(1, WRITE_ORD);
            drop(guard);

            self.stats.height_grow();
            debug_log!(height = self.height(), "SkipList: grew");
        }
    }

    // ========================================================================
    //  Remove
    // ========================================================================

    /// Remove `key`. Returns `false` if it was not present.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(key = key))
    )]
    pub fn remove(&self, key: Key) -> bool {
        let mut backoff = Backoff::new();

        loop {
            let path = self.search(key);

            let (top_level, targets) = match plan_remove(&path, key) {
                RemovePlan::Absent => return false,
                RemovePlan::Victims { top_level, targets } => (top_level, targets),
            };

            let locks = match LockSet::acquire(&self.arena, &targets, self.config.lock_timeout) {
                Ok(locks) => locks,
                Err(err) => {
                    self.retry("remove", key, &mut backoff, Retry::Acquire(err));
                    continue;
                }
            };

            let checked = locks
                .validate_preds(&self.arena, &path)
                .and_then(|()| locks.validate_victims(&self.arena, &path, key, top_level));
            if let Err(invalid) = checked {
                drop(locks);
                self.retry("remove", key, &mut backoff, Retry::Invalid(invalid));
                continue;
            }

            // Bottom first; validation proved every level has a victim.
            let victims: Vec<(usize, NodeId)> = (0..=top_level)
                .filter_map(|level| path.at_level(level)?.succ.map(|id| (level, id)))
                .collect();

            for &(_, victim) in &victims {
                let marked = locks.mark(&self.arena, victim);
                debug_assert!(marked, "remove: victim not locked");
            }
            self.size.fetch_sub(1, RELAXED);

            let mut top_emptied = false;
            for &(level, victim) in victims.iter().rev() {
                let Some(step) = path.at_level(level) else {
                    continue;
                };
                let next: Option<NodeId> = self.arena.read(victim).and_then(|v| v.right);
                let linked = locks.relink(&self.arena, step.pred, next);
                debug_assert!(linked, "remove: pred at level {level} not locked");

                if level + 1 == path.height() && next.is_none() {
                    top_emptied = true;
                }
            }

            let old_head = if top_emptied {
                self.collapse_top(&locks, &path)
            } else {
                None
            };
            drop(locks);

            for (_, victim) in victims {
                self.arena.free(victim);
            }
            if let Some(head) = old_head {
                self.arena.free(head);
            }

            trace_log!(key, top_level, "remove: unlinked");
            return true;
        }
    }

    /// Drop the top level after a removal emptied it.
    ///
    /// Only applies when the top-level pred was the current top head and more
    /// than one level exists. The caller holds that head's lock. Returns the
    /// discarded head, which the caller frees once its locks are released.
    fn collapse_top(&self, locks: &LockSet<'_>, path: &Path) -> Option<NodeId> {
        let step = path.at_level(path.height() - 1)?;
        let head = step.pred;
        if self.top.load(READ_ORD) != Some(head) || self.height() <= 1 {
            return None;
        }

        let view = self.arena.read(head)?;
        if !view.is_head || view.right.is_some() {
            return None;
        }
        let below = view.down?;

        self.top.store(Some(below), WRITE_ORD);
        self.height.fetch_sub(1, WRITE_ORD);
        let marked = locks.mark(&self.arena, head);
        debug_assert!(marked, "collapse: top head not locked");

        self.stats.height_shrink();
        debug_log!(height = self.height(), "SkipList: shrank");
        Some(head)
    }

    // ========================================================================
    //  Retry bookkeeping
    // ========================================================================

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn retry(&self, op: &'static str, key: Key, backoff: &mut Backoff, why: Retry) {
        match why {
            Retry::Acquire(_) => self.stats.lock_timeout(),
            Retry::Invalid(_) => self.stats.validation_failure(),
        }

        if backoff.attempts() >= WARN_AFTER_RETRIES {
            warn_log!(op, key, ?why, attempts = backoff.attempts(), "heavy contention");
        } else {
            debug_log!(op, key, ?why, "lock set released, retrying");
        }
        backoff.snooze();
    }
}
