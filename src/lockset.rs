//! Lock-acquisition protocol for writers.
//!
//! A writer first scans the list without locks, producing a [`Path`]: one
//! [`Step`] per level, top level first, recording the predecessor of the
//! target key, its successor and the node after that (the look-ahead). From
//! the path it derives the set of nodes to lock, in discovery order:
//!
//! ```text
//! inserting 5:
//! level 2:  H ---------------------> 9               lock H
//! level 1:  H ---------> 4 --------> 9 --> 12        lock 4, 12
//! level 0:  H --> 1 ---> 4 --> 6 --> 9 --> 12        lock 4, 9
//! ```
//!
//! Discovery order is level descending, key ascending within a level. Every
//! writer uses the same order, and every acquisition is also bounded by the
//! configured timeout: when one times out, the whole set is released and the
//! operation backs off and rescans.
//!
//! Once the set is held, [`LockSet::validate_preds`] checks that each
//! predecessor is still live, unmarked and still points at the successor the
//! scan recorded. Any writer that could change those links needs one of the
//! held locks, so a validated set describes a frozen neighbourhood.

use std::hint as StdHint;
use std::thread;
use std::time::Duration;

use crate::Key;
use crate::arena::NodeArena;
use crate::link::NodeId;
use crate::node::NodeGuard;


// ============================================================================
//  Path
// ============================================================================

/// What the scan saw at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    /// Last node on this level with key below the target (possibly the head).
    pub pred: NodeId,

    /// `pred.right` at scan time.
    pub succ: Option<NodeId>,

    /// Key of `succ`.
    pub succ_key: Option<Key>,

    /// Whether `succ` was marked removed at scan time.
    pub succ_marked: bool,

    /// `succ.right` at scan time: the look-ahead node.
    pub after: Option<NodeId>,
}

impl Step {
    /// Whether `succ` carries `key`.
    #[inline]
    pub(crate) fn hits(&self, key: Key) -> bool {
        self.succ_key == Some(key)
    }
}

/// One [`Step`] per level, top level first.
#[derive(Debug, Clone, Default)]
pub(crate) struct Path {
    steps: Vec<Step>,
}

impl Path {
    pub(crate) fn with_capacity(levels: usize) -> Self {
        Self {
            steps: Vec::with_capacity(levels),
        }
    }

    pub(crate) fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Number of levels scanned.
    pub(crate) fn height(&self) -> usize {
        self.steps.len()
    }

    /// The step at `level`, counting from the bottom (level 0).
    pub(crate) fn at_level(&self, level: usize) -> Option<&Step> {
        let index = self.steps.len().checked_sub(level + 1)?;
        self.steps.get(index)
    }

    /// The level-0 step.
    pub(crate) fn bottom(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Steps paired with their level, top level first.
    pub(crate) fn levels(&self) -> impl Iterator<Item = (usize, &Step)> {
        let top = self.steps.len();
        self.steps
            .iter()
            .enumerate()
            .map(move |(i, step)| (top - 1 - i, step))
    }
}

// ============================================================================
//  Plans
// ============================================================================

/// Outcome of planning an insert.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum InsertPlan {
    /// The key is linked on some level; `level` is the highest one.
    Present {
        /// Level counted from the bottom.
        level: usize,
        /// The level-0 node is missing or marked: a removal is in flight and
        /// the key is already logically absent.
        removing: bool,
    },

    /// The key is absent; lock these nodes in this order.
    Absent(Vec<NodeId>),
}

/// Outcome of planning a removal.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RemovePlan {
    /// No live node carries the key at level 0.
    Absent,

    /// The key's tower occupies levels `0..=top_level`; lock these nodes.
    Victims {
        /// Highest level holding the key.
        top_level: usize,
        /// Predecessors, victims and look-aheads in lock order.
        targets: Vec<NodeId>,
    },
}

fn push_unique(targets: &mut Vec<NodeId>, id: NodeId) {
    if !targets.contains(&id) {
        targets.push(id);
    }
}

/// Decide whether an insert of `key` can proceed, and which nodes it locks.
///
/// Level 0 decides presence, as for removal. An upper copy above a missing
/// or marked level-0 node belongs to a removal that is still unlinking.
///
/// The lock set covers every scanned level, not only the levels the new
/// tower will occupy.
pub(crate) fn plan_insert(path: &Path, key: Key) -> InsertPlan {
    let present: Option<usize> = path
        .levels()
        .find(|(_, step)| step.hits(key))
        .map(|(level, _)| level);
    if let Some(level) = present {
        let live: bool = path
            .bottom()
            .is_some_and(|bottom| bottom.hits(key) && !bottom.succ_marked);
        return InsertPlan::Present {
            level,
            removing: !live,
        };
    }

    let mut targets = Vec::with_capacity(path.height() * 2);
    for (_, step) in path.levels() {
        push_unique(&mut targets, step.pred);
        if let Some(after) = step.after {
            push_unique(&mut targets, after);
        }
    }
    InsertPlan::Absent(targets)
}

/// Decide whether a removal of `key` has anything to do, and which nodes it
/// locks.
///
/// Level 0 decides: if the level-0 node is missing or already marked, the key
/// is (or is about to be) gone.
pub(crate) fn plan_remove(path: &Path, key: Key) -> RemovePlan {
    match path.bottom() {
        Some(bottom) if bottom.hits(key) && !bottom.succ_marked => {}
        _ => return RemovePlan::Absent,
    }

    let mut top_level = 0;
    let mut targets = Vec::with_capacity(path.height() * 3);
    for (level, step) in path.levels() {
        push_unique(&mut targets, step.pred);
        if let Some(succ) = step.succ {
            if step.hits(key) {
                top_level = top_level.max(level);
                push_unique(&mut targets, succ);
            }
            if let Some(after) = step.after {
                push_unique(&mut targets, after);
            }
        }
    }
    RemovePlan::Victims { top_level, targets }
}

// ============================================================================
//  LockSet
// ============================================================================

/// Why [`LockSet::acquire`] gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcquireError {
    /// Waited longer than the timeout for this node.
    TimedOut(NodeId),
    /// The handle points outside the arena.
    Missing(NodeId),
}

/// Why a held lock set no longer matches its scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invalid {
    /// Node was freed (and maybe reused) since the scan.
    Stale(NodeId),
    /// Node is marked removed.
    Marked(NodeId),
    /// `pred.right` moved at this level.
    Moved { level: usize },
    /// The key's tower is not contiguous from level 0.
    Gap { level: usize },
}

/// Guards for every node in a plan, released together on drop.
pub(crate) struct LockSet<'a> {
    held: Vec<(NodeId, NodeGuard<'a>)>,
}

impl<'a> LockSet<'a> {
    /// Lock `targets` in order, waiting at most `timeout` for each.
    ///
    /// On failure every lock taken so far is released before returning.
    pub(crate) fn acquire<V>(
        arena: &'a NodeArena<V>,
        targets: &[NodeId],
        timeout: Duration,
    ) -> Result<Self, AcquireError> {
        let mut held = Vec::with_capacity(targets.len());

        for &id in targets {
            let Some(node) = arena.node(id) else {
                return Err(AcquireError::Missing(id));
            };
            let Some(guard) = node.try_lock_for(timeout) else {
                return Err(AcquireError::TimedOut(id));
            };
            held.push((id, guard));
        }

        Ok(Self { held })
    }

    /// Number of locks held.
    pub(crate) fn len(&self) -> usize {
        self.held.len()
    }

    /// Guard for `id`, if `id` is in the set.
    pub(crate) fn guard(&self, id: NodeId) -> Option<&NodeGuard<'a>> {
        self.held
            .iter()
            .find_map(|(held, guard)| (*held == id).then_some(guard))
    }

    /// Every predecessor is live, unmarked and still points at its recorded
    /// successor.
    pub(crate) fn validate_preds<V>(&self, arena: &NodeArena<V>, path: &Path) -> Result<(), Invalid> {
        for (level, step) in path.levels() {
            debug_assert!(self.guard(step.pred).is_some(), "pred not locked");
            let view = arena.read(step.pred).ok_or(Invalid::Stale(step.pred))?;
            if view.marked {
                return Err(Invalid::Marked(step.pred));
            }
            if view.right != step.succ {
                return Err(Invalid::Moved { level });
            }
        }
        Ok(())
    }

    /// Every victim of a removal is live and unmarked, and the tower is
    /// contiguous from level 0 to `top_level`.
    pub(crate) fn validate_victims<V>(
        &self,
        arena: &NodeArena<V>,
        path: &Path,
        key: Key,
        top_level: usize,
    ) -> Result<(), Invalid> {
        for level in 0..=top_level {
            let step = path.at_level(level).ok_or(Invalid::Gap { level })?;
            let victim = match step.succ {
                Some(succ) if step.hits(key) => succ,
                _ => return Err(Invalid::Gap { level }),
            };
            let view = arena.read(victim).ok_or(Invalid::Stale(victim))?;
            if view.marked {
                return Err(Invalid::Marked(victim));
            }
        }
        Ok(())
    }

    /// Point `pred.right` at `target`. Returns `false` if `pred` is not held.
    pub(crate) fn relink<V>(&self, arena: &NodeArena<V>, pred: NodeId, target: Option<NodeId>) -> bool {
        match (arena.node(pred), self.guard(pred)) {
            (Some(node), Some(guard)) => {
                node.set_right(guard, target);
                true
            }
            _ => false,
        }
    }

    /// Mark `id` removed. Returns `false` if `id` is not held.
    pub(crate) fn mark<V>(&self, arena: &NodeArena<V>, id: NodeId) -> bool {
        match (arena.node(id), self.guard(id)) {
            (Some(node), Some(guard)) => {
                node.mark(guard);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
//  Backoff
// ============================================================================

/// Escalating pause between retries: spin, then yield, then sleep.
#[derive(Debug, Default)]
pub(crate) struct Backoff {
    step: u32,
    attempts: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 4;
    const YIELD_LIMIT: u32 = 8;
    const MAX_STEP: u32 = 18;

    pub(crate) const fn new() -> Self {
        Self {
            step: 0,
            attempts: 0,
        }
    }

    /// Pause, longer on each call until the sleep reaches about a millisecond.
    pub(crate) fn snooze(&mut self) {
        if self.step < Self::SPIN_LIMIT {
            for _ in 0..(1_u32 << self.step) {
                StdHint::spin_loop();
            }
        } else if self.step < Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            let micros = 1_u64 << (self.step - Self::YIELD_LIMIT);
            thread::sleep(Duration::from_micros(micros));
        }
        self.step = (self.step + 1).min(Self::MAX_STEP);
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Pauses taken so far.
    pub(crate) const fn attempts(&self) -> u32 {
        self.attempts
    }
}
