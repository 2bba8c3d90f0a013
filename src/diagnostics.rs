//! Structure dumps and self-checks.
//!
//! Everything here walks the list without locks. On a list that is being
//! mutated the output is a best-effort picture; on a quiescent list it is
//! exact, and [`SkipList::check_invariants`] is meaningful.

use std::collections::HashSet;
use std::fmt as StdFmt;

use crate::Key;
use crate::link::NodeId;
use crate::list::SkipList;
use crate::node::NodeView;
use crate::ordering::{READ_ORD, RELAXED};

// ============================================================================
//  InvariantViolation
// ============================================================================

/// A structural rule the list broke. Levels count from the bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Keys on a level are not strictly increasing.
    OutOfOrder {
        /// Level of the offending pair.
        level: usize,
        /// Left key.
        prev: Key,
        /// Right key, not greater than `prev`.
        next: Key,
    },

    /// A node above level 0 has no `down` link.
    MissingDown {
        /// Level of the node.
        level: usize,
        /// Its key.
        key: Key,
    },

    /// A node's `down` link leads to a different key.
    DownKeyMismatch {
        /// Level of the node.
        level: usize,
        /// Its key.
        key: Key,
        /// Key found one level lower.
        found: Key,
    },

    /// A node's `down` target is not linked into the level below.
    NotContained {
        /// Level of the node.
        level: usize,
        /// Its key.
        key: Key,
    },

    /// A level-0 node has a `down` link.
    BottomHasDown {
        /// The node's key.
        key: Key,
    },

    /// A link leads to a recycled slot or to a node marked removed.
    StaleLink {
        /// Level of the link.
        level: usize,
        /// The handle found.
        id: NodeId,
    },

    /// The head chain is broken: a `down` link from a head does not lead to a
    /// head, or a head is missing.
    HeadChainBroken {
        /// Level where the chain broke.
        level: usize,
    },

    /// The recorded height differs from the number of head sentinels.
    HeightMismatch {
        /// Value of the height counter.
        recorded: usize,
        /// Heads reachable from the top pointer.
        actual: usize,
    },

    /// The recorded size differs from the number of level-0 nodes.
    SizeMismatch {
        /// Value of the size counter.
        recorded: usize,
        /// Nodes found on level 0.
        actual: usize,
    },
}

impl StdFmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::OutOfOrder { level, prev, next } => {
                write!(f, "level {level}: key {next} follows {prev}")
            }

            Self::MissingDown { level, key } => {
                write!(f, "level {level}: key {key} has no down link")
            }

            Self::DownKeyMismatch { level, key, found } => {
                write!(f, "level {level}: key {key} points down to key {found}")
            }

            Self::NotContained { level, key } => {
                write!(
                    f,
                    "level {level}: key {key} is missing from level {}",
                    level.saturating_sub(1)
                )
            }

            Self::BottomHasDown { key } => write!(f, "level 0: key {key} has a down link"),

            Self::StaleLink { level, id } => {
                write!(f, "level {level}: link to dead node {id:?}")
            }

            Self::HeadChainBroken { level } => write!(f, "head chain broken at level {level}"),

            Self::HeightMismatch { recorded, actual } => {
                write!(f, "height is {recorded} but {actual} levels exist")
            }

            Self::SizeMismatch { recorded, actual } => {
                write!(f, "size is {recorded} but level 0 holds {actual} keys")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

// ============================================================================
//  Walks
// ============================================================================

/// One level as seen by a walk: its head and its data nodes in order.
struct LevelWalk {
    head: NodeId,
    head_view: NodeView,
    nodes: Vec<(NodeId, NodeView)>,
}

/// Why a walk stopped early.
enum WalkError {
    Stale { level_from_top: usize, id: NodeId },
    NotHead { level_from_top: usize },
}

impl<V> SkipList<V> {
    /// Every level, top first. Fails on the first unreadable node.
    fn walk(&self) -> Result<Vec<LevelWalk>, WalkError> {
        let mut levels = Vec::with_capacity(self.height());
        let mut next_head = self.top.load(READ_ORD);

        while let Some(head) = next_head {
            let level_from_top = levels.len();
            let head_view = self
                .arena
                .read(head)
                .ok_or(WalkError::Stale { level_from_top, id: head })?;
            if !head_view.is_head {
                return Err(WalkError::NotHead { level_from_top });
            }

            let mut nodes = Vec::new();
            let mut cursor = head_view.right;
            while let Some(id) = cursor {
                let view = self
                    .arena
                    .read(id)
                    .ok_or(WalkError::Stale { level_from_top, id })?;
                cursor = view.right;
                nodes.push((id, view));
            }

            next_head = head_view.down;
            levels.push(LevelWalk {
                head,
                head_view,
                nodes,
            });
        }

        Ok(levels)
    }

    /// Keys on each level, top level first.
    ///
    /// Stops at the first level it cannot read consistently, so under
    /// concurrent mutation the result may be missing lower levels.
    #[must_use]
    pub fn level_keys(&self) -> Vec<Vec<Key>> {
        let mut out = Vec::with_capacity(self.height());
        let mut next_head = self.top.load(READ_ORD);

        'levels: while let Some(head) = next_head {
            let Some(head_view) = self.arena.read(head) else {
                break;
            };

            let mut keys = Vec::new();
            let mut cursor = head_view.right;
            while let Some(id) = cursor {
                let Some(view) = self.arena.read(id) else {
                    break 'levels;
                };
                keys.push(view.key);
                cursor = view.right;
            }

            out.push(keys);
            next_head = head_view.down;
        }

        out
    }

    /// Multi-line picture of the list:
    ///
    /// ```text
    /// SkipList<2, 3>:
    /// -inf--->3
    /// -inf--->1--->3--->5
    ///
    /// ```
    ///
    /// The header shows height and size; then one line per level, top level
    /// first; then an empty line.
    #[must_use]
    pub fn dump(&self) -> String {
        self.to_string()
    }

    /// Verify every structural rule. Meant for quiescent lists.
    ///
    /// # Errors
    ///
    /// The first [`InvariantViolation`] found, scanning top level first.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let levels = self.walk().map_err(|err| {
            let height = self.height();
            match err {
                WalkError::Stale { level_from_top, id } => InvariantViolation::StaleLink {
                    level: height.saturating_sub(level_from_top + 1),
                    id,
                },
                WalkError::NotHead { level_from_top } => InvariantViolation::HeadChainBroken {
                    level: height.saturating_sub(level_from_top + 1),
                },
            }
        })?;

        let recorded = self.height.load(RELAXED);
        if levels.len() != recorded || levels.is_empty() {
            return Err(InvariantViolation::HeightMismatch {
                recorded,
                actual: levels.len(),
            });
        }

        let top = levels.len();
        for (i, walk) in levels.iter().enumerate() {
            let level = top - 1 - i;
            let below: Option<&LevelWalk> = levels.get(i + 1);

            match (below, walk.head_view.down) {
                (Some(lower), Some(down)) if down == lower.head => {}
                (None, None) => {}
                _ => return Err(InvariantViolation::HeadChainBroken { level }),
            }

            let lower_ids: HashSet<NodeId> = below
                .map(|lower| lower.nodes.iter().map(|(id, _)| *id).collect())
                .unwrap_or_default();

            let mut prev: Option<Key> = None;
            for &(id, view) in &walk.nodes {
                if view.marked || view.is_head {
                    return Err(InvariantViolation::StaleLink { level, id });
                }
                match prev {
                    Some(prev) if view.key <= prev => {
                        return Err(InvariantViolation::OutOfOrder {
                            level,
                            prev,
                            next: view.key,
                        });
                    }
                    _ => {}
                }
                prev = Some(view.key);

                self.check_down(level, view, &lower_ids)?;
            }
        }

        let recorded = self.size.load(RELAXED);
        let actual = levels.last().map_or(0, |bottom| bottom.nodes.len());
        if recorded != actual {
            return Err(InvariantViolation::SizeMismatch { recorded, actual });
        }

        Ok(())
    }

    fn check_down(
        &self,
        level: usize,
        view: NodeView,
        lower_ids: &HashSet<NodeId>,
    ) -> Result<(), InvariantViolation> {
        let key = view.key;
        if level == 0 {
            return match view.down {
                Some(_) => Err(InvariantViolation::BottomHasDown { key }),
                None => Ok(()),
            };
        }

        let down = view
            .down
            .ok_or(InvariantViolation::MissingDown { level, key })?;
        let down_view = self
            .arena
            .read(down)
            .ok_or(InvariantViolation::StaleLink { level, id: down })?;
        if down_view.key != key {
            return Err(InvariantViolation::DownKeyMismatch {
                level,
                key,
                found: down_view.key,
            });
        }
        if !lower_ids.contains(&down) {
            return Err(InvariantViolation::NotContained { level, key });
        }
        Ok(())
    }
}

impl<V> StdFmt::Display for SkipList<V> {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(f, "SkipList<{}, {}>:", self.height(), self.len())?;
        for keys in self.level_keys() {
            f.write_str("-inf")?;
            for key in keys {
                write!(f, "--->{key}")?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }
}
