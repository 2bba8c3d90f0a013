//! Per-list contention counters.
//!
//! Counters are bumped with relaxed atomics on the slow paths only (retries,
//! structural changes), so they cost nothing on an uncontended operation.
//! [`Stats`] is a point-in-time copy for reporting.

use std::fmt as StdFmt;
use std::sync::atomic::AtomicU64;

use crate::ordering::RELAXED;

/// Snapshot of a list's contention counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Lock sets abandoned because one acquisition timed out.
    pub lock_timeouts: u64,

    /// Lock sets abandoned because a recorded link changed before locking.
    pub validation_failures: u64,

    /// Searches restarted from the top after reading a recycled node.
    pub read_restarts: u64,

    /// Levels added.
    pub height_grows: u64,

    /// Levels collapsed after removals.
    pub height_shrinks: u64,

    /// Inserts rejected because the key was present.
    pub duplicate_rejections: u64,
}

impl Stats {
    /// Total retries of any kind.
    #[must_use]
    pub const fn retries(&self) -> u64 {
        self.lock_timeouts + self.validation_failures + self.read_restarts
    }
}

impl StdFmt::Display for Stats {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        writeln!(f, "lock timeouts:        {}", self.lock_timeouts)?;
        writeln!(f, "validation failures:  {}", self.validation_failures)?;
        writeln!(f, "read restarts:        {}", self.read_restarts)?;
        writeln!(f, "height grows:         {}", self.height_grows)?;
        writeln!(f, "height shrinks:       {}", self.height_shrinks)?;
        write!(f, "duplicate rejections: {}", self.duplicate_rejections)
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    lock_timeouts: AtomicU64,
    validation_failures: AtomicU64,
    read_restarts: AtomicU64,
    height_grows: AtomicU64,
    height_shrinks: AtomicU64,
    duplicate_rejections: AtomicU64,
}

impl StatsCounters {
    #[inline]
    pub(crate) fn lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn validation_failure(&self) {
        self.validation_failures.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn read_restart(&self) {
        self.read_restarts.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn height_grow(&self) {
        self.height_grows.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn height_shrink(&self) {
        self.height_shrinks.fetch_add(1, RELAXED);
    }

    #[inline]
    pub(crate) fn duplicate_rejection(&self) {
        self.duplicate_rejections.fetch_add(1, RELAXED);
    }

    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            lock_timeouts: self.lock_timeouts.load(RELAXED),
            validation_failures: self.validation_failures.load(RELAXED),
            read_restarts: self.read_restarts.load(RELAXED),
            height_grows: self.height_grows.load(RELAXED),
            height_shrinks: self.height_shrinks.load(RELAXED),
            duplicate_rejections: self.duplicate_rejections.load(RELAXED),
        }
    }
}
