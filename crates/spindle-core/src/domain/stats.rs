//! Live counters for a periodic task.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of a task's counters.
///
/// `ticks == runs + skipped` とは限らない：Stopped で観測した tick は
/// どちらにも数えない。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Ticks observed by the worker.
    pub ticks: u64,
    /// Ticks that invoked the action.
    pub runs: u64,
    /// Ticks observed while paused.
    pub skipped: u64,
    /// Invocations that returned an error or panicked.
    pub failures: u64,
}

/// Shared counters written by the worker and read by any handle.
#[derive(Debug, Default)]
pub(crate) struct TaskCounters {
    ticks: AtomicU64,
    runs: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
}

impl TaskCounters {
    /// Record a tick, returning its 1-based number.
    pub(crate) fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn run(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fail(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TaskStats {
        TaskStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            runs: self.runs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
