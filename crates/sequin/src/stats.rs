//! Optional counters describing what a parallel call did.
//!
//! Attach a shared [`Stats`] with [`ParallelConfig::with_stats`] to observe a
//! call while it runs or after it returns. Counters only ever grow, except
//! `live_threads`, which returns to its starting value once the call has
//! joined every thread it started.
//!
//! [`ParallelConfig::with_stats`]: crate::ParallelConfig::with_stats

use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

#[cfg(feature = "cache-padded")]
type Counter<T> = crossbeam_utils::CachePadded<T>;
#[cfg(not(feature = "cache-padded"))]
type Counter<T> = T;

/// Shared counters, updated by every thread of a call.
#[derive(Debug, Default)]
pub struct Stats {
    live_threads: Counter<AtomicUsize>,
    peak_threads: Counter<AtomicUsize>,
    dispatched: Counter<AtomicU64>,
    completed: Counter<AtomicU64>,
    emitted: Counter<AtomicU64>,
    peak_pending: Counter<AtomicUsize>,
}

/// A point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StatsSnapshot {
    /// Engine threads currently running.
    pub live_threads: usize,
    /// Most engine threads ever running at once.
    pub peak_threads: usize,
    /// Elements handed to the worker pool.
    pub dispatched: u64,
    /// Elements fully processed by a worker.
    pub completed: u64,
    /// Values delivered to the consumer.
    pub emitted: u64,
    /// Most results ever held by the ordering buffer at once.
    pub peak_pending: usize,
}

impl Stats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine threads currently running.
    pub fn live_threads(&self) -> usize {
        self.live_threads.load(Ordering::Acquire)
    }

    /// Most results ever held by the ordering buffer at once.
    pub fn peak_pending(&self) -> usize {
        self.peak_pending.load(Ordering::Relaxed)
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            live_threads: self.live_threads(),
            peak_threads: self.peak_threads.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            peak_pending: self.peak_pending(),
        }
    }

    pub(crate) fn thread_started(&self) {
        let live = self.live_threads.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_threads.fetch_max(live, Ordering::Relaxed);
    }

    pub(crate) fn thread_stopped(&self) {
        self.live_threads.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pending(&self, pending: usize) {
        self.peak_pending.fetch_max(pending, Ordering::Relaxed);
    }
}

/// Counts one engine thread as live for as long as it is held.
pub(crate) struct ThreadGuard<'a>(Option<&'a Stats>);

impl<'a> ThreadGuard<'a> {
    pub(crate) fn enter(stats: Option<&'a Stats>) -> Self {
        if let Some(stats) = stats {
            stats.thread_started();
        }
        Self(stats)
    }
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        if let Some(stats) = self.0 {
            stats.thread_stopped();
        }
    }
}
