//! Per-engine streaming counters

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// Counters updated from the completion path, readable from any thread
#[derive(Debug, Default)]
pub struct StreamStats {
    delivered: CachePadded<AtomicU64>,
    incomplete: CachePadded<AtomicU64>,
    requeue_failures: CachePadded<AtomicU64>,
    stale: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub incomplete: u64,
    pub requeue_failures: u64,
    pub stale: u64,
    /// Completions the subsystem could not hand over
    pub dropped: u64,
}

impl StreamStats {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framestream_frames_delivered").increment(1);
    }

    pub fn record_incomplete(&self) {
        self.incomplete.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framestream_frames_incomplete").increment(1);
    }

    pub fn record_requeue_failure(&self) {
        self.requeue_failures.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framestream_requeue_failures").increment(1);
    }

    /// Completion for a buffer that is no longer part of the pool
    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("framestream_completions_dropped").increment(1);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            requeue_failures: self.requeue_failures.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
