//! Per-sink counters, shared between the handle and its worker

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Delivery counters of one sink.
///
/// Written by the worker task, read by whoever holds the handle.
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queued: AtomicUsize,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    /// Global tracks carried by written batches
    tracks_written: AtomicU64,
    /// Fusion cycle of the most recent successful write (0 = none yet)
    last_cycle: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_queued(&self, len: usize) {
        self.queued.store(len, Ordering::Relaxed);
    }

    /// A batch of `tracks` tracks from `cycle` reached the sink
    pub fn record_written(&self, cycle: u64, tracks: usize) {
        self.written.fetch_add(1, Ordering::Relaxed);
        self.tracks_written
            .fetch_add(tracks as u64, Ordering::Relaxed);
        self.last_cycle.fetch_max(cycle, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed(),
            dropped: self.dropped(),
            tracks_written: self.tracks_written.load(Ordering::Relaxed),
            last_cycle: self.last_cycle.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SinkMetrics`] for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queued: usize,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
    pub tracks_written: u64,
    pub last_cycle: u64,
}

impl MetricsSnapshot {
    /// Batches handed to this sink, delivered or not
    pub fn offered(&self) -> u64 {
        self.written + self.failed + self.dropped + self.queued as u64
    }
}
