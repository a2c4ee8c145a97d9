//! Per-source counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Source metrics shared between the decode worker and readers
#[derive(Debug, Default)]
pub struct SourceMetrics {
    /// Frames produced by the decoder
    pub frames_decoded: AtomicU64,

    /// Frames handed out through `read`
    pub frames_read: AtomicU64,

    /// Frames replaced before anyone read them
    pub frames_overwritten: AtomicU64,

    /// Failed reads
    pub read_failures: AtomicU64,

    /// Open attempts (successful or not)
    pub open_attempts: AtomicU64,
}

impl SourceMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self) {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_overwritten(&self) {
        self.frames_overwritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_open_attempt(&self) -> u64 {
        self.open_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get snapshot
    pub fn snapshot(&self) -> SourceMetricsSnapshot {
        SourceMetricsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_overwritten: self.frames_overwritten.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            open_attempts: self.open_attempts.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceMetricsSnapshot {
    pub frames_decoded: u64,
    pub frames_read: u64,
    pub frames_overwritten: u64,
    pub read_failures: u64,
    pub open_attempts: u64,
}
