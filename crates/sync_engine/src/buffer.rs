//! Per-stream delay buffer with nearest-timestamp lookup.
//!
//! Uses index-based separation:
//! - HeapRb stores lightweight metadata (timestamp + slab key) in arrival order
//! - Slab stores the normalized tiles
//!
//! Timestamps in the index are non-decreasing, so retention eviction only
//! ever pops from the front and lookups can stop at the first entry past
//! the target.

use std::fmt;

use contracts::ImageData;
use ringbuf::{traits::*, HeapRb};
use slab::Slab;

/// A normalized frame ready to be blitted
#[derive(Debug, Clone)]
pub struct Tile {
    pub image: ImageData,
    /// Capture timestamp (shared clock, seconds)
    pub captured_at: f64,
    pub sequence: u64,
}

/// Lightweight metadata stored in ring buffer
#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    timestamp: f64,
    slab_key: usize,
}

/// Time-ordered history of one stream's tiles
pub struct DelayBuffer {
    index: HeapRb<FrameMeta>,
    storage: Slab<Tile>,
    capacity: usize,
    /// Last accepted entry, kept so pushes never walk the ring
    newest: Option<FrameMeta>,
    dropped_count: u64,
    out_of_order_count: u64,
    evicted_count: u64,
}

impl fmt::Debug for DelayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayBuffer")
            .field("len", &self.index.occupied_len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped_count)
            .field("evicted", &self.evicted_count)
            .finish()
    }
}

impl DelayBuffer {
    /// Create a buffer holding at most `capacity` tiles
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: HeapRb::new(capacity),
            storage: Slab::with_capacity(capacity),
            capacity,
            newest: None,
            dropped_count: 0,
            out_of_order_count: 0,
            evicted_count: 0,
        }
    }

    /// Append a tile.
    ///
    /// Tiles older than the newest entry are rejected to keep the history
    /// ordered. When full, the oldest tile is overwritten.
    pub fn push(&mut self, tile: Tile) -> bool {
        let timestamp = tile.captured_at;
        if !timestamp.is_finite() {
            self.dropped_count += 1;
            return false;
        }
        if self.newest_timestamp().is_some_and(|last| timestamp < last) {
            self.out_of_order_count += 1;
            return false;
        }

        if self.index.is_full() {
            if let Some(old) = self.index.try_pop() {
                self.storage.remove(old.slab_key);
            }
            self.dropped_count += 1;
        }

        let slab_key = self.storage.insert(tile);
        let meta = FrameMeta {
            timestamp,
            slab_key,
        };
        let _ = self.index.try_push(meta);
        self.newest = Some(meta);
        true
    }

    /// Raise the capacity to `capacity`, keeping every buffered tile.
    ///
    /// Returns false when the buffer is already at least that large.
    pub fn grow(&mut self, capacity: usize) -> bool {
        if capacity <= self.capacity {
            return false;
        }
        let mut index = HeapRb::new(capacity);
        while let Some(meta) = self.index.try_pop() {
            let _ = index.try_push(meta);
        }
        self.index = index;
        self.storage.reserve(capacity - self.storage.len());
        self.capacity = capacity;
        true
    }

    /// Tile whose timestamp is nearest to `target` (ties go to the older tile)
    pub fn nearest(&self, target: f64) -> Option<&Tile> {
        let mut best: Option<(f64, usize)> = None;
        for meta in self.index.iter() {
            let distance = (meta.timestamp - target).abs();
            match best {
                Some((best_distance, _)) if distance >= best_distance => {
                    // ordered: once past the target distances only grow
                    if meta.timestamp > target {
                        break;
                    }
                }
                _ => best = Some((distance, meta.slab_key)),
            }
        }
        best.and_then(|(_, key)| self.storage.get(key))
    }

    /// Most recent tile
    pub fn latest(&self) -> Option<&Tile> {
        self.newest
            .and_then(|meta| self.storage.get(meta.slab_key))
    }

    /// Drop tiles captured before `cutoff`
    pub fn evict_before(&mut self, cutoff: f64) -> usize {
        let mut evicted = 0;
        while self
            .index
            .iter()
            .next()
            .is_some_and(|meta| meta.timestamp < cutoff)
        {
            if let Some(meta) = self.index.try_pop() {
                self.storage.remove(meta.slab_key);
                evicted += 1;
            }
        }
        if self.index.is_empty() {
            self.newest = None;
        }
        self.evicted_count += evicted as u64;
        evicted
    }

    /// Drop tiles whose age at `now` exceeds `retention_s`
    pub fn evict_expired(&mut self, now: f64, retention_s: f64) -> usize {
        self.evict_before(now - retention_s)
    }

    /// Discard everything
    pub fn clear(&mut self) {
        while let Some(meta) = self.index.try_pop() {
            self.storage.remove(meta.slab_key);
        }
        self.newest = None;
    }

    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest_timestamp(&self) -> Option<f64> {
        self.index.iter().next().map(|meta| meta.timestamp)
    }

    pub fn newest_timestamp(&self) -> Option<f64> {
        self.newest.map(|meta| meta.timestamp)
    }

    /// Tiles lost to capacity overflow or invalid timestamps
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }

    /// Tiles removed by retention eviction
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tile(timestamp: f64) -> Tile {
        Tile {
            image: ImageData::filled(2, 2, [0, 0, 0]),
            captured_at: timestamp,
            sequence: (timestamp * 1000.0) as u64,
        }
    }

    #[test]
    fn test_nearest_lookup() {
        let mut buffer = DelayBuffer::new(16);
        for t in [1.0, 1.033, 1.066, 1.1] {
            buffer.push(make_tile(t));
        }

        assert_eq!(buffer.nearest(1.05).unwrap().captured_at, 1.066);
        assert_eq!(buffer.nearest(1.04).unwrap().captured_at, 1.033);
        // Before the oldest / after the newest clamp to the ends
        assert_eq!(buffer.nearest(0.0).unwrap().captured_at, 1.0);
        assert_eq!(buffer.nearest(9.0).unwrap().captured_at, 1.1);
        assert!(DelayBuffer::new(4).nearest(1.0).is_none());
    }

    #[test]
    fn test_rejects_out_of_order() {
        let mut buffer = DelayBuffer::new(8);
        assert!(buffer.push(make_tile(2.0)));
        assert!(!buffer.push(make_tile(1.0)));
        assert!(buffer.push(make_tile(2.0)));
        assert!(!buffer.push(make_tile(f64::NAN)));

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.out_of_order_count(), 1);
        assert_eq!(buffer.dropped_count(), 1);
    }

    #[test]
    fn test_capacity_overwrites_oldest() {
        let mut buffer = DelayBuffer::new(3);
        for t in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(make_tile(t));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.dropped_count(), 1);
        assert_eq!(buffer.oldest_timestamp(), Some(2.0));
        assert_eq!(buffer.latest().unwrap().captured_at, 4.0);
    }

    #[test]
    fn test_retention_eviction() {
        let mut buffer = DelayBuffer::new(10);
        for t in [0.0, 0.5, 1.5, 2.0] {
            buffer.push(make_tile(t));
        }

        let evicted = buffer.evict_expired(2.0, 1.0);
        assert_eq!(evicted, 2);
        assert_eq!(buffer.oldest_timestamp(), Some(1.5));
        assert_eq!(buffer.evicted_count(), 2);

        // Slab slots are reused after eviction
        buffer.push(make_tile(2.5));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_clear() {
        let mut buffer = DelayBuffer::new(4);
        buffer.push(make_tile(1.0));
        buffer.push(make_tile(2.0));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_newest_follows_push_evict_and_clear() {
        let mut buffer = DelayBuffer::new(2);
        assert_eq!(buffer.newest_timestamp(), None);
        for t in [1.0, 2.0, 3.0] {
            buffer.push(make_tile(t));
            assert_eq!(buffer.newest_timestamp(), Some(t));
        }
        // overflow dropped 1.0, newest untouched
        assert_eq!(buffer.oldest_timestamp(), Some(2.0));
        assert_eq!(buffer.latest().unwrap().captured_at, 3.0);

        buffer.evict_before(2.5);
        assert_eq!(buffer.newest_timestamp(), Some(3.0));
        buffer.evict_before(10.0);
        assert_eq!(buffer.newest_timestamp(), None);
        assert!(buffer.latest().is_none());

        buffer.push(make_tile(4.0));
        buffer.clear();
        assert_eq!(buffer.newest_timestamp(), None);
    }

    #[test]
    fn test_grow_keeps_history() {
        let mut buffer = DelayBuffer::new(3);
        for t in [1.0, 2.0, 3.0] {
            buffer.push(make_tile(t));
        }
        assert!(!buffer.grow(2));
        assert!(buffer.grow(5));
        assert_eq!(buffer.capacity(), 5);

        for t in [4.0, 5.0] {
            buffer.push(make_tile(t));
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.dropped_count(), 0);
        assert_eq!(buffer.oldest_timestamp(), Some(1.0));
        assert_eq!(buffer.nearest(2.9).unwrap().captured_at, 3.0);
        assert_eq!(buffer.latest().unwrap().captured_at, 5.0);
    }
}
