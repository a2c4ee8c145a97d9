//! Thread-safe handle over a `FusionEngine`
//!
//! Detection runs on blocking workers while operators read statistics from
//! the delivery side; both go through this mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{FusedTrack, FusionConfig, FusionStats, GroundPlaneTrack};

use crate::engine::FusionEngine;

/// Cloneable, mutex-guarded fusion engine
#[derive(Debug, Clone)]
pub struct SharedFusion {
    inner: Arc<Mutex<FusionEngine>>,
}

impl SharedFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self::from_engine(FusionEngine::new(config))
    }

    pub fn from_engine(engine: FusionEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Exclusive access; a poisoned lock is recovered
    pub fn lock(&self) -> MutexGuard<'_, FusionEngine> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fuse(&self, tracks: &[GroundPlaneTrack], now: f64) -> Vec<FusedTrack> {
        self.lock().fuse(tracks, now)
    }

    /// Fuse and snapshot statistics under one lock
    pub fn fuse_with_stats(
        &self,
        tracks: &[GroundPlaneTrack],
        now: f64,
    ) -> (Vec<FusedTrack>, FusionStats, u64) {
        let mut engine = self.lock();
        let fused = engine.fuse(tracks, now);
        (fused, engine.stats(), engine.cycles())
    }

    pub fn stats(&self) -> FusionStats {
        self.lock().stats()
    }

    pub fn reset(&self) {
        self.lock().reset();
    }
}

impl Default for SharedFusion {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}
