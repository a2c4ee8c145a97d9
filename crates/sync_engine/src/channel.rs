//! Per-stream runtime state owned by the engine

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use contracts::{
    ImageData, ReadOutcome, StreamDescriptor, StreamHealthState, StreamId, StreamSource,
    SyncEngineConfig, TileSource, MAX_DELAY_MS,
};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::buffer::{DelayBuffer, Tile};
use crate::combiner::PlaceholderKind;
use crate::health::{lock_health, HealthEvent, SharedHealth, StreamHealth};

/// Tiles a fresh stream can hold before its input rate is known
const INITIAL_BUFFERED_FRAMES: usize = 64;

/// Hard ceiling on buffered tiles per stream: the longest delay plus purge
/// margin (7 s) up to ~460 fps
const MAX_BUFFERED_FRAMES: usize = 4096;

/// Capacity kept above rate × retention
const BUFFER_HEADROOM: f64 = 1.25;

/// Frames used for the input fps estimate
const FPS_WINDOW: usize = 30;

/// Operator view of one stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub stream_id: StreamId,
    pub name: String,
    pub enabled: bool,
    pub health: StreamHealthState,
    pub delay_ms: u32,
    /// Measured input rate over the last frames
    pub fps: f64,
    pub frames_read: u64,
    pub read_failures: u64,
    pub buffer_depth: usize,
    pub last_error: Option<String>,
}

/// Success / failure counters with periodic logging
#[derive(Debug, Default)]
pub(crate) struct ReadStats {
    pub successes: u64,
    pub failures: u64,
    window_successes: u64,
    window_failures: u64,
}

impl ReadStats {
    fn record_success(&mut self, stream_id: StreamId, config: &SyncEngineConfig) {
        self.successes += 1;
        self.window_successes += 1;
        if self.window_successes < config.read_stats_interval {
            return;
        }

        let attempts = self.window_successes + self.window_failures;
        let ratio = self.window_failures as f64 / attempts as f64;
        if ratio > config.read_failure_warn_ratio {
            warn!(
                stream_id,
                successes = self.successes,
                failures = self.failures,
                failure_ratio = ratio,
                "high read failure rate"
            );
        } else {
            debug!(
                stream_id,
                successes = self.successes,
                failures = self.failures,
                failure_ratio = ratio,
                "read statistics"
            );
        }
        self.window_successes = 0;
        self.window_failures = 0;
    }

    fn record_failure(&mut self) {
        self.failures += 1;
        self.window_failures += 1;
    }
}

/// Input rate over a sliding window of capture timestamps
#[derive(Debug, Default)]
pub(crate) struct FpsMeter {
    stamps: VecDeque<f64>,
}

impl FpsMeter {
    fn record(&mut self, timestamp: f64) {
        if self.stamps.len() == FPS_WINDOW {
            self.stamps.pop_front();
        }
        self.stamps.push_back(timestamp);
    }

    pub fn fps(&self) -> f64 {
        match (self.stamps.front(), self.stamps.back()) {
            (Some(first), Some(last)) if last > first => {
                (self.stamps.len() - 1) as f64 / (last - first)
            }
            _ => 0.0,
        }
    }

    fn clear(&mut self) {
        self.stamps.clear();
    }
}

/// What the combiner should draw for one stream this cycle
pub(crate) enum TileChoice {
    Frame { image: ImageData, source: TileSource },
    Placeholder(PlaceholderKind),
}

/// One stream: source, health, delay buffer and caches
pub(crate) struct StreamChannel {
    pub descriptor: StreamDescriptor,
    pub source: Arc<dyn StreamSource>,
    pub health: SharedHealth,
    pub buffer: DelayBuffer,
    pub last_good: Option<Tile>,
    pub delay_ms: u32,
    pub stats: ReadStats,
    pub fps: FpsMeter,
    pub last_frame_at: Option<f64>,
    /// Health epoch whose frames the buffer holds
    seen_epoch: u64,
    /// Open / reconnect task, at most one at a time
    pub supervisor: Option<JoinHandle<()>>,
    /// Held by a blocking `open` until it returns, even after its
    /// supervisor was aborted
    pub open_gate: Arc<Semaphore>,
}

impl StreamChannel {
    pub fn new(source: Arc<dyn StreamSource>, init_deadline: f64) -> Self {
        let descriptor = source.descriptor().clone();
        let health = StreamHealth::new(descriptor.id, init_deadline);
        Self {
            delay_ms: descriptor.delay_ms.min(MAX_DELAY_MS),
            descriptor,
            source,
            health: Arc::new(Mutex::new(health)),
            buffer: DelayBuffer::new(INITIAL_BUFFERED_FRAMES),
            last_good: None,
            stats: ReadStats::default(),
            fps: FpsMeter::default(),
            last_frame_at: None,
            seen_epoch: 0,
            supervisor: None,
            open_gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn id(&self) -> StreamId {
        self.descriptor.id
    }

    pub fn state(&self) -> StreamHealthState {
        lock_health(&self.health).state()
    }

    pub fn supervisor_active(&self) -> bool {
        self.supervisor.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn abort_supervisor(&mut self) -> Option<JoinHandle<()>> {
        let task = self.supervisor.take()?;
        task.abort();
        Some(task)
    }

    /// Drop buffered frames and the cached tile
    pub fn discard_frames(&mut self) {
        self.buffer.clear();
        self.last_good = None;
        self.last_frame_at = None;
        self.fps.clear();
    }

    fn apply(&self, event: HealthEvent) -> Option<StreamHealthState> {
        let changed = lock_health(&self.health).apply(event);
        if let Some(state) = changed {
            observability::record_stream_health(self.id(), state);
        }
        changed
    }

    /// Read step of one cycle; returns the tile read this cycle, if any
    pub fn poll(&mut self, now: f64, config: &SyncEngineConfig) -> Option<Tile> {
        let (state, epoch, deadline) = {
            let health = lock_health(&self.health);
            (health.state(), health.epoch(), health.deadline())
        };

        if epoch != self.seen_epoch {
            info!(
                stream_id = self.id(),
                discarded = self.buffer.len(),
                "stream reopened, discarding pre-outage frames"
            );
            self.discard_frames();
            self.seen_epoch = epoch;
        }

        let fresh = match state {
            StreamHealthState::Ready => self.read(now, config, state),
            StreamHealthState::Initializing if self.source.is_open() => {
                self.read(now, config, state)
            }
            _ => None,
        };

        if fresh.is_none()
            && state == StreamHealthState::Initializing
            && deadline.is_some_and(|deadline| now >= deadline)
        {
            self.apply(HealthEvent::DeadlineElapsed);
        }

        self.evict(now, config);
        fresh
    }

    fn read(
        &mut self,
        now: f64,
        config: &SyncEngineConfig,
        state: StreamHealthState,
    ) -> Option<Tile> {
        match self.source.read() {
            ReadOutcome::Frame(frame) => {
                match ingestion::normalize_to_tile(
                    &frame.image,
                    config.tile_width,
                    config.tile_height,
                ) {
                    Ok(image) => {
                        let tile = Tile {
                            image,
                            captured_at: frame.timestamp,
                            sequence: frame.sequence,
                        };
                        if !self.buffer.push(tile.clone()) {
                            trace!(
                                stream_id = self.id(),
                                timestamp = frame.timestamp,
                                "frame not buffered"
                            );
                        }
                        self.last_good = Some(tile.clone());
                        self.last_frame_at = Some(now);
                        self.fps.record(frame.timestamp);
                        self.fit_buffer(config);
                        self.stats.record_success(self.descriptor.id, config);
                        if state == StreamHealthState::Initializing {
                            self.apply(HealthEvent::FrameRead);
                        }
                        Some(tile)
                    }
                    Err(e) => {
                        self.fail(state, format!("undecodable frame: {e}"));
                        None
                    }
                }
            }
            ReadOutcome::Pending => {
                let stalled = state == StreamHealthState::Ready
                    && self
                        .last_frame_at
                        .is_some_and(|at| now - at > config.stall_timeout_s);
                if stalled {
                    self.fail(
                        state,
                        format!("no frames for {:.1}s", config.stall_timeout_s),
                    );
                }
                None
            }
            ReadOutcome::Failed(e) => {
                self.fail(state, e.to_string());
                None
            }
        }
    }

    fn fail(&mut self, state: StreamHealthState, reason: String) {
        self.stats.record_failure();
        observability::record_stream_read_failure(self.id());
        trace!(stream_id = self.id(), reason = %reason, "stream read failed");
        if state == StreamHealthState::Ready {
            self.apply(HealthEvent::ReadFailed { reason });
        }
    }

    /// Retention: 2 s without delay, otherwise enough to cover delay + margin
    pub fn retention(&self, config: &SyncEngineConfig) -> f64 {
        if self.delay_ms == 0 {
            config.undelayed_retention_s
        } else {
            let needed = self.delay_ms as f64 / 1000.0 + config.delay_purge_margin_s;
            config.retention_s.max(needed)
        }
    }

    /// Grow the delay buffer so a whole retention window fits at the
    /// measured input rate
    fn fit_buffer(&mut self, config: &SyncEngineConfig) {
        let fps = self.fps.fps();
        let wanted = (fps * self.retention(config) * BUFFER_HEADROOM).ceil();
        if !wanted.is_finite() || wanted as usize <= self.buffer.capacity() {
            return;
        }
        let capacity = (wanted as usize).min(MAX_BUFFERED_FRAMES);
        if !self.buffer.grow(capacity) {
            return;
        }
        if capacity == MAX_BUFFERED_FRAMES {
            warn!(
                stream_id = self.id(),
                fps,
                capacity,
                "input rate exceeds delay buffer ceiling, oldest frames will be overwritten"
            );
        } else {
            debug!(stream_id = self.id(), fps, capacity, "delay buffer grown");
        }
    }

    fn evict(&mut self, now: f64, config: &SyncEngineConfig) {
        let retention = self.retention(config);
        let evicted = self.buffer.evict_expired(now, retention);
        if evicted > 0 {
            trace!(stream_id = self.id(), evicted, "buffer entries expired");
        }
    }

    /// Pick this cycle's tile for the combiner
    pub fn select(&self, now: f64, state: StreamHealthState, fresh: Option<Tile>) -> TileChoice {
        if !state.is_ready() {
            return TileChoice::Placeholder(PlaceholderKind::for_state(state));
        }

        let chosen = if self.delay_ms == 0 {
            fresh
                .map(|tile| (tile, true))
                .or_else(|| self.last_good.clone().map(|tile| (tile, false)))
                .map(|(tile, is_fresh)| {
                    let captured_at = tile.captured_at;
                    let source = if is_fresh {
                        TileSource::Fresh { captured_at }
                    } else {
                        TileSource::Cached { captured_at }
                    };
                    (tile.image, source)
                })
        } else {
            let target = now - self.delay_ms as f64 / 1000.0;
            match self.buffer.nearest(target) {
                Some(tile) => Some((
                    tile.image.clone(),
                    TileSource::Delayed {
                        captured_at: tile.captured_at,
                    },
                )),
                None => self.last_good.as_ref().map(|tile| {
                    (
                        tile.image.clone(),
                        TileSource::Cached {
                            captured_at: tile.captured_at,
                        },
                    )
                }),
            }
        };

        match chosen {
            Some((image, source)) => TileChoice::Frame { image, source },
            None => TileChoice::Placeholder(PlaceholderKind::Preparing),
        }
    }

    pub fn status(&self) -> StreamStatus {
        let health = lock_health(&self.health);
        StreamStatus {
            stream_id: self.descriptor.id,
            name: self.descriptor.name.clone(),
            enabled: self.descriptor.enabled,
            health: health.state(),
            delay_ms: self.delay_ms,
            fps: self.fps.fps(),
            frames_read: self.stats.successes,
            read_failures: self.stats.failures,
            buffer_depth: self.buffer.len(),
            last_error: health.last_error().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_meter() {
        let mut meter = FpsMeter::default();
        assert_eq!(meter.fps(), 0.0);
        for i in 0..40 {
            meter.record(i as f64 / 20.0);
        }
        assert!((meter.fps() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_read_stats_window_resets() {
        let config = SyncEngineConfig {
            read_stats_interval: 4,
            ..Default::default()
        };
        let mut stats = ReadStats::default();
        stats.record_failure();
        for _ in 0..4 {
            stats.record_success(0, &config);
        }
        assert_eq!((stats.successes, stats.failures), (4, 1));
        assert_eq!((stats.window_successes, stats.window_failures), (0, 0));
    }
}
