//! Main sync engine implementation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use contracts::{
    CombinedFrame, DetectionConfig, DetectionHandler, ImageData, SharedClock, StreamHealthState,
    StreamId, StreamSource, SyncEngineConfig, TileInfo, TileSource, MAX_DELAY_MS,
};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::channel::{StreamChannel, StreamStatus, TileChoice};
use crate::combiner::{placeholder_label, FrameCombiner, StreamLayout};
use crate::dispatch::{DetectionControl, DetectionDispatcher};
use crate::health::{lock_health, HealthEvent};
use crate::reconnect::{supervise, ReconnectContext, ReconnectPolicy, SuperviseMode};
use crate::{Result, SyncError};

/// Multi-stream synchronization and combination engine
///
/// `produce_frame` is synchronous and never touches stream I/O beyond one
/// non-blocking read per stream; opening and reconnecting happen on
/// background tasks spawned on the runtime captured by `initialize`.
pub struct SyncEngine {
    /// Configuration
    config: SyncEngineConfig,
    clock: SharedClock,
    /// Per-stream state, in descriptor order
    channels: Vec<StreamChannel>,
    combiner: FrameCombiner,
    detection: DetectionDispatcher,
    policy: ReconnectPolicy,
    /// Cleared on shutdown; background tasks check it before mutating
    running: Arc<AtomicBool>,
    runtime: Option<Handle>,
    initialized: bool,
    shut_down: bool,
    /// Frame counter
    frame_counter: u64,
    /// Presentation clock anchor
    first_frame_at: Option<f64>,
}

impl SyncEngine {
    /// Create an engine over already constructed sources
    pub fn new(
        config: SyncEngineConfig,
        sources: Vec<Arc<dyn StreamSource>>,
        clock: SharedClock,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            let stream_id = source.descriptor().id;
            if !seen.insert(stream_id) {
                return Err(SyncError::DuplicateStream { stream_id });
            }
        }

        let policy = ReconnectPolicy::from_config(&config)?;
        let deadline = clock.now() + config.init_timeout();
        let channels = sources
            .into_iter()
            .map(|source| StreamChannel::new(source, deadline))
            .collect();
        let control = Arc::new(DetectionControl::new(&DetectionConfig::default()));

        Ok(Self {
            combiner: FrameCombiner::new(config.tile_width, config.tile_height),
            policy,
            config,
            clock,
            channels,
            detection: DetectionDispatcher::new(control),
            running: Arc::new(AtomicBool::new(true)),
            runtime: None,
            initialized: false,
            shut_down: false,
            frame_counter: 0,
            first_frame_at: None,
        })
    }

    /// Register the detection consumer and its dispatch settings
    pub fn with_detection(
        mut self,
        config: &DetectionConfig,
        handler: Arc<dyn DetectionHandler>,
    ) -> Self {
        self.detection = DetectionDispatcher::new(Arc::new(DetectionControl::new(config)));
        self.detection.set_handler(handler);
        self
    }

    /// Open every enabled stream in the background
    ///
    /// Idempotent. Must be called from within a Tokio runtime; open failures
    /// never fail this call.
    #[instrument(name = "sync_engine_initialize", skip(self), fields(streams = self.channels.len()))]
    pub fn initialize(&mut self) -> Result<()> {
        if self.shut_down {
            return Err(SyncError::ShutDown);
        }
        if self.initialized {
            debug!("sync engine already initialized");
            return Ok(());
        }

        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let deadline = self.clock.now() + self.config.init_timeout();
        for index in 0..self.channels.len() {
            if self.channels[index].descriptor.enabled {
                self.start_stream(&runtime, index, deadline);
            }
        }

        self.runtime = Some(runtime);
        self.initialized = true;
        info!(
            enabled = self.active_count(),
            init_timeout_s = self.config.init_timeout(),
            "sync engine initialized"
        );
        Ok(())
    }

    fn start_stream(&mut self, runtime: &Handle, index: usize, deadline: f64) {
        let channel = &mut self.channels[index];
        lock_health(&channel.health).arm_deadline(deadline);
        let ctx = reconnect_context(channel, &self.clock, &self.running, self.policy);
        channel.supervisor = Some(runtime.spawn(supervise(ctx, SuperviseMode::InitialOpen)));
    }

    /// Produce the next combined frame
    ///
    /// Never blocks on stream I/O and never fails; streams without a usable
    /// frame get a status placeholder.
    #[instrument(
        level = "trace",
        name = "sync_engine_produce_frame",
        skip(self),
        fields(frame_id = self.frame_counter)
    )]
    pub fn produce_frame(&mut self) -> CombinedFrame {
        let started = Instant::now();
        let now = self.clock.now();
        let first = *self.first_frame_at.get_or_insert(now);
        let reading = self.initialized && self.running.load(Ordering::SeqCst);

        let mut choices = Vec::with_capacity(self.channels.len());
        for channel in self.channels.iter_mut().filter(|c| c.descriptor.enabled) {
            let fresh = if reading {
                channel.poll(now, &self.config)
            } else {
                None
            };
            let state = channel.state();
            let choice = channel.select(now, state, fresh);
            observability::record_buffer_depth(channel.id(), channel.buffer.len());
            choices.push((channel.id(), state, choice));
        }

        if reading {
            self.spawn_pending_reconnects();
        }

        let layout = self.combiner.layout(choices.len());
        let mut images: Vec<ImageData> = Vec::with_capacity(choices.len());
        let mut tiles = Vec::with_capacity(choices.len());
        for (slot, (stream_id, state, choice)) in choices.into_iter().enumerate() {
            let Some(rect) = layout.tile_rect(slot) else {
                break;
            };
            let (image, source, label) = match choice {
                TileChoice::Frame { image, source } => (image, source, None),
                TileChoice::Placeholder(_) => {
                    let name = self
                        .channels
                        .iter()
                        .find(|c| c.id() == stream_id)
                        .map(|c| c.descriptor.name.as_str())
                        .unwrap_or_default();
                    (
                        self.combiner.placeholder(stream_id, name, state),
                        TileSource::Placeholder,
                        Some(placeholder_label(name, stream_id, state)),
                    )
                }
            };
            images.push(image);
            tiles.push(TileInfo {
                stream_id,
                slot,
                rect,
                health: state,
                source,
                label,
            });
        }
        let images: Vec<&ImageData> = images.iter().collect();

        let frame = CombinedFrame {
            frame_id: self.frame_counter,
            pts: now - first,
            produced_at: now,
            image: self.combiner.compose(&layout, &images),
            tiles,
        };
        self.frame_counter += 1;

        if self.detection.has_consumer() {
            self.detection.try_dispatch(Arc::new(frame.clone()), now);
        }

        observability::record_frame_produced(&frame, started.elapsed().as_secs_f64() * 1000.0);
        frame
    }

    /// Hand streams that entered Error/Timeout to a reconnect task
    fn spawn_pending_reconnects(&mut self) {
        let Some(runtime) = self.runtime.clone() else {
            return;
        };
        for channel in self.channels.iter_mut().filter(|c| c.descriptor.enabled) {
            if channel.supervisor_active() {
                continue;
            }
            if !lock_health(&channel.health).take_reconnect_request() {
                continue;
            }
            debug!(
                stream_id = channel.id(),
                backoff_s = self.policy.backoff.as_secs_f64(),
                "scheduling reconnect"
            );
            let ctx = reconnect_context(channel, &self.clock, &self.running, self.policy);
            channel.supervisor = Some(runtime.spawn(supervise(ctx, SuperviseMode::Reconnect)));
        }
    }

    /// Set a stream's artificial delay, clamped to 0..=5000 ms
    ///
    /// Takes effect on the next produced frame; the connection is untouched.
    /// Returns the applied delay.
    #[instrument(name = "sync_engine_set_delay", skip(self))]
    pub fn set_delay(&mut self, stream_id: StreamId, delay_ms: i64) -> Result<u32> {
        let now = self.clock.now();
        let margin = self.config.delay_purge_margin_s;
        let undelayed = self.config.undelayed_retention_s;
        let channel = self
            .channel_mut(stream_id)
            .ok_or(SyncError::UnknownStream { stream_id })?;

        let clamped = delay_ms.clamp(0, MAX_DELAY_MS as i64) as u32;
        if clamped as i64 != delay_ms {
            warn!(requested = delay_ms, applied = clamped, "delay clamped");
        }
        let previous = channel.delay_ms;
        channel.delay_ms = clamped;

        let keep = if clamped == 0 {
            undelayed
        } else {
            clamped as f64 / 1000.0 + margin
        };
        let purged = channel.buffer.evict_before(now - keep);
        info!(previous, delay_ms = clamped, purged, "stream delay changed");
        Ok(clamped)
    }

    /// Current delay of a stream (ms)
    pub fn delay(&self, stream_id: StreamId) -> Option<u32> {
        self.channel(stream_id).map(|c| c.delay_ms)
    }

    pub fn health(&self, stream_id: StreamId) -> Option<StreamHealthState> {
        self.channel(stream_id).map(StreamChannel::state)
    }

    /// Health, delay, rate and counters of every stream
    pub fn stream_status(&self) -> Vec<StreamStatus> {
        self.channels.iter().map(StreamChannel::status).collect()
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.channels.iter().map(StreamChannel::id).collect()
    }

    /// Enable or disable a stream; disabled streams are not read or laid out
    pub fn set_stream_enabled(&mut self, stream_id: StreamId, enabled: bool) -> Result<()> {
        let index = self
            .channels
            .iter()
            .position(|c| c.id() == stream_id)
            .ok_or(SyncError::UnknownStream { stream_id })?;
        self.channels[index].descriptor.enabled = enabled;
        info!(stream_id, enabled, "stream toggled");

        let channel = &self.channels[index];
        let needs_open = enabled
            && !channel.source.is_open()
            && !channel.supervisor_active()
            && channel.state() == StreamHealthState::Initializing;
        if needs_open && self.running.load(Ordering::SeqCst) {
            if let Some(runtime) = self.runtime.clone() {
                let deadline = self.clock.now() + self.config.init_timeout();
                self.start_stream(&runtime, index, deadline);
            }
        }
        Ok(())
    }

    /// Zero every delay, drop buffered frames and restart health tracking
    ///
    /// Open sources stay open; closed ones are reopened in the background.
    /// A reopen queued behind an open that is still running waits for it
    /// and keeps its result.
    #[instrument(name = "sync_engine_reset", skip(self))]
    pub fn reset(&mut self) {
        let now = self.clock.now();
        let deadline = now + self.config.init_timeout();
        let running = self.running.load(Ordering::SeqCst);

        for index in 0..self.channels.len() {
            let channel = &mut self.channels[index];
            channel.abort_supervisor();
            channel.delay_ms = 0;
            channel.discard_frames();
            if let Some(state) = lock_health(&channel.health).apply(HealthEvent::Reset { deadline })
            {
                observability::record_stream_health(channel.id(), state);
            }

            let reopen = running && channel.descriptor.enabled && !channel.source.is_open();
            if reopen {
                if let Some(runtime) = self.runtime.clone() {
                    self.start_stream(&runtime, index, deadline);
                }
            }
        }
        info!(streams = self.channels.len(), "sync engine reset");
    }

    /// Grid for the current active-stream count
    pub fn layout(&self) -> StreamLayout {
        self.combiner.layout(self.active_count())
    }

    /// Number of enabled streams
    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.descriptor.enabled).count()
    }

    /// Enable / rate switch for detection dispatch
    pub fn detection_control(&self) -> Arc<DetectionControl> {
        self.detection.control().clone()
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.detection.control().set_enabled(enabled);
    }

    pub fn frames_produced(&self) -> u64 {
        self.frame_counter
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Stop background work, close every source and discard buffers
    ///
    /// Reconnect tasks are cancelled; an in-flight detection pass is drained
    /// (bounded). Later `produce_frame` calls only return placeholders.
    #[instrument(name = "sync_engine_shutdown", skip(self))]
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.running.store(false, Ordering::SeqCst);

        let tasks: Vec<_> = self
            .channels
            .iter_mut()
            .filter_map(StreamChannel::abort_supervisor)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "stream supervisor failed");
                }
            }
        }

        self.detection.drain().await;

        let sources: Vec<Arc<dyn StreamSource>> =
            self.channels.iter().map(|c| c.source.clone()).collect();
        if let Err(e) = tokio::task::spawn_blocking(move || {
            for source in &sources {
                source.close();
            }
        })
        .await
        {
            warn!(error = %e, "closing stream sources failed");
        }

        for channel in &mut self.channels {
            channel.discard_frames();
        }
        self.shut_down = true;
        info!(frames = self.frame_counter, "sync engine stopped");
    }

    fn channel(&self, stream_id: StreamId) -> Option<&StreamChannel> {
        self.channels.iter().find(|c| c.id() == stream_id)
    }

    fn channel_mut(&mut self, stream_id: StreamId) -> Option<&mut StreamChannel> {
        self.channels.iter_mut().find(|c| c.id() == stream_id)
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for channel in &mut self.channels {
            channel.abort_supervisor();
        }
    }
}

fn reconnect_context(
    channel: &StreamChannel,
    clock: &SharedClock,
    running: &Arc<AtomicBool>,
    policy: ReconnectPolicy,
) -> ReconnectContext {
    ReconnectContext {
        source: channel.source.clone(),
        health: channel.health.clone(),
        clock: clock.clone(),
        running: running.clone(),
        policy,
        open_gate: channel.open_gate.clone(),
    }
}
