//! Pipeline orchestrator - coordinates all components.
//!
//! streams → SyncEngine → (detection) VisionPipeline → fusion → Dispatcher

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{FusionBatch, MonotonicClock, SystemBlueprint};
use fusion::SharedFusion;
use ingestion::SourceFactory;
use sync_engine::SyncEngine;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use vision::VisionPipeline;

use super::{PipelineStats, SnapshotWriter};

/// Seconds between status log lines
const STATUS_INTERVAL_S: f64 = 5.0;

/// How long sinks get to flush after the loop stops
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The system blueprint configuration
    pub blueprint: SystemBlueprint,

    /// Combined frame output rate (Hz)
    pub output_fps: f64,

    /// Delays applied once streams are opening, `(stream_id, ms)`
    pub delays: Vec<(u32, i64)>,

    /// Maximum number of frames to produce (None = unlimited)
    pub max_frames: Option<u64>,

    /// Run duration (None = until shutdown signal)
    pub duration: Option<Duration>,

    /// Fusion batch queue capacity
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// PNG snapshot directory and interval
    pub snapshots: Option<(PathBuf, u64)>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or a frame/duration limit is reached
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Open Sources
        let clock = MonotonicClock::shared();
        let factory = SourceFactory::new(clock.clone());
        let sources = factory
            .create_all(&blueprint.streams)
            .context("Failed to create stream sources")?;
        info!(
            streams = sources.len(),
            schemes = ?factory.schemes(),
            "Stream sources created"
        );

        let mut engine = SyncEngine::new(blueprint.engine.clone(), sources, clock.clone())
            .context("Failed to create sync engine")?;

        // Setup Vision & Fusion
        let (batch_tx, batch_rx) = mpsc::channel::<FusionBatch>(self.config.buffer_size.max(1));
        let vision = match vision::create_tracker(&blueprint.detection)
            .context("Failed to create tracker")?
        {
            Some(tracker) => {
                let fusion = SharedFusion::new(blueprint.fusion.clone());
                let pipeline =
                    Arc::new(VisionPipeline::new(tracker, fusion, clock.clone()).with_output(batch_tx));
                engine = engine.with_detection(&blueprint.detection, pipeline.clone());
                info!(
                    enabled = blueprint.detection.enabled,
                    fps = blueprint.detection.clamped_fps(),
                    "Detection consumer registered"
                );
                Some(pipeline)
            }
            None => {
                info!("No tracker configured - fusion disabled");
                drop(batch_tx);
                None
            }
        };

        // Setup Dispatcher
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - fusion batches will be dropped");
        }
        let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), batch_rx)
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();
        info!(sinks = blueprint.sinks.len(), "Dispatcher started");

        // Start Streams
        engine.initialize().context("Failed to initialize sync engine")?;
        for &(stream_id, delay_ms) in &self.config.delays {
            engine
                .set_delay(stream_id, delay_ms)
                .with_context(|| format!("Failed to set delay for stream {stream_id}"))?;
        }

        let mut snapshots = match &self.config.snapshots {
            Some((dir, every)) => Some(
                SnapshotWriter::new(dir, *every)
                    .with_context(|| format!("Failed to prepare {}", dir.display()))?,
            ),
            None => None,
        };

        let fps = if self.config.output_fps.is_finite() && self.config.output_fps > 0.0 {
            self.config.output_fps
        } else {
            warn!(requested = self.config.output_fps, "invalid output fps, using 15");
            15.0
        };
        let status_every = (fps * STATUS_INTERVAL_S).round().max(1.0) as u64;
        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deadline = self.config.duration;
        let timeout = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(timeout);

        info!(
            fps,
            max_frames = ?self.config.max_frames,
            duration = ?self.config.duration,
            "Pipeline running"
        );

        let mut stats = PipelineStats::default();
        let mut last_cycle = 0u64;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    break;
                }
                _ = &mut timeout => {
                    info!("Run duration reached");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let cycle_started = Instant::now();
            let frame = engine.produce_frame();
            let cycle_ms = cycle_started.elapsed().as_secs_f64() * 1000.0;
            stats.metrics.update_frame(&frame, cycle_ms);

            if let Some(Err(e)) = snapshots.as_mut().map(|w| w.maybe_write(&frame)) {
                warn!(error = %e, "snapshot failed, disabling snapshots");
                snapshots = None;
            }

            if let Some(pipeline) = &vision {
                if let Some(batch) = pipeline.latest() {
                    if batch.cycle != last_cycle {
                        last_cycle = batch.cycle;
                        stats
                            .metrics
                            .update_fusion(&batch, pipeline.stats().last_processing_ms);
                    }
                }
            }

            if frame.frame_id > 0 && frame.frame_id.is_multiple_of(status_every) {
                log_status(&engine, &stats);
            }

            if let Some(max) = self.config.max_frames {
                if stats.frames() >= max {
                    info!(frames = stats.frames(), "Reached max frames limit");
                    break;
                }
            }
        }

        // Shutdown
        info!("Shutting down pipeline...");
        engine.shutdown().await;
        stats.streams = engine.stream_status();
        stats.detection = engine.detection_control().stats();
        stats.snapshots = snapshots.as_ref().map_or(0, SnapshotWriter::written);
        if let Some(pipeline) = &vision {
            stats.vision = Some(pipeline.stats());
            stats.fusion = Some(pipeline.fusion().stats());
        }
        // the engine and the vision pipeline hold the last batch senders
        drop(engine);
        drop(vision);

        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(sinks)) => stats.sinks = sinks,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!(
                timeout_secs = DISPATCHER_DRAIN_TIMEOUT.as_secs(),
                "Dispatcher did not drain in time"
            ),
        }

        stats.duration = start_time.elapsed();
        info!(
            frames = stats.frames(),
            duration_secs = stats.duration.as_secs_f64(),
            fps = format!("{:.2}", stats.fps()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

fn log_status(engine: &SyncEngine, stats: &PipelineStats) {
    let detection = engine.detection_control().stats();
    info!(
        frames = stats.frames(),
        active_streams = engine.active_count(),
        dispatched = detection.dispatched,
        skipped_busy = detection.skipped_busy,
        "Pipeline status"
    );
    for status in engine.stream_status() {
        info!(
            stream_id = status.stream_id,
            health = status.health.label(),
            delay_ms = status.delay_ms,
            fps = format!("{:.1}", status.fps),
            buffer_depth = status.buffer_depth,
            read_failures = status.read_failures,
            "Stream status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SinkConfig, SinkType, StreamDescriptor, TrackerKind};
    use std::collections::HashMap;

    fn blueprint(dir: &std::path::Path) -> SystemBlueprint {
        let mut bp = SystemBlueprint {
            streams: vec![
                StreamDescriptor::new(0, "synthetic://a?fps=30&width=64&height=48"),
                StreamDescriptor::new(1, "synthetic://b?fps=30&width=64&height=48"),
            ],
            sinks: vec![SinkConfig {
                name: "jsonl".into(),
                sink_type: SinkType::File,
                queue_capacity: 100,
                params: HashMap::from([(
                    "path".to_string(),
                    dir.join("fusion.jsonl").display().to_string(),
                )]),
            }],
            ..Default::default()
        };
        bp.engine.tile_width = 64;
        bp.engine.tile_height = 48;
        bp.detection.enabled = true;
        bp.detection.fps = 30.0;
        bp.detection.tracker = TrackerKind::Dummy;
        bp.detection.seed = Some(7);
        bp
    }

    fn config(bp: SystemBlueprint) -> PipelineConfig {
        PipelineConfig {
            blueprint: bp,
            output_fps: 50.0,
            delays: vec![(1, 200)],
            max_frames: Some(20),
            duration: Some(Duration::from_secs(10)),
            buffer_size: 16,
            metrics_port: None,
            snapshots: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_until_max_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(blueprint(dir.path()));
        cfg.snapshots = Some((dir.path().join("snaps"), 10));

        let stats = Pipeline::new(cfg)
            .run(std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(stats.frames(), 20);
        assert_eq!(stats.streams.len(), 2);
        assert_eq!(stats.streams[1].delay_ms, 200);
        assert_eq!(stats.snapshots, 2);
        assert!(dir.path().join("snaps/frame_00000000.png").exists());
        assert!(stats.vision.is_some());
        assert_eq!(stats.sinks.len(), 1);
        assert_eq!(stats.sinks[0].0, "jsonl");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_signal_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut bp = blueprint(dir.path());
        bp.detection.tracker = TrackerKind::None;
        let mut cfg = config(bp);
        cfg.max_frames = None;
        cfg.delays.clear();

        let stats = Pipeline::new(cfg)
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        assert!(stats.frames() > 0);
        assert!(stats.vision.is_none());
        assert!(stats.fusion.is_none());
        assert_eq!(stats.detection.dispatched, 0);
    }

    #[tokio::test]
    async fn test_unknown_delay_stream_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(blueprint(dir.path()));
        cfg.delays = vec![(9, 100)];

        let err = Pipeline::new(cfg)
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stream 9"), "got: {err}");
    }
}
