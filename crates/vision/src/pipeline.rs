//! VisionPipeline: combined frame → per-camera tracks → fusion → sinks

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use contracts::{
    CameraId, CombinedFrame, DetectionHandler, FusionBatch, GroundPlaneTrack, SharedClock,
    TileSource, Tracker,
};
use fusion::SharedFusion;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Log a summary every this many processed frames
const SUMMARY_INTERVAL: u64 = 30;

/// Pipeline counters (operator view)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VisionStats {
    pub frames_processed: u64,
    /// Tiles run through the tracker
    pub tiles_processed: u64,
    /// Placeholder tiles not sent to the tracker
    pub tiles_skipped: u64,
    pub detections: u64,
    pub tracks: u64,
    pub tracker_failures: u64,
    /// Batches the output queue could not take
    pub batches_dropped: u64,
    pub last_processing_ms: f64,
}

struct State {
    tracker: Box<dyn Tracker>,
    stats: VisionStats,
    latest: Option<Arc<FusionBatch>>,
}

/// Detection consumer registered with the sync engine
///
/// Runs detect → track → project per laid-out stream, fuses the result and
/// forwards the batch to the dispatcher without waiting.
pub struct VisionPipeline {
    state: Mutex<State>,
    fusion: SharedFusion,
    clock: SharedClock,
    output: Option<mpsc::Sender<FusionBatch>>,
}

impl VisionPipeline {
    pub fn new(tracker: Box<dyn Tracker>, fusion: SharedFusion, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(State {
                tracker,
                stats: VisionStats::default(),
                latest: None,
            }),
            fusion,
            clock,
            output: None,
        }
    }

    /// Forward every batch to this channel (bounded, never awaited)
    pub fn with_output(mut self, output: mpsc::Sender<FusionBatch>) -> Self {
        self.output = Some(output);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fusion(&self) -> &SharedFusion {
        &self.fusion
    }

    pub fn stats(&self) -> VisionStats {
        self.state().stats
    }

    /// Most recent fusion batch
    pub fn latest(&self) -> Option<Arc<FusionBatch>> {
        self.state().latest.clone()
    }

    /// Process one combined frame; returns the fusion batch
    #[instrument(
        name = "vision_process",
        skip(self, frame),
        fields(frame_id = frame.frame_id, tiles = frame.tiles.len())
    )]
    pub fn process_frame(&self, frame: &CombinedFrame) -> Arc<FusionBatch> {
        let started = Instant::now();
        let mut state = self.state();
        let State { tracker, stats, .. } = &mut *state;

        let mut projected: Vec<GroundPlaneTrack> = Vec::new();
        for tile in &frame.tiles {
            let Some(captured_at) = tile.source.captured_at() else {
                debug_assert_eq!(tile.source, TileSource::Placeholder);
                stats.tiles_skipped += 1;
                continue;
            };
            let Some(image) = frame.crop_tile(tile.rect) else {
                warn!(stream_id = tile.stream_id, rect = ?tile.rect, "tile outside canvas");
                stats.tiles_skipped += 1;
                continue;
            };

            stats.tiles_processed += 1;
            match run_tracker(tracker.as_mut(), &image, tile.stream_id, captured_at) {
                Ok((detections, tracks)) => {
                    stats.detections += detections as u64;
                    stats.tracks += tracks.len() as u64;
                    projected.extend(tracks);
                }
                Err(e) => {
                    stats.tracker_failures += 1;
                    warn!(
                        stream_id = tile.stream_id,
                        tracker = tracker.name(),
                        error = %e,
                        "tracker failed, tile skipped"
                    );
                }
            }
        }

        let now = self.clock.now();
        let (tracks, fusion_stats, cycle) = self.fusion.fuse_with_stats(&projected, now);
        let batch = FusionBatch {
            cycle,
            frame_id: frame.frame_id,
            timestamp: now,
            tracks,
            stats: fusion_stats,
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        stats.frames_processed += 1;
        stats.last_processing_ms = elapsed_ms;
        observability::record_fusion_cycle(&batch, elapsed_ms);

        if stats.frames_processed.is_multiple_of(SUMMARY_INTERVAL) {
            info!(
                frames = stats.frames_processed,
                detections = stats.detections,
                global_tracks = batch.stats.total_global_tracks,
                merges = batch.stats.merges,
                processing_ms = elapsed_ms,
                "vision summary"
            );
        }

        if let Some(output) = &self.output {
            if let Err(e) = output.try_send(batch.clone()) {
                stats.batches_dropped += 1;
                warn!(cycle, error = %e, "fusion batch not forwarded");
            }
        }

        let batch = Arc::new(batch);
        state.latest = Some(Arc::clone(&batch));
        debug!(
            cycle,
            fused = batch.tracks.len(),
            processing_ms = elapsed_ms,
            "frame processed"
        );
        batch
    }
}

fn run_tracker(
    tracker: &mut dyn Tracker,
    image: &contracts::ImageData,
    camera_id: CameraId,
    timestamp: f64,
) -> Result<(usize, Vec<GroundPlaneTrack>), contracts::ContractError> {
    let detections = tracker.detect(image, camera_id)?;
    let count = detections.len();
    let tracks = tracker.track(detections, camera_id, timestamp)?;
    Ok((count, tracker.project(&tracks)))
}

impl DetectionHandler for VisionPipeline {
    fn process(&self, frame: Arc<CombinedFrame>) {
        self.process_frame(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homography::HomographySet;
    use crate::trackers::{ScriptedObject, ScriptedTracker};
    use contracts::{
        BoundingBox, ImageData, ImageFormat, ManualClock, StreamHealthState, TileInfo, TileRect,
    };

    fn tile(stream_id: u32, slot: usize, source: TileSource) -> TileInfo {
        TileInfo {
            stream_id,
            slot,
            rect: TileRect {
                x: slot as u32 * 8,
                y: 0,
                width: 8,
                height: 6,
            },
            health: if source == TileSource::Placeholder {
                StreamHealthState::Initializing
            } else {
                StreamHealthState::Ready
            },
            source,
            label: None,
        }
    }

    fn frame(frame_id: u64, tiles: Vec<TileInfo>) -> CombinedFrame {
        let width = 16;
        CombinedFrame {
            frame_id,
            pts: 0.0,
            produced_at: 0.0,
            image: ImageData::new(width, 6, ImageFormat::Rgb8, vec![0u8; 16 * 6 * 3]),
            tiles,
        }
    }

    fn scripted() -> (ScriptedTracker, VisionPipeline) {
        let control = ScriptedTracker::new(HomographySet::default());
        let pipeline = VisionPipeline::new(
            Box::new(control.clone()),
            SharedFusion::default(),
            ManualClock::new(),
        );
        (control, pipeline)
    }

    fn person(id: &str, x: f32) -> ScriptedObject {
        ScriptedObject::new(id, BoundingBox::new(x - 1.0, 0.0, x + 1.0, 5.0))
    }

    #[test]
    fn test_cross_camera_objects_fuse() {
        let (control, pipeline) = scripted();
        control.set_objects(0, vec![person("a", 3.0)]);
        control.set_objects(1, vec![person("b", 4.0), person("far", 400.0)]);

        let live = TileSource::Fresh { captured_at: 0.0 };
        let batch = pipeline.process_frame(&frame(7, vec![tile(0, 0, live), tile(1, 1, live)]));

        assert_eq!(batch.frame_id, 7);
        assert_eq!(batch.cycle, 1);
        assert_eq!(batch.tracks.len(), 3);
        let id_of = |t: &str| {
            batch
                .tracks
                .iter()
                .find(|f| f.track_id == t)
                .map(|f| f.global_id)
                .unwrap()
        };
        assert_eq!(id_of("a"), id_of("b"));
        assert_ne!(id_of("a"), id_of("far"));
        assert_eq!(batch.stats.total_global_tracks, 2);
        assert_eq!(pipeline.latest().unwrap().cycle, 1);
    }

    #[test]
    fn test_placeholders_skipped_and_failures_isolated() {
        let (control, pipeline) = scripted();
        control.set_objects(0, vec![person("a", 3.0)]);
        control.set_objects(1, vec![person("b", 3.0)]);
        control.set_failing(1, true);

        let batch = pipeline.process_frame(&frame(
            0,
            vec![
                tile(0, 0, TileSource::Cached { captured_at: 0.0 }),
                tile(1, 1, TileSource::Delayed { captured_at: 0.0 }),
                tile(2, 1, TileSource::Placeholder),
            ],
        ));

        assert_eq!(batch.tracks.len(), 1);
        let stats = pipeline.stats();
        assert_eq!(stats.tiles_processed, 2);
        assert_eq!(stats.tiles_skipped, 1);
        assert_eq!(stats.tracker_failures, 1);
        assert_eq!(control.calls(), 2);
    }

    #[tokio::test]
    async fn test_batches_forwarded_until_queue_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let control = ScriptedTracker::default();
        let pipeline = VisionPipeline::new(
            Box::new(control.clone()),
            SharedFusion::default(),
            ManualClock::new(),
        )
        .with_output(tx);
        control.set_objects(0, vec![person("a", 3.0)]);

        let live = TileSource::Fresh { captured_at: 0.0 };
        let handler: Arc<dyn DetectionHandler> = Arc::new(pipeline);
        handler.process(Arc::new(frame(0, vec![tile(0, 0, live)])));
        handler.process(Arc::new(frame(1, vec![tile(0, 0, live)])));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.frame_id, 0);
        assert_eq!(first.tracks[0].track_id, "a");
        assert!(rx.try_recv().is_err());
    }
}
