//! Pipeline statistics and metrics.

use std::time::Duration;

use contracts::FusionStats;
use dispatcher::MetricsSnapshot;
use observability::PipelineMetricsAggregator;
use sync_engine::{DetectionStats, StreamStatus};
use vision::VisionStats;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Frame and fusion aggregates
    pub metrics: PipelineMetricsAggregator,

    /// Per-stream status at shutdown
    pub streams: Vec<StreamStatus>,

    /// Detection dispatch counters
    pub detection: DetectionStats,

    /// Tracker counters (None when no tracker was configured)
    pub vision: Option<VisionStats>,

    /// Final fusion counters
    pub fusion: Option<FusionStats>,

    /// Per-sink delivery counters
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// PNG snapshots written
    pub snapshots: u64,
}

impl PipelineStats {
    pub fn frames(&self) -> u64 {
        self.metrics.total_frames
    }

    /// Calculate frames per second throughput
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        let summary = self.metrics.summary();

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Combined frames: {}", self.frames());
        println!("   ├─ FPS: {:.2}", self.fps());
        println!("   ├─ Placeholder tiles: {:.2}%", summary.placeholder_rate);
        println!("   ├─ Cycle time (ms): {}", summary.cycle_ms);
        println!("   └─ Snapshots: {}", self.snapshots);

        if !self.streams.is_empty() {
            println!("\n📷 Streams ({})", self.streams.len());
            for (i, s) in self.streams.iter().enumerate() {
                let prefix = if i == self.streams.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} [{}] {} - {}, delay {} ms, {:.1} fps, {} read / {} failed{}",
                    prefix,
                    s.stream_id,
                    s.name,
                    s.health.label(),
                    s.delay_ms,
                    s.fps,
                    s.frames_read,
                    s.read_failures,
                    s.last_error
                        .as_ref()
                        .map(|e| format!(" (last error: {e})"))
                        .unwrap_or_default()
                );
            }
        }

        let d = &self.detection;
        println!("\n🔍 Detection Dispatch");
        println!("   ├─ Dispatched: {}", d.dispatched);
        println!("   ├─ Skipped (busy): {}", d.skipped_busy);
        println!("   ├─ Skipped (rate): {}", d.skipped_rate);
        println!("   └─ Disabled: {}", d.disabled);

        if let Some(v) = &self.vision {
            println!("\n🎯 Tracking");
            println!("   ├─ Frames processed: {}", v.frames_processed);
            println!("   ├─ Tiles: {} processed, {} skipped", v.tiles_processed, v.tiles_skipped);
            println!("   ├─ Detections: {}", v.detections);
            println!("   ├─ Tracks: {}", v.tracks);
            println!("   ├─ Tracker failures: {}", v.tracker_failures);
            println!("   └─ Batches dropped: {}", v.batches_dropped);
        }

        if let Some(f) = &self.fusion {
            println!("\n🔗 Fusion");
            println!("   ├─ Cycles: {}", summary.fusion_cycles);
            println!("   ├─ Cycle time (ms): {}", summary.fusion_ms);
            println!("   ├─ Live global tracks: {}", f.total_global_tracks);
            println!("   ├─ Global ids created: {}", f.tracks_created);
            println!("   ├─ Merges: {}", f.merges);
            println!("   ├─ Multi-camera associations: {}", f.multi_camera_associations);
            println!("   ├─ Active mappings: {}", f.active_mappings);
            println!("   └─ Dropped inputs: {}", f.dropped_inputs);
        }

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks ({})", self.sinks.len());
            for (i, (name, m)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} written ({} tracks, last cycle {}), {} failed, {} dropped",
                    prefix, name, m.written, m.tracks_written, m.last_cycle, m.failed, m.dropped
                );
            }
        }

        println!();
    }
}
