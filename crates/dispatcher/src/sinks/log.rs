//! LogSink - logs fusion cycle summaries via tracing

use contracts::{ContractError, FusionBatch, MetadataSink};
use tracing::{debug, info, instrument};

/// Sink that logs fusion summaries for debugging
pub struct LogSink {
    name: String,
    /// Also log every fused track at debug level
    per_track: bool,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            per_track: false,
        }
    }

    pub fn with_per_track(mut self, per_track: bool) -> Self {
        self.per_track = per_track;
        self
    }

    fn log_batch_summary(&self, batch: &FusionBatch) {
        let mut global_ids: Vec<u64> = batch.tracks.iter().map(|t| t.global_id).collect();
        global_ids.sort_unstable();
        global_ids.dedup();

        info!(
            sink = %self.name,
            cycle = batch.cycle,
            frame_id = batch.frame_id,
            timestamp = batch.timestamp,
            tracks = batch.tracks.len(),
            identities = global_ids.len(),
            global_tracks = batch.stats.total_global_tracks,
            merges = batch.stats.merges,
            "FusionBatch received"
        );

        if self.per_track {
            for track in &batch.tracks {
                debug!(
                    sink = %self.name,
                    global_id = track.global_id,
                    camera_id = track.camera_id,
                    track_id = %track.track_id,
                    x = track.position.x,
                    y = track.position.y,
                    "fused track"
                );
            }
        }
    }
}

impl MetadataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, batch),
        fields(sink = %self.name, cycle = batch.cycle)
    )]
    async fn write(&mut self, batch: &FusionBatch) -> Result<(), ContractError> {
        self.log_batch_summary(batch);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
