//! Sink implementations
//!
//! Contains LogSink and FileSink.

mod file;
mod log;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;

#[cfg(test)]
pub(crate) mod test_support {
    use contracts::{FusedTrack, FusionBatch, FusionStats, PlanePoint};

    pub fn batch(cycle: u64, tracks: usize) -> FusionBatch {
        FusionBatch {
            cycle,
            frame_id: cycle * 3,
            timestamp: cycle as f64 * 0.1,
            tracks: (0..tracks)
                .map(|i| FusedTrack {
                    global_id: i as u64 + 1,
                    camera_id: i as u32,
                    track_id: format!("cam{i}_track_1").into(),
                    position: PlanePoint::new(i as f64, 0.0),
                    confidence: 0.9,
                })
                .collect(),
            stats: FusionStats::default(),
        }
    }
}
