//! `Tracker` implementations
//!
//! Contains DummyTracker and ScriptedTracker.

mod dummy;
mod scripted;

pub use self::dummy::DummyTracker;
pub use self::scripted::{ScriptedObject, ScriptedTracker};

use contracts::{DetectionConfig, GroundPlaneTrack, Track, Tracker, TrackerKind};
use tracing::{info, trace};

use crate::error::Result;
use crate::homography::HomographySet;

/// Build the configured tracker; `None` when detection has no tracker
pub fn create_tracker(config: &DetectionConfig) -> Result<Option<Box<dyn Tracker>>> {
    let homographies = HomographySet::from_config(&config.homographies)?;
    match config.tracker {
        TrackerKind::Dummy => {
            info!(seed = ?config.seed, calibrated = config.homographies.len(), "dummy tracker selected");
            Ok(Some(Box::new(DummyTracker::new(config.seed, homographies))))
        }
        TrackerKind::None => Ok(None),
    }
}

/// Bottom-center projection shared by the built-in trackers
pub(crate) fn project_tracks(homographies: &HomographySet, tracks: &[Track]) -> Vec<GroundPlaneTrack> {
    tracks
        .iter()
        .filter_map(|track| {
            let (fx, fy) = track.bbox.bottom_center();
            let Some(point) = homographies.project(track.camera_id, fx as f64, fy as f64) else {
                trace!(
                    camera_id = track.camera_id,
                    track_id = %track.track_id,
                    "foot point does not project onto the plane"
                );
                return None;
            };
            Some(GroundPlaneTrack {
                camera_id: Some(track.camera_id),
                track_id: track.track_id.clone(),
                position: point,
                confidence: track.confidence,
                appearance: track.appearance.clone(),
            })
        })
        .collect()
}
