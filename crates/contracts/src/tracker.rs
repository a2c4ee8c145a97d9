//! Detector/tracker collaborator contract
//!
//! The model behind these traits is a black box. Implementations are picked
//! at construction time (model-backed, dummy, scripted) and boxed.

use std::sync::Arc;

use crate::{CameraId, CombinedFrame, ContractError, Detection, GroundPlaneTrack, ImageData, Track};

/// Per-camera detect → track → project pipeline
pub trait Tracker: Send {
    /// Implementation name (logs / metrics)
    fn name(&self) -> &str;

    /// Detect objects in one camera tile
    fn detect(&mut self, frame: &ImageData, camera_id: CameraId)
        -> Result<Vec<Detection>, ContractError>;

    /// Associate detections with this camera's existing tracks
    fn track(
        &mut self,
        detections: Vec<Detection>,
        camera_id: CameraId,
        timestamp: f64,
    ) -> Result<Vec<Track>, ContractError>;

    /// Project tracks into the shared ground plane
    fn project(&self, tracks: &[Track]) -> Vec<GroundPlaneTrack>;
}

/// Consumer of combined frames dispatched by the sync engine
///
/// `process` runs on a blocking worker; the engine guarantees at most one
/// call in flight.
pub trait DetectionHandler: Send + Sync {
    fn process(&self, frame: Arc<CombinedFrame>);
}
