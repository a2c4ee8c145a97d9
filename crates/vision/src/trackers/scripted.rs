//! ScriptedTracker - fixed per-camera objects for deterministic runs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{
    BoundingBox, CameraId, ContractError, Detection, GroundPlaneTrack, ImageData, Track, TrackId,
    Tracker,
};

use crate::homography::HomographySet;

/// One object reported for a camera on every call
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedObject {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    pub appearance: Option<Vec<f32>>,
}

impl ScriptedObject {
    pub fn new(track_id: impl Into<TrackId>, bbox: BoundingBox) -> Self {
        Self {
            track_id: track_id.into(),
            bbox,
            appearance: None,
        }
    }

    pub fn with_appearance(mut self, feature: Vec<f32>) -> Self {
        self.appearance = Some(feature);
        self
    }
}

#[derive(Debug, Default)]
struct Script {
    objects: HashMap<CameraId, Vec<ScriptedObject>>,
    failing: HashSet<CameraId>,
    calls: u64,
}

/// Tracker whose output is set by the test
///
/// Clones share one script, so a test keeps a clone to move objects or
/// inject failures while the pipeline owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTracker {
    script: Arc<Mutex<Script>>,
    homographies: HomographySet,
    /// Objects returned by the last `detect`, per camera
    pending: HashMap<CameraId, Vec<ScriptedObject>>,
}

impl ScriptedTracker {
    pub fn new(homographies: HomographySet) -> Self {
        Self {
            homographies,
            ..Default::default()
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the objects a camera reports
    pub fn set_objects(&self, camera_id: CameraId, objects: Vec<ScriptedObject>) {
        self.script().objects.insert(camera_id, objects);
    }

    /// Make `detect` fail for a camera
    pub fn set_failing(&self, camera_id: CameraId, failing: bool) {
        let mut script = self.script();
        if failing {
            script.failing.insert(camera_id);
        } else {
            script.failing.remove(&camera_id);
        }
    }

    /// `detect` calls so far, across clones
    pub fn calls(&self) -> u64 {
        self.script().calls
    }
}

impl Tracker for ScriptedTracker {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(
        &mut self,
        _frame: &ImageData,
        camera_id: CameraId,
    ) -> Result<Vec<Detection>, ContractError> {
        let objects = {
            let mut script = self.script();
            script.calls += 1;
            if script.failing.contains(&camera_id) {
                return Err(ContractError::detection(
                    "scripted",
                    format!("camera {camera_id} scripted to fail"),
                ));
            }
            script.objects.get(&camera_id).cloned().unwrap_or_default()
        };

        let detections = objects
            .iter()
            .map(|o| Detection {
                bbox: o.bbox,
                confidence: 1.0,
                class_id: 0,
            })
            .collect();
        self.pending.insert(camera_id, objects);
        Ok(detections)
    }

    fn track(
        &mut self,
        detections: Vec<Detection>,
        camera_id: CameraId,
        timestamp: f64,
    ) -> Result<Vec<Track>, ContractError> {
        let objects = self.pending.remove(&camera_id).unwrap_or_default();
        Ok(detections
            .into_iter()
            .zip(objects)
            .map(|(d, o)| Track {
                track_id: o.track_id,
                camera_id,
                bbox: d.bbox,
                confidence: d.confidence,
                class_id: d.class_id,
                timestamp,
                appearance: o.appearance,
            })
            .collect())
    }

    fn project(&self, tracks: &[Track]) -> Vec<GroundPlaneTrack> {
        super::project_tracks(&self.homographies, tracks)
    }
}
