//! Detection, tracking and fusion data
//!
//! Flow: `Detection` (image space) → `Track` (per-camera identity) →
//! `GroundPlaneTrack` (shared plane) → `FusedTrack` (global identity).

use serde::{Deserialize, Serialize};

use crate::{CameraId, TrackId};

/// Global identity number. Monotonic, never reused.
pub type GlobalId = u64;

/// Axis-aligned box in tile pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Foot point used for ground-plane projection
    pub fn bottom_center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, self.y2)
    }
}

/// Single-frame detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// Per-camera tracked object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: TrackId,
    pub camera_id: CameraId,
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
    pub timestamp: f64,
    /// Appearance embedding when the tracker produces one
    #[serde(default)]
    pub appearance: Option<Vec<f32>>,
}

/// Point in shared ground-plane units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanePoint {
    pub x: f64,
    pub y: f64,
}

impl PlanePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &PlanePoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Fusion input: one projected track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundPlaneTrack {
    /// `None` when the projection could not attribute the track to a camera;
    /// such inputs are rejected by fusion
    pub camera_id: Option<CameraId>,
    pub track_id: TrackId,
    pub position: PlanePoint,
    pub confidence: f32,
    #[serde(default)]
    pub appearance: Option<Vec<f32>>,
}

impl GroundPlaneTrack {
    pub fn new(camera_id: CameraId, track_id: impl Into<TrackId>, x: f64, y: f64) -> Self {
        Self {
            camera_id: Some(camera_id),
            track_id: track_id.into(),
            position: PlanePoint::new(x, y),
            confidence: 1.0,
            appearance: None,
        }
    }

    pub fn with_appearance(mut self, feature: Vec<f32>) -> Self {
        self.appearance = Some(feature);
        self
    }
}

/// Fusion output: an input track tagged with its global id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedTrack {
    pub global_id: GlobalId,
    pub camera_id: CameraId,
    pub track_id: TrackId,
    pub position: PlanePoint,
    pub confidence: f32,
}

/// Fusion statistics (operator view)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    /// Live global tracks
    pub total_global_tracks: usize,
    /// Global ids ever allocated
    pub tracks_created: u64,
    /// Global ids retired by merging into a lower id
    pub merges: u64,
    /// Multi-camera clusters resolved against existing identities
    pub multi_camera_associations: u64,
    /// Entries in the (camera, local) → global table
    pub active_mappings: usize,
    /// Inputs rejected as malformed
    pub dropped_inputs: u64,
}

/// One fusion cycle's output, handed to metadata sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionBatch {
    /// Fusion cycle counter
    pub cycle: u64,
    /// Combined frame the detections came from
    pub frame_id: u64,
    /// Fusion time on the shared clock
    pub timestamp: f64,
    pub tracks: Vec<FusedTrack>,
    pub stats: FusionStats,
}
