//! DummyTracker - pseudo-random detections for demos

use contracts::{
    BoundingBox, CameraId, ContractError, Detection, GroundPlaneTrack, ImageData, Track, Tracker,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::homography::HomographySet;

/// At most this many detections per tile
const MAX_DETECTIONS: usize = 3;

/// Generates 0–3 person boxes per tile; ids are `cam{c}_track_{i}` by
/// detection index, so identities are stable only while counts are
pub struct DummyTracker {
    rng: StdRng,
    homographies: HomographySet,
}

impl DummyTracker {
    pub fn new(seed: Option<u64>, homographies: HomographySet) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng, homographies }
    }
}

impl Tracker for DummyTracker {
    fn name(&self) -> &str {
        "dummy"
    }

    fn detect(
        &mut self,
        frame: &ImageData,
        camera_id: CameraId,
    ) -> Result<Vec<Detection>, ContractError> {
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }
        let (w, h) = (frame.width as f32, frame.height as f32);
        let count = self.rng.random_range(0..=MAX_DETECTIONS);

        let detections: Vec<Detection> = (0..count)
            .map(|_| {
                let bw = w * self.rng.random_range(0.07f32..0.2);
                let bh = h * self.rng.random_range(0.17f32..0.4);
                let x1 = self.rng.random_range(0.0..=(w - bw));
                let y1 = self.rng.random_range(0.0..=(h - bh));
                Detection {
                    bbox: BoundingBox::new(x1, y1, x1 + bw, y1 + bh),
                    confidence: 0.7 + self.rng.random::<f32>() * 0.3,
                    class_id: 0,
                }
            })
            .collect();

        trace!(camera_id, detections = detections.len(), "dummy detections");
        Ok(detections)
    }

    fn track(
        &mut self,
        detections: Vec<Detection>,
        camera_id: CameraId,
        timestamp: f64,
    ) -> Result<Vec<Track>, ContractError> {
        Ok(detections
            .into_iter()
            .enumerate()
            .map(|(i, d)| Track {
                track_id: format!("cam{camera_id}_track_{i}").into(),
                camera_id,
                bbox: d.bbox,
                confidence: d.confidence,
                class_id: d.class_id,
                timestamp,
                appearance: None,
            })
            .collect())
    }

    fn project(&self, tracks: &[Track]) -> Vec<GroundPlaneTrack> {
        super::project_tracks(&self.homographies, tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(seed: u64) -> Vec<Track> {
        let mut tracker = DummyTracker::new(Some(seed), HomographySet::default());
        let frame = ImageData::filled(720, 480, [0, 0, 0]);
        let mut all = Vec::new();
        for _ in 0..10 {
            let detections = tracker.detect(&frame, 1).unwrap();
            all.extend(tracker.track(detections, 1, 2.0).unwrap());
        }
        all
    }

    #[test]
    fn test_detections_inside_frame() {
        let tracks = run(7);
        assert!(!tracks.is_empty());
        for t in &tracks {
            assert!(t.bbox.x1 >= 0.0 && t.bbox.x2 <= 720.0);
            assert!(t.bbox.y1 >= 0.0 && t.bbox.y2 <= 480.0);
            assert!((0.7..=1.0).contains(&t.confidence));
            assert!(t.track_id.as_str().starts_with("cam1_track_"));
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_projection_uses_foot_point() {
        let tracker = DummyTracker::new(Some(0), HomographySet::default());
        let track = Track {
            track_id: "cam0_track_0".into(),
            camera_id: 0,
            bbox: BoundingBox::new(10.0, 20.0, 30.0, 60.0),
            confidence: 0.9,
            class_id: 0,
            timestamp: 0.0,
            appearance: None,
        };
        let projected = tracker.project(&[track]);
        assert_eq!(projected[0].position, contracts::PlanePoint::new(20.0, 60.0));
        assert_eq!(projected[0].camera_id, Some(0));
    }
}
