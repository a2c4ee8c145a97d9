//! Image → ground-plane projection

use std::collections::HashMap;

use contracts::{CameraHomography, CameraId, PlanePoint};
use nalgebra::{Matrix3, Vector3};

use crate::error::{Result, VisionError};

/// Projective weights closer to zero than this map to infinity
const MIN_W: f64 = 1e-9;

/// 3×3 planar homography
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Build from a row-major matrix; rejects non-finite and singular input
    pub fn from_row_major(camera_id: CameraId, values: &[f64; 9]) -> Result<Self> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(VisionError::InvalidHomography {
                camera_id,
                message: "non-finite entry".to_string(),
            });
        }
        let matrix = Matrix3::from_row_slice(values);
        if matrix.determinant().abs() < MIN_W {
            return Err(VisionError::InvalidHomography {
                camera_id,
                message: "matrix is singular".to_string(),
            });
        }
        Ok(Self { matrix })
    }

    /// Project an image point; `None` for points on the horizon line
    pub fn project(&self, x: f64, y: f64) -> Option<PlanePoint> {
        let p = self.matrix * Vector3::new(x, y, 1.0);
        if p.z.abs() < MIN_W {
            return None;
        }
        let point = PlanePoint::new(p.x / p.z, p.y / p.z);
        point.is_finite().then_some(point)
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

/// Per-camera homographies; cameras without one use identity
#[derive(Debug, Clone, Default)]
pub struct HomographySet {
    by_camera: HashMap<CameraId, Homography>,
}

impl HomographySet {
    pub fn from_config(entries: &[CameraHomography]) -> Result<Self> {
        let mut by_camera = HashMap::with_capacity(entries.len());
        for entry in entries {
            let h = Homography::from_row_major(entry.camera_id, &entry.matrix)?;
            by_camera.insert(entry.camera_id, h);
        }
        Ok(Self { by_camera })
    }

    pub fn insert(&mut self, camera_id: CameraId, homography: Homography) {
        self.by_camera.insert(camera_id, homography);
    }

    pub fn get(&self, camera_id: CameraId) -> Homography {
        self.by_camera.get(&camera_id).copied().unwrap_or_default()
    }

    pub fn is_calibrated(&self, camera_id: CameraId) -> bool {
        self.by_camera.contains_key(&camera_id)
    }

    pub fn project(&self, camera_id: CameraId, x: f64, y: f64) -> Option<PlanePoint> {
        self.get(camera_id).project(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_projection() {
        let h = Homography::identity();
        assert_eq!(h.project(3.0, 4.0), Some(PlanePoint::new(3.0, 4.0)));
    }

    #[test]
    fn test_scale_and_translate() {
        // x' = 2x + 100, y' = 2y
        let h = Homography::from_row_major(0, &[2.0, 0.0, 100.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        assert_eq!(h.project(1.0, 5.0), Some(PlanePoint::new(102.0, 10.0)));
    }

    #[test]
    fn test_horizon_point_rejected() {
        // w = y - 10
        let h = Homography::from_row_major(0, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, -10.0])
            .unwrap();
        assert!(h.project(5.0, 10.0).is_none());
        assert!(h.project(5.0, 20.0).is_some());
    }

    #[test]
    fn test_invalid_matrices() {
        let singular = [1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0];
        assert!(matches!(
            Homography::from_row_major(3, &singular),
            Err(VisionError::InvalidHomography { camera_id: 3, .. })
        ));
        let mut nan = [0.0; 9];
        nan[0] = f64::NAN;
        assert!(Homography::from_row_major(0, &nan).is_err());
    }

    #[test]
    fn test_set_falls_back_to_identity() {
        let set = HomographySet::from_config(&[CameraHomography {
            camera_id: 1,
            matrix: [1.0, 0.0, 50.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }])
        .unwrap();
        assert!(set.is_calibrated(1));
        assert!(!set.is_calibrated(0));
        assert_eq!(set.project(1, 0.0, 0.0), Some(PlanePoint::new(50.0, 0.0)));
        assert_eq!(set.project(0, 7.0, 8.0), Some(PlanePoint::new(7.0, 8.0)));
    }
}
