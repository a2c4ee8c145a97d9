//! GlobalTrack: one physical object across cameras and time

use std::collections::{BTreeMap, VecDeque};

use contracts::{CameraId, GlobalId, PlanePoint, TrackId};
use nalgebra::{DVector, Vector2};
use serde::Serialize;

/// Position sample in the history
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSample {
    pub position: PlanePoint,
    pub timestamp: f64,
}

/// Persistent cross-camera identity
#[derive(Debug, Clone)]
pub struct GlobalTrack {
    pub(crate) global_id: GlobalId,
    /// camera → local track id (at most one local id per camera)
    pub(crate) memberships: BTreeMap<CameraId, TrackId>,
    pub(crate) created_at: f64,
    pub(crate) last_seen: f64,
    /// Ordered by timestamp, bounded
    pub(crate) history: VecDeque<PositionSample>,
    /// Running mean of member appearance features
    pub(crate) feature: Option<DVector<f64>>,
    pub(crate) feature_samples: u32,
    pub(crate) smoothed: Vector2<f64>,
    pub(crate) velocity: Vector2<f64>,
    last_update: f64,
}

impl GlobalTrack {
    pub(crate) fn new(
        global_id: GlobalId,
        position: Vector2<f64>,
        feature: Option<DVector<f64>>,
        feature_samples: u32,
        timestamp: f64,
    ) -> Self {
        let mut history = VecDeque::new();
        history.push_back(PositionSample {
            position: to_point(&position),
            timestamp,
        });
        Self {
            global_id,
            memberships: BTreeMap::new(),
            created_at: timestamp,
            last_seen: timestamp,
            history,
            feature_samples: if feature.is_some() { feature_samples.max(1) } else { 0 },
            feature,
            smoothed: position,
            velocity: Vector2::zeros(),
            last_update: timestamp,
        }
    }

    pub fn global_id(&self) -> GlobalId {
        self.global_id
    }

    pub fn memberships(&self) -> &BTreeMap<CameraId, TrackId> {
        &self.memberships
    }

    pub fn cameras(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.memberships.keys().copied()
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    pub fn last_seen(&self) -> f64 {
        self.last_seen
    }

    pub fn history(&self) -> impl ExactSizeIterator<Item = &PositionSample> {
        self.history.iter()
    }

    /// Latest raw position sample
    pub fn position(&self) -> PlanePoint {
        self.history
            .back()
            .map(|s| s.position)
            .unwrap_or_else(|| to_point(&self.smoothed))
    }

    /// EMA-smoothed position
    pub fn smoothed_position(&self) -> PlanePoint {
        to_point(&self.smoothed)
    }

    /// EMA velocity (plane units per second)
    pub fn velocity(&self) -> (f64, f64) {
        (self.velocity.x, self.velocity.y)
    }

    pub fn appearance(&self) -> Option<Vec<f32>> {
        self.feature
            .as_ref()
            .map(|f| f.iter().map(|&v| v as f32).collect())
    }

    pub(crate) fn is_expired(&self, now: f64, max_age_s: f64) -> bool {
        now - self.last_seen > max_age_s
    }

    /// Refresh with a new observation
    pub(crate) fn observe(
        &mut self,
        position: Vector2<f64>,
        timestamp: f64,
        alphas: (f64, f64),
        max_history: usize,
    ) {
        let (smoothing_alpha, velocity_alpha) = alphas;
        let dt = timestamp - self.last_update;
        let previous = self.smoothed;
        self.smoothed = position * smoothing_alpha + previous * (1.0 - smoothing_alpha);
        if dt > 0.0 {
            let instant = (self.smoothed - previous) / dt;
            self.velocity = instant * velocity_alpha + self.velocity * (1.0 - velocity_alpha);
            self.last_update = timestamp;
        }

        self.last_seen = self.last_seen.max(timestamp);
        self.push_sample(
            PositionSample {
                position: to_point(&position),
                timestamp,
            },
            max_history,
        );
    }

    fn push_sample(&mut self, sample: PositionSample, max_history: usize) {
        // keep ordered; out-of-order samples are inserted in place
        let at = self
            .history
            .iter()
            .rposition(|s| s.timestamp <= sample.timestamp)
            .map_or(0, |i| i + 1);
        self.history.insert(at, sample);
        while self.history.len() > max_history.max(1) {
            self.history.pop_front();
        }
    }

    /// Fold a feature vector into the running mean
    pub(crate) fn add_feature(&mut self, feature: &DVector<f64>) {
        match self.feature.as_mut() {
            Some(mean) if mean.len() == feature.len() => {
                self.feature_samples += 1;
                let n = self.feature_samples as f64;
                let delta = (feature - &*mean) / n;
                *mean += delta;
            }
            Some(_) => {}
            None => {
                self.feature = Some(feature.clone());
                self.feature_samples = 1;
            }
        }
    }

    /// Absorb another track (this one keeps its id)
    ///
    /// Returns the (camera, local id) pairs of `other` that lost to an
    /// existing membership of `self`.
    pub(crate) fn absorb(&mut self, other: GlobalTrack, max_history: usize) -> Vec<(CameraId, TrackId)> {
        let mut displaced = Vec::new();
        for (camera, local) in other.memberships {
            match self.memberships.get(&camera) {
                Some(existing) if *existing != local => displaced.push((camera, local)),
                Some(_) => {}
                None => {
                    self.memberships.insert(camera, local);
                }
            }
        }

        let mut merged: Vec<PositionSample> = self.history.drain(..).chain(other.history).collect();
        merged.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        let skip = merged.len().saturating_sub(max_history.max(1));
        self.history = merged.into_iter().skip(skip).collect();

        if let Some(theirs) = other.feature {
            let b = other.feature_samples.max(1);
            match self.feature.as_mut() {
                Some(mine) if mine.len() == theirs.len() => {
                    let a = self.feature_samples.max(1);
                    *mine = (&*mine * a as f64 + theirs * b as f64) / (a + b) as f64;
                    self.feature_samples = a + b;
                }
                Some(_) => {}
                None => {
                    self.feature = Some(theirs);
                    self.feature_samples = b;
                }
            }
        }

        self.created_at = self.created_at.min(other.created_at);
        self.last_seen = self.last_seen.max(other.last_seen);
        displaced
    }
}

pub(crate) fn to_point(v: &Vector2<f64>) -> PlanePoint {
    PlanePoint::new(v.x, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALPHAS: (f64, f64) = (0.5, 1.0);

    fn track(id: GlobalId, x: f64, t: f64) -> GlobalTrack {
        GlobalTrack::new(id, Vector2::new(x, 0.0), None, 0, t)
    }

    #[test]
    fn test_observe_smooths_and_estimates_velocity() {
        let mut gt = track(1, 0.0, 0.0);
        gt.observe(Vector2::new(10.0, 0.0), 1.0, ALPHAS, 10);

        assert_eq!(gt.smoothed_position(), PlanePoint::new(5.0, 0.0));
        assert_eq!(gt.velocity(), (5.0, 0.0));
        assert_eq!(gt.position(), PlanePoint::new(10.0, 0.0));
        assert_eq!(gt.last_seen(), 1.0);
        assert_eq!(gt.history().len(), 2);
    }

    #[test]
    fn test_history_bounded() {
        let mut gt = track(1, 0.0, 0.0);
        for i in 1..10 {
            gt.observe(Vector2::new(i as f64, 0.0), i as f64, ALPHAS, 4);
        }
        let stamps: Vec<f64> = gt.history().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_absorb_unions_and_sorts() {
        let mut a = track(1, 0.0, 0.0);
        a.memberships.insert(0, "cam0_track_1".into());
        a.observe(Vector2::new(1.0, 0.0), 2.0, ALPHAS, 10);

        let mut b = track(4, 5.0, 1.0);
        b.memberships.insert(1, "cam1_track_9".into());
        b.memberships.insert(0, "cam0_track_7".into());

        let displaced = a.absorb(b, 10);
        assert_eq!(displaced, vec![(0, TrackId::from("cam0_track_7"))]);
        assert_eq!(a.memberships().len(), 2);
        assert_eq!(a.memberships()[&1].as_str(), "cam1_track_9");

        let stamps: Vec<f64> = a.history().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_feature_running_mean() {
        let mut gt = GlobalTrack::new(
            1,
            Vector2::zeros(),
            Some(DVector::from_vec(vec![1.0, 0.0])),
            1,
            0.0,
        );
        gt.add_feature(&DVector::from_vec(vec![0.0, 1.0]));
        gt.add_feature(&DVector::from_vec(vec![0.0, 1.0]));
        let mean = gt.appearance().unwrap();
        assert!((mean[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((mean[1] - 2.0 / 3.0).abs() < 1e-6);

        // mismatched dimensions are ignored
        gt.add_feature(&DVector::from_vec(vec![1.0, 1.0, 1.0]));
        assert_eq!(gt.appearance().unwrap().len(), 2);
    }
}
