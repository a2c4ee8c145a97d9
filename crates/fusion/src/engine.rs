//! FusionEngine: cross-camera identity resolution
//!
//! Per cycle: validate → expire → cluster → resolve (multi-camera clusters
//! first, then singletons) → tag.

use std::collections::{BTreeMap, HashMap, HashSet};

use contracts::{
    CameraId, FusedTrack, FusionConfig, FusionStats, GlobalId, GroundPlaneTrack, TrackId,
};
use nalgebra::{DVector, Vector2};
use tracing::{debug, info, instrument, trace, warn};

use crate::cluster::{self, Candidate};
use crate::error::{FusionError, Result};
use crate::global_track::GlobalTrack;

type LocalKey = (CameraId, TrackId);

/// Cross-camera identity registry
///
/// Owns every `GlobalTrack` and the `(camera, local id) → global id` table.
/// Not thread-safe on its own; see [`crate::SharedFusion`].
#[derive(Debug)]
pub struct FusionEngine {
    config: FusionConfig,
    tracks: BTreeMap<GlobalId, GlobalTrack>,
    mapping: HashMap<LocalKey, GlobalId>,
    next_id: GlobalId,
    tracks_created: u64,
    merges: u64,
    multi_camera_associations: u64,
    dropped_inputs: u64,
    cycles: u64,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            mapping: HashMap::new(),
            next_id: 1,
            tracks_created: 0,
            merges: 0,
            multi_camera_associations: 0,
            dropped_inputs: 0,
            cycles: 0,
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse one batch of ground-plane tracks observed at `now`
    ///
    /// Malformed inputs are dropped (counted, logged) and absent from the
    /// output; every other input comes back tagged, in input order.
    #[instrument(
        name = "fusion_cycle",
        skip(self, tracks),
        fields(cycle = self.cycles + 1, inputs = tracks.len())
    )]
    pub fn fuse(&mut self, tracks: &[GroundPlaneTrack], now: f64) -> Vec<FusedTrack> {
        self.cycles += 1;

        let candidates = self.validate(tracks);
        self.expire(now);

        let mut clusters = cluster::cluster(
            &candidates,
            self.config.spatial_threshold,
            self.config.appearance_threshold,
        );
        // multi-camera clusters claim memberships before any singleton refreshes
        clusters.sort_by_key(|members| members.len() == 1);
        for members in &clusters {
            self.resolve(&candidates, members, now);
        }

        let fused: Vec<FusedTrack> = candidates
            .iter()
            .map(|c| {
                let global_id = self.tag(c, now);
                let input = &tracks[c.index];
                FusedTrack {
                    global_id,
                    camera_id: c.camera_id,
                    track_id: c.track_id.clone(),
                    position: input.position,
                    confidence: input.confidence,
                }
            })
            .collect();

        debug!(
            clusters = clusters.len(),
            fused = fused.len(),
            global_tracks = self.tracks.len(),
            "fusion cycle complete"
        );
        fused
    }

    /// Reject malformed inputs; duplicates keep their first occurrence
    fn validate(&mut self, tracks: &[GroundPlaneTrack]) -> Vec<Candidate> {
        let mut seen: HashSet<LocalKey> = HashSet::with_capacity(tracks.len());
        let mut candidates = Vec::with_capacity(tracks.len());

        for (index, track) in tracks.iter().enumerate() {
            match check_input(index, track, &mut seen) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    self.dropped_inputs += 1;
                    warn!(error = %e, "dropping fusion input");
                }
            }
        }
        candidates
    }

    /// Remove global tracks unseen for longer than the max age
    fn expire(&mut self, now: f64) {
        let max_age = self.config.max_track_age_s;
        let expired: Vec<GlobalId> = self
            .tracks
            .values()
            .filter(|gt| gt.is_expired(now, max_age))
            .map(|gt| gt.global_id)
            .collect();

        for global_id in expired {
            if let Some(gt) = self.tracks.remove(&global_id) {
                for (camera, local) in gt.memberships {
                    self.mapping.remove(&(camera, local));
                }
                info!(global_id, last_seen = gt.last_seen, "global track expired");
            }
        }
    }

    fn resolve(&mut self, candidates: &[Candidate], members: &[usize], now: f64) {
        let mut existing: Vec<GlobalId> = members
            .iter()
            .filter_map(|&i| self.live_mapping(&candidates[i]))
            .collect();
        existing.sort_unstable();
        existing.dedup();

        if let [only] = members {
            let candidate = &candidates[*only];
            match existing.first() {
                Some(&global_id) => self.refresh(global_id, candidate, now),
                None => {
                    self.allocate_singleton(candidate, now);
                }
            }
            return;
        }

        let (position, feature) = cluster_mean(candidates, members);
        let global_id = match existing.split_first() {
            Some((&primary, rest)) => {
                for &secondary in rest {
                    self.merge(primary, secondary);
                }
                self.multi_camera_associations += 1;
                primary
            }
            None => {
                let samples = members
                    .iter()
                    .filter(|&&i| candidates[i].feature.is_some())
                    .count() as u32;
                let global_id = self.allocate(position, feature, samples, now);
                for &i in members {
                    self.assign(global_id, &candidates[i]);
                }
                debug!(global_id, members = members.len(), "multi-camera track created");
                return;
            }
        };

        for &i in members {
            self.assign(global_id, &candidates[i]);
        }
        let alphas = self.alphas();
        let max_history = self.config.max_history;
        if let Some(gt) = self.tracks.get_mut(&global_id) {
            gt.observe(position, now, alphas, max_history);
            for f in members.iter().filter_map(|&i| candidates[i].feature.as_ref()) {
                gt.add_feature(f);
            }
        }
    }

    /// Global id of a candidate's mapping, if its track is still live
    fn live_mapping(&self, candidate: &Candidate) -> Option<GlobalId> {
        let key = (candidate.camera_id, candidate.track_id.clone());
        self.mapping
            .get(&key)
            .copied()
            .filter(|id| self.tracks.contains_key(id))
    }

    fn refresh(&mut self, global_id: GlobalId, candidate: &Candidate, now: f64) {
        let alphas = self.alphas();
        let max_history = self.config.max_history;
        if let Some(gt) = self.tracks.get_mut(&global_id) {
            gt.observe(candidate.position, now, alphas, max_history);
            if let Some(f) = &candidate.feature {
                gt.add_feature(f);
            }
            trace!(global_id, track_id = %candidate.track_id, "global track refreshed");
        }
    }

    fn allocate_singleton(&mut self, candidate: &Candidate, now: f64) -> GlobalId {
        let samples = u32::from(candidate.feature.is_some());
        let global_id = self.allocate(candidate.position, candidate.feature.clone(), samples, now);
        self.assign(global_id, candidate);
        debug!(
            global_id,
            camera_id = candidate.camera_id,
            track_id = %candidate.track_id,
            "global track created"
        );
        global_id
    }

    fn allocate(
        &mut self,
        position: Vector2<f64>,
        feature: Option<DVector<f64>>,
        samples: u32,
        now: f64,
    ) -> GlobalId {
        let global_id = self.next_id;
        self.next_id += 1;
        self.tracks_created += 1;
        self.tracks
            .insert(global_id, GlobalTrack::new(global_id, position, feature, samples, now));
        global_id
    }

    /// Fold `secondary` into `primary`; `secondary` is retired for good
    fn merge(&mut self, primary: GlobalId, secondary: GlobalId) {
        let Some(other) = self.tracks.remove(&secondary) else {
            return;
        };
        let moved: Vec<LocalKey> = other
            .memberships
            .iter()
            .map(|(camera, local)| (*camera, local.clone()))
            .collect();

        let max_history = self.config.max_history;
        let Some(gt) = self.tracks.get_mut(&primary) else {
            return;
        };
        let displaced = gt.absorb(other, max_history);

        for key in moved {
            if displaced.contains(&key) {
                self.mapping.remove(&key);
            } else {
                self.mapping.insert(key, primary);
            }
        }
        self.merges += 1;
        info!(
            primary,
            secondary,
            displaced = displaced.len(),
            "global tracks merged"
        );
    }

    /// Make `candidate` the member of `global_id` for its camera
    ///
    /// A previous member from the same camera loses its mapping.
    fn assign(&mut self, global_id: GlobalId, candidate: &Candidate) {
        let Some(gt) = self.tracks.get_mut(&global_id) else {
            return;
        };
        let key = (candidate.camera_id, candidate.track_id.clone());
        if let Some(previous) = gt.memberships.insert(key.0, key.1.clone()) {
            if previous != candidate.track_id {
                let old_key = (candidate.camera_id, previous);
                if self.mapping.get(&old_key) == Some(&global_id) {
                    self.mapping.remove(&old_key);
                    trace!(global_id, track_id = %old_key.1, "membership replaced");
                }
            }
        }
        self.mapping.insert(key, global_id);
    }

    /// Resolved id for a candidate; a track whose mapping was taken over in
    /// this cycle gets a fresh identity
    fn tag(&mut self, candidate: &Candidate, now: f64) -> GlobalId {
        match self.live_mapping(candidate) {
            Some(global_id) => global_id,
            None => self.allocate_singleton(candidate, now),
        }
    }

    fn alphas(&self) -> (f64, f64) {
        (self.config.smoothing_alpha, self.config.velocity_alpha)
    }

    pub fn stats(&self) -> FusionStats {
        FusionStats {
            total_global_tracks: self.tracks.len(),
            tracks_created: self.tracks_created,
            merges: self.merges,
            multi_camera_associations: self.multi_camera_associations,
            active_mappings: self.mapping.len(),
            dropped_inputs: self.dropped_inputs,
        }
    }

    pub fn global_track(&self, global_id: GlobalId) -> Option<&GlobalTrack> {
        self.tracks.get(&global_id)
    }

    /// Live global tracks, ascending id
    pub fn global_tracks(&self) -> impl Iterator<Item = &GlobalTrack> {
        self.tracks.values()
    }

    /// Current global id of a (camera, local track) pair
    pub fn global_id_of(&self, camera_id: CameraId, track_id: &TrackId) -> Option<GlobalId> {
        self.mapping.get(&(camera_id, track_id.clone())).copied()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Drop all identity state; ids keep increasing afterwards
    pub fn reset(&mut self) {
        info!(
            global_tracks = self.tracks.len(),
            mappings = self.mapping.len(),
            "fusion state reset"
        );
        self.tracks.clear();
        self.mapping.clear();
        self.tracks_created = 0;
        self.merges = 0;
        self.multi_camera_associations = 0;
        self.dropped_inputs = 0;
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

fn check_input(
    index: usize,
    track: &GroundPlaneTrack,
    seen: &mut HashSet<LocalKey>,
) -> Result<Candidate> {
    let camera_id = track.camera_id.ok_or_else(|| FusionError::MissingCamera {
        track_id: track.track_id.to_string(),
    })?;
    if track.track_id.is_blank() {
        return Err(FusionError::BlankTrackId { camera_id });
    }
    if !track.position.is_finite() {
        return Err(FusionError::NonFinitePosition {
            track_id: track.track_id.to_string(),
            x: track.position.x,
            y: track.position.y,
        });
    }

    let feature = match &track.appearance {
        None => None,
        Some(values) if values.is_empty() => {
            return Err(FusionError::InvalidFeature {
                track_id: track.track_id.to_string(),
                message: "empty vector".to_string(),
            });
        }
        Some(values) if values.iter().any(|v| !v.is_finite()) => {
            return Err(FusionError::InvalidFeature {
                track_id: track.track_id.to_string(),
                message: "non-finite component".to_string(),
            });
        }
        Some(values) => Some(DVector::from_iterator(
            values.len(),
            values.iter().map(|&v| f64::from(v)),
        )),
    };

    if !seen.insert((camera_id, track.track_id.clone())) {
        return Err(FusionError::DuplicateTrack {
            camera_id,
            track_id: track.track_id.to_string(),
        });
    }

    Ok(Candidate {
        index,
        camera_id,
        track_id: track.track_id.clone(),
        position: Vector2::new(track.position.x, track.position.y),
        feature,
    })
}

/// Mean position and mean feature of a cluster
///
/// Features whose dimension differs from the first one present are skipped.
fn cluster_mean(candidates: &[Candidate], members: &[usize]) -> (Vector2<f64>, Option<DVector<f64>>) {
    let position = members
        .iter()
        .fold(Vector2::<f64>::zeros(), |acc, &i| acc + candidates[i].position)
        / members.len().max(1) as f64;

    let mut sum: Option<DVector<f64>> = None;
    let mut count = 0usize;
    for f in members.iter().filter_map(|&i| candidates[i].feature.as_ref()) {
        match sum.as_mut() {
            Some(acc) if acc.len() == f.len() => {
                *acc += f;
                count += 1;
            }
            Some(_) => {}
            None => {
                sum = Some(f.clone());
                count = 1;
            }
        }
    }
    (position, sum.map(|s| s / count as f64))
}
