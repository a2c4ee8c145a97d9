//! Candidate graph and connected-component clustering
//!
//! O(n²) edge construction over one cycle's tracks; n is tens, not thousands.

use contracts::{CameraId, TrackId};
use nalgebra::{DVector, Vector2};

/// Validated fusion input
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    /// Position in the input batch
    pub index: usize,
    pub camera_id: CameraId,
    pub track_id: TrackId,
    pub position: Vector2<f64>,
    pub feature: Option<DVector<f64>>,
}

/// Cosine distance `1 - cos(a, b)`; `None` when dimensions differ
pub(crate) fn cosine_distance(a: &DVector<f64>, b: &DVector<f64>) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    Some(1.0 - a.dot(b) / (a.norm() * b.norm() + 1e-8))
}

/// Edge rule: different cameras, within `spatial_threshold`, and (only
/// when both carry comparable features) within `appearance_threshold`
pub(crate) fn linked(
    a: &Candidate,
    b: &Candidate,
    spatial_threshold: f64,
    appearance_threshold: f64,
) -> bool {
    if a.camera_id == b.camera_id {
        return false;
    }
    if (a.position - b.position).norm() > spatial_threshold {
        return false;
    }
    match (&a.feature, &b.feature) {
        (Some(fa), Some(fb)) => {
            cosine_distance(fa, fb).map_or(true, |distance| distance <= appearance_threshold)
        }
        _ => true,
    }
}

/// Symmetric adjacency lists
pub(crate) fn build_graph(
    candidates: &[Candidate],
    spatial_threshold: f64,
    appearance_threshold: f64,
) -> Vec<Vec<usize>> {
    let n = candidates.len();
    let mut adjacency = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if linked(
                &candidates[i],
                &candidates[j],
                spatial_threshold,
                appearance_threshold,
            ) {
                adjacency[i].push(j);
                adjacency[j].push(i);
            }
        }
    }
    adjacency
}

/// Connected components by depth-first traversal, in discovery order
pub(crate) fn connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut visited = vec![false; adjacency.len()];
    let mut components = Vec::new();

    for start in 0..adjacency.len() {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(node) = stack.pop() {
            component.push(node);
            for &next in adjacency[node].iter().rev() {
                if !visited[next] {
                    visited[next] = true;
                    stack.push(next);
                }
            }
        }
        components.push(component);
    }
    components
}

/// Split a component so no group holds two tracks of one camera
///
/// A chain `cam0 - cam1 - cam0` is connected without a direct same-camera
/// edge; each node joins the first group that lacks its camera and already
/// holds one of its neighbours, otherwise it starts a new group.
pub(crate) fn split_same_camera(
    component: &[usize],
    candidates: &[Candidate],
    adjacency: &[Vec<usize>],
) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for &node in component {
        let camera = candidates[node].camera_id;
        let slot = groups.iter().position(|group| {
            group.iter().all(|&m| candidates[m].camera_id != camera)
                && group.iter().any(|m| adjacency[node].contains(m))
        });
        match slot {
            Some(slot) => groups[slot].push(node),
            None => groups.push(vec![node]),
        }
    }
    groups
}

/// Final clusters: components, split where a camera repeats
pub(crate) fn cluster(
    candidates: &[Candidate],
    spatial_threshold: f64,
    appearance_threshold: f64,
) -> Vec<Vec<usize>> {
    let adjacency = build_graph(candidates, spatial_threshold, appearance_threshold);
    connected_components(&adjacency)
        .into_iter()
        .flat_map(|component| split_same_camera(&component, candidates, &adjacency))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(index: usize, camera_id: CameraId, x: f64, y: f64) -> Candidate {
        Candidate {
            index,
            camera_id,
            track_id: TrackId::local(camera_id, index as u64),
            position: Vector2::new(x, y),
            feature: None,
        }
    }

    fn with_feature(mut c: Candidate, feature: &[f64]) -> Candidate {
        c.feature = Some(DVector::from_column_slice(feature));
        c
    }

    #[test]
    fn test_cosine_distance() {
        let a = DVector::from_vec(vec![1.0, 0.0]);
        let b = DVector::from_vec(vec![0.0, 1.0]);
        assert!(cosine_distance(&a, &a).unwrap().abs() < 1e-6);
        assert!((cosine_distance(&a, &b).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&a, &DVector::from_vec(vec![1.0, 0.0, 0.0])).is_none());
    }

    #[test]
    fn test_edge_rules() {
        let a = candidate(0, 0, 100.0, 100.0);
        let b = candidate(1, 1, 105.0, 102.0);
        let same_cam = candidate(2, 0, 101.0, 100.0);
        let far = candidate(3, 1, 500.0, 500.0);

        assert!(linked(&a, &b, 50.0, 0.4));
        assert!(!linked(&a, &same_cam, 50.0, 0.4));
        assert!(!linked(&a, &far, 50.0, 0.4));

        // appearance checked only when both sides carry features
        let a_feat = with_feature(a.clone(), &[1.0, 0.0]);
        let b_feat = with_feature(b.clone(), &[0.0, 1.0]);
        assert!(!linked(&a_feat, &b_feat, 50.0, 0.4));
        assert!(linked(&a_feat, &b, 50.0, 0.4));
        let b_close = with_feature(b, &[0.9, 0.1]);
        assert!(linked(&a_feat, &b_close, 50.0, 0.4));
    }

    #[test]
    fn test_components() {
        let candidates = vec![
            candidate(0, 0, 0.0, 0.0),
            candidate(1, 1, 10.0, 0.0),
            candidate(2, 2, 20.0, 0.0),
            candidate(3, 0, 900.0, 900.0),
        ];
        let clusters = cluster(&candidates, 15.0, 0.4);
        assert_eq!(clusters.len(), 2);
        let mut first = clusters[0].clone();
        first.sort_unstable();
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(clusters[1], vec![3]);
    }

    #[test]
    fn test_same_camera_chain_is_split() {
        // cam0 - cam1 - cam0: connected, but cam0 tracks must stay apart
        let candidates = vec![
            candidate(0, 0, 0.0, 0.0),
            candidate(1, 1, 10.0, 0.0),
            candidate(2, 0, 20.0, 0.0),
        ];
        let clusters = cluster(&candidates, 15.0, 0.4);
        assert_eq!(clusters.len(), 2);
        for group in &clusters {
            let cams: Vec<_> = group.iter().map(|&i| candidates[i].camera_id).collect();
            let mut unique = cams.clone();
            unique.dedup();
            assert_eq!(cams.len(), unique.len());
        }
    }
}
