//! KD-tree descriptor index.

use crate::SearchIndex;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point2;
use planar_track_core::FeaturePoint;
use serde::{Deserialize, Serialize};

/// Acceptance rule for a nearest-descriptor match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdTreeIndexParams {
    /// Maximum Euclidean descriptor distance of an accepted match.
    pub max_distance: f32,
    /// Maximum ratio between the best distance and the distance to the
    /// nearest entry of a different physical feature.
    pub max_ratio: f32,
    /// Entries closer than this fraction of the repository extent to the
    /// best entry count as the same feature seen at another scale and are
    /// skipped by the ratio test.
    pub duplicate_radius: f64,
    /// Neighbours fetched per query when looking for a distinct runner-up.
    pub neighbours: usize,
}

impl Default for KdTreeIndexParams {
    fn default() -> Self {
        Self {
            max_distance: 0.3,
            max_ratio: 0.8,
            duplicate_radius: 0.01,
            neighbours: 8,
        }
    }
}

/// [`SearchIndex`] over `D`-dimensional float descriptors.
///
/// Repository points whose descriptor length differs from `D` are not
/// indexed; candidates with the wrong length never match.
pub struct KdTreeIndex<const D: usize> {
    params: KdTreeIndexParams,
    tree: Option<KdTree<f32, D>>,
    ids: Vec<usize>,
    positions: Vec<Point2<f64>>,
    duplicate_radius: f64,
}

impl<const D: usize> KdTreeIndex<D> {
    pub fn new(params: KdTreeIndexParams) -> Self {
        Self {
            params,
            tree: None,
            ids: Vec::new(),
            positions: Vec::new(),
            duplicate_radius: 0.0,
        }
    }

    #[inline]
    pub fn params(&self) -> &KdTreeIndexParams {
        &self.params
    }

    /// Number of indexed repository points.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<const D: usize> Default for KdTreeIndex<D> {
    fn default() -> Self {
        Self::new(KdTreeIndexParams::default())
    }
}

fn descriptor<const D: usize>(point: &FeaturePoint) -> Option<[f32; D]> {
    point.descriptor.as_slice().try_into().ok()
}

/// Diagonal of the bounding box of `points`.
fn extent(points: &[Point2<f64>]) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };
    let (min, max) = points.iter().fold((*first, *first), |(lo, hi), p| {
        (
            Point2::new(lo.x.min(p.x), lo.y.min(p.y)),
            Point2::new(hi.x.max(p.x), hi.y.max(p.y)),
        )
    });
    (max - min).norm()
}

impl<const D: usize> SearchIndex for KdTreeIndex<D> {
    fn train(&mut self, repository: &[FeaturePoint]) {
        let mut coords = Vec::with_capacity(repository.len());
        self.ids.clear();
        self.positions.clear();
        for p in repository {
            if let Some(d) = descriptor::<D>(p) {
                coords.push(d);
                self.ids.push(p.repository_id);
                self.positions.push(p.position);
            }
        }
        let skipped = repository.len() - coords.len();
        if skipped > 0 {
            log::warn!("{skipped} repository points without a {D}-dim descriptor were not indexed");
        }
        self.duplicate_radius = self.params.duplicate_radius * extent(&self.positions);
        self.tree = if coords.is_empty() {
            None
        } else {
            Some((&coords).into())
        };
    }

    fn find(&self, candidate: &FeaturePoint) -> Option<usize> {
        let tree = self.tree.as_ref()?;
        let query = descriptor::<D>(candidate)?;
        let nearest = tree.nearest_n::<SquaredEuclidean>(&query, self.params.neighbours.max(2));

        let best = nearest.first()?;
        let best_dist = best.distance.sqrt();
        if best_dist > self.params.max_distance {
            return None;
        }
        let anchor = *self.positions.get(best.item as usize)?;
        let runner_up = nearest[1..].iter().find(|n| {
            self.positions
                .get(n.item as usize)
                .is_some_and(|p| (p - anchor).norm() > self.duplicate_radius)
        });
        if let Some(second) = runner_up {
            if best_dist >= self.params.max_ratio * second.distance.sqrt() {
                return None;
            }
        }
        self.ids.get(best.item as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn point_at(id: usize, x: f64, y: f64, descriptor: [f32; 3]) -> FeaturePoint {
        let mut p = FeaturePoint::new(Point2::new(x, y)).with_descriptor(descriptor.to_vec());
        p.repository_id = id;
        p
    }

    fn point(id: usize, descriptor: [f32; 3]) -> FeaturePoint {
        point_at(id, 0.0, 0.0, descriptor)
    }

    fn repository() -> Vec<FeaturePoint> {
        vec![
            point_at(0, -1.0, -1.0, [1.0, 0.0, 0.0]),
            point_at(1, 1.0, -1.0, [0.0, 1.0, 0.0]),
            point_at(2, 1.0, 1.0, [0.0, 0.0, 1.0]),
            point_at(3, -1.0, 1.0, [0.7, 0.7, 0.0]),
        ]
    }

    #[test]
    fn finds_nearest_distinctive_descriptor() {
        let mut index = KdTreeIndex::<3>::default();
        index.train(&repository());
        assert_eq!(index.len(), 4);
        assert_eq!(index.find(&point(99, [0.02, 0.0, 0.98])), Some(2));
        assert_eq!(index.find(&point(99, [0.95, 0.05, 0.0])), Some(0));
    }

    #[test]
    fn rejects_far_and_ambiguous_candidates() {
        let mut index = KdTreeIndex::<3>::default();
        index.train(&repository());
        // Far from everything.
        assert_eq!(index.find(&point(99, [-1.0, -1.0, -1.0])), None);
        // Halfway between two entries.
        assert_eq!(index.find(&point(99, [0.5, 0.0, 0.5])), None);
    }

    #[test]
    fn same_feature_at_another_scale_does_not_block_the_match() {
        // Entries 0 and 1 are one corner seen in two tiles; entry 2 is elsewhere.
        let repo = vec![
            point_at(0, 0.500, 0.500, [1.0, 0.0, 0.0]),
            point_at(1, 0.502, 0.499, [0.95, 0.05, 0.0]),
            point_at(2, -2.0, -1.5, [0.0, 0.0, 1.0]),
            point_at(3, 2.0, 1.5, [0.0, 1.0, 0.0]),
        ];
        let mut index = KdTreeIndex::<3>::default();
        index.train(&repo);
        assert_eq!(index.find(&point(99, [0.977, 0.023, 0.0])), Some(0));

        // The same descriptors at distinct positions are ambiguous.
        let mut spread = repo.clone();
        spread[1].position = Point2::new(-1.0, 1.0);
        index.train(&spread);
        assert_eq!(index.find(&point(99, [0.977, 0.023, 0.0])), None);
    }

    #[test]
    fn wrong_dimension_is_ignored() {
        let mut repo = repository();
        repo.push(point(4, [0.0, 0.0, 0.0]));
        repo[4].descriptor.pop();
        let mut index = KdTreeIndex::<3>::default();
        index.train(&repo);
        assert_eq!(index.len(), 4);

        let mut short = point(99, [0.0, 0.0, 1.0]);
        short.descriptor.pop();
        assert_eq!(index.find(&short), None);
    }

    #[test]
    fn untrained_index_never_matches() {
        let index = KdTreeIndex::<3>::default();
        assert!(index.is_empty());
        assert_eq!(index.find(&point(0, [1.0, 0.0, 0.0])), None);
    }
}
