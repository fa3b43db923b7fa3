//! Reference/scene correspondences of one surface.

use nalgebra::Point2;
use planar_track_core::FeaturePoint;
use serde::{Deserialize, Serialize};

/// Two lock-step sequences: `reference()[k]` and `scene()[k]` form pair `k`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedPairSet {
    reference: Vec<FeaturePoint>,
    scene: Vec<FeaturePoint>,
}

impl MatchedPairSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.reference.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.reference.is_empty()
    }

    #[inline]
    pub fn reference(&self) -> &[FeaturePoint] {
        &self.reference
    }

    #[inline]
    pub fn scene(&self) -> &[FeaturePoint] {
        &self.scene
    }

    /// Iterate over pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&FeaturePoint, &FeaturePoint)> {
        self.reference.iter().zip(self.scene.iter())
    }

    pub(crate) fn push(&mut self, reference: FeaturePoint, scene: FeaturePoint) {
        self.reference.push(reference);
        self.scene.push(scene);
    }

    pub(crate) fn set_scene_position(&mut self, k: usize, position: Point2<f64>) {
        if let Some(p) = self.scene.get_mut(k) {
            p.position = position;
        }
    }

    /// Drop the pairs at `indices` and return their reference points.
    ///
    /// Surviving pairs keep their relative order. Duplicate and out-of-range
    /// indices are ignored. The returned points come in no particular order.
    pub(crate) fn remove_pairs(&mut self, indices: &[usize]) -> Vec<FeaturePoint> {
        if indices.is_empty() {
            return Vec::new();
        }
        let mut keep = vec![true; self.len()];
        for &k in indices {
            if let Some(slot) = keep.get_mut(k) {
                *slot = false;
            }
        }

        let mut write = 0;
        for (read, &kept) in keep.iter().enumerate() {
            if !kept {
                continue;
            }
            if write != read {
                self.reference.swap(write, read);
                self.scene.swap(write, read);
            }
            write += 1;
        }

        self.scene.truncate(write);
        self.reference.split_off(write)
    }

    /// Remove every pair, returning the reference points.
    pub(crate) fn clear(&mut self) -> Vec<FeaturePoint> {
        self.scene.clear();
        std::mem::take(&mut self.reference)
    }
}
