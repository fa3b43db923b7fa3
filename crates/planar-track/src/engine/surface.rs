use crate::{FeatureRepository, MatchedPairSet, SearchIndex};
use planar_track_core::{Calibration, FeaturePoint, GrayImage, PoseModel};

/// Everything the engine keeps for one tracked surface.
pub(crate) struct Surface {
    pub(crate) reference: GrayImage,
    pub(crate) repository: FeatureRepository,
    pub(crate) index: Option<Box<dyn SearchIndex>>,
    pub(crate) pairs: MatchedPairSet,
    pub(crate) pose: PoseModel,
}

impl Surface {
    pub(crate) fn new(reference: GrayImage, calibration: Calibration) -> Self {
        Self {
            reference,
            repository: FeatureRepository::default(),
            index: None,
            pairs: MatchedPairSet::new(),
            pose: PoseModel::new(calibration),
        }
    }

    #[inline]
    pub(crate) fn is_trained(&self) -> bool {
        self.index.is_some()
    }

    /// Drop the pairs at `indices` and free their repository entries.
    pub(crate) fn release_pairs(&mut self, indices: &[usize]) -> usize {
        let removed = self.pairs.remove_pairs(indices);
        for p in &removed {
            self.repository.set_tracked(p.repository_id, false);
        }
        removed.len()
    }

    /// Match detector candidates against the repository and append a pair
    /// for every hit on an entry that is not tracked yet.
    pub(crate) fn match_candidates(&mut self, candidates: &[FeaturePoint]) -> usize {
        let Some(index) = self.index.as_deref() else {
            return 0;
        };
        let mut added = 0;
        for candidate in candidates {
            let Some(id) = index.find(candidate) else {
                continue;
            };
            let Some(entry) = self.repository.get(id) else {
                log::warn!(
                    "search index returned id {id} for a repository of {} points",
                    self.repository.len()
                );
                continue;
            };
            if entry.tracked {
                continue;
            }
            let mut reference = entry.clone();
            reference.tracked = true;
            let mut scene = candidate.clone();
            scene.outlier = false;

            self.repository.set_tracked(id, true);
            self.pairs.push(reference, scene);
            added += 1;
        }
        added
    }

    /// Replace the trained state, discarding every pair and the pose.
    pub(crate) fn install(&mut self, repository: FeatureRepository, index: Box<dyn SearchIndex>) {
        self.pairs.clear();
        self.pose.reset();
        self.repository = repository;
        self.index = Some(index);
    }
}
