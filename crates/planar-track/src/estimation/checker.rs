use crate::OutlierChecker;
use planar_track_core::{FeaturePoint, Homography};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerParams {
    /// Pairs whose transfer error exceeds this many scene pixels are outliers.
    pub reprojection_error: f64,
}

impl Default for CheckerParams {
    fn default() -> Self {
        Self {
            reprojection_error: 15.0,
        }
    }
}

/// Flags pairs by their transfer error under the model.
#[derive(Clone, Debug, Default)]
pub struct ReprojectionChecker {
    params: CheckerParams,
}

impl ReprojectionChecker {
    pub fn new(params: CheckerParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &CheckerParams {
        &self.params
    }
}

impl OutlierChecker for ReprojectionChecker {
    fn check(
        &self,
        model: &Homography,
        reference: &[FeaturePoint],
        scene: &[FeaturePoint],
    ) -> Vec<bool> {
        reference
            .iter()
            .zip(scene)
            .map(|(r, s)| model.transfer_error(r.position, s.position) > self.params.reprojection_error)
            .collect()
    }
}
