use serde::{Deserialize, Serialize};

/// Counters collected for one surface during one update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceFrameStats {
    /// Pairs carried forward by the tracker.
    pub propagated: usize,
    /// Pairs dropped because the tracker lost them.
    pub lost: usize,
    /// Pairs appended by detection this frame.
    pub detected: usize,
    /// Pairs dropped by the outlier checker.
    pub rejected: usize,
    /// Pair count at the end of the update.
    pub matched: usize,
    /// Whether the pose was replaced this frame.
    pub pose_updated: bool,
}

/// Diagnostics of one [`crate::TrackingEngine::update`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    /// Zero-based index of the processed frame.
    pub frame_index: u64,
    /// Surface that received detections, `None` on idle frames.
    pub detection_target: Option<usize>,
    /// Keypoints the detector returned this frame.
    pub keypoints: usize,
    pub surfaces: Vec<SurfaceFrameStats>,
}

impl FrameReport {
    pub fn total_matched(&self) -> usize {
        self.surfaces.iter().map(|s| s.matched).sum()
    }

    pub fn updated_poses(&self) -> usize {
        self.surfaces.iter().filter(|s| s.pose_updated).count()
    }
}
