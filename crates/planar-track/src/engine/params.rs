use serde::{Deserialize, Serialize};

/// Per-frame policy of the tracking engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// A surface runs the estimate/reject/refine cycle only when it holds
    /// strictly more matched pairs than this.
    pub min_matched_pairs: usize,
    /// Pairs that must survive outlier rejection before the refined model
    /// is allowed to replace the surface pose.
    pub min_refine_pairs: usize,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            min_matched_pairs: 10,
            min_refine_pairs: 4,
        }
    }
}
