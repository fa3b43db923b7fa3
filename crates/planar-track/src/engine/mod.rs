//! Multi-surface tracking engine.
//!
//! The engine owns one slot per reference surface (repository, search index,
//! matched pairs, pose model) and runs the per-frame cycle: propagate the
//! existing matches with the tracker, detect new matches for the surface
//! picked by the round-robin scheduler, then estimate, reject, refine and
//! decompose the pose of every surface that holds enough matches.

mod error;
mod params;
mod pipeline;
mod report;
mod surface;

use serde::{Deserialize, Serialize};

pub use error::TrackingError;
pub use params::TrackerParams;
pub use pipeline::TrackingEngine;
pub use report::{FrameReport, SurfaceFrameStats};

/// Lifecycle of a [`TrackingEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EngineState {
    Uninitialized,
    /// Calibration and frame geometry are known.
    Initialized,
    /// At least one surface has a trained repository.
    Trained,
    /// At least one frame has been processed.
    Tracking,
}

/// Frame size and the physical size of the tracked surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub real_width: f64,
    pub real_height: f64,
}

impl FrameGeometry {
    pub(crate) fn validate(&self) -> Result<(), TrackingError> {
        if self.width == 0 || self.height == 0 {
            return Err(TrackingError::InvalidDimensions {
                reason: format!("frame size {}x{} is empty", self.width, self.height),
            });
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.real_width) || !positive(self.real_height) {
            return Err(TrackingError::InvalidDimensions {
                reason: format!(
                    "surface size {}x{} must be positive",
                    self.real_width, self.real_height
                ),
            });
        }
        Ok(())
    }
}
