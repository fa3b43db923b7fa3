use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A keypoint either on a reference surface or in a live frame.
///
/// Reference points live on the surface plane `z = 0`, in real-world units
/// centered on the surface with `+y` pointing up. Scene points are raw image
/// pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub position: Point2<f64>,
    /// Dense index into the owning repository for reference points; the
    /// emission index of the detector for scene points.
    pub repository_id: usize,
    /// Which training tile produced a reference point.
    pub object_id: usize,
    /// Set on repository entries that are currently paired with a scene point.
    pub tracked: bool,
    pub outlier: bool,
    #[serde(default)]
    pub descriptor: Vec<f32>,
}

impl FeaturePoint {
    pub fn new(position: Point2<f64>) -> Self {
        Self {
            position,
            repository_id: 0,
            object_id: 0,
            tracked: false,
            outlier: false,
            descriptor: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, descriptor: Vec<f32>) -> Self {
        self.descriptor = descriptor;
        self
    }
}
