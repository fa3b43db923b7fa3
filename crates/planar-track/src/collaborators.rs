//! Capability traits for the pluggable stages of the tracking cycle.
//!
//! The engine holds exactly one boxed implementation per role and calls them
//! sequentially; implementations may keep internal scratch state between
//! calls but must not rely on being called for any particular surface.

use planar_track_core::{FeaturePoint, GrayImageView, Homography};
use std::fmt;

/// Keypoint + descriptor extractor.
pub trait FeatureDetector {
    /// Run detection on `image`, replacing the stored keypoint list.
    fn extract(&mut self, image: &GrayImageView<'_>);

    /// Keypoints produced by the last [`FeatureDetector::extract`] call, in
    /// image pixel coordinates.
    fn keypoints(&self) -> &[FeaturePoint];

    /// Adjust the detector response threshold.
    fn set_threshold(&mut self, threshold: f64);
}

/// Frame-to-frame sparse point tracker.
pub trait PointTracker {
    /// Track `points` from `previous` into `current`.
    ///
    /// Must return exactly one point per input, in input order. Points that
    /// could not be followed are returned with `outlier == true`.
    fn track(
        &mut self,
        previous: &GrayImageView<'_>,
        current: &GrayImageView<'_>,
        points: &[FeaturePoint],
    ) -> Vec<FeaturePoint>;
}

/// Nearest-descriptor lookup over one surface's repository.
pub trait SearchIndex {
    /// Build the index over a complete repository.
    fn train(&mut self, repository: &[FeaturePoint]);

    /// Repository id of the best match for `candidate`, if any.
    fn find(&self, candidate: &FeaturePoint) -> Option<usize>;
}

/// Builds a fresh [`SearchIndex`] for every trained surface.
pub trait SearchIndexFactory {
    fn create(&self) -> Box<dyn SearchIndex>;
}

impl<F> SearchIndexFactory for F
where
    F: Fn() -> Box<dyn SearchIndex>,
{
    fn create(&self) -> Box<dyn SearchIndex> {
        self()
    }
}

/// Robust plane-to-image model estimation.
pub trait HomographyEstimator {
    /// Estimate the homography mapping `reference` positions onto `scene`
    /// positions. Both slices have equal length.
    fn estimate(
        &mut self,
        reference: &[FeaturePoint],
        scene: &[FeaturePoint],
    ) -> Option<Homography>;
}

/// Flags correspondences that disagree with a model.
pub trait OutlierChecker {
    /// One flag per pair, `true` for outliers.
    fn check(
        &self,
        model: &Homography,
        reference: &[FeaturePoint],
        scene: &[FeaturePoint],
    ) -> Vec<bool>;
}

/// Iterative refinement of a model on its inlier set.
pub trait HomographyRefiner {
    fn refine(
        &mut self,
        model: &Homography,
        reference: &[FeaturePoint],
        scene: &[FeaturePoint],
    ) -> Homography;
}

/// Collaborator slots of the engine, used in error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollaboratorRole {
    Detector,
    Tracker,
    SearchIndex,
    Estimator,
    Checker,
    Refiner,
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detector => "feature detector",
            Self::Tracker => "point tracker",
            Self::SearchIndex => "search index factory",
            Self::Estimator => "homography estimator",
            Self::Checker => "outlier checker",
            Self::Refiner => "homography refiner",
        };
        f.write_str(name)
    }
}
