//! Real-time tracking of several planar surfaces in a video stream.
//!
//! For every attached reference surface the engine keeps a trained pool of
//! reference points, the set of reference/scene correspondences that are
//! currently matched, and a camera pose. Each frame it carries matches
//! forward with a sparse point tracker, spends one detector pass on a single
//! surface chosen round-robin, and re-estimates the pose of every surface
//! with enough matches.
//!
//! The keypoint detector and the frame-to-frame tracker are supplied by the
//! caller through [`FeatureDetector`] and [`PointTracker`]. Reference
//! implementations are provided for the remaining roles: [`KdTreeIndex`],
//! [`RansacEstimator`], [`ReprojectionChecker`] and [`LmRefiner`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use planar_track::{
//!     FeatureDetector, PointTracker, TrackingConfig, TrainingParams,
//! };
//! use planar_track::core::{FeaturePoint, GrayImage, GrayImageView};
//!
//! struct Detector(Vec<FeaturePoint>);
//!
//! impl FeatureDetector for Detector {
//!     fn extract(&mut self, _image: &GrayImageView<'_>) {
//!         // Fill self.0 with keypoints carrying 32-dim descriptors.
//!     }
//!     fn keypoints(&self) -> &[FeaturePoint] {
//!         &self.0
//!     }
//!     fn set_threshold(&mut self, _threshold: f64) {}
//! }
//!
//! struct Tracker;
//!
//! impl PointTracker for Tracker {
//!     fn track(
//!         &mut self,
//!         _previous: &GrayImageView<'_>,
//!         _current: &GrayImageView<'_>,
//!         points: &[FeaturePoint],
//!     ) -> Vec<FeaturePoint> {
//!         points.to_vec()
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrackingConfig::load_json("tracking.json")?;
//! let mut engine = config.build_engine()?;
//! engine.attach_detector(Detector(Vec::new()));
//! engine.attach_tracker(Tracker);
//! engine.attach_search_index_factory(config.kd_tree_factory::<32>());
//!
//! let reference = GrayImage::new(640, 480);
//! engine.attach_reference_image(&reference.view())?;
//! engine.train(&TrainingParams::default())?;
//!
//! let frame = GrayImage::new(config.frame_width, config.frame_height);
//! let report = engine.update(&frame.view())?;
//! println!("matched pairs: {}", report.total_matched());
//! if let Some(outline) = engine.surface_outline(0) {
//!     println!("surface 0 corners: {outline:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade: lifecycle events at `info`,
//! per-frame counters at `debug`. With the `tracing` feature `train` and
//! `update` are also instrumented with spans.

mod collaborators;
mod engine;
mod estimation;
mod io;
mod pair_set;
mod repository;
mod scheduler;
mod search;

pub use collaborators::{
    CollaboratorRole, FeatureDetector, HomographyEstimator, HomographyRefiner, OutlierChecker,
    PointTracker, SearchIndex, SearchIndexFactory,
};
pub use engine::{
    EngineState, FrameGeometry, FrameReport, SurfaceFrameStats, TrackerParams, TrackingEngine,
    TrackingError,
};
pub use estimation::{
    fit_homography_ransac, CheckerParams, LmRefiner, RansacError, RansacEstimator, RansacFit,
    RansacParams, RefinerParams, ReprojectionChecker,
};
pub use io::{ConfigIoError, TrackingConfig};
pub use pair_set::MatchedPairSet;
pub use repository::{train_repository, FeatureRepository, TrainingParams};
pub use scheduler::DetectionScheduler;
pub use search::{KdTreeIndex, KdTreeIndexParams};

pub use planar_track_core as core;
