//! JSON configuration and report helpers.

use crate::{
    CheckerParams, FrameReport, KdTreeIndex, KdTreeIndexParams, LmRefiner, RansacEstimator,
    RansacParams, RefinerParams, ReprojectionChecker, SearchIndex, SearchIndexFactory,
    TrackerParams, TrackingEngine, TrackingError, TrainingParams,
};
use planar_track_core::Calibration;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Everything needed to set up a tracking session except the detector,
/// the tracker and the reference images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Raw camera parameters `[fx, fy, cx, cy, k1, k2, p1, p2]`.
    pub calibration: [f64; 8],
    pub frame_width: usize,
    pub frame_height: usize,
    /// Physical width of the tracked surfaces.
    pub real_width: f64,
    /// Physical height of the tracked surfaces.
    pub real_height: f64,
    #[serde(default)]
    pub detection_ratio: Option<usize>,
    #[serde(default)]
    pub tracker: TrackerParams,
    #[serde(default)]
    pub training: TrainingParams,
    #[serde(default)]
    pub ransac: RansacParams,
    #[serde(default)]
    pub checker: CheckerParams,
    #[serde(default)]
    pub refiner: RefinerParams,
    #[serde(default)]
    pub search: KdTreeIndexParams,
}

impl TrackingConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn calibration(&self) -> Calibration {
        Calibration::from_params(self.calibration)
    }

    /// Build an initialized engine with the calibration and the geometric
    /// collaborators from this config attached.
    ///
    /// The detector, tracker and search index factory still have to be
    /// attached by the caller.
    pub fn build_engine(&self) -> Result<TrackingEngine, TrackingError> {
        let mut engine = TrackingEngine::new(self.tracker.clone());
        engine.attach_calibration(self.calibration());
        engine.attach_estimator(RansacEstimator::new(self.ransac.clone()));
        engine.attach_checker(ReprojectionChecker::new(self.checker.clone()));
        engine.attach_refiner(LmRefiner::new(self.refiner.clone()));
        engine.initialize(
            self.frame_width,
            self.frame_height,
            self.real_width,
            self.real_height,
        )?;
        Ok(engine)
    }

    /// Factory of [`KdTreeIndex`] instances over `D`-dimensional descriptors
    /// using the configured acceptance rule.
    pub fn kd_tree_factory<const D: usize>(&self) -> impl SearchIndexFactory + 'static {
        let params = self.search.clone();
        move || -> Box<dyn SearchIndex> { Box::new(KdTreeIndex::<D>::new(params.clone())) }
    }

    /// Apply the configured detection ratio. Call after all surfaces are
    /// attached, since attaching resets the ratio to the surface count.
    pub fn apply_detection_ratio(&self, engine: &mut TrackingEngine) -> Option<usize> {
        self.detection_ratio.map(|ratio| engine.set_detection_ratio(ratio))
    }
}

impl FrameReport {
    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineState, SurfaceFrameStats};

    fn config() -> TrackingConfig {
        TrackingConfig {
            calibration: [1033.9, 1033.8, 319.0, 228.9, -0.2, 0.3, 0.0007, 0.0011],
            frame_width: 640,
            frame_height: 480,
            real_width: 267.0,
            real_height: 200.0,
            detection_ratio: Some(4),
            tracker: TrackerParams::default(),
            training: TrainingParams::default(),
            ransac: RansacParams::default(),
            checker: CheckerParams::default(),
            refiner: RefinerParams::default(),
            search: KdTreeIndexParams::default(),
        }
    }

    #[test]
    fn json_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracking.json");
        let cfg = config();
        cfg.write_json(&path).unwrap();
        assert_eq!(TrackingConfig::load_json(&path).unwrap(), cfg);
    }

    #[test]
    fn frame_report_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.json");
        let report = FrameReport {
            frame_index: 17,
            detection_target: Some(1),
            keypoints: 240,
            surfaces: vec![
                SurfaceFrameStats {
                    propagated: 30,
                    lost: 2,
                    matched: 28,
                    ..SurfaceFrameStats::default()
                },
                SurfaceFrameStats {
                    propagated: 12,
                    detected: 9,
                    rejected: 1,
                    matched: 20,
                    pose_updated: true,
                    ..SurfaceFrameStats::default()
                },
            ],
        };
        report.write_json(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let loaded: FrameReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.total_matched(), 48);
        assert_eq!(loaded.updated_poses(), 1);
    }

    #[test]
    fn omitted_sections_use_defaults() {
        let raw = r#"{
            "calibration": [800, 800, 320, 240, 0, 0, 0, 0],
            "frame_width": 640,
            "frame_height": 480,
            "real_width": 1.0,
            "real_height": 0.75,
            "ransac": { "seed": 7 }
        }"#;
        let cfg: TrackingConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.tracker, TrackerParams::default());
        assert_eq!(cfg.ransac.seed, 7);
        assert_eq!(cfg.ransac.max_iters, RansacParams::default().max_iters);
        assert_eq!(cfg.detection_ratio, None);
    }

    #[test]
    fn builds_initialized_engine() {
        let engine = config().build_engine().unwrap();
        assert_eq!(engine.state(), EngineState::Initialized);
        assert_eq!(engine.calibration().map(|c| c.params()), Some(config().calibration));
        assert_eq!(engine.surface_count(), 0);
    }

    #[test]
    fn kd_tree_factory_uses_configured_params() {
        let mut cfg = config();
        cfg.search.max_distance = 0.05;
        let factory = cfg.kd_tree_factory::<2>();
        let mut index = factory.create();

        let mut entry = planar_track_core::FeaturePoint::new(nalgebra::Point2::origin())
            .with_descriptor(vec![1.0, 0.0]);
        entry.repository_id = 0;
        index.train(&[entry.clone()]);
        assert_eq!(index.find(&entry), Some(0));

        let near = entry.clone().with_descriptor(vec![1.0, 0.1]);
        assert_eq!(index.find(&near), None);
    }

    #[test]
    fn detection_ratio_is_applied_on_request() {
        let cfg = config();
        let mut engine = cfg.build_engine().unwrap();
        let image = planar_track_core::GrayImage::from_fn(16, 16, |x, y| (x * y) as u8);
        engine.attach_reference_image(&image.view()).unwrap();
        engine.attach_reference_image(&image.view()).unwrap();
        assert_eq!(engine.detection_ratio(), 2);
        assert_eq!(cfg.apply_detection_ratio(&mut engine), Some(4));
        assert_eq!(engine.detection_ratio(), 4);
    }

    #[test]
    fn invalid_geometry_is_reported() {
        let mut cfg = config();
        cfg.real_width = 0.0;
        assert!(matches!(
            cfg.build_engine(),
            Err(TrackingError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrackingConfig::load_json(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigIoError::Io(_)));
    }
}
