#![allow(dead_code)]

use nalgebra::{Matrix3, Point2, UnitQuaternion, Vector3};
use planar_track::core::{Calibration, FeaturePoint, GrayImage, GrayImageView, Homography};
use planar_track::{
    FeatureDetector, PointTracker, SearchIndex, TrackerParams, TrackingEngine, TrainingParams,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub const FRAME_W: usize = 64;
pub const FRAME_H: usize = 48;
pub const REAL_W: f64 = 4.0;
pub const REAL_H: f64 = 3.2;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn calibration() -> Calibration {
    Calibration::from_params([500.0, 500.0, 32.0, 24.0, 0.0, 0.0, 0.0, 0.0])
}

pub fn reference_image() -> GrayImage {
    GrayImage::from_fn(40, 32, |x, y| ((x * 13 + y * 7) % 251) as u8)
}

pub fn frame() -> GrayImage {
    GrayImage::from_fn(FRAME_W, FRAME_H, |x, y| ((x + 2 * y) % 256) as u8)
}

pub fn small_training() -> TrainingParams {
    TrainingParams {
        scale_factor: 2.0,
        scale_step: 2,
    }
}

/// Candidate whose descriptor names the repository entry it matches.
pub fn candidate(repository_id: usize, position: Point2<f64>) -> FeaturePoint {
    FeaturePoint::new(position).with_descriptor(vec![repository_id as f32])
}

/// Shared state of a [`ScriptedDetector`].
#[derive(Default)]
pub struct DetectorScript {
    /// Keypoint lists returned for frame-sized images, one per extract call.
    pub frames: VecDeque<Vec<FeaturePoint>>,
    /// Sizes of every image passed to extract.
    pub extract_sizes: Vec<(usize, usize)>,
    /// Keypoints returned for each non-frame (training) image.
    pub training_counts: Vec<usize>,
    pub threshold: Option<f64>,
}

/// Frame-sized images pop scripted keypoints; any other image is a training
/// tile and yields a regular grid of about one point per 10 px.
pub struct ScriptedDetector {
    script: Rc<RefCell<DetectorScript>>,
    keypoints: Vec<FeaturePoint>,
}

impl ScriptedDetector {
    pub fn new() -> (Self, Rc<RefCell<DetectorScript>>) {
        let script = Rc::new(RefCell::new(DetectorScript::default()));
        (
            Self {
                script: script.clone(),
                keypoints: Vec::new(),
            },
            script,
        )
    }
}

impl FeatureDetector for ScriptedDetector {
    fn extract(&mut self, image: &GrayImageView<'_>) {
        let mut script = self.script.borrow_mut();
        script.extract_sizes.push((image.width, image.height));
        if (image.width, image.height) == (FRAME_W, FRAME_H) {
            self.keypoints = script.frames.pop_front().unwrap_or_default();
            return;
        }

        let nx = 1 + image.width / 10;
        let ny = 1 + image.height / 10;
        self.keypoints.clear();
        for j in 0..ny {
            for i in 0..nx {
                let x = image.width as f64 * (i as f64 + 0.5) / nx as f64;
                let y = image.height as f64 * (j as f64 + 0.5) / ny as f64;
                self.keypoints
                    .push(FeaturePoint::new(Point2::new(x, y)).with_descriptor(vec![0.0; 4]));
            }
        }
        script.training_counts.push(self.keypoints.len());
    }

    fn keypoints(&self) -> &[FeaturePoint] {
        &self.keypoints
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.script.borrow_mut().threshold = Some(threshold);
    }
}

/// Shared state of a [`ScriptedTracker`].
#[derive(Default)]
pub struct TrackerScript {
    /// Batch indices to flag as lost, one list per call. Missing lists lose nothing.
    pub lost: VecDeque<Vec<usize>>,
    /// Offset applied to every followed point.
    pub shift: (f64, f64),
    /// Return this many points instead of one per input.
    pub force_len: Option<usize>,
    /// Batch sizes seen so far.
    pub calls: Vec<usize>,
}

pub struct ScriptedTracker {
    script: Rc<RefCell<TrackerScript>>,
}

impl ScriptedTracker {
    pub fn new() -> (Self, Rc<RefCell<TrackerScript>>) {
        let script = Rc::new(RefCell::new(TrackerScript::default()));
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl PointTracker for ScriptedTracker {
    fn track(
        &mut self,
        _previous: &GrayImageView<'_>,
        _current: &GrayImageView<'_>,
        points: &[FeaturePoint],
    ) -> Vec<FeaturePoint> {
        let mut script = self.script.borrow_mut();
        script.calls.push(points.len());
        let lost = script.lost.pop_front().unwrap_or_default();
        let (dx, dy) = script.shift;
        let mut out: Vec<FeaturePoint> = points
            .iter()
            .enumerate()
            .map(|(k, p)| {
                let mut q = p.clone();
                q.position = Point2::new(p.position.x + dx, p.position.y + dy);
                q.outlier = lost.contains(&k);
                q
            })
            .collect();
        if let Some(len) = script.force_len {
            out.resize(len, FeaturePoint::new(Point2::origin()));
        }
        out
    }
}

/// Index that trusts the first descriptor component as the repository id.
#[derive(Default)]
pub struct DescriptorIdIndex {
    len: usize,
}

impl SearchIndex for DescriptorIdIndex {
    fn train(&mut self, repository: &[FeaturePoint]) {
        self.len = repository.len();
    }

    fn find(&self, candidate: &FeaturePoint) -> Option<usize> {
        let id = *candidate.descriptor.first()? as usize;
        (id < self.len).then_some(id)
    }
}

pub fn descriptor_id_index() -> Box<dyn SearchIndex> {
    Box::new(DescriptorIdIndex::default())
}

pub struct Harness {
    pub engine: TrackingEngine,
    pub detector: Rc<RefCell<DetectorScript>>,
    pub tracker: Rc<RefCell<TrackerScript>>,
}

/// Initialized engine with scripted detector/tracker, the descriptor-id
/// index and the reference geometric collaborators.
pub fn harness(params: TrackerParams) -> Harness {
    init_logging();
    let mut engine = TrackingEngine::new(params);
    engine.attach_calibration(calibration());
    let (detector, detector_script) = ScriptedDetector::new();
    let (tracker, tracker_script) = ScriptedTracker::new();
    engine.attach_detector(detector);
    engine.attach_tracker(tracker);
    engine.attach_search_index_factory(descriptor_id_index);
    engine.attach_estimator(planar_track::RansacEstimator::default());
    engine.attach_checker(planar_track::ReprojectionChecker::default());
    engine.attach_refiner(planar_track::LmRefiner::default());
    engine
        .initialize(FRAME_W, FRAME_H, REAL_W, REAL_H)
        .expect("initialize");
    Harness {
        engine,
        detector: detector_script,
        tracker: tracker_script,
    }
}

/// Harness with `surfaces` attached and trained.
pub fn trained_harness(params: TrackerParams, surfaces: usize) -> Harness {
    let mut h = harness(params);
    let reference = reference_image();
    for _ in 0..surfaces {
        h.engine
            .attach_reference_image(&reference.view())
            .expect("attach");
    }
    h.engine.train(&small_training()).expect("train");
    h
}

/// Plane-to-image homography of a surface seen from about 10 units away.
pub fn ground_truth_homography() -> Homography {
    let k = calibration().intrinsics.matrix();
    let rotation = UnitQuaternion::from_euler_angles(0.1, -0.05, 0.02).to_rotation_matrix();
    let r = rotation.matrix();
    let t = Vector3::new(0.2, -0.1, 10.0);
    let rt = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), t]);
    Homography::new(k * rt)
}

/// Check the pairing invariants of every surface.
pub fn assert_invariants(engine: &TrackingEngine) {
    for s in 0..engine.surface_count() {
        let pairs = engine.matched_pairs(s).expect("surface");
        let repository = engine.repository(s).expect("surface");
        assert_eq!(pairs.reference().len(), pairs.scene().len());

        let mut paired: Vec<usize> = pairs.reference().iter().map(|p| p.repository_id).collect();
        paired.sort_unstable();
        let before = paired.len();
        paired.dedup();
        assert_eq!(paired.len(), before, "surface {s}: repository entry paired twice");

        for (id, entry) in repository.points().iter().enumerate() {
            assert_eq!(entry.repository_id, id);
            assert_eq!(
                entry.tracked,
                paired.binary_search(&id).is_ok(),
                "surface {s}: entry {id} tracked flag out of sync"
            );
        }
    }
}
