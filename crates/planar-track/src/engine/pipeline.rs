use super::surface::Surface;
use super::{
    EngineState, FrameGeometry, FrameReport, SurfaceFrameStats, TrackerParams, TrackingError,
};
use crate::{
    train_repository, CollaboratorRole, DetectionScheduler, FeatureDetector, FeatureRepository,
    HomographyEstimator, HomographyRefiner, MatchedPairSet, OutlierChecker, PointTracker,
    SearchIndexFactory, TrainingParams,
};
use nalgebra::{Point2, Point3};
use planar_track_core::{
    Calibration, CameraPose, FeaturePoint, GrayImage, GrayImageView, PoseModel,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-frame multi-surface planar tracker.
///
/// Typical use: attach the calibration and collaborators, call
/// [`TrackingEngine::initialize`], attach reference images, [`train`], then
/// feed frames to [`update`].
///
/// [`train`]: TrackingEngine::train
/// [`update`]: TrackingEngine::update
pub struct TrackingEngine {
    params: TrackerParams,
    state: EngineState,
    calibration: Option<Calibration>,
    detector: Option<Box<dyn FeatureDetector>>,
    tracker: Option<Box<dyn PointTracker>>,
    index_factory: Option<Box<dyn SearchIndexFactory>>,
    estimator: Option<Box<dyn HomographyEstimator>>,
    checker: Option<Box<dyn OutlierChecker>>,
    refiner: Option<Box<dyn HomographyRefiner>>,
    geometry: Option<FrameGeometry>,
    previous: GrayImage,
    surfaces: Vec<Surface>,
    scheduler: DetectionScheduler,
    frame_index: u64,
    last_report: Option<FrameReport>,
}

impl Default for TrackingEngine {
    fn default() -> Self {
        Self::new(TrackerParams::default())
    }
}

fn missing(role: CollaboratorRole) -> TrackingError {
    TrackingError::MissingCollaborator { role }
}

impl TrackingEngine {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            state: EngineState::Uninitialized,
            calibration: None,
            detector: None,
            tracker: None,
            index_factory: None,
            estimator: None,
            checker: None,
            refiner: None,
            geometry: None,
            previous: GrayImage::new(0, 0),
            surfaces: Vec::new(),
            scheduler: DetectionScheduler::new(),
            frame_index: 0,
            last_report: None,
        }
    }

    #[inline]
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    #[inline]
    pub fn geometry(&self) -> Option<&FrameGeometry> {
        self.geometry.as_ref()
    }

    /// Shared calibration cloned into every surface attached afterwards.
    pub fn attach_calibration(&mut self, calibration: Calibration) {
        self.calibration = Some(calibration);
    }

    #[inline]
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    pub fn attach_detector(&mut self, detector: impl FeatureDetector + 'static) {
        self.detector = Some(Box::new(detector));
    }

    pub fn attach_tracker(&mut self, tracker: impl PointTracker + 'static) {
        self.tracker = Some(Box::new(tracker));
    }

    pub fn attach_search_index_factory(&mut self, factory: impl SearchIndexFactory + 'static) {
        self.index_factory = Some(Box::new(factory));
    }

    pub fn attach_estimator(&mut self, estimator: impl HomographyEstimator + 'static) {
        self.estimator = Some(Box::new(estimator));
    }

    pub fn attach_checker(&mut self, checker: impl OutlierChecker + 'static) {
        self.checker = Some(Box::new(checker));
    }

    pub fn attach_refiner(&mut self, refiner: impl HomographyRefiner + 'static) {
        self.refiner = Some(Box::new(refiner));
    }

    /// Attached detector, e.g. to adapt its threshold between frames.
    pub fn detector_mut(&mut self) -> Option<&mut dyn FeatureDetector> {
        self.detector.as_deref_mut().map(|d| d as &mut dyn FeatureDetector)
    }

    /// Set frame geometry and allocate the previous-frame buffer.
    ///
    /// Requires an attached calibration. Calling it again starts a fresh
    /// session: surfaces and the scheduler are dropped, collaborators and
    /// calibration are kept.
    pub fn initialize(
        &mut self,
        width: usize,
        height: usize,
        real_width: f64,
        real_height: f64,
    ) -> Result<(), TrackingError> {
        if self.calibration.is_none() {
            return Err(TrackingError::MissingCalibration);
        }
        let geometry = FrameGeometry {
            width,
            height,
            real_width,
            real_height,
        };
        geometry.validate()?;

        self.geometry = Some(geometry);
        self.previous = GrayImage::new(width, height);
        self.surfaces.clear();
        self.scheduler = DetectionScheduler::new();
        self.frame_index = 0;
        self.last_report = None;
        self.state = EngineState::Initialized;
        log::info!(
            "tracking engine initialized: {width}x{height} frames, surface size {real_width}x{real_height}"
        );
        Ok(())
    }

    /// Add a reference surface and return its index.
    ///
    /// The shared calibration is copied into the new surface's pose model
    /// and the detection ratio is reset to the new surface count.
    pub fn attach_reference_image(
        &mut self,
        image: &GrayImageView<'_>,
    ) -> Result<usize, TrackingError> {
        if self.state == EngineState::Uninitialized {
            return Err(TrackingError::NotInitialized);
        }
        if !image.is_valid() {
            return Err(TrackingError::EmptyReferenceImage);
        }
        let calibration = self.calibration.ok_or(TrackingError::MissingCalibration)?;

        self.surfaces
            .push(Surface::new(image.to_owned_image(), calibration));
        let index = self.surfaces.len() - 1;
        self.scheduler.reset_bound(self.surfaces.len());
        log::info!(
            "attached surface {index} ({}x{} reference)",
            image.width,
            image.height
        );
        Ok(index)
    }

    /// Train every surface that has no repository yet. Returns how many
    /// surfaces were trained.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(surfaces = self.surfaces.len()))
    )]
    pub fn train(&mut self, params: &TrainingParams) -> Result<usize, TrackingError> {
        let geometry = self.geometry.ok_or(TrackingError::NotInitialized)?;
        if self.surfaces.is_empty() {
            return Err(TrackingError::NoSurfaces);
        }
        let detector = self
            .detector
            .as_deref_mut()
            .ok_or(missing(CollaboratorRole::Detector))?;
        let factory = self
            .index_factory
            .as_deref()
            .ok_or(missing(CollaboratorRole::SearchIndex))?;

        let pending: Vec<usize> = (0..self.surfaces.len())
            .filter(|&i| !self.surfaces[i].is_trained())
            .collect();
        for &i in &pending {
            let reference = &self.surfaces[i].reference;
            params.base_tile(reference.width, reference.height)?;
        }

        for &i in &pending {
            let surface = &mut self.surfaces[i];
            let repository = train_repository(
                &surface.reference.view(),
                (geometry.real_width, geometry.real_height),
                params,
                detector,
            )?;
            let mut index = factory.create();
            index.train(repository.points());
            log::info!("trained surface {i}: {} reference points", repository.len());
            surface.install(repository, index);
        }

        if self.state == EngineState::Initialized {
            self.state = EngineState::Trained;
        }
        Ok(pending.len())
    }

    /// Rebuild one surface's repository and index. Its pairs are dropped and
    /// its pose is reset; other surfaces are untouched.
    pub fn retrain_surface(
        &mut self,
        index: usize,
        params: &TrainingParams,
    ) -> Result<(), TrackingError> {
        let geometry = self.geometry.ok_or(TrackingError::NotInitialized)?;
        let count = self.surfaces.len();
        let surface = self
            .surfaces
            .get_mut(index)
            .ok_or(TrackingError::SurfaceOutOfRange { index, count })?;
        let detector = self
            .detector
            .as_deref_mut()
            .ok_or(missing(CollaboratorRole::Detector))?;
        let factory = self
            .index_factory
            .as_deref()
            .ok_or(missing(CollaboratorRole::SearchIndex))?;

        let repository = train_repository(
            &surface.reference.view(),
            (geometry.real_width, geometry.real_height),
            params,
            detector,
        )?;
        let mut search = factory.create();
        search.train(repository.points());
        log::info!(
            "retrained surface {index}: {} reference points",
            repository.len()
        );
        surface.install(repository, search);

        if self.state == EngineState::Initialized {
            self.state = EngineState::Trained;
        }
        Ok(())
    }

    /// Process one grayscale frame.
    ///
    /// Fails without touching any state when the engine is not trained, a
    /// collaborator is missing, the frame is empty or has the wrong size, or
    /// the tracker breaks its one-output-per-input contract.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, frame), fields(frame = self.frame_index))
    )]
    pub fn update(&mut self, frame: &GrayImageView<'_>) -> Result<FrameReport, TrackingError> {
        match self.state {
            EngineState::Uninitialized => return Err(TrackingError::NotInitialized),
            EngineState::Initialized => return Err(TrackingError::NotTrained),
            EngineState::Trained | EngineState::Tracking => {}
        }
        if !frame.is_valid() {
            return Err(TrackingError::InvalidFrame {
                width: frame.width,
                height: frame.height,
                len: frame.data.len(),
            });
        }
        let expected = (self.previous.width, self.previous.height);
        if (frame.width, frame.height) != expected {
            return Err(TrackingError::FrameSizeMismatch {
                expected,
                got: (frame.width, frame.height),
            });
        }

        let Self {
            params,
            state,
            detector,
            tracker,
            estimator,
            checker,
            refiner,
            previous,
            surfaces,
            scheduler,
            frame_index,
            last_report,
            ..
        } = self;
        let detector = detector
            .as_deref_mut()
            .ok_or(missing(CollaboratorRole::Detector))?;
        let tracker = tracker
            .as_deref_mut()
            .ok_or(missing(CollaboratorRole::Tracker))?;
        let estimator = estimator
            .as_deref_mut()
            .ok_or(missing(CollaboratorRole::Estimator))?;
        let checker = checker
            .as_deref()
            .ok_or(missing(CollaboratorRole::Checker))?;
        let refiner = refiner
            .as_deref_mut()
            .ok_or(missing(CollaboratorRole::Refiner))?;

        let batch: Vec<FeaturePoint> = surfaces
            .iter()
            .flat_map(|s| s.pairs.scene().iter().cloned())
            .collect();
        let tracked = if batch.is_empty() {
            Vec::new()
        } else {
            let out = tracker.track(&previous.view(), frame, &batch);
            if out.len() != batch.len() {
                return Err(TrackingError::TrackerContract {
                    expected: batch.len(),
                    got: out.len(),
                });
            }
            out
        };

        let mut report = FrameReport {
            frame_index: *frame_index,
            detection_target: None,
            keypoints: 0,
            surfaces: vec![SurfaceFrameStats::default(); surfaces.len()],
        };

        // Propagate.
        let mut results = tracked.iter();
        for (surface, stats) in surfaces.iter_mut().zip(report.surfaces.iter_mut()) {
            let n = surface.pairs.len();
            let mut lost = Vec::new();
            for (k, point) in results.by_ref().take(n).enumerate() {
                if point.outlier {
                    lost.push(k);
                } else {
                    surface.pairs.set_scene_position(k, point.position);
                }
            }
            stats.lost = surface.release_pairs(&lost);
            stats.propagated = n - stats.lost;
        }

        // Detect.
        let target = scheduler
            .target(surfaces.len())
            .filter(|&t| surfaces[t].is_trained());
        if let Some(t) = target {
            detector.extract(frame);
            let candidates = detector.keypoints();
            report.keypoints = candidates.len();
            report.surfaces[t].detected = surfaces[t].match_candidates(candidates);
        }
        report.detection_target = target;

        // Estimate, reject, refine, decompose.
        for (i, (surface, stats)) in surfaces
            .iter_mut()
            .zip(report.surfaces.iter_mut())
            .enumerate()
        {
            if surface.pairs.len() <= params.min_matched_pairs {
                continue;
            }
            let Some(model) = estimator.estimate(surface.pairs.reference(), surface.pairs.scene())
            else {
                log::warn!(
                    "surface {i}: estimator found no model for {} pairs",
                    surface.pairs.len()
                );
                continue;
            };

            let flags = checker.check(&model, surface.pairs.reference(), surface.pairs.scene());
            if flags.len() != surface.pairs.len() {
                log::warn!(
                    "surface {i}: checker returned {} flags for {} pairs, skipping",
                    flags.len(),
                    surface.pairs.len()
                );
                continue;
            }
            let rejected: Vec<usize> = flags
                .iter()
                .enumerate()
                .filter_map(|(k, &outlier)| outlier.then_some(k))
                .collect();
            stats.rejected = surface.release_pairs(&rejected);

            if surface.pairs.len() < params.min_refine_pairs {
                log::debug!(
                    "surface {i}: {} inliers left, keeping previous pose",
                    surface.pairs.len()
                );
                continue;
            }
            let refined = refiner.refine(&model, surface.pairs.reference(), surface.pairs.scene());
            stats.pose_updated = surface.pose.update_from_homography(&refined);
            if !stats.pose_updated {
                log::warn!("surface {i}: refined homography is not decomposable");
            }
        }

        for (i, (surface, stats)) in surfaces.iter().zip(report.surfaces.iter_mut()).enumerate() {
            stats.matched = surface.pairs.len();
            log::debug!(
                "frame {} surface {i}: kept {} lost {} detected {} rejected {} matched {}",
                report.frame_index,
                stats.propagated,
                stats.lost,
                stats.detected,
                stats.rejected,
                stats.matched
            );
        }

        // Advance.
        previous.copy_from(frame);
        scheduler.advance();
        *frame_index += 1;
        *state = EngineState::Tracking;
        *last_report = Some(report.clone());
        Ok(report)
    }

    #[inline]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_trained(&self, index: usize) -> bool {
        self.surfaces.get(index).is_some_and(Surface::is_trained)
    }

    pub fn matched_pair_count(&self, index: usize) -> Option<usize> {
        self.surfaces.get(index).map(|s| s.pairs.len())
    }

    pub fn matched_pairs(&self, index: usize) -> Option<&MatchedPairSet> {
        self.surfaces.get(index).map(|s| &s.pairs)
    }

    pub fn repository(&self, index: usize) -> Option<&FeatureRepository> {
        self.surfaces.get(index).map(|s| &s.repository)
    }

    pub fn pose_model(&self, index: usize) -> Option<&PoseModel> {
        self.surfaces.get(index).map(|s| &s.pose)
    }

    /// Current pose of a surface; `None` until its first successful estimate.
    pub fn pose(&self, index: usize) -> Option<&CameraPose> {
        self.surfaces.get(index)?.pose.pose()
    }

    /// Frames between two detections of the same surface.
    #[inline]
    pub fn detection_ratio(&self) -> usize {
        self.scheduler.ratio()
    }

    /// Scheduler position for the next frame.
    #[inline]
    pub fn detection_cursor(&self) -> usize {
        self.scheduler.cursor()
    }

    /// Set the detection ratio. Values below the surface count are raised to
    /// it; the applied ratio is returned.
    pub fn set_detection_ratio(&mut self, ratio: usize) -> usize {
        let count = self.surfaces.len();
        let applied = self.scheduler.set_ratio(ratio, count);
        if applied != ratio {
            log::warn!("detection ratio {ratio} raised to surface count {count}");
        }
        applied
    }

    /// Image positions of the four physical corners of a surface under its
    /// current pose, counter-clockwise from `(-w/2, -h/2)`.
    pub fn surface_outline(&self, index: usize) -> Option<[Point2<f64>; 4]> {
        let geometry = self.geometry?;
        let surface = self.surfaces.get(index)?;
        let hw = geometry.real_width / 2.0;
        let hh = geometry.real_height / 2.0;
        let corners = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];

        let mut outline = [Point2::origin(); 4];
        for (out, (x, y)) in outline.iter_mut().zip(corners) {
            *out = surface.pose.world_to_image(&Point3::new(x, y, 0.0))?;
        }
        Some(outline)
    }

    /// Report of the most recent successful [`TrackingEngine::update`].
    #[inline]
    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// Frames processed since initialization.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}
