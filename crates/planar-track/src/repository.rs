//! Reference point pools and multi-scale training.

use crate::{FeatureDetector, TrackingError};
use nalgebra::Point2;
use planar_track_core::{gaussian_blur_3x3, resize_bilinear, FeaturePoint, GrayImageView};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Multi-scale resampling used to build a repository.
///
/// The reference image is shrunk by `scale_factor` to a base tile, and the
/// detector runs on `scale_step x scale_step` tiles whose width and height
/// are independent multiples `1..=scale_step` of the base tile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    pub scale_factor: f64,
    pub scale_step: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            scale_factor: 6.0,
            scale_step: 6,
        }
    }
}

impl TrainingParams {
    /// Base tile size for a reference image of the given size.
    pub fn base_tile(&self, width: usize, height: usize) -> Result<(usize, usize), TrackingError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(TrackingError::InvalidTrainingParams {
                reason: format!("scale factor must be positive, got {}", self.scale_factor),
            });
        }
        if self.scale_step == 0 {
            return Err(TrackingError::InvalidTrainingParams {
                reason: "scale step must be at least 1".to_string(),
            });
        }
        let base_w = (width as f64 / self.scale_factor).round() as usize;
        let base_h = (height as f64 / self.scale_factor).round() as usize;
        if base_w == 0 || base_h == 0 {
            return Err(TrackingError::InvalidTrainingParams {
                reason: format!(
                    "scale factor {} shrinks a {width}x{height} reference to nothing",
                    self.scale_factor
                ),
            });
        }
        let largest = base_w
            .checked_mul(self.scale_step)
            .zip(base_h.checked_mul(self.scale_step))
            .filter(|&(w, h)| w.checked_mul(h).is_some());
        if largest.is_none() {
            return Err(TrackingError::InvalidTrainingParams {
                reason: format!(
                    "scale factor {} with {} steps overflows the tile size",
                    self.scale_factor, self.scale_step
                ),
            });
        }
        Ok((base_w, base_h))
    }

    /// Tile sizes in training order: height multiplier outer, width inner.
    pub fn tiles(&self, base: (usize, usize)) -> impl Iterator<Item = (usize, usize)> + '_ {
        let s = self.scale_step;
        (1..=s).flat_map(move |y| (1..=s).map(move |x| (base.0 * x, base.1 * y)))
    }
}

/// Trained reference points of one surface.
///
/// `points()[i].repository_id == i` for every entry. Only the `tracked`
/// flags change after training.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRepository {
    points: Vec<FeaturePoint>,
}

impl FeatureRepository {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[FeaturePoint] {
        &self.points
    }

    pub fn get(&self, id: usize) -> Option<&FeaturePoint> {
        self.points.get(id)
    }

    pub fn is_tracked(&self, id: usize) -> bool {
        self.points.get(id).is_some_and(|p| p.tracked)
    }

    pub fn tracked_count(&self) -> usize {
        self.points.iter().filter(|p| p.tracked).count()
    }

    pub(crate) fn set_tracked(&mut self, id: usize, tracked: bool) {
        if let Some(p) = self.points.get_mut(id) {
            p.tracked = tracked;
        }
    }
}

/// Build a repository from a reference image.
///
/// Every tile is resized, smoothed and passed to `detector`. Detected pixel
/// positions are scaled to `real_size` units and moved into a surface
/// centered frame with `+y` up. Repository ids run `0..N` over all tiles;
/// the object id records the tile index.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(reference, detector), fields(width = reference.width, height = reference.height))
)]
pub fn train_repository(
    reference: &GrayImageView<'_>,
    real_size: (f64, f64),
    params: &TrainingParams,
    detector: &mut dyn FeatureDetector,
) -> Result<FeatureRepository, TrackingError> {
    if !reference.is_valid() {
        return Err(TrackingError::EmptyReferenceImage);
    }
    let base = params.base_tile(reference.width, reference.height)?;
    let (real_w, real_h) = real_size;

    let mut points = Vec::new();
    for (object_id, (tile_w, tile_h)) in params.tiles(base).enumerate() {
        let resized = resize_bilinear(reference, tile_w, tile_h);
        let tile = gaussian_blur_3x3(&resized.view());
        detector.extract(&tile.view());

        let sx = real_w / tile_w as f64;
        let sy = real_h / tile_h as f64;
        let before = points.len();
        for kp in detector.keypoints() {
            let mut p = kp.clone();
            p.position = Point2::new(
                kp.position.x * sx - real_w / 2.0,
                real_h / 2.0 - kp.position.y * sy,
            );
            p.repository_id = points.len();
            p.object_id = object_id;
            p.tracked = false;
            p.outlier = false;
            points.push(p);
        }
        log::debug!(
            "training tile {object_id} ({tile_w}x{tile_h}): {} points",
            points.len() - before
        );
    }

    Ok(FeatureRepository { points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use planar_track_core::GrayImage;

    /// Reports the four tile corners plus the tile center.
    #[derive(Default)]
    struct CornerDetector {
        keypoints: Vec<FeaturePoint>,
        sizes: Vec<(usize, usize)>,
    }

    impl FeatureDetector for CornerDetector {
        fn extract(&mut self, image: &GrayImageView<'_>) {
            let (w, h) = (image.width as f64, image.height as f64);
            self.sizes.push((image.width, image.height));
            self.keypoints = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h), (w / 2.0, h / 2.0)]
                .into_iter()
                .map(|(x, y)| FeaturePoint::new(Point2::new(x, y)).with_descriptor(vec![1.0]))
                .collect();
        }

        fn keypoints(&self) -> &[FeaturePoint] {
            &self.keypoints
        }

        fn set_threshold(&mut self, _threshold: f64) {}
    }

    #[test]
    fn tiles_enumerate_height_outer() {
        let params = TrainingParams {
            scale_factor: 2.0,
            scale_step: 2,
        };
        let base = params.base_tile(40, 30).unwrap();
        assert_eq!(base, (20, 15));
        let tiles: Vec<_> = params.tiles(base).collect();
        assert_eq!(tiles, vec![(20, 15), (40, 15), (20, 30), (40, 30)]);
    }

    #[test]
    fn rejects_degenerate_params() {
        let bad = [
            TrainingParams { scale_factor: 0.0, scale_step: 2 },
            TrainingParams { scale_factor: f64::NAN, scale_step: 2 },
            TrainingParams { scale_factor: 2.0, scale_step: 0 },
            TrainingParams { scale_factor: 100.0, scale_step: 1 },
        ];
        for params in bad {
            assert!(matches!(
                params.base_tile(40, 30),
                Err(TrackingError::InvalidTrainingParams { .. })
            ));
        }
    }

    #[test]
    fn rejects_tile_sizes_that_overflow() {
        let tiny = TrainingParams {
            scale_factor: 1e-300,
            scale_step: 1,
        };
        let many = TrainingParams {
            scale_factor: 2.0,
            scale_step: usize::MAX,
        };
        for params in [tiny, many] {
            assert!(matches!(
                params.base_tile(40, 30),
                Err(TrackingError::InvalidTrainingParams { .. })
            ));
        }
    }

    #[test]
    fn maps_pixels_into_centered_world_frame() {
        let image = GrayImage::from_fn(40, 30, |x, y| ((x * 7 + y * 3) % 256) as u8);
        let params = TrainingParams {
            scale_factor: 2.0,
            scale_step: 2,
        };
        let mut detector = CornerDetector::default();
        let repo = train_repository(&image.view(), (4.0, 3.0), &params, &mut detector).unwrap();

        assert_eq!(detector.sizes, vec![(20, 15), (40, 15), (20, 30), (40, 30)]);
        assert_eq!(repo.len(), 20);
        for (i, p) in repo.points().iter().enumerate() {
            assert_eq!(p.repository_id, i);
            assert_eq!(p.object_id, i / 5);
            assert!(!p.tracked);
            assert_eq!(p.descriptor, vec![1.0]);
        }

        // Every tile maps onto the same physical rectangle.
        for tile in 0..4 {
            let pts = &repo.points()[tile * 5..tile * 5 + 5];
            assert_relative_eq!(pts[0].position, Point2::new(-2.0, 1.5));
            assert_relative_eq!(pts[1].position, Point2::new(2.0, 1.5));
            assert_relative_eq!(pts[2].position, Point2::new(2.0, -1.5));
            assert_relative_eq!(pts[3].position, Point2::new(-2.0, -1.5));
            assert_relative_eq!(pts[4].position, Point2::new(0.0, 0.0));
        }
    }

    #[test]
    fn tracked_flags_are_addressed_by_id() {
        let image = GrayImage::from_fn(8, 8, |x, _| (x * 30) as u8);
        let params = TrainingParams {
            scale_factor: 1.0,
            scale_step: 1,
        };
        let mut detector = CornerDetector::default();
        let mut repo = train_repository(&image.view(), (1.0, 1.0), &params, &mut detector).unwrap();
        repo.set_tracked(3, true);
        repo.set_tracked(42, true);
        assert!(repo.is_tracked(3));
        assert!(!repo.is_tracked(42));
        assert_eq!(repo.tracked_count(), 1);
    }

    #[test]
    fn empty_reference_is_rejected() {
        let view = GrayImageView {
            width: 0,
            height: 0,
            data: &[],
        };
        let mut detector = CornerDetector::default();
        let err = train_repository(&view, (1.0, 1.0), &TrainingParams::default(), &mut detector);
        assert_eq!(err, Err(TrackingError::EmptyReferenceImage));
    }
}
