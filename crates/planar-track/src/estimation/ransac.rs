use crate::HomographyEstimator;
use nalgebra::Point2;
use planar_track_core::{
    estimate_homography, homography_from_4pt, FeaturePoint, Homography, HomographyError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// RANSAC configuration for homography estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    pub max_iters: usize,
    /// Inlier threshold on the transfer error, in scene pixels.
    pub reprojection_error: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            reprojection_error: 5.0,
            min_inliers: 4,
            seed: 0,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RansacError {
    #[error(transparent)]
    Homography(#[from] HomographyError),
    #[error("best model has {best} inliers, need {needed}")]
    NoConsensus { best: usize, needed: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RansacFit {
    pub homography: Homography,
    pub inliers: Vec<bool>,
    pub inlier_count: usize,
}

/// Fit `dst ~ H * src` robustly: minimal 4-point samples, best consensus,
/// then a least-squares refit on the consensus set.
pub fn fit_homography_ransac(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Result<RansacFit, RansacError> {
    let n = src.len();
    if n != dst.len() {
        return Err(HomographyError::LengthMismatch {
            src: n,
            dst: dst.len(),
        }
        .into());
    }
    if n < 4 {
        return Err(HomographyError::TooFewPoints { needed: 4, got: n }.into());
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Homography, Vec<bool>, usize)> = None;

    for _ in 0..params.max_iters {
        let sample = rand::seq::index::sample(&mut rng, n, 4);
        let s4: [Point2<f64>; 4] = std::array::from_fn(|k| src[sample.index(k)]);
        let d4: [Point2<f64>; 4] = std::array::from_fn(|k| dst[sample.index(k)]);
        let Some(h) = homography_from_4pt(&s4, &d4) else {
            continue;
        };

        let mask: Vec<bool> = src
            .iter()
            .zip(dst)
            .map(|(&s, &d)| h.transfer_error(s, d) < params.reprojection_error)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        if best.as_ref().is_none_or(|(_, _, c)| count > *c) {
            best = Some((h, mask, count));
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    let needed = params.min_inliers.max(4);
    let (best_h, mask, count) = match best {
        Some(b) if b.2 >= needed => b,
        Some((_, _, c)) => return Err(RansacError::NoConsensus { best: c, needed }),
        None => return Err(HomographyError::Degenerate.into()),
    };

    let (in_src, in_dst): (Vec<_>, Vec<_>) = src
        .iter()
        .zip(dst)
        .zip(&mask)
        .filter(|&(_, &m)| m)
        .map(|((&s, &d), _)| (s, d))
        .unzip();
    let homography = estimate_homography(&in_src, &in_dst).unwrap_or(best_h);

    let inliers: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| homography.transfer_error(s, d) < params.reprojection_error)
        .collect();
    let inlier_count = inliers.iter().filter(|&&m| m).count();
    if inlier_count < count {
        // The refit drifted; keep the consensus model.
        return Ok(RansacFit {
            homography: best_h,
            inliers: mask,
            inlier_count: count,
        });
    }

    Ok(RansacFit {
        homography,
        inliers,
        inlier_count,
    })
}

/// [`HomographyEstimator`] backed by [`fit_homography_ransac`].
///
/// The random generator is reseeded on every call so results depend only
/// on the input.
#[derive(Clone, Debug, Default)]
pub struct RansacEstimator {
    params: RansacParams,
}

impl RansacEstimator {
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &RansacParams {
        &self.params
    }
}

impl HomographyEstimator for RansacEstimator {
    fn estimate(
        &mut self,
        reference: &[FeaturePoint],
        scene: &[FeaturePoint],
    ) -> Option<Homography> {
        let src: Vec<_> = reference.iter().map(|p| p.position).collect();
        let dst: Vec<_> = scene.iter().map(|p| p.position).collect();
        match fit_homography_ransac(&src, &dst, &self.params) {
            Ok(fit) => {
                log::trace!("ransac: {}/{} inliers", fit.inlier_count, src.len());
                Some(fit.homography)
            }
            Err(err) => {
                log::debug!("ransac failed on {} pairs: {err}", src.len());
                None
            }
        }
    }
}
