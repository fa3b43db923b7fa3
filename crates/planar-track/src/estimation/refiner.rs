use crate::HomographyRefiner;
use nalgebra::{Matrix3, SMatrix, SVector};
use planar_track_core::{FeaturePoint, Homography};
use serde::{Deserialize, Serialize};

type Params8 = SVector<f64, 8>;
type Normal8 = SMatrix<f64, 8, 8>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerParams {
    pub max_iterations: usize,
    /// Starting Levenberg-Marquardt damping.
    pub initial_lambda: f64,
    /// Stop once the relative cost decrease falls below this.
    pub tolerance: f64,
}

impl Default for RefinerParams {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            initial_lambda: 1e-3,
            tolerance: 1e-10,
        }
    }
}

/// Levenberg-Marquardt minimization of the squared transfer error over the
/// eight free entries of a homography normalized to `h33 = 1`.
#[derive(Clone, Debug, Default)]
pub struct LmRefiner {
    params: RefinerParams,
}

impl LmRefiner {
    pub fn new(params: RefinerParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &RefinerParams {
        &self.params
    }
}

fn to_params(h: &Matrix3<f64>) -> Params8 {
    Params8::from_column_slice(&[
        h[(0, 0)],
        h[(0, 1)],
        h[(0, 2)],
        h[(1, 0)],
        h[(1, 1)],
        h[(1, 2)],
        h[(2, 0)],
        h[(2, 1)],
    ])
}

fn from_params(p: &Params8) -> Homography {
    Homography::new(Matrix3::new(p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7], 1.0))
}

/// Sum of squared residuals; `None` if any point maps to infinity.
fn cost(p: &Params8, reference: &[FeaturePoint], scene: &[FeaturePoint]) -> Option<f64> {
    let h = from_params(p);
    let mut sum = 0.0;
    for (r, s) in reference.iter().zip(scene) {
        let d = h.apply(r.position) - s.position;
        sum += d.norm_squared();
    }
    sum.is_finite().then_some(sum)
}

/// Gauss-Newton normal equations `J^T J` and `J^T r`.
fn normal_equations(
    p: &Params8,
    reference: &[FeaturePoint],
    scene: &[FeaturePoint],
) -> Option<(Normal8, Params8)> {
    let mut jtj = Normal8::zeros();
    let mut jtr = Params8::zeros();
    for (r, s) in reference.iter().zip(scene) {
        let (x, y) = (r.position.x, r.position.y);
        let w = p[6] * x + p[7] * y + 1.0;
        if w.abs() < 1e-12 {
            return None;
        }
        let u = (p[0] * x + p[1] * y + p[2]) / w;
        let v = (p[3] * x + p[4] * y + p[5]) / w;

        let ju = Params8::from_column_slice(&[
            x / w,
            y / w,
            1.0 / w,
            0.0,
            0.0,
            0.0,
            -u * x / w,
            -u * y / w,
        ]);
        let jv = Params8::from_column_slice(&[
            0.0,
            0.0,
            0.0,
            x / w,
            y / w,
            1.0 / w,
            -v * x / w,
            -v * y / w,
        ]);

        jtj += ju * ju.transpose() + jv * jv.transpose();
        jtr += ju * (u - s.position.x) + jv * (v - s.position.y);
    }
    Some((jtj, jtr))
}

impl HomographyRefiner for LmRefiner {
    fn refine(
        &mut self,
        model: &Homography,
        reference: &[FeaturePoint],
        scene: &[FeaturePoint],
    ) -> Homography {
        if reference.len() < 4 || reference.len() != scene.len() {
            return *model;
        }
        let Some(start) = model.normalized() else {
            return *model;
        };

        let mut p = to_params(&start.h);
        let Some(mut current) = cost(&p, reference, scene) else {
            return start;
        };
        let mut lambda = self.params.initial_lambda;

        for _ in 0..self.params.max_iterations {
            let Some((jtj, jtr)) = normal_equations(&p, reference, scene) else {
                break;
            };

            let mut damped = jtj;
            for i in 0..8 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let Some(chol) = damped.cholesky() else {
                lambda *= 10.0;
                continue;
            };
            let step = chol.solve(&(-jtr));
            let candidate = p + step;

            match cost(&candidate, reference, scene) {
                Some(next) if next < current => {
                    let decrease = (current - next) / current.max(1e-300);
                    p = candidate;
                    current = next;
                    lambda = (lambda / 10.0).max(1e-12);
                    if decrease < self.params.tolerance {
                        break;
                    }
                }
                _ => lambda *= 10.0,
            }
        }

        log::trace!("lm refine: final cost {current:.3e} over {} pairs", reference.len());
        from_params(&p)
    }
}
