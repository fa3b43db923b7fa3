//! Camera intrinsics, radial-tangential distortion, and camera pose recovery
//! from a plane-to-image homography.
//!
//! One physical camera is described by a [`Calibration`]. Every tracked
//! surface owns a [`PoseModel`]: a private copy of the calibration plus the
//! extrinsic pose last decomposed for that surface.

use crate::Homography;
use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Returns `true` when all entries are finite and focal lengths non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    /// The 3x3 camera matrix `K`.
    pub fn matrix(self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Convert normalized pinhole coordinates to pixel coordinates.
    pub fn normalized_to_pixel(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        [
            self.fx * normalized_xy[0] + self.cx,
            self.fy * normalized_xy[1] + self.cy,
        ]
    }
}

/// Brown-Conrady distortion with two radial and two tangential terms.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl RadialTangentialDistortion {
    /// Apply distortion to normalized coordinates.
    pub fn distort_normalized(self, normalized_xy: [f64; 2]) -> [f64; 2] {
        let x = normalized_xy[0];
        let y = normalized_xy[1];
        let r2 = x * x + y * y;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r2 * r2;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }
}

/// Intrinsic calibration of one physical camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Calibration {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub distortion: RadialTangentialDistortion,
}

impl Calibration {
    /// Build from `[fx, fy, cx, cy, k1, k2, p1, p2]`.
    pub fn from_params(params: [f64; 8]) -> Self {
        let [fx, fy, cx, cy, k1, k2, p1, p2] = params;
        Self {
            intrinsics: CameraIntrinsics { fx, fy, cx, cy },
            distortion: RadialTangentialDistortion { k1, k2, p1, p2 },
        }
    }

    /// Raw parameter vector `[fx, fy, cx, cy, k1, k2, p1, p2]`.
    pub fn params(&self) -> [f64; 8] {
        let i = self.intrinsics;
        let d = self.distortion;
        [i.fx, i.fy, i.cx, i.cy, d.k1, d.k2, d.p1, d.p2]
    }

    pub fn is_valid(&self) -> bool {
        self.intrinsics.is_valid() && self.params().iter().all(|v| v.is_finite())
    }

    /// Project a point given in the camera frame. `None` behind the camera.
    pub fn project_camera_point(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 1e-12 {
            return None;
        }
        let xn = [p.x / p.z, p.y / p.z];
        let xd = self.distortion.distort_normalized(xn);
        let [u, v] = self.intrinsics.normalized_to_pixel(xd);
        (u.is_finite() && v.is_finite()).then(|| Point2::new(u, v))
    }
}

/// Extrinsic pose: transforms world (surface) coordinates into the camera frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraPose {
    pub world_to_camera: Isometry3<f64>,
}

impl CameraPose {
    pub fn rotation(&self) -> Rotation3<f64> {
        self.world_to_camera.rotation.to_rotation_matrix()
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.world_to_camera.translation.vector
    }

    /// Camera center expressed in world coordinates.
    pub fn camera_center(&self) -> Point3<f64> {
        self.world_to_camera.inverse_transform_point(&Point3::origin())
    }
}

/// Recover the pose of the plane `z = 0` from `H ~ K [r1 r2 t]`.
///
/// The sign is chosen so that the plane lies in front of the camera. The
/// rotation is projected onto SO(3) with an SVD.
pub fn decompose_homography(
    intrinsics: &CameraIntrinsics,
    homography: &Homography,
) -> Option<CameraPose> {
    let k_inv = intrinsics.matrix().try_inverse()?;
    let m = k_inv * homography.h;
    let m1: Vector3<f64> = m.column(0).into_owned();
    let m2: Vector3<f64> = m.column(1).into_owned();
    let m3: Vector3<f64> = m.column(2).into_owned();

    let norm = 0.5 * (m1.norm() + m2.norm());
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if m3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let t = m3 * lambda;
    let r3 = r1.cross(&r2);
    let approx = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        r = -r;
    }
    if r.iter().chain(t.iter()).any(|v| !v.is_finite()) {
        return None;
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Some(CameraPose {
        world_to_camera: Isometry3::from_parts(Translation3::from(t), rotation),
    })
}

/// Per-surface camera model: a private copy of the shared calibration plus
/// the last successfully recovered extrinsics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoseModel {
    calibration: Calibration,
    pose: Option<CameraPose>,
    homography: Option<Homography>,
}

impl PoseModel {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            pose: None,
            homography: None,
        }
    }

    #[inline]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Last decomposed pose; `None` until the first successful estimate.
    #[inline]
    pub fn pose(&self) -> Option<&CameraPose> {
        self.pose.as_ref()
    }

    /// Homography the current pose was decomposed from.
    #[inline]
    pub fn homography(&self) -> Option<&Homography> {
        self.homography.as_ref()
    }

    /// Decompose `homography` and store the result. On failure the previous
    /// pose is left in place and `false` is returned.
    pub fn update_from_homography(&mut self, homography: &Homography) -> bool {
        match decompose_homography(&self.calibration.intrinsics, homography) {
            Some(pose) => {
                self.pose = Some(pose);
                self.homography = Some(*homography);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.pose = None;
        self.homography = None;
    }

    /// Project a world point into the image through the current pose.
    pub fn world_to_image(&self, world: &Point3<f64>) -> Option<Point2<f64>> {
        let pose = self.pose.as_ref()?;
        let p_cam = pose.world_to_camera.transform_point(world);
        self.calibration.project_camera_point(&p_cam)
    }
}
