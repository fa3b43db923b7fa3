//! Core types and utilities for multi-surface planar tracking.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete keypoint detector, tracker, or image crate.

mod camera;
mod feature;
mod homography;
mod image;
mod logger;

pub use camera::{
    decompose_homography, Calibration, CameraIntrinsics, CameraPose, PoseModel,
    RadialTangentialDistortion,
};
pub use feature::FeaturePoint;
pub use homography::{estimate_homography, homography_from_4pt, Homography, HomographyError};
pub use image::{gaussian_blur_3x3, resize_bilinear, GrayImage, GrayImageView};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, LOG_LEVEL_ENV};
