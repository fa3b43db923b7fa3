//! Reference implementations of the geometric collaborators.

mod checker;
mod ransac;
mod refiner;

pub use checker::{CheckerParams, ReprojectionChecker};
pub use ransac::{fit_homography_ransac, RansacError, RansacEstimator, RansacFit, RansacParams};
pub use refiner::{LmRefiner, RefinerParams};
