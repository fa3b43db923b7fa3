use crate::CollaboratorRole;

/// Errors returned by the tracking engine.
///
/// Every error is raised before the engine mutates any of its state, so a
/// failed call can simply be retried once the cause is fixed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error("no camera calibration attached")]
    MissingCalibration,
    #[error("no {role} attached")]
    MissingCollaborator { role: CollaboratorRole },
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("no surface has been trained yet")]
    NotTrained,
    #[error("no reference surface attached")]
    NoSurfaces,
    #[error("reference image is empty or truncated")]
    EmptyReferenceImage,
    #[error("frame is empty or truncated ({width}x{height}, {len} bytes)")]
    InvalidFrame {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("frame size {got:?} does not match the initialized size {expected:?}")]
    FrameSizeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("invalid training parameters: {reason}")]
    InvalidTrainingParams { reason: String },
    #[error("invalid engine dimensions: {reason}")]
    InvalidDimensions { reason: String },
    #[error("surface {index} out of range (surface count {count})")]
    SurfaceOutOfRange { index: usize, count: usize },
    #[error("tracker returned {got} points for {expected} inputs")]
    TrackerContract { expected: usize, got: usize },
}
