use camgauge_core::{CameraError, GeometryError};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("expected 4 marker corners, got {0}")]
    CornerCount(usize),
    #[error("marker size must be positive and finite, got {0}")]
    InvalidMarkerSize(f64),
    #[error("degenerate corner configuration (collinear points)")]
    DegenerateCorners,
    #[error("need at least 4 correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("object points are not on the z = 0 plane")]
    NonPlanar,
    #[error("image point {0} could not be undistorted")]
    Undistort(usize),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
