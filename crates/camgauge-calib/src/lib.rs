//! Camera calibration from planar targets.
//!
//! - [`calibrate`]: intrinsics, distortion and per-view extrinsics from a set
//!   of planar correspondence sets (closed-form initialization followed by a
//!   joint Levenberg–Marquardt refinement).
//! - [`undistort`] / [`distort`]: whole-frame distortion correction and its
//!   synthetic inverse.
//! - [`write_calibration`] / [`read_calibration`]: the plain-text calibration
//!   file.

mod calibrate;
mod init;
mod persist;
mod undistort;

pub use calibrate::{calibrate, CalibError, CalibrationOptions, CalibrationResult};
pub use init::initial_focal_lengths;
pub use persist::{load, read_calibration, save, write_calibration, PersistError, DEFAULT_CALIBRATION_FILE};
pub use undistort::{distort, undistort, undistort_points, UndistortError};
