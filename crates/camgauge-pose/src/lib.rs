//! Pose of planar targets seen by a calibrated camera.
//!
//! [`estimate_pose`] handles a single square marker given its four image
//! corners; [`solve_planar_pnp`] handles any set of four or more `z = 0`
//! correspondences, e.g. a whole chessboard. Both start from the
//! decomposition of a homography in normalized coordinates and refine the
//! pose by Levenberg–Marquardt on the pixel reprojection error, distortion
//! included.

mod error;
mod marker;
mod pnp;

pub use error::PoseError;
pub use marker::{estimate_pose, marker_object_points};
pub use pnp::{refine_pose, reprojection_rms, solve_planar_pnp};
