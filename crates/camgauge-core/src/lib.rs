//! Core geometry and camera-model types for camgauge.
//!
//! Everything here is detector-agnostic: correspondence sets, rigid poses,
//! homographies, the pinhole + Brown–Conrady camera model, the
//! Levenberg–Marquardt entry point shared by the solves and the logger used
//! by the binaries.

mod camera;
mod geometry;
mod homography;
mod image;
mod lm;
mod logger;
mod planar_pose;

pub use camera::{
    CameraError, CameraModel, Distortion, DistortionModel, Intrinsics, UndistortConfig,
};
pub use geometry::{Axis, CorrespondenceSet, GeometryError, Pose};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, sample_mean_3x3, GrayImage, GrayImageView};
pub use lm::{diff_step, minimize, DynProblem, LmOptions, LmReport};
pub use planar_pose::pose_from_homography;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
