use crate::pnp::{refine_pose, undistort_all};
use crate::PoseError;
use camgauge_core::{homography_from_4pt, pose_from_homography, CameraModel, Intrinsics, LmOptions, Pose};
use log::trace;
use nalgebra::{Point2, Point3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Relative triangle area below which three corners count as collinear.
const COLLINEAR_TOL: f64 = 1e-6;

/// Marker corners TL, TR, BR, BL in the marker frame.
///
/// The marker's x axis points right, y up and z out of the marker towards
/// the camera.
pub fn marker_object_points(size: f64) -> [Point3<f64>; 4] {
    let h = size / 2.0;
    [
        Point3::new(-h, h, 0.0),
        Point3::new(h, h, 0.0),
        Point3::new(h, -h, 0.0),
        Point3::new(-h, -h, 0.0),
    ]
}

fn has_collinear_triple(pts: &[Point2<f64>]) -> bool {
    let mut extent = 0.0f64;
    for (i, a) in pts.iter().enumerate() {
        for b in &pts[i + 1..] {
            extent = extent.max((b - a).norm_squared());
        }
    }
    let n = pts.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let u = pts[j] - pts[i];
                let v = pts[k] - pts[i];
                if (u.x * v.y - u.y * v.x).abs() <= COLLINEAR_TOL * extent {
                    return true;
                }
            }
        }
    }
    false
}

/// Pose of a square marker of side `marker_size` (meters) from its image
/// corners in TL, TR, BR, BL order.
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip(camera)))]
pub fn estimate_pose(corners: &[Point2<f64>], marker_size: f64, camera: &CameraModel) -> Result<Pose, PoseError> {
    if corners.len() != 4 {
        return Err(PoseError::CornerCount(corners.len()));
    }
    if !marker_size.is_finite() || marker_size <= 0.0 {
        return Err(PoseError::InvalidMarkerSize(marker_size));
    }
    camera.intrinsics.validate()?;
    if has_collinear_triple(corners) {
        return Err(PoseError::DegenerateCorners);
    }

    let object = marker_object_points(marker_size);
    let normalized = undistort_all(camera, corners)?;
    let normalized: [Point2<f64>; 4] = [normalized[0], normalized[1], normalized[2], normalized[3]];
    let plane = object.map(|p| Point2::new(p.x, p.y));
    let h = homography_from_4pt(&plane, &normalized).ok_or(PoseError::DegenerateCorners)?;
    let initial = pose_from_homography(&h, &Intrinsics::identity()).ok_or(PoseError::DegenerateCorners)?;

    let (pose, report) = refine_pose(camera, &object, corners, initial, &LmOptions::default());
    trace!(
        "marker pose: cost {:.3e} -> {:.3e}, t = {:?}",
        report.initial_cost,
        report.final_cost,
        pose.translation
    );
    Ok(pose)
}
