use crate::{Homography, Intrinsics, Pose};
use nalgebra::{Matrix3, Rotation3};

/// Decompose a plane-to-image homography into the pose of the `z = 0` plane.
///
/// `h` maps target-plane coordinates `(X, Y)` to pixels of a camera with
/// intrinsics `k`; pass [`Intrinsics::identity`] when `h` already maps to
/// normalized coordinates. The rotation is re-orthonormalized via SVD and the
/// solution with the plane in front of the camera is returned.
pub fn pose_from_homography(h: &Homography, k: &Intrinsics) -> Option<Pose> {
    let kinv = k.matrix().try_inverse()?;
    let a = kinv * h.h;
    let a1 = a.column(0).into_owned();
    let a2 = a.column(1).into_owned();
    let a3 = a.column(2).into_owned();

    let n1 = a1.norm();
    let n2 = a2.norm();
    if n1 < 1e-12 || n2 < 1e-12 || !n1.is_finite() || !n2.is_finite() {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let t = a3 * lambda;

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }

    if r.iter().chain(t.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    Some(Pose::new(Rotation3::from_matrix_unchecked(r), t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate_homography;
    use approx::assert_relative_eq;
    use nalgebra::{Point2, Point3, Vector2, Vector3};

    #[test]
    fn recovers_tilted_plane_pose() {
        let k = Intrinsics::new(900.0, 880.0, 640.0, 360.0);
        let gt = Pose::from_rvec_tvec(Vector3::new(0.3, -0.4, 0.1), Vector3::new(0.05, -0.02, 0.8));

        let obj: Vec<Point3<f64>> = (0..5)
            .flat_map(|j| (0..6).map(move |i| Point3::new(i as f64 * 0.03, j as f64 * 0.03, 0.0)))
            .collect();
        let src: Vec<Point2<f64>> = obj.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let dst: Vec<Point2<f64>> = obj
            .iter()
            .map(|p| {
                let pc = gt.transform_point(p);
                k.normalized_to_pixel(Vector2::new(pc.x / pc.z, pc.y / pc.z))
            })
            .collect();

        let h = estimate_homography(&src, &dst).unwrap();
        let pose = pose_from_homography(&h, &k).unwrap();
        assert_relative_eq!(pose.rotation, gt.rotation, epsilon = 1e-6);
        assert_relative_eq!(pose.translation, gt.translation, epsilon = 1e-6);
    }

    #[test]
    fn plane_ends_up_in_front_of_camera() {
        // -H is the same projective map; the sign must be resolved.
        let h = Homography::new(-Matrix3::new(1.0, 0.0, 0.1, 0.0, 1.0, -0.2, 0.0, 0.0, 2.0));
        let pose = pose_from_homography(&h, &Intrinsics::identity()).unwrap();
        assert!(pose.translation.z > 0.0);
        assert_relative_eq!(pose.rotation.matrix().determinant(), 1.0, epsilon = 1e-12);
    }
}
