//! Closed-form focal length initialization.

use camgauge_core::Homography;
use nalgebra::{DMatrix, DVector};

/// Focal lengths from plane homographies with a known principal point.
///
/// With `K = [fx 0 cx; 0 fy cy; 0 0 1]`, the first two columns of `K⁻¹H` are
/// orthogonal and of equal norm. Shifting the principal point to the origin,
/// both constraints are linear in `u = 1/fx²` and `v = 1/fy²`; all views are
/// stacked and solved in the least-squares sense.
///
/// Returns `None` when the system is degenerate (e.g. only fronto-parallel
/// views) or the solution is not a pair of positive finite focal lengths.
pub fn initial_focal_lengths(homographies: &[Homography], cx: f64, cy: f64) -> Option<(f64, f64)> {
    if homographies.is_empty() {
        return None;
    }
    let m = homographies.len();
    let mut a = DMatrix::<f64>::zeros(2 * m, 2);
    let mut b = DVector::<f64>::zeros(2 * m);
    for (k, h) in homographies.iter().enumerate() {
        let shift = |c: nalgebra::Vector3<f64>| (c.x - cx * c.z, c.y - cy * c.z, c.z);
        let (x1, y1, z1) = shift(h.column(0));
        let (x2, y2, z2) = shift(h.column(1));
        // Rows are scaled by the column norms so every view weighs the same.
        let s = 1.0 / (x1 * x1 + y1 * y1 + x2 * x2 + y2 * y2).max(1e-300);

        a[(2 * k, 0)] = x1 * x2 * s;
        a[(2 * k, 1)] = y1 * y2 * s;
        b[2 * k] = -z1 * z2 * s;

        a[(2 * k + 1, 0)] = (x1 * x1 - x2 * x2) * s;
        a[(2 * k + 1, 1)] = (y1 * y1 - y2 * y2) * s;
        b[2 * k + 1] = -(z1 * z1 - z2 * z2) * s;
    }

    let ata = a.transpose() * &a;
    let atb = a.transpose() * &b;
    // Reject near-singular systems relative to their own scale.
    let det = ata[(0, 0)] * ata[(1, 1)] - ata[(0, 1)] * ata[(1, 0)];
    let scale = ata[(0, 0)].abs().max(ata[(1, 1)].abs());
    if !det.is_finite() || det.abs() <= 1e-12 * scale * scale {
        return None;
    }
    let sol = ata.lu().solve(&atb)?;
    let (u, v) = (sol[0], sol[1]);
    if !(u.is_finite() && v.is_finite()) || u <= 0.0 || v <= 0.0 {
        return None;
    }
    Some((1.0 / u.sqrt(), 1.0 / v.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Rotation3, Vector3};

    fn homography(k: &Matrix3<f64>, rvec: Vector3<f64>, t: Vector3<f64>) -> Homography {
        let r = Rotation3::new(rvec);
        let m = r.matrix();
        let h = k * Matrix3::from_columns(&[m.column(0).into_owned(), m.column(1).into_owned(), t]);
        Homography::new(h / h[(2, 2)])
    }

    #[test]
    fn recovers_focal_lengths_from_tilted_views() {
        let k = Matrix3::new(850.0, 0.0, 320.0, 0.0, 830.0, 240.0, 0.0, 0.0, 1.0);
        let hs = vec![
            homography(&k, Vector3::new(0.3, 0.1, 0.0), Vector3::new(-0.05, -0.04, 0.6)),
            homography(&k, Vector3::new(-0.2, 0.35, 0.1), Vector3::new(-0.02, -0.05, 0.7)),
            homography(&k, Vector3::new(0.1, -0.3, -0.2), Vector3::new(-0.06, 0.0, 0.5)),
        ];
        let (fx, fy) = initial_focal_lengths(&hs, 320.0, 240.0).unwrap();
        assert_relative_eq!(fx, 850.0, epsilon = 1e-6);
        assert_relative_eq!(fy, 830.0, epsilon = 1e-6);
    }

    #[test]
    fn fronto_parallel_views_are_degenerate() {
        let k = Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0);
        let hs = vec![
            homography(&k, Vector3::zeros(), Vector3::new(0.0, 0.0, 0.5)),
            homography(&k, Vector3::new(0.0, 0.0, 0.3), Vector3::new(0.01, 0.0, 0.6)),
        ];
        assert!(initial_focal_lengths(&hs, 320.0, 240.0).is_none());
        assert!(initial_focal_lengths(&[], 320.0, 240.0).is_none());
    }
}
