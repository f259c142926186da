//! Pinhole intrinsics and Brown–Conrady / rational distortion.
//!
//! Coefficients follow the OpenCV positional order
//! `k1, k2, p1, p2, k3[, k4, k5, k6]`, so persisted calibrations and
//! exported tables line up with other tools.

use crate::Pose;
use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Invalid camera parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("invalid intrinsics (fx={fx}, fy={fy}, cx={cx}, cy={cy})")]
    InvalidIntrinsics { fx: f64, fy: f64, cx: f64, cy: f64 },
    #[error("intrinsic matrix is not of the form [fx 0 cx; 0 fy cy; 0 0 1]")]
    NotPinholeMatrix,
    #[error("expected 5 or 8 distortion coefficients, got {0}")]
    InvalidCoefficientCount(usize),
    #[error("distortion coefficients must be finite")]
    NonFiniteCoefficient,
}

/// Pinhole intrinsics with zero skew.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// `fx = fy = 1`, `cx = cy = 0`: pixel and normalized coordinates coincide.
    pub fn identity() -> Self {
        Self::new(1.0, 1.0, 0.0, 0.0)
    }

    /// Finite parameters with non-zero focal lengths.
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CameraError::InvalidIntrinsics {
                fx: self.fx,
                fy: self.fy,
                cx: self.cx,
                cy: self.cy,
            })
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read `fx, fy, cx, cy` from a pinhole matrix; skew and bottom row must
    /// be the canonical zeros and one.
    pub fn from_matrix(k: &Matrix3<f64>) -> Result<Self, CameraError> {
        const TOL: f64 = 1e-9;
        let canonical = k[(0, 1)].abs() <= TOL
            && k[(1, 0)].abs() <= TOL
            && k[(2, 0)].abs() <= TOL
            && k[(2, 1)].abs() <= TOL
            && (k[(2, 2)] - 1.0).abs() <= TOL;
        if !canonical {
            return Err(CameraError::NotPinholeMatrix);
        }
        Ok(Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]))
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

/// Which coefficients are estimated and persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    /// `k1, k2, p1, p2, k3`.
    #[default]
    BrownConrady5,
    /// `k1, k2, p1, p2, k3, k4, k5, k6` (rational radial term).
    Rational8,
}

impl DistortionModel {
    #[inline]
    pub fn coefficient_count(self) -> usize {
        match self {
            DistortionModel::BrownConrady5 => 5,
            DistortionModel::Rational8 => 8,
        }
    }

    pub fn from_count(n: usize) -> Result<Self, CameraError> {
        match n {
            5 => Ok(DistortionModel::BrownConrady5),
            8 => Ok(DistortionModel::Rational8),
            other => Err(CameraError::InvalidCoefficientCount(other)),
        }
    }
}

/// Lens distortion coefficients.
///
/// `k4..k6` are only meaningful for [`DistortionModel::Rational8`] and stay
/// zero for the five-coefficient model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Distortion {
    pub model: DistortionModel,
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    #[serde(default)]
    pub k4: f64,
    #[serde(default)]
    pub k5: f64,
    #[serde(default)]
    pub k6: f64,
}

impl Distortion {
    /// All-zero coefficients for `model`.
    pub fn zero(model: DistortionModel) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    /// Build from 5 or 8 coefficients in `k1, k2, p1, p2, k3[, k4, k5, k6]` order.
    pub fn from_coeffs(c: &[f64]) -> Result<Self, CameraError> {
        let model = DistortionModel::from_count(c.len())?;
        if c.iter().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFiniteCoefficient);
        }
        let mut d = Self::zero(model);
        d.set_coeffs(c);
        Ok(d)
    }

    /// Coefficients in positional order; length follows the model.
    pub fn coeffs(&self) -> Vec<f64> {
        let mut out = vec![self.k1, self.k2, self.p1, self.p2, self.k3];
        if self.model == DistortionModel::Rational8 {
            out.extend_from_slice(&[self.k4, self.k5, self.k6]);
        }
        out
    }

    /// Overwrite coefficients from a slice in positional order.
    ///
    /// Missing trailing entries are left unchanged; entries beyond the
    /// model's count are ignored.
    pub fn set_coeffs(&mut self, c: &[f64]) {
        let n = self.model.coefficient_count().min(c.len());
        for (i, &v) in c.iter().take(n).enumerate() {
            match i {
                0 => self.k1 = v,
                1 => self.k2 = v,
                2 => self.p1 = v,
                3 => self.p2 = v,
                4 => self.k3 = v,
                5 => self.k4 = v,
                6 => self.k5 = v,
                _ => self.k6 = v,
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs().iter().all(|&v| v == 0.0)
    }

    #[inline]
    fn radial(&self, r2: f64) -> f64 {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        match self.model {
            DistortionModel::BrownConrady5 => num,
            DistortionModel::Rational8 => {
                num / (1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6)
            }
        }
    }

    #[inline]
    fn tangential(&self, x: f64, y: f64, r2: f64) -> Vector2<f64> {
        Vector2::new(
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Apply distortion to ideal normalized coordinates.
    #[inline]
    pub fn distort_normalized(&self, n: Vector2<f64>) -> Vector2<f64> {
        let r2 = n.norm_squared();
        n * self.radial(r2) + self.tangential(n.x, n.y, r2)
    }

    /// Invert [`Distortion::distort_normalized`] by fixed-point iteration.
    ///
    /// Returns `None` if the iteration diverges.
    pub fn undistort_normalized(
        &self,
        distorted: Vector2<f64>,
        cfg: UndistortConfig,
    ) -> Option<Vector2<f64>> {
        let mut n = distorted;
        for _ in 0..cfg.max_iters.max(1) {
            let r2 = n.norm_squared();
            let radial = self.radial(r2);
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let next = (distorted - self.tangential(n.x, n.y, r2)) / radial;
            if !next.x.is_finite() || !next.y.is_finite() {
                return None;
            }
            let step = (next - n).norm();
            n = next;
            if step <= cfg.eps.max(0.0) {
                break;
            }
        }
        Some(n)
    }
}

/// Settings of the iterative distortion inversion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UndistortConfig {
    pub max_iters: usize,
    /// Stop once the update norm falls below this value.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

/// Intrinsics plus distortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a camera-frame point; `None` behind (or on) the image plane.
    #[inline]
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 1e-12 {
            return None;
        }
        let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
        Some(
            self.intrinsics
                .normalized_to_pixel(self.distortion.distort_normalized(n)),
        )
    }

    /// Project a target-frame point seen under `pose`.
    #[inline]
    pub fn project(&self, pose: &Pose, p: &Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(&pose.transform_point(p))
    }

    /// Distorted pixel of an ideal (undistorted) pixel.
    pub fn distort_pixel(&self, ideal: Point2<f64>) -> Point2<f64> {
        let n = self.intrinsics.pixel_to_normalized(ideal);
        self.intrinsics
            .normalized_to_pixel(self.distortion.distort_normalized(n))
    }

    /// Ideal normalized coordinates of an observed pixel.
    pub fn undistort_to_normalized(&self, pixel: Point2<f64>) -> Option<Vector2<f64>> {
        let d = self.intrinsics.pixel_to_normalized(pixel);
        self.distortion
            .undistort_normalized(d, UndistortConfig::default())
    }

    /// Ideal pixel of an observed pixel, in the same intrinsics.
    pub fn undistort_pixel(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        self.undistort_to_normalized(pixel)
            .map(|n| self.intrinsics.normalized_to_pixel(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn camera(model: DistortionModel) -> CameraModel {
        let mut d = Distortion::zero(model);
        d.set_coeffs(&[-0.21, 0.05, 0.001, -0.0007, 0.01, 0.02, -0.01, 0.005]);
        CameraModel::new(Intrinsics::new(820.0, 810.0, 320.0, 240.0), d)
    }

    #[test]
    fn coefficients_round_trip_in_positional_order() {
        let d = Distortion::from_coeffs(&[0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        assert_eq!(d.model, DistortionModel::BrownConrady5);
        assert_eq!(d.p1, 0.3);
        assert_eq!(d.coeffs(), vec![0.1, 0.2, 0.3, 0.4, 0.5]);

        let d8 = Distortion::from_coeffs(&[0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(d8.model, DistortionModel::Rational8);
        assert_eq!(d8.k6, 3.0);

        assert_eq!(
            Distortion::from_coeffs(&[0.0; 4]),
            Err(CameraError::InvalidCoefficientCount(4))
        );
    }

    #[test]
    fn undistort_inverts_distort() {
        for model in [DistortionModel::BrownConrady5, DistortionModel::Rational8] {
            let cam = camera(model);
            for p in [Point2::new(50.0, 40.0), Point2::new(600.0, 420.0), Point2::new(321.0, 239.0)] {
                let back = cam.undistort_pixel(cam.distort_pixel(p)).unwrap();
                assert_relative_eq!(back, p, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn matrix_round_trip_and_validation() {
        let k = Intrinsics::new(800.0, 780.0, 640.0, 360.0);
        assert_eq!(Intrinsics::from_matrix(&k.matrix()).unwrap(), k);
        assert!(Intrinsics::new(0.0, 0.0, 0.0, 0.0).validate().is_err());
        assert!(Intrinsics::identity().validate().is_ok());

        let mut skewed = k.matrix();
        skewed[(0, 1)] = 0.5;
        assert_eq!(
            Intrinsics::from_matrix(&skewed),
            Err(CameraError::NotPinholeMatrix)
        );
    }

    #[test]
    fn projection_rejects_points_behind_camera() {
        let cam = camera(DistortionModel::BrownConrady5);
        let pose = Pose::from_rvec_tvec(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        assert!(cam.project(&pose, &Point3::origin()).is_none());

        let pose = Pose::from_rvec_tvec(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0));
        let p = cam.project(&pose, &Point3::origin()).unwrap();
        assert_relative_eq!(p, Point2::new(320.0, 240.0), epsilon = 1e-12);
    }
}
