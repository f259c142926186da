//! Planar PnP: homography initialization plus reprojection refinement.

use crate::PoseError;
use camgauge_core::{
    diff_step, estimate_homography, minimize, pose_from_homography, CameraModel, GeometryError,
    Intrinsics, LmOptions, LmReport, Pose,
};
use levenberg_marquardt::LeastSquaresProblem;
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Point2, Point3, Rotation3, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest |z| accepted for a target-plane point.
const PLANE_TOL: f64 = 1e-9;

/// Pixel reprojection residuals of one pose.
///
/// Parameters are `[δr; t]` with `R = exp(δr) · R0`, so the rotation stays
/// well conditioned even for markers facing the camera (angle near π).
struct ReprojectionProblem<'a> {
    camera: &'a CameraModel,
    base: Rotation3<f64>,
    object: &'a [Point3<f64>],
    image: &'a [Point2<f64>],
    params: DVector<f64>,
}

impl ReprojectionProblem<'_> {
    fn pose_at(&self, x: &DVector<f64>) -> Pose {
        let delta = Rotation3::new(Vector3::new(x[0], x[1], x[2]));
        Pose::new(delta * self.base, Vector3::new(x[3], x[4], x[5]))
    }

    fn residuals_at(&self, x: &DVector<f64>) -> DVector<f64> {
        let pose = self.pose_at(x);
        let mut r = DVector::zeros(2 * self.object.len());
        for (k, (o, i)) in self.object.iter().zip(self.image).enumerate() {
            let (dx, dy) = match self.camera.project(&pose, o) {
                Some(p) => (p.x - i.x, p.y - i.y),
                None => (f64::NAN, f64::NAN),
            };
            r[2 * k] = dx;
            r[2 * k + 1] = dy;
        }
        r
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for ReprojectionProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(&self.params))
    }

    /// Central differences over the six pose parameters.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let x = &self.params;
        let mut jac = DMatrix::zeros(2 * self.object.len(), x.len());
        let mut probe = x.clone();
        for k in 0..x.len() {
            let h = diff_step(x[k]);
            probe[k] = x[k] + h;
            let plus = self.residuals_at(&probe);
            probe[k] = x[k] - h;
            let minus = self.residuals_at(&probe);
            probe[k] = x[k];
            jac.set_column(k, &((plus - minus) / (2.0 * h)));
        }
        Some(jac)
    }
}

/// Refine `initial` by minimizing the pixel reprojection error.
pub fn refine_pose(
    camera: &CameraModel,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    initial: Pose,
    opts: &LmOptions,
) -> (Pose, LmReport) {
    let t = initial.translation;
    let problem = ReprojectionProblem {
        camera,
        base: initial.rotation,
        object,
        image,
        params: DVector::from_row_slice(&[0.0, 0.0, 0.0, t.x, t.y, t.z]),
    };
    let (problem, report) = minimize(problem, opts);
    (problem.pose_at(&problem.params), report)
}

pub(crate) fn undistort_all(camera: &CameraModel, image: &[Point2<f64>]) -> Result<Vec<Point2<f64>>, PoseError> {
    image
        .iter()
        .enumerate()
        .map(|(i, p)| {
            camera
                .undistort_to_normalized(*p)
                .map(Point2::from)
                .ok_or(PoseError::Undistort(i))
        })
        .collect()
}

/// Pose of a planar (`z = 0`) target from four or more correspondences.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(points = object.len()))
)]
pub fn solve_planar_pnp(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
) -> Result<Pose, PoseError> {
    if object.len() != image.len() {
        return Err(GeometryError::MismatchedLengths {
            image: image.len(),
            object: object.len(),
        }
        .into());
    }
    if object.len() < 4 {
        return Err(PoseError::TooFewPoints(object.len()));
    }
    camera.intrinsics.validate()?;
    if object.iter().any(|p| p.z.abs() > PLANE_TOL) {
        return Err(PoseError::NonPlanar);
    }

    let normalized = undistort_all(camera, image)?;
    let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    let h = estimate_homography(&plane, &normalized).ok_or(PoseError::DegenerateCorners)?;
    let initial = pose_from_homography(&h, &Intrinsics::identity()).ok_or(PoseError::DegenerateCorners)?;

    let (pose, report) = refine_pose(camera, object, image, initial, &LmOptions::default());
    debug!(
        "planar pnp: {} points, cost {:.3e} -> {:.3e} in {} evaluations",
        object.len(),
        report.initial_cost,
        report.final_cost,
        report.evaluations
    );
    Ok(pose)
}

/// Root-mean-square pixel distance between `image` and the projections of
/// `object` under `pose`.
///
/// `None` for empty or mismatched input, or when a point projects behind the
/// camera.
pub fn reprojection_rms(
    pose: &Pose,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
) -> Option<f64> {
    if object.is_empty() || object.len() != image.len() {
        return None;
    }
    let mut sum = 0.0;
    for (o, i) in object.iter().zip(image) {
        sum += (camera.project(pose, o)? - i).norm_squared();
    }
    Some((sum / object.len() as f64).sqrt())
}
