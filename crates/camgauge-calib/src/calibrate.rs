//! Joint calibration of intrinsics, distortion and per-view extrinsics.

use crate::init::initial_focal_lengths;
use camgauge_core::{
    diff_step, estimate_homography, minimize, pose_from_homography, CameraModel, CorrespondenceSet,
    Distortion, DistortionModel, GeometryError, Intrinsics, LmOptions, Pose,
};
use camgauge_pose::reprojection_rms;
use levenberg_marquardt::LeastSquaresProblem;
use log::{debug, info, warn};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Point2, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Largest |z| accepted for a target-plane point.
const PLANE_TOL: f64 = 1e-9;
/// Per-view parameters: rotation update and translation.
const VIEW_PARAMS: usize = 6;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibError {
    #[error("no correspondence sets to calibrate from")]
    NoTarget,
    #[error("set {index}: {image} image points but {object} object points")]
    MismatchedLengths {
        index: usize,
        image: usize,
        object: usize,
    },
    #[error("set {index}: {count} points, at least 4 required")]
    InsufficientPoints { index: usize, count: usize },
    #[error("set {index}: object points are not on the z = 0 plane")]
    NonPlanar { index: usize },
    #[error("image size {width}x{height} is invalid")]
    InvalidImageSize { width: u32, height: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub model: DistortionModel,
    pub lm: LmOptions,
}

/// Output of [`calibrate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// `sqrt(Σ‖observed − projected‖² / N)` over all points, pixels.
    pub rms: f64,
    pub image_size: (u32, u32),
    /// Target pose per input set, same order.
    pub extrinsics: Vec<Pose>,
    pub per_view_rms: Vec<f64>,
    /// Residual evaluations spent by the solver.
    pub evaluations: usize,
}

impl CalibrationResult {
    pub fn camera(&self) -> CameraModel {
        CameraModel::new(self.intrinsics, self.distortion)
    }

    /// Overall RMS of `sets` reprojected with this result's camera and
    /// extrinsics. `None` if the set count differs or a point lands behind
    /// the camera.
    pub fn reprojection_rms(&self, sets: &[CorrespondenceSet]) -> Option<f64> {
        if sets.len() != self.extrinsics.len() {
            return None;
        }
        let camera = self.camera();
        let mut sum = 0.0;
        let mut count = 0usize;
        for (set, pose) in sets.iter().zip(&self.extrinsics) {
            for (o, i) in set.pairs() {
                sum += (camera.project(pose, o)? - i).norm_squared();
                count += 1;
            }
        }
        (count > 0).then(|| (sum / count as f64).sqrt())
    }
}

fn check_sets(sets: &[CorrespondenceSet], width: u32, height: u32) -> Result<(), CalibError> {
    if sets.is_empty() {
        return Err(CalibError::NoTarget);
    }
    for (index, set) in sets.iter().enumerate() {
        match set.validate() {
            Ok(()) => {}
            Err(GeometryError::MismatchedLengths { image, object }) => {
                return Err(CalibError::MismatchedLengths {
                    index,
                    image,
                    object,
                })
            }
            Err(GeometryError::EmptySet) => {
                return Err(CalibError::InsufficientPoints { index, count: 0 })
            }
        }
        if set.len() < 4 {
            return Err(CalibError::InsufficientPoints {
                index,
                count: set.len(),
            });
        }
        if !set.is_planar(PLANE_TOL) {
            return Err(CalibError::NonPlanar { index });
        }
    }
    if width == 0 || height == 0 {
        return Err(CalibError::InvalidImageSize { width, height });
    }
    Ok(())
}

/// All views stacked into one residual vector.
///
/// Parameters: `[fx, fy, cx, cy, coeffs…, (δr, t) per view]` with each view
/// rotation `exp(δr) · R0` around its initial estimate.
struct CalibrationProblem<'a> {
    sets: &'a [CorrespondenceSet],
    model: DistortionModel,
    base: Vec<Rotation3<f64>>,
    /// First residual row of each view.
    offsets: Vec<usize>,
    rows: usize,
    params: DVector<f64>,
}

impl<'a> CalibrationProblem<'a> {
    fn new(sets: &'a [CorrespondenceSet], model: DistortionModel, base: Vec<Rotation3<f64>>) -> Self {
        let mut offsets = Vec::with_capacity(sets.len());
        let mut rows = 0;
        for set in sets {
            offsets.push(rows);
            rows += 2 * set.len();
        }
        Self {
            sets,
            model,
            base,
            offsets,
            rows,
            params: DVector::zeros(0),
        }
    }

    fn shared(&self) -> usize {
        4 + self.model.coefficient_count()
    }

    fn pack(&self, camera: &CameraModel, poses: &[Pose]) -> DVector<f64> {
        let mut x = DVector::zeros(self.shared() + VIEW_PARAMS * poses.len());
        let k = camera.intrinsics;
        x[0] = k.fx;
        x[1] = k.fy;
        x[2] = k.cx;
        x[3] = k.cy;
        for (i, c) in camera.distortion.coeffs().into_iter().enumerate() {
            x[4 + i] = c;
        }
        for (v, pose) in poses.iter().enumerate() {
            let o = self.shared() + VIEW_PARAMS * v;
            // Rotation updates start at zero.
            x[o + 3] = pose.translation.x;
            x[o + 4] = pose.translation.y;
            x[o + 5] = pose.translation.z;
        }
        x
    }

    fn camera(&self, x: &DVector<f64>) -> CameraModel {
        let mut distortion = Distortion::zero(self.model);
        distortion.set_coeffs(&x.as_slice()[4..self.shared()]);
        CameraModel::new(Intrinsics::new(x[0], x[1], x[2], x[3]), distortion)
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Pose {
        let o = self.shared() + VIEW_PARAMS * view;
        let delta = Rotation3::new(Vector3::new(x[o], x[o + 1], x[o + 2]));
        Pose::new(delta * self.base[view], Vector3::new(x[o + 3], x[o + 4], x[o + 5]))
    }

    fn view_residuals(&self, camera: &CameraModel, x: &DVector<f64>, view: usize) -> DVector<f64> {
        let set = &self.sets[view];
        let pose = self.pose(x, view);
        let mut r = DVector::zeros(2 * set.len());
        for (k, (o, i)) in set.pairs().enumerate() {
            let (dx, dy) = match camera.project(&pose, o) {
                Some(p) => (p.x - i.x, p.y - i.y),
                None => (f64::NAN, f64::NAN),
            };
            r[2 * k] = dx;
            r[2 * k + 1] = dy;
        }
        r
    }
}

impl CalibrationProblem<'_> {
    fn residuals_at(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = self.camera(x);
        let mut r = DVector::zeros(self.rows);
        for view in 0..self.sets.len() {
            let rv = self.view_residuals(&camera, x, view);
            r.rows_mut(self.offsets[view], rv.len()).copy_from(&rv);
        }
        r
    }

    /// Central differences exploiting the block structure: camera columns
    /// touch every row, view columns only their own view's rows.
    fn jacobian_at(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, x.len());
        let mut probe = x.clone();

        for k in 0..self.shared() {
            let h = diff_step(x[k]);
            probe[k] = x[k] + h;
            let plus = self.residuals_at(&probe);
            probe[k] = x[k] - h;
            let minus = self.residuals_at(&probe);
            probe[k] = x[k];
            jac.set_column(k, &((plus - minus) / (2.0 * h)));
        }

        let camera = self.camera(x);
        for view in 0..self.sets.len() {
            let rows = 2 * self.sets[view].len();
            for p in 0..VIEW_PARAMS {
                let k = self.shared() + VIEW_PARAMS * view + p;
                let h = diff_step(x[k]);
                probe[k] = x[k] + h;
                let plus = self.view_residuals(&camera, &probe, view);
                probe[k] = x[k] - h;
                let minus = self.view_residuals(&camera, &probe, view);
                probe[k] = x[k];
                jac.view_mut((self.offsets[view], k), (rows, 1))
                    .copy_from(&((plus - minus) / (2.0 * h)));
            }
        }
        jac
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CalibrationProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    /// Points behind the camera give NaN rows; the solver rejects such steps.
    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals_at(&self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(self.jacobian_at(&self.params))
    }
}

fn plane_points(set: &CorrespondenceSet) -> Vec<Point2<f64>> {
    set.object_points.iter().map(|p| Point2::new(p.x, p.y)).collect()
}

fn spread(pts: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (lo_x, hi_x, lo_y, hi_y) = pts.fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(a, b, c, d), (x, y)| (a.min(x), b.max(x), c.min(y), d.max(y)),
    );
    (hi_x - lo_x).max(hi_y - lo_y)
}

/// Target facing the camera on the optical axis, at the depth that matches
/// its image extent (1 m when the image points collapse).
fn fronto_parallel_pose(set: &CorrespondenceSet, k: &Intrinsics) -> Pose {
    let n = set.len() as f64;
    let center = set.object_points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let object_extent = spread(set.object_points.iter().map(|p| (p.x, p.y)));
    let image_extent = spread(set.image_points.iter().map(|p| (p.x, p.y)));
    let depth = if image_extent > 1e-9 && object_extent > 0.0 {
        k.fx.max(k.fy) * object_extent / image_extent
    } else {
        1.0
    };
    Pose::new(Rotation3::identity(), Vector3::new(-center.x, -center.y, depth))
}

/// Calibrate a camera from planar correspondence sets observed in images of
/// `image_size = (width, height)` pixels.
///
/// All preconditions are checked before solving. Poor geometry is not an
/// error: views without a homography start fronto-parallel, and the result
/// carries whatever RMS the refinement reaches.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(sets, options), fields(views = sets.len()))
)]
pub fn calibrate(
    sets: &[CorrespondenceSet],
    image_size: (u32, u32),
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibError> {
    let (width, height) = image_size;
    check_sets(sets, width, height)?;

    let homographies: Vec<Option<Homography>> = sets
        .iter()
        .enumerate()
        .map(|(index, set)| {
            let h = estimate_homography(&plane_points(set), &set.image_points);
            if h.is_none() {
                warn!("set {index}: no homography, starting from a fronto-parallel pose");
            }
            h
        })
        .collect();
    let usable: Vec<Homography> = homographies.iter().flatten().copied().collect();

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    let (fx, fy) = initial_focal_lengths(&usable, cx, cy).unwrap_or_else(|| {
        let f = width.max(height) as f64;
        warn!("closed-form focal length degenerate, starting from f = {f}");
        (f, f)
    });
    let intrinsics = Intrinsics::new(fx, fy, cx, cy);
    debug!("initial intrinsics: {intrinsics:?}");

    let camera = CameraModel::new(intrinsics, Distortion::zero(options.model));
    let poses: Vec<Pose> = homographies
        .iter()
        .zip(sets)
        .map(|(h, set)| {
            h.as_ref()
                .and_then(|h| pose_from_homography(h, &intrinsics))
                .filter(|pose| set.object_points.iter().all(|p| camera.project(pose, p).is_some()))
                .unwrap_or_else(|| fronto_parallel_pose(set, &intrinsics))
        })
        .collect();

    let mut problem = CalibrationProblem::new(sets, options.model, poses.iter().map(|p| p.rotation).collect());
    let x0 = problem.pack(&camera, &poses);
    problem.set_params(&x0);
    let (problem, report) = minimize(problem, &options.lm);
    debug!(
        "calibration solve: {:?} after {} evaluations, cost {:.6e} -> {:.6e}",
        report.termination, report.evaluations, report.initial_cost, report.final_cost
    );
    let x = problem.params();

    let camera = problem.camera(&x);
    let extrinsics: Vec<Pose> = (0..sets.len()).map(|v| problem.pose(&x, v)).collect();
    let per_view_rms: Vec<f64> = sets
        .iter()
        .zip(&extrinsics)
        .map(|(set, pose)| {
            reprojection_rms(pose, &set.object_points, &set.image_points, &camera).unwrap_or(f64::INFINITY)
        })
        .collect();
    let points: usize = sets.iter().map(CorrespondenceSet::len).sum();
    let rms = (2.0 * report.final_cost / points as f64).sqrt();
    info!(
        "calibrated {} views: fx={:.3} fy={:.3} cx={:.3} cy={:.3}, rms {:.6} px",
        sets.len(),
        camera.intrinsics.fx,
        camera.intrinsics.fy,
        camera.intrinsics.cx,
        camera.intrinsics.cy,
        rms
    );

    Ok(CalibrationResult {
        intrinsics: camera.intrinsics,
        distortion: camera.distortion,
        rms,
        image_size,
        extrinsics,
        per_view_rms,
        evaluations: report.evaluations,
    })
}
