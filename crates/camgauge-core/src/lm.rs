//! Levenberg–Marquardt settings and the shared solve entry point.
//!
//! Problems implement [`levenberg_marquardt::LeastSquaresProblem`] over
//! dynamically sized vectors; [`minimize`] runs the solver with
//! [`LmOptions`] and summarizes the outcome in an [`LmReport`].

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{storage::Owned, DVector, Dyn};
use serde::{Deserialize, Serialize};

/// Residual, Jacobian and parameter storage of every problem in this workspace.
pub trait DynProblem:
    LeastSquaresProblem<
    f64,
    Dyn,
    Dyn,
    ResidualStorage = Owned<f64, Dyn>,
    JacobianStorage = Owned<f64, Dyn, Dyn>,
    ParameterStorage = Owned<f64, Dyn>,
>
{
}

impl<P> DynProblem for P where
    P: LeastSquaresProblem<
        f64,
        Dyn,
        Dyn,
        ResidualStorage = Owned<f64, Dyn>,
        JacobianStorage = Owned<f64, Dyn, Dyn>,
        ParameterStorage = Owned<f64, Dyn>,
    >
{
}

/// Central-difference step for parameter value `v`.
#[inline]
pub fn diff_step(v: f64) -> f64 {
    1e-6 * v.abs().max(1e-3)
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LmOptions {
    /// Relative reduction of the cost below which the solve stops.
    pub ftol: f64,
    /// Relative parameter change below which the solve stops.
    pub xtol: f64,
    /// Orthogonality between residuals and Jacobian columns below which the
    /// solve stops.
    pub gtol: f64,
    /// Residual evaluations allowed per parameter.
    pub patience: usize,
    /// Initial trust-region radius factor.
    pub stepbound: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-12,
            xtol: 1e-12,
            gtol: 1e-12,
            patience: 100,
            stepbound: 100.0,
        }
    }
}

impl LmOptions {
    pub fn solver(&self) -> LevenbergMarquardt<f64> {
        LevenbergMarquardt::new()
            .with_ftol(self.ftol.max(0.0))
            .with_xtol(self.xtol.max(0.0))
            .with_gtol(self.gtol.max(0.0))
            .with_stepbound(if self.stepbound > 0.0 { self.stepbound } else { 100.0 })
            .with_patience(self.patience.max(1))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LmReport {
    pub evaluations: usize,
    /// `½‖r‖²` at the start.
    pub initial_cost: f64,
    pub final_cost: f64,
    pub converged: bool,
    pub termination: TerminationReason,
}

fn cost_of<P: DynProblem>(problem: &P) -> f64 {
    problem
        .residuals()
        .map_or(f64::INFINITY, |r: DVector<f64>| 0.5 * r.norm_squared())
}

/// Minimize `problem` from its current parameters.
///
/// The returned problem holds the best parameters found; when the solve
/// ends without improving on the start, the start is restored.
pub fn minimize<P: DynProblem>(problem: P, options: &LmOptions) -> (P, LmReport) {
    let x0 = problem.params();
    let initial_cost = cost_of(&problem);

    let (mut problem, report) = options.solver().minimize(problem);
    let mut final_cost = cost_of(&problem);
    if !(final_cost.is_finite() && final_cost <= initial_cost) {
        problem.set_params(&x0);
        final_cost = initial_cost;
    }
    log::trace!(
        "lm: {:?} after {} evaluations, cost {:.6e} -> {:.6e}",
        report.termination,
        report.number_of_evaluations,
        initial_cost,
        final_cost
    );

    let converged = report.termination.was_successful();
    (
        problem,
        LmReport {
            evaluations: report.number_of_evaluations,
            initial_cost,
            final_cost,
            converged,
            termination: report.termination,
        },
    )
}
