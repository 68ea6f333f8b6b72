//! Trust-Region Interior-Point Method (`spec.md` §4.6): the outer barrier-parameter
//! loop orchestrating [`inner::solve`] and, on failure, [`crate::solvers::lm`]
//! restoration. Grounded on
//! `original_source/src/Algos/QPSolverAlgo/TrustRegionInteriorPointMethod.cpp`.

pub mod inner;
pub mod params;

use derive_more::{Display, Error};
use faer::Col;
use problemo::Problem;

use crate::E;
use crate::bounds::{self, Bounds};
use crate::callback::{Callback, ConvergenceOutput, NoOpCallback, SolverState};
use crate::linalg::kernel;
use crate::model::QPModel;
use crate::solvers::lm::{self, LmParams, LmStatus};
use inner::InnerStatus;
pub use params::TripmParams;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TripmStatus {
    Solved,
    MaxIterReached,
    StagnationIterates,
    TightVarBounds,
    LmFailure,
    /// The feasibility-restoration sweep could not find a strictly interior
    /// starting point (`spec.md` §7: "the outer framework may then retry").
    StrictPtFailure,
    /// A bound-consistency check failed in the reduced free subspace.
    BoundsError,
    /// A dimension mismatch was detected inside the solver stack after entry
    /// validation (a collaborator passed inconsistent `model`/`bounds` state).
    MatrixDimensionsFailure,
    NumError,
}

#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum TripmError {
    #[display("mu_init must be positive and mu_decrease must exceed 1, found mu_init={mu_init}, mu_decrease={mu_decrease}")]
    InvalidParams { mu_init: E, mu_decrease: E },
    #[display("x0 has length {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Drives `x0` (and its implicit slacks/multipliers) toward a KKT point of
/// `min f(x) s.t. c(x) <= 0, l <= x <= u` around a fixed [`QPModel`], using a
/// sequence of shrinking barrier parameters `mu` each solved to (approximate)
/// optimality by [`inner::solve`] (`spec.md` §4.6, §6: "`Tripm::solve(&mut self,
/// x0, bounds)`").
pub struct Tripm {
    model: QPModel,
    params: TripmParams,
}

impl Tripm {
    pub fn new(model: QPModel, params: TripmParams) -> Self {
        Self { model, params }
    }

    pub fn params(&self) -> &TripmParams {
        &self.params
    }

    /// Variables whose bound width is below [`bounds::FIXED_TOL`] are fixed at
    /// their starting value and the problem is solved in the reduced free
    /// subspace (`spec.md` §4.2/§4.6), then the result is lifted back to full
    /// dimension.
    pub fn solve(&mut self, x0: &mut Col<E>, bounds: &Bounds) -> Result<TripmStatus, Problem> {
        if self.params.mu_init <= 0.0 || self.params.mu_decrease <= 1.0 {
            return Err(TripmError::InvalidParams {
                mu_init: self.params.mu_init,
                mu_decrease: self.params.mu_decrease,
            }
            .into());
        }
        if x0.nrows() != self.model.n() {
            return Err(TripmError::DimensionMismatch {
                expected: self.model.n(),
                found: x0.nrows(),
            }
            .into());
        }

        let mask = bounds.fixed_mask();
        let free = bounds.free_indices();
        if free.is_empty() {
            return Ok(TripmStatus::TightVarBounds);
        }

        let fixed_values = x0.clone();
        let reduced_model = self.model.reduce(x0, &mask)?;
        let reduced_bounds = bounds.restrict(&free);
        let mut x_free = bounds::project_free(x0, &free);

        let status = solve_free(&reduced_model, &reduced_bounds, &mut x_free, &self.params)?;
        *x0 = bounds::lift_free(&x_free, &free, &fixed_values);
        Ok(status)
    }
}

/// Builds the per-outer-iteration trace snapshot (`spec.md` §6: "tabular trace
/// of objective, constraint infeasibility, projected gradient norm, mu, nu,
/// delta, ratio" — the subset this driver has cheaply on hand at the outer
/// boundary; `nu` and the step-acceptance ratio live inside `inner::solve` and
/// are not threaded out, consistent with the per-iteration trace being
/// informational rather than a stable interface).
fn outer_state(model: &QPModel, x: &Col<E>, lambda: &Col<E>, nit: usize, mu: E, delta: E) -> Result<SolverState, Problem> {
    let obj = model.obj(x)?;
    let c = model.cons(x)?;
    let primal_infeasibility = c.iter().cloned().fold(0.0_f64, |acc, v| acc.max(v.max(0.0)));
    let grad_l = model.lagrangian_grad(x, lambda, 1.0)?;
    let dual_infeasibility = kernel::norm2(grad_l.as_ref());
    Ok(SolverState { nit, mu, delta, obj, primal_infeasibility, dual_infeasibility })
}

fn solve_free(model: &QPModel, bounds: &Bounds, x: &mut Col<E>, params: &TripmParams) -> Result<TripmStatus, Problem> {
    let n = model.n();
    let m = model.m();

    // Strictly-interior starting point: keep x0 where it already satisfies the
    // box, else fall back to the box midpoint at the violating coordinates only
    // (a simplification of the spec's literal blanket-midpoint rule; see DESIGN.md).
    let interior_eps = 1e-10;
    if !bounds.strictly_interior(x, interior_eps) {
        let mid = bounds.midpoint();
        for j in 0..n {
            let lo = bounds.l()[j];
            let hi = bounds.u()[j];
            if !(lo + interior_eps <= x[j] && x[j] <= hi - interior_eps) {
                x[j] = mid[j];
            }
        }
    }

    let c0 = model.cons(x)?;
    let mut s = Col::from_fn(m, |i| (-c0[i]).max(0.5));

    // One tight LM sweep drops (x, s) onto an approximately feasible starting
    // point before the barrier iterations begin (`spec.md` §4.6 step 1).
    let lm_params = LmParams {
        feasibility_tol: 1e-10,
        tol: 1e-10,
        tol_dist_successive_x: params.tol_dist_successive_x,
        max_iter: 50,
        sol_be_strict: true,
    };
    match lm::solve(model, bounds, x, &mut s, &lm_params) {
        LmStatus::Solved | LmStatus::Improved | LmStatus::MaxIterReached | LmStatus::StagnationIterates => {}
        LmStatus::StrictPtFailure => return Ok(TripmStatus::StrictPtFailure),
        LmStatus::BoundsError | LmStatus::TightVarBounds => return Ok(TripmStatus::BoundsError),
        LmStatus::MatrixDimensionsFailure => return Ok(TripmStatus::MatrixDimensionsFailure),
    }

    let mut mu = params.mu_init;
    let tol_mu = (params.atol_opt.min(params.atol_feas) / 100.0).max(1e-14);
    let mut delta: E = 1.0;
    let mut lambda = Col::from_fn(m, |i| -(1e-3_f64.min(mu / s[i].max(1e-300))));
    let x0 = x.clone();
    let mut fail_streak: u32 = 0;
    let mut success_streak: u32 = 0;

    // Informational per-iteration trace (`spec.md` §6); silent unless the
    // caller opted in via `verbose_level`.
    let mut callback: Box<dyn Callback> =
        if params.verbose_level > 0 { Box::new(ConvergenceOutput::new()) } else { Box::new(NoOpCallback::new()) };

    for outer in 0..params.max_iter_outer {
        if inner::kkt_satisfied(model, bounds, x, &lambda, &s, &x0, params.atol_opt.max(params.atol_feas)) {
            return Ok(TripmStatus::Solved);
        }

        if params.verbose_level > 0 {
            callback.call(&outer_state(model, x, &lambda, outer, mu, delta)?);
        }

        let x_prev = x.clone();
        let status = inner::solve(model, bounds, x, &mut s, &mut lambda, mu, tol_mu, &mut delta, &x0, params);

        match status {
            InnerStatus::NumError => return Ok(TripmStatus::NumError),
            InnerStatus::Solved => {
                mu /= params.mu_decrease;
                fail_streak = 0;
                success_streak += 1;
            }
            InnerStatus::OneStepMade => {
                fail_streak = 0;
                success_streak += 1;
                if success_streak >= 2 {
                    mu /= params.mu_decrease.sqrt();
                    success_streak = 0;
                }
            }
            InnerStatus::Failure => {
                success_streak = 0;
                let c = model.cons(x)?;
                let cs_norm = {
                    let mut acc = 0.0;
                    for i in 0..m {
                        acc += (c[i] + s[i]) * (c[i] + s[i]);
                    }
                    acc.sqrt()
                };
                if cs_norm > tol_mu {
                    match lm::solve(model, bounds, x, &mut s, &lm_params) {
                        LmStatus::Solved | LmStatus::Improved => {
                            fail_streak = 0;
                        }
                        LmStatus::StrictPtFailure => return Ok(TripmStatus::StrictPtFailure),
                        LmStatus::BoundsError | LmStatus::TightVarBounds => return Ok(TripmStatus::BoundsError),
                        LmStatus::MatrixDimensionsFailure => return Ok(TripmStatus::MatrixDimensionsFailure),
                        LmStatus::MaxIterReached | LmStatus::StagnationIterates => {
                            fail_streak += 1;
                        }
                    }
                } else {
                    fail_streak += 1;
                }
                if fail_streak >= 3 {
                    return Ok(TripmStatus::LmFailure);
                }
            }
            InnerStatus::StagnationIterates | InnerStatus::Undefined => {
                return Ok(TripmStatus::StagnationIterates);
            }
        }

        let dist = {
            let mut m_ = 0.0_f64;
            for j in 0..n {
                m_ = m_.max((x[j] - x_prev[j]).abs());
            }
            m_
        };
        if dist <= params.tol_dist_successive_x {
            return Ok(TripmStatus::StagnationIterates);
        }
        if mu < 1e-14 {
            return Ok(TripmStatus::NumError);
        }
    }

    Ok(TripmStatus::MaxIterReached)
}
