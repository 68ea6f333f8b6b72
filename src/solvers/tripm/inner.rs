//! Inner barrier subproblem solver (`spec.md` §4.6): normal step (Dogleg) +
//! tangential step (projected CG) under the mu-barrier Lagrangian, a merit-function
//! trust-region test, a second-order correction, and reject/shrink handling.

use faer::{Col, Mat};

use crate::E;
use crate::bounds::Bounds;
use crate::linalg::factor::{qr_factorization, solve_least_norm_qr, solve_least_squares_qr};
use crate::linalg::kernel;
use crate::model::QPModel;
use crate::solvers::dogleg::{self, DoglegStatus};
use crate::solvers::pcg::{self, PcgStatus};
use crate::solvers::tripm::params::TripmParams;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InnerStatus {
    NumError,
    Failure,
    Solved,
    StagnationIterates,
    OneStepMade,
    Undefined,
}

const TAU_NORMAL: E = 0.995;
const TAU_TANGENTIAL: E = 0.1;
const RHO: E = 0.1;
const EPSILON_1: E = 1e-8;
const EPSILON_2: E = 0.9;
const GAMMA_1: E = 0.5;
const SMALLEST_DELTA: E = 1e-15;
const NU_INFINITY: E = 1e16;

/// Largest `theta <= 1` keeping `s + theta*p_s >= (1-tau)*s` and `x + theta*p_x`
/// strictly inside `[l, u]` with margin `tau` (`spec.md` §4.5/§4.6 fraction-to-boundary).
fn fraction_to_boundary(x: &Col<E>, bounds: &Bounds, s: &Col<E>, p_x: &Col<E>, p_s: &Col<E>, tau: E) -> E {
    let mut theta = 1.0_f64;
    for i in 0..s.nrows() {
        if p_s[i] < -1e-300 {
            theta = theta.min(-tau * s[i] / p_s[i]);
        }
    }
    for i in 0..x.nrows() {
        let li = bounds.l()[i];
        let ui = bounds.u()[i];
        if p_x[i] > 0.0 {
            theta = theta.min((tau * (ui - x[i]) / p_x[i]).max(0.0));
        } else if p_x[i] < 0.0 {
            theta = theta.min((tau * (li - x[i]) / p_x[i]).max(0.0));
        }
    }
    theta.clamp(0.0, 1.0)
}

fn merit(model: &QPModel, x: &Col<E>, s: &Col<E>, bounds: &Bounds, nu: E, mu: E) -> Option<E> {
    let f = model.obj(x).ok()?;
    let c = model.cons(x).ok()?;
    let mut log_s = 0.0;
    for i in 0..s.nrows() {
        log_s += s[i].max(1e-300).ln();
    }
    let mut log_box = 0.0;
    for i in 0..x.nrows() {
        let lo = (x[i] - bounds.l()[i]).max(1e-300);
        let hi = (bounds.u()[i] - x[i]).max(1e-300);
        log_box += lo.ln() + hi.ln();
    }
    let cs = Col::from_fn(c.nrows(), |i| c[i] + s[i]);
    Some(f - mu * log_s - mu * log_box + nu * kernel::norm2(cs.as_ref()))
}

struct TrialStep {
    x: Col<E>,
    s: Col<E>,
    delta: E,
    accepted: bool,
    p_norm: E,
}

/// Performs one normal-step / tangential-step / merit-test inner iteration.
/// Returns `None` on an unrecoverable numerical failure (propagated as `NumError`).
#[allow(clippy::too_many_arguments)]
fn one_trial(
    model: &QPModel,
    bounds: &Bounds,
    x: &Col<E>,
    s: &Col<E>,
    lambda: &Col<E>,
    mu: E,
    delta: E,
    nu: &mut E,
) -> Option<TrialStep> {
    let n = model.n();
    let m = model.m();

    let c = model.cons(x).ok()?;
    let jac = model.cons_jacobian(x).ok()?;
    let cs = Col::from_fn(m, |i| c[i] + s[i]);
    let w = Mat::from_fn(m, n + m, |i, j| {
        if j < n { jac[(i, j)] } else if j - n == i { s[i] } else { 0.0 }
    });

    // Normal step.
    let (v_raw, dl_status) = dogleg::solve(w.as_ref(), &cs, 0.8 * delta);
    if dl_status != DoglegStatus::Solved {
        return None;
    }
    let v_x = Col::from_fn(n, |i| v_raw[i]);
    let v_s = Col::from_fn(m, |i| v_raw[n + i]);
    let theta_v = fraction_to_boundary(x, bounds, s, &v_x, &v_s, TAU_NORMAL);
    let v = Col::from_fn(n + m, |i| theta_v * v_raw[i]);

    // Tangential step.
    let hess_l = model.lagrangian_hessian(x, lambda, 1.0).ok()?;
    let obj_grad = model.obj_grad(x).ok()?;
    let mut q = Mat::<E>::zeros(n + m, n + m);
    for i in 0..n {
        for j in 0..n {
            q[(i, j)] = hess_l[(i, j)];
        }
        let lo = (x[i] - bounds.l()[i]).max(1e-300);
        let hi = (bounds.u()[i] - x[i]).max(1e-300);
        q[(i, i)] += mu * (1.0 / (lo * lo) + 1.0 / (hi * hi));
    }
    for i in 0..m {
        q[(n + i, n + i)] = -lambda[i] * s[i];
    }
    let mut q_lin = Col::<E>::zeros(n + m);
    for i in 0..n {
        let lo = (x[i] - bounds.l()[i]).max(1e-300);
        let hi = (bounds.u()[i] - x[i]).max(1e-300);
        q_lin[i] = obj_grad[i] - mu / lo + mu / hi;
    }
    for i in 0..m {
        q_lin[n + i] = -mu;
    }

    let b_tan = &w * &v;
    let (p_raw, pcg_status) = pcg::solve(q.as_ref(), &q_lin, w.as_ref(), &b_tan, delta, Some(&v));
    let p_raw = match pcg_status {
        PcgStatus::NoInitSolution => v.clone(),
        PcgStatus::MatrixDimensionsFailure | PcgStatus::FactorizationFailure | PcgStatus::TrParamError => {
            return None;
        }
        _ => p_raw,
    };

    let p_x_raw = Col::from_fn(n, |i| p_raw[i]);
    let p_s_raw = Col::from_fn(m, |i| p_raw[n + i]);
    let theta_p = fraction_to_boundary(x, bounds, s, &p_x_raw, &p_s_raw, TAU_TANGENTIAL);
    let p = Col::from_fn(n + m, |i| theta_p * p_raw[i]);
    let p_norm = kernel::norm2(p.as_ref());

    // Merit function / penalty update.
    let wp = &w * &p;
    let residual_after = Col::from_fn(m, |i| b_tan[i] - wp[i]);
    let gap = kernel::norm2(cs.as_ref()) - kernel::norm2(residual_after.as_ref());
    let p_x = Col::from_fn(n, |i| p[i]);
    let p_s = Col::from_fn(m, |i| p[n + i]);
    let qp = &q * &p;
    let p_t_q_p: E = kernel::dot(p.as_ref(), qp.as_ref()).unwrap_or(0.0);
    let q_lin_t_p: E = kernel::dot(q_lin.as_ref(), p.as_ref()).unwrap_or(0.0);

    if gap > 0.0 {
        let needed = (0.5 * p_t_q_p + q_lin_t_p) / ((1.0 - RHO) * gap) + 1.0;
        if needed > *nu {
            *nu = needed;
        }
    } else if gap <= 0.0 {
        *nu = NU_INFINITY;
    }
    let pred = *nu * gap - 0.5 * p_t_q_p - q_lin_t_p;

    let try_candidate = |x_p: &Col<E>, s_p: &Col<E>| -> Option<(Col<E>, Col<E>, E)> {
        let eps = 1e-13;
        let x_can = Col::from_fn(n, |i| x_p[i].clamp(bounds.l()[i] + eps, bounds.u()[i] - eps));
        let mut s_can = Col::from_fn(m, |i| s_p[i].max(eps));
        let c_can = model.cons(&x_can).ok()?;
        for i in 0..m {
            if c_can[i] < 0.0 {
                s_can[i] = -c_can[i];
            }
        }
        let phi_trial = merit(model, &x_can, &s_can, bounds, *nu, mu)?;
        Some((x_can, s_can, phi_trial))
    };

    let phi_prev = merit(model, x, s, bounds, *nu, mu)?;
    let x_trial = Col::from_fn(n, |i| x[i] + p_x[i]);
    let s_trial = Col::from_fn(m, |i| s[i] + p_s[i]);
    let (mut x_can, mut s_can, mut phi_trial) = try_candidate(&x_trial, &s_trial)?;
    let mut ared = phi_prev - phi_trial;

    if !(ared >= EPSILON_1 * pred.max(0.0)) && p_norm <= 1.1 * kernel::norm2(v.as_ref()) {
        // Second-order correction: min ||W y - (c(x+p_x)+s+p_s)||.
        let target = Col::from_fn(m, |i| model.cons(&x_trial).ok().map(|cv| cv[i]).unwrap_or(0.0) + s_trial[i]);
        let target_mat = Mat::from_fn(m, 1, |i, _| target[i]);
        if let Ok(qr) = qr_factorization(w.as_ref()) {
            let y_mat = if qr.of_transpose {
                solve_least_norm_qr(&qr, target_mat.as_ref())
            } else {
                solve_least_squares_qr(&qr, target_mat.as_ref())
            };
            if let Ok(y_mat) = y_mat {
                let y = Col::from_fn(n + m, |i| y_mat[(i, 0)]);
                let x_soc = Col::from_fn(n, |i| x_trial[i] + y[i]);
                let s_soc = Col::from_fn(m, |i| s_trial[i] + y[n + i]);
                if let Some((xc, sc, phit)) = try_candidate(&x_soc, &s_soc) {
                    let ared_soc = phi_prev - phit;
                    if ared_soc >= EPSILON_1 * pred.max(0.0) {
                        x_can = xc;
                        s_can = sc;
                        phi_trial = phit;
                        ared = ared_soc;
                    }
                }
            }
        }
    }

    if ared >= EPSILON_1 * pred.max(1e-300) {
        let mut new_delta = delta;
        if ared >= EPSILON_2 * pred.max(1e-300) {
            new_delta = (2.0 * delta).min((1.0 / mu).max(1e15));
        }
        Some(TrialStep { x: x_can, s: s_can, delta: new_delta, accepted: true, p_norm })
    } else {
        let new_delta = (GAMMA_1 * delta.min(p_norm)).max(SMALLEST_DELTA);
        Some(TrialStep { x: x.clone(), s: s.clone(), delta: new_delta, accepted: false, p_norm })
    }
}

/// KKT-residual-style check shared by the outer and inner stopping tests
/// (`spec.md` §4.6, adapted from Waltz–Morales–Nocedal–Orban 2006).
pub fn kkt_satisfied(model: &QPModel, bounds: &Bounds, x: &Col<E>, lambda: &Col<E>, s: &Col<E>, x0: &Col<E>, atol: E) -> bool {
    let Ok(grad_l) = model.lagrangian_grad(x, lambda, 1.0) else { return false };
    let Ok(obj_grad) = model.obj_grad(x) else { return false };
    let n = x.nrows();
    let proj = |g: &Col<E>| -> Col<E> {
        Col::from_fn(n, |i| (x[i] - g[i]).clamp(bounds.l()[i], bounds.u()[i]))
    };
    let p_l = proj(&grad_l);
    let p_f = proj(&obj_grad);
    let stat_scale = {
        let mut m_ = 1.0_f64;
        for i in 0..n {
            m_ = m_.max((x[i] - p_f[i]).abs());
        }
        m_
    };
    let stat_resid = {
        let mut m_ = 0.0_f64;
        for i in 0..n {
            m_ = m_.max((x[i] - p_l[i]).abs());
        }
        m_
    };
    if stat_resid > stat_scale * atol {
        return false;
    }
    let comp_resid = {
        let mut m_ = 0.0_f64;
        for i in 0..s.nrows() {
            m_ = m_.max((s[i] * lambda[i]).abs());
        }
        m_
    };
    if comp_resid > atol {
        return false;
    }
    let Ok(c0) = model.cons(x0) else { return false };
    let Ok(c) = model.cons(x) else { return false };
    let feas0 = c0.iter().cloned().fold(0.0_f64, |acc, v| acc.max(v.max(0.0)));
    let feas = c.iter().cloned().fold(0.0_f64, |acc, v| acc.max(v.max(0.0)));
    feas <= feas0.max(1.0) * atol
}

/// Runs the inner barrier-subproblem iteration to (approximate) convergence for a
/// fixed `mu`, looping up to `params.max_iter_inner` times.
#[allow(clippy::too_many_arguments)]
pub fn solve(
    model: &QPModel,
    bounds: &Bounds,
    x: &mut Col<E>,
    s: &mut Col<E>,
    lambda: &mut Col<E>,
    mu: E,
    tol_mu: E,
    delta: &mut E,
    x0: &Col<E>,
    params: &TripmParams,
) -> InnerStatus {
    let mut nu: E = 1.0;
    let mut made_progress = false;
    let x_prev_outer = x.clone();

    for _iter in 0..params.max_iter_inner {
        let x_before = x.clone();

        let Some(trial) = one_trial(model, bounds, x, s, lambda, mu, *delta, &mut nu) else {
            return InnerStatus::NumError;
        };
        *delta = trial.delta;

        if trial.accepted {
            *x = trial.x;
            *s = trial.s;
            made_progress = true;
            // Re-estimate multipliers from the complementarity relation lambda_i
            // = -mu / s_i, clipped negative per the invariant in `spec.md` §3.
            for i in 0..lambda.nrows() {
                let est = -mu / s[i].max(1e-300);
                lambda[i] = if est >= 0.0 { -(1e-3_f64.min(mu / s[i].max(1e-300))) } else { est };
            }
        }

        if kkt_satisfied(model, bounds, x, lambda, s, x0, tol_mu) {
            return InnerStatus::Solved;
        }
        if trial.p_norm <= 1e-8 || *delta < 1e-8 {
            return if made_progress { InnerStatus::OneStepMade } else { InnerStatus::Failure };
        }
        let dist = kernel::dist_norm2(x.as_ref(), x_before.as_ref());
        if dist <= params.tol_dist_successive_x {
            return if made_progress { InnerStatus::StagnationIterates } else { InnerStatus::Failure };
        }
    }

    let _ = x_prev_outer;
    if made_progress { InnerStatus::OneStepMade } else { InnerStatus::Failure }
}
