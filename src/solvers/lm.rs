//! Levenberg–Marquardt feasibility restoration (`spec.md` §4.5), grounded on
//! `original_source/src/Algos/QPSolverAlgo/LevenbergMarquardtSolver.cpp` (constants
//! `epsilon_1=1e-8`, `epsilon_2=0.9`, `gamma_1=0.5`, `tau=0.5`, `small_v=1e-10`
//! confirmed there).
//!
//! Drives `min ||c(x) + s||^2` subject to `l <= x <= u`, `s >= 0`, around a given
//! starting `XS = (x0, s0)`.

use faer::{Col, Mat};

use crate::E;
use crate::bounds::Bounds;
use crate::linalg::kernel;
use crate::model::QPModel;
use crate::solvers::dogleg::{self, DoglegStatus};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LmStatus {
    Solved,
    Improved,
    MaxIterReached,
    StagnationIterates,
    BoundsError,
    TightVarBounds,
    StrictPtFailure,
    MatrixDimensionsFailure,
}

#[derive(Debug, Clone)]
pub struct LmParams {
    pub feasibility_tol: E,
    pub tol: E,
    pub tol_dist_successive_x: E,
    pub max_iter: usize,
    pub sol_be_strict: bool,
}

impl Default for LmParams {
    fn default() -> Self {
        Self {
            feasibility_tol: 1e-8,
            tol: 1e-8,
            tol_dist_successive_x: 1e-13,
            max_iter: 50,
            sol_be_strict: true,
        }
    }
}

const EPSILON_1: E = 1e-8;
const EPSILON_2: E = 0.9;
const GAMMA_1: E = 0.5;
const TAU: E = 0.5;
const SMALL_V: E = 1e-10;
const SMALLEST_DELTA: E = 1e-15;
const LARGEST_DELTA: E = 1e15;

fn residual(model: &QPModel, x: &Col<E>, s: &Col<E>) -> Option<Col<E>> {
    let c = model.cons(x).ok()?;
    Some(Col::from_fn(c.nrows(), |i| c[i] + s[i]))
}

/// Drives `(x, s)` toward feasibility. Overwrites `x` and `s` on `Solved`/`Improved`;
/// restores the input `x` on any other status (`spec.md` §4.5).
pub fn solve(model: &QPModel, bounds: &Bounds, x: &mut Col<E>, s: &mut Col<E>, params: &LmParams) -> LmStatus {
    let n = model.n();
    let m = model.m();
    if x.nrows() != n || s.nrows() != m || bounds.n() != n {
        return LmStatus::MatrixDimensionsFailure;
    }
    if params.sol_be_strict && !bounds.strictly_interior(x, 1e-13) {
        return LmStatus::StrictPtFailure;
    }

    let x0 = x.clone();
    let mut delta: E = 1.0;
    let mut r = match residual(model, x, s) {
        Some(r) => r,
        None => return LmStatus::MatrixDimensionsFailure,
    };
    let mut improved = false;

    for _iter in 0..params.max_iter {
        let cs_norm = {
            let mut acc = 0.0;
            for i in 0..m {
                acc += r[i] * r[i];
            }
            acc.sqrt()
        };
        if cs_norm <= params.feasibility_tol {
            return if improved { LmStatus::Improved } else { LmStatus::Solved };
        }

        let jac = match model.cons_jacobian(x) {
            Ok(j) => j,
            Err(_) => return LmStatus::MatrixDimensionsFailure,
        };
        let w = Mat::from_fn(m, n + m, |i, j| {
            if j < n { jac[(i, j)] } else if j - n == i { 1.0 } else { 0.0 }
        });

        // Gradient-stationarity stop: `W^T r` is the gradient of `1/2||r||^2`
        // w.r.t. the stacked `(x, s)` variable (`spec.md` §4.5 step 7,
        // `‖WᵀW r‖ ≤ tol`, read here as the Gauss-Newton stationarity residual
        // `‖Wᵀr‖`, the only reading of that expression with matching
        // dimensions — see `DESIGN.md`).
        let wt_r = w.transpose() * &r;
        if kernel::norm2(wt_r.as_ref()) <= params.tol {
            return if improved { LmStatus::Improved } else { LmStatus::Solved };
        }

        let (v, status) = dogleg::solve(w.as_ref(), &r, delta);
        if status != DoglegStatus::Solved {
            return LmStatus::MatrixDimensionsFailure;
        }
        let v_x = Col::from_fn(n, |i| v[i]);
        let v_s = Col::from_fn(m, |i| v[n + i]);

        if v_x.iter().chain(v_s.iter()).map(|e| e * e).sum::<E>().sqrt() <= SMALL_V {
            return if improved { LmStatus::Improved } else { LmStatus::Solved };
        }

        // Fraction-to-boundary backtrack with margin `TAU = 0.5`: the largest
        // step length <= 1 keeping s at least half its value and x strictly
        // inside the box (`spec.md` §4.5 step 3).
        let mut tau = 1.0_f64;
        for i in 0..m {
            if v_s[i] < -1e-300 {
                tau = tau.min(-TAU * s[i] / v_s[i]);
            }
        }
        for i in 0..n {
            let li = bounds.l()[i];
            let ui = bounds.u()[i];
            if v_x[i] > 0.0 {
                let lim = TAU * (ui - x[i]) / v_x[i];
                tau = tau.min(lim.max(0.0));
            } else if v_x[i] < 0.0 {
                let lim = TAU * (li - x[i]) / v_x[i];
                tau = tau.min(lim.max(0.0));
            }
        }
        tau = tau.clamp(0.0, 1.0);
        if tau <= 0.0 {
            return if improved { LmStatus::Improved } else { LmStatus::Solved };
        }

        let eps = if params.sol_be_strict { 1e-13 } else { 0.0 };
        let mut x_can = Col::from_fn(n, |i| (x[i] + tau * v_x[i]).clamp(bounds.l()[i] + eps, bounds.u()[i] - eps));
        let mut s_can = Col::from_fn(m, |i| (s[i] + tau * v_s[i]).max(eps.max(1e-300)));

        // Magic slack reset.
        if let Ok(c_at_can) = model.cons(&x_can) {
            for i in 0..m {
                if c_at_can[i] < 0.0 {
                    s_can[i] = -c_at_can[i];
                }
            }
        } else {
            return LmStatus::MatrixDimensionsFailure;
        }

        let r_can = match residual(model, &x_can, &s_can) {
            Some(r) => r,
            None => return LmStatus::MatrixDimensionsFailure,
        };
        let cs_can_norm = {
            let mut acc = 0.0;
            for i in 0..m {
                acc += r_can[i] * r_can[i];
            }
            acc.sqrt()
        };

        let ared = cs_norm - cs_can_norm;
        let wv = &w * &v;
        let pred = {
            let mut acc = 0.0;
            for i in 0..m {
                acc += r[i] * r[i] - (r[i] + wv[i]) * (r[i] + wv[i]);
            }
            0.5 * acc.max(1e-300)
        };

        if ared >= EPSILON_1 * pred {
            if ared >= EPSILON_2 * pred {
                delta = (2.0 * delta).min(LARGEST_DELTA);
            }
            let dist = {
                let mut m_ = 0.0_f64;
                for i in 0..n {
                    m_ = m_.max((x_can[i] - x[i]).abs());
                }
                m_
            };
            std::mem::swap(&mut x_can, x);
            std::mem::swap(&mut s_can, s);
            r = r_can;
            improved = true;
            if dist <= params.tol_dist_successive_x {
                return LmStatus::Improved;
            }
        } else {
            delta = (GAMMA_1 * delta).max(SMALLEST_DELTA);
        }
    }

    if !improved {
        *x = x0;
        LmStatus::MaxIterReached
    } else {
        LmStatus::StagnationIterates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat as FMat;

    fn col(v: &[E]) -> Col<E> {
        Col::from_fn(v.len(), |i| v[i])
    }

    fn single_constraint_model() -> QPModel {
        // n=2, m=1, c(x) = x0 + x1 - 1 (alpha0=-1, alpha_L=[1,1], H=0).
        let mut data = FMat::<E>::zeros(2, crate::model::row_width(2));
        data[(1, 0)] = -1.0;
        data[(1, 1)] = 1.0;
        data[(1, 2)] = 1.0;
        QPModel::try_new(2, 1, data).unwrap()
    }

    #[test]
    fn decreases_infeasibility_on_solved_or_improved() {
        let model = single_constraint_model();
        let bounds = Bounds::new(col(&[-10.0, -10.0]), col(&[10.0, 10.0])).unwrap();
        let mut x = col(&[2.0, 2.0]);
        let mut s = col(&[0.5]);
        let before = residual(&model, &x, &s).unwrap();
        let before_norm = before[0].abs();
        let params = LmParams::default();
        let status = solve(&model, &bounds, &mut x, &mut s, &params);
        assert!(matches!(status, LmStatus::Solved | LmStatus::Improved));
        let after = residual(&model, &x, &s).unwrap();
        assert!(after[0].abs() <= before_norm + 1e-9);
    }

    #[test]
    fn rejects_non_strict_start_when_required() {
        let model = single_constraint_model();
        let bounds = Bounds::new(col(&[-10.0, -10.0]), col(&[10.0, 10.0])).unwrap();
        let mut x = col(&[-10.0, 0.0]);
        let mut s = col(&[0.5]);
        let params = LmParams::default();
        let status = solve(&model, &bounds, &mut x, &mut s, &params);
        assert_eq!(status, LmStatus::StrictPtFailure);
    }
}
