//! Projected Conjugate Gradient (`spec.md` §4.4), Algorithm 6.2 of
//! Gould, Hribar & Nocedal (2001), "Solving the Trust-Region Subproblem using the
//! Lanczos Method and a Trust-Region Implicit Cholesky Factorization" — NOMAD's own
//! adaptation lives in `original_source/src/Algos/QPSolverAlgo/ProjectedConjugateGradientSolver.cpp`.
//!
//! Solves `min 1/2 x^T G x + c^T x` subject to `A x = b`, `||x|| <= delta`, with
//! `m <= n` equality constraints. The projection onto `{p : A p = 0}` assumes the
//! identity preconditioner (`spec.md` §9 Open Questions: the source does not
//! exercise other choices, and neither does this crate).

use faer::{Col, Mat, MatRef};

use crate::E;
use crate::linalg::factor::{Ldlt, ldl_solve, ldlt_factorization};
use crate::linalg::kernel;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PcgStatus {
    Solved,
    NegativeCurvature,
    BoundaryReached,
    MaxIterReached,
    QuadRootsError,
    NoInitSolution,
    TrParamError,
    FactorizationFailure,
    MatrixDimensionsFailure,
}

/// Builds the saturated KKT matrix `[I A^T; A 0]` of order `n + m`.
fn saturated_matrix(a: MatRef<E>, n: usize, m: usize) -> Mat<E> {
    Mat::from_fn(n + m, n + m, |i, j| {
        if i < n && j < n {
            if i == j { 1.0 } else { 0.0 }
        } else if i < n && j >= n {
            a[(j - n, i)]
        } else if i >= n && j < n {
            a[(i - n, j)]
        } else {
            0.0
        }
    })
}

/// Solves the saturated system for the "primal" `n`-length block with right-hand
/// side `(top, bottom)`, applying up to three iterative-refinement passes.
fn solve_saturated(ldlt: &Ldlt, m_mat: MatRef<E>, n: usize, mm: usize, top: &Col<E>, bottom: &Col<E>) -> Col<E> {
    let rhs = Col::from_fn(n + mm, |i| if i < n { top[i] } else { bottom[i - n] });
    let mut sol = match ldl_solve(ldlt, &rhs) {
        Ok(s) => s,
        Err(_) => return Col::zeros(n),
    };
    for _ in 0..3 {
        let residual_full = &rhs - &(m_mat * &sol);
        if kernel::norm2(residual_full.as_ref()) <= 1e-12 * (1.0 + kernel::norm2(rhs.as_ref())) {
            break;
        }
        let correction = match ldl_solve(ldlt, &residual_full) {
            Ok(c) => c,
            Err(_) => break,
        };
        sol = &sol + &correction;
    }
    Col::from_fn(n, |i| sol[i])
}

/// Real roots of `a r^2 + b r + c = 0`.
fn roots_quadratic(a: E, b: E, c: E) -> Option<(E, E)> {
    if a.abs() < 1e-300 {
        return None;
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let r1 = (-b - sq) / (2.0 * a);
    let r2 = (-b + sq) / (2.0 * a);
    Some((r1.min(r2), r1.max(r2)))
}

/// Solves `min 1/2 x^T G x + c^T x s.t. A x = b, ||x|| <= delta`.
///
/// `x_init`, when given, is assumed to already satisfy `A x_init = b` (the TRIPM
/// tangential step passes its backtracked normal step this way); otherwise a
/// feasible start is derived by solving the saturated system with right-hand side
/// `(0, b)`.
pub fn solve(
    g: MatRef<E>,
    c: &Col<E>,
    a: MatRef<E>,
    b: &Col<E>,
    delta: E,
    x_init: Option<&Col<E>>,
) -> (Col<E>, PcgStatus) {
    let n = a.ncols();
    let m = a.nrows();

    if delta <= 1e-8 {
        return (Col::zeros(n), PcgStatus::TrParamError);
    }
    if g.nrows() != n || g.ncols() != n || c.nrows() != n || b.nrows() != m {
        return (Col::zeros(n), PcgStatus::MatrixDimensionsFailure);
    }
    if m > n {
        return (Col::zeros(n), PcgStatus::MatrixDimensionsFailure);
    }

    let sat = saturated_matrix(a, n, m);
    let ldlt = match ldlt_factorization(sat.as_ref()) {
        Ok(l) => l,
        Err(_) => return (Col::zeros(n), PcgStatus::FactorizationFailure),
    };

    let mut x = match x_init {
        Some(x0) => x0.clone(),
        None => solve_saturated(&ldlt, sat.as_ref(), n, m, &Col::zeros(n), b),
    };
    if x.nrows() != n || x.iter().any(|v| !v.is_finite()) {
        return (Col::zeros(n), PcgStatus::NoInitSolution);
    }

    let project = |v: &Col<E>| -> Col<E> { solve_saturated(&ldlt, sat.as_ref(), n, m, v, &Col::zeros(m)) };

    let mut r: Col<E> = &(&g * &x) + c;
    let mut z = project(&r);
    let mut d: Col<E> = Col::from_fn(n, |i| -z[i]);

    let rz0 = kernel::dot(r.as_ref(), z.as_ref()).unwrap_or(0.0).max(0.0);
    let tol_cg = 0.01 * rz0.sqrt();
    let max_iter = 2 * (n + m);

    let mut rz = rz0;

    for _iter in 0..max_iter {
        let gd = &g * &d;
        let dgd = kernel::dot(d.as_ref(), gd.as_ref()).unwrap_or(0.0);

        if dgd <= 0.0 {
            let a_coef = kernel::normsquare(d.as_ref());
            let mut b_coef = 0.0;
            for i in 0..n {
                b_coef += 2.0 * x[i] * d[i];
            }
            let c_coef = kernel::normsquare(x.as_ref()) - delta * delta;
            return match roots_quadratic(a_coef, b_coef, c_coef) {
                Some((r1, r2)) => {
                    let tau = r1.max(r2);
                    let xf = Col::from_fn(n, |i| x[i] + tau * d[i]);
                    (xf, PcgStatus::NegativeCurvature)
                }
                None => (x, PcgStatus::QuadRootsError),
            };
        }

        let alpha = rz / dgd;
        let x_new: Col<E> = Col::from_fn(n, |i| x[i] + alpha * d[i]);

        if kernel::norm2(x_new.as_ref()) > delta {
            let a_coef = kernel::normsquare(d.as_ref());
            let mut b_coef = 0.0;
            for i in 0..n {
                b_coef += 2.0 * x[i] * d[i];
            }
            let c_coef = kernel::normsquare(x.as_ref()) - delta * delta;
            return match roots_quadratic(a_coef, b_coef, c_coef) {
                Some((r1, r2)) => {
                    let tau = if r1 >= 0.0 { r1 } else { r2 };
                    let xf = Col::from_fn(n, |i| x[i] + tau * d[i]);
                    (xf, PcgStatus::BoundaryReached)
                }
                None => (x, PcgStatus::QuadRootsError),
            };
        }

        let r_new: Col<E> = Col::from_fn(n, |i| r[i] + alpha * gd[i]);
        let z_new = project(&r_new);
        let rz_new = kernel::dot(r_new.as_ref(), z_new.as_ref()).unwrap_or(0.0);

        if rz_new.max(0.0).sqrt() <= tol_cg {
            return (x_new, PcgStatus::Solved);
        }

        let beta = rz_new / rz;
        d = Col::from_fn(n, |i| -z_new[i] + beta * d[i]);
        x = x_new;
        r = r_new;
        z = z_new;
        rz = rz_new;
    }

    (x, PcgStatus::MaxIterReached)
}
