//! Dogleg trust-region least-squares solver (`spec.md` §4.3), grounded on
//! `original_source/src/Algos/QPSolverAlgo/DoglegTRSolver.cpp`.
//!
//! Solves `min 1/2 ||A x + b||^2` subject to `||x||_2 <= delta`, with `A` possibly
//! over- or under-determined, via the Cauchy-point / Newton-point dogleg path.

use faer::{Col, Mat, MatRef};

use crate::E;
use crate::linalg::factor::{qr_factorization, solve_least_norm_qr, solve_least_squares_qr};
use crate::linalg::kernel;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DoglegStatus {
    Solved,
    MatrixDimensionsFailure,
    QrFactorizationFailure,
    TrParamError,
    TrNumError,
}

/// Solves `min 1/2 ||A x + b||^2 s.t. ||x|| <= delta`. Returns the candidate `x`
/// (zeroed on a non-`Solved` status, following `original_source`'s plain-return
/// convention for these checks — no exception) alongside the status.
pub fn solve(a: MatRef<E>, b: &Col<E>, delta: E) -> (Col<E>, DoglegStatus) {
    let n = a.ncols();

    if delta <= 1e-8 {
        return (Col::zeros(n), DoglegStatus::TrParamError);
    }
    if a.nrows() != b.nrows() {
        return (Col::zeros(n), DoglegStatus::MatrixDimensionsFailure);
    }
    if kernel::norm_inf(b.as_ref()) <= 1e-13 {
        return (Col::zeros(n), DoglegStatus::Solved);
    }

    let g0 = a.transpose() * b;
    let ag0 = a * &g0;
    let denom = kernel::normsquare(ag0.as_ref());
    if denom <= 0.0 {
        return (Col::zeros(n), DoglegStatus::TrNumError);
    }
    let alpha = kernel::normsquare(g0.as_ref()) / denom;
    let x_c: Col<E> = Col::from_fn(n, |i| -alpha * g0[i]);

    let neg_b = Mat::from_fn(b.nrows(), 1, |i, _| -b[i]);
    let m = a.nrows();
    let x_n: Col<E> = if m >= n {
        let qr = match qr_factorization(a) {
            Ok(qr) => qr,
            Err(_) => return (Col::zeros(n), DoglegStatus::QrFactorizationFailure),
        };
        match solve_least_squares_qr(&qr, neg_b.as_ref()) {
            Ok(sol) => Col::from_fn(n, |i| sol[(i, 0)]),
            Err(_) => return (Col::zeros(n), DoglegStatus::QrFactorizationFailure),
        }
    } else {
        let qr = match qr_factorization(a) {
            Ok(qr) => qr,
            Err(_) => return (Col::zeros(n), DoglegStatus::QrFactorizationFailure),
        };
        match solve_least_norm_qr(&qr, neg_b.as_ref()) {
            Ok(sol) => Col::from_fn(n, |i| sol[(i, 0)]),
            Err(_) => return (Col::zeros(n), DoglegStatus::QrFactorizationFailure),
        }
    };

    let xn_norm = kernel::norm2(x_n.as_ref());
    if xn_norm <= delta {
        return (x_n, DoglegStatus::Solved);
    }

    let xc_norm = kernel::norm2(x_c.as_ref());
    if xc_norm > delta {
        let scale = delta / xc_norm;
        let x = Col::from_fn(n, |i| scale * x_c[i]);
        return (x, DoglegStatus::Solved);
    }

    let d: Col<E> = Col::from_fn(n, |i| x_n[i] - x_c[i]);
    let a_coef = kernel::normsquare(d.as_ref());
    let mut b_coef = 0.0;
    for i in 0..n {
        b_coef += 2.0 * x_c[i] * d[i];
    }
    let c_coef = kernel::normsquare(x_c.as_ref()) - delta * delta;

    match roots_quadratic(a_coef, b_coef, c_coef) {
        Some((r1, r2)) => {
            let admissible = [r1, r2].into_iter().find(|&r| (0.0..=1.0).contains(&r));
            match admissible {
                Some(r) => {
                    let x = Col::from_fn(n, |i| x_c[i] + r * d[i]);
                    (x, DoglegStatus::Solved)
                }
                None => (Col::zeros(n), DoglegStatus::TrNumError),
            }
        }
        None => (Col::zeros(n), DoglegStatus::TrNumError),
    }
}

/// Real roots of `a r^2 + b r + c = 0`, smaller root first.
fn roots_quadratic(a: E, b: E, c: E) -> Option<(E, E)> {
    if a.abs() < 1e-300 {
        if b.abs() < 1e-300 {
            return None;
        }
        let r = -c / b;
        return Some((r, r));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn col(v: &[E]) -> Col<E> {
        Col::from_fn(v.len(), |i| v[i])
    }

    #[test]
    fn rejects_tiny_trust_region() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let b = col(&[1.0, 1.0]);
        let (_, status) = solve(a.as_ref(), &b, 1e-9);
        assert_eq!(status, DoglegStatus::TrParamError);
    }

    #[test]
    fn zero_residual_returns_zero() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let b = col(&[0.0, 0.0]);
        let (x, status) = solve(a.as_ref(), &b, 1.0);
        assert_eq!(status, DoglegStatus::Solved);
        assert!(kernel::norm2(x.as_ref()) < 1e-12);
    }

    #[test]
    fn unconstrained_recovery_matches_least_squares() {
        // A well-conditioned square system: the unconstrained minimizer is A^-1(-b).
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 0.0 });
        let b = col(&[-2.0, -4.0]);
        let (x, status) = solve(a.as_ref(), &b, 10.0);
        assert_eq!(status, DoglegStatus::Solved);
        assert!((x[0] - 1.0).abs() < 1e-8);
        assert!((x[1] - 2.0).abs() < 1e-8);
    }

    #[test]
    fn monotonicity_and_trust_region_respected() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 0.0 });
        let b = col(&[-2.0, -4.0]);
        let delta = 0.5;
        let (x, status) = solve(a.as_ref(), &b, delta);
        assert_eq!(status, DoglegStatus::Solved);
        assert!(kernel::norm2(x.as_ref()) <= delta + 1e-13 * delta);
        let residual = &a * &x + &b;
        assert!(kernel::norm2(residual.as_ref()) <= kernel::norm2(b.as_ref()) + 1e-12);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let a = Mat::from_fn(3, 2, |_, _| 1.0);
        let b = col(&[1.0, 1.0]);
        let (_, status) = solve(a.as_ref(), &b, 1.0);
        assert_eq!(status, DoglegStatus::MatrixDimensionsFailure);
    }
}
