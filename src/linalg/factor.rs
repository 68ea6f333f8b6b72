//! Dense factorizations used by the higher-level solvers: Householder QR (for
//! least-squares and least-norm solves), Golub–Reinsch SVD (for minimum-norm
//! least-squares), and a pivoted LDLᵀ (for the saturated KKT system in the
//! projected-CG solver).
//!
//! These are hand-rolled against `faer::Mat<E>` used purely as dense storage,
//! the same way `original_source`'s `Math/MatrixUtils.cpp` hand-rolls its own
//! QR/SVD rather than delegating to an external library — see `DESIGN.md`.

use faer::{Col, Mat, MatRef};

use crate::E;
use crate::linalg::kernel::LinalgError;

/// Maximum number of SVD sweeps before giving up (`spec.md` §4.1: "explicit
/// iteration cap (30)"); also the cap used by `original_source`'s own
/// `SVD_decomposition` (`NITER = 30`).
pub const SVD_ITER_CAP: usize = 30;

fn sign(a: E, b: E) -> E {
    if b >= 0.0 { a.abs() } else { -a.abs() }
}

/// Thin QR of `m` (rows >= cols) or of `m^T` (rows < cols), dispatched explicitly
/// by shape as `spec.md` §4.1/§4.3 require.
pub struct ThinQr {
    pub q: Mat<E>,
    pub r: Mat<E>,
    /// `true` when this is the QR of `m` itself; `false` when it is the QR of `m^T`
    /// (i.e. `m` was under-determined and the least-norm branch applies).
    pub of_transpose: bool,
}

/// Householder QR of a tall-or-square `a` (`rows >= cols`): returns the thin
/// `(Q, R)` with `Q` `rows x cols`, `R` `cols x cols` upper triangular.
fn householder_qr_tall(a: MatRef<E>) -> (Mat<E>, Mat<E>) {
    let m = a.nrows();
    let n = a.ncols();
    let mut r = a.to_owned();
    let mut q = Mat::<E>::identity(m, m);

    for k in 0..n {
        let mut norm_x_sq = 0.0;
        for i in k..m {
            norm_x_sq += r[(i, k)] * r[(i, k)];
        }
        let norm_x = norm_x_sq.sqrt();
        if norm_x < 1e-300 {
            continue;
        }
        let alpha = -sign(norm_x, r[(k, k)]);
        let mut v = vec![0.0; m - k];
        for i in k..m {
            v[i - k] = r[(i, k)];
        }
        v[0] -= alpha;
        let vnorm_sq: E = v.iter().map(|x| x * x).sum();
        if vnorm_sq < 1e-300 {
            continue;
        }

        for j in k..n {
            let mut dot = 0.0;
            for i in k..m {
                dot += v[i - k] * r[(i, j)];
            }
            let factor = 2.0 * dot / vnorm_sq;
            for i in k..m {
                r[(i, j)] -= factor * v[i - k];
            }
        }
        for row in 0..m {
            let mut dot = 0.0;
            for i in k..m {
                dot += q[(row, i)] * v[i - k];
            }
            let factor = 2.0 * dot / vnorm_sq;
            for i in k..m {
                q[(row, i)] -= factor * v[i - k];
            }
        }
    }

    let q_thin = Mat::from_fn(m, n, |i, j| q[(i, j)]);
    let r_thin = Mat::from_fn(n, n, |i, j| if i <= j { r[(i, j)] } else { 0.0 });
    (q_thin, r_thin)
}

pub fn qr_factorization(m: MatRef<E>) -> Result<ThinQr, LinalgError> {
    let (rows, cols) = (m.nrows(), m.ncols());
    if rows == 0 || cols == 0 {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: 1,
            expected_cols: 1,
            found_rows: rows,
            found_cols: cols,
        });
    }

    let of_transpose = rows < cols;
    let (q, r) = if of_transpose {
        householder_qr_tall(m.transpose())
    } else {
        householder_qr_tall(m)
    };

    Ok(ThinQr { q, r, of_transpose })
}

/// Solves `A x = b` in the least-squares sense (`rows >= cols`) using a
/// precomputed thin QR of `A`. Back-substitutes `R x = Q^T b`.
pub fn solve_least_squares_qr(qr: &ThinQr, b: MatRef<E>) -> Result<Mat<E>, LinalgError> {
    if qr.of_transpose {
        return Err(LinalgError::FactorizationFailed {
            reason: "least-squares solve requires the QR of A, not of A^T",
        });
    }
    let qtb = qr.q.transpose() * b;
    back_substitute_upper(qr.r.as_ref(), qtb.as_ref())
}

/// Solves `A x = b` in the least-norm sense (`rows < cols`) using a precomputed
/// thin QR of `A^T`: `x = Q (R^-T b)`.
pub fn solve_least_norm_qr(qr: &ThinQr, b: MatRef<E>) -> Result<Mat<E>, LinalgError> {
    if !qr.of_transpose {
        return Err(LinalgError::FactorizationFailed {
            reason: "least-norm solve requires the QR of A^T, not of A",
        });
    }
    let y = forward_substitute_lower_t(qr.r.as_ref(), b)?;
    Ok(&qr.q * &y)
}

fn back_substitute_upper(r: MatRef<E>, rhs: MatRef<E>) -> Result<Mat<E>, LinalgError> {
    let n = r.ncols();
    if r.nrows() < n {
        return Err(LinalgError::FactorizationFailed {
            reason: "R is not upper triangular with at least n rows",
        });
    }
    let ncols_rhs = rhs.ncols();
    let mut x = Mat::<E>::zeros(n, ncols_rhs);
    for c in 0..ncols_rhs {
        for i in (0..n).rev() {
            let mut v = rhs[(i, c)];
            for j in (i + 1)..n {
                v -= r[(i, j)] * x[(j, c)];
            }
            x[(i, c)] = v / r[(i, i)];
        }
    }
    Ok(x)
}

/// Solves `R^T y = b` by forward substitution, where `R` is the (square, upper
/// triangular) top block of the QR factor of `A^T`.
fn forward_substitute_lower_t(r: MatRef<E>, rhs: MatRef<E>) -> Result<Mat<E>, LinalgError> {
    let m = r.ncols();
    let ncols_rhs = rhs.ncols();
    let mut y = Mat::<E>::zeros(m, ncols_rhs);
    for c in 0..ncols_rhs {
        for i in 0..m {
            let mut v = rhs[(i, c)];
            for j in 0..i {
                v -= r[(j, i)] * y[(j, c)];
            }
            y[(i, c)] = v / r[(i, i)];
        }
    }
    Ok(y)
}

/// Golub–Reinsch SVD of `a` (`rows >= cols`), capped at [`SVD_ITER_CAP`] sweeps per
/// singular value, following `original_source`'s `SVD_decomposition` structure.
/// Returns `(U, sigma, V)` with `U` `rows x cols`, `sigma` length `cols`, `V`
/// `cols x cols`, such that `A = U diag(sigma) V^T`.
fn svd_decomposition(a: MatRef<E>) -> Result<(Mat<E>, Vec<E>, Mat<E>), LinalgError> {
    let m = a.nrows();
    let n = a.ncols();
    let mut u = a.to_owned();
    let mut v = Mat::<E>::zeros(n, n);
    let mut w = vec![0.0; n];
    let mut rv1 = vec![0.0; n];

    let mut g = 0.0;
    let mut scale = 0.0;
    let mut anorm: E = 0.0;
    let mut l: usize = 0;

    // Householder reduction to bidiagonal form. `scale` and `g` carry their
    // values from the end of the previous iteration into this assignment,
    // matching `original_source`'s `rv1[i] = scale * g;`.
    for i in 0..n {
        l = i + 1;
        rv1[i] = scale * g;
        g = 0.0;
        let mut s = 0.0;
        scale = 0.0;
        if i < m {
            for k in i..m {
                scale += u[(k, i)].abs();
            }
            if scale != 0.0 {
                for k in i..m {
                    u[(k, i)] /= scale;
                    s += u[(k, i)] * u[(k, i)];
                }
                let f = u[(i, i)];
                g = -sign(s.sqrt(), f);
                let h = f * g - s;
                u[(i, i)] = f - g;
                for j in l..n {
                    let mut s2 = 0.0;
                    for k in i..m {
                        s2 += u[(k, i)] * u[(k, j)];
                    }
                    let f2 = s2 / h;
                    for k in i..m {
                        u[(k, j)] += f2 * u[(k, i)];
                    }
                }
                for k in i..m {
                    u[(k, i)] *= scale;
                }
            }
        }
        w[i] = scale * g;

        g = 0.0;
        s = 0.0;
        scale = 0.0;
        if i < m && i != n - 1 {
            for k in l..n {
                scale += u[(i, k)].abs();
            }
            if scale != 0.0 {
                for k in l..n {
                    u[(i, k)] /= scale;
                    s += u[(i, k)] * u[(i, k)];
                }
                let f = u[(i, l)];
                g = -sign(s.sqrt(), f);
                let h = f * g - s;
                u[(i, l)] = f - g;
                for k in l..n {
                    rv1[k] = u[(i, k)] / h;
                }
                for j in l..m {
                    let mut s2 = 0.0;
                    for k in l..n {
                        s2 += u[(j, k)] * u[(i, k)];
                    }
                    for k in l..n {
                        u[(j, k)] += s2 * rv1[k];
                    }
                }
                for k in l..n {
                    u[(i, k)] *= scale;
                }
            }
        }
        anorm = anorm.max(w[i].abs() + rv1[i].abs());
    }

    // Accumulate right-hand (V) transformations.
    for i in (0..n).rev() {
        if i < n - 1 {
            if g != 0.0 {
                for j in l..n {
                    v[(j, i)] = (u[(i, j)] / u[(i, l)]) / g;
                }
                for j in l..n {
                    let mut s = 0.0;
                    for k in l..n {
                        s += u[(i, k)] * v[(k, j)];
                    }
                    for k in l..n {
                        v[(k, j)] += s * v[(k, i)];
                    }
                }
            }
            for j in l..n {
                v[(i, j)] = 0.0;
                v[(j, i)] = 0.0;
            }
        }
        v[(i, i)] = 1.0;
        g = rv1[i];
        l = i;
    }

    // Accumulate left-hand (U) transformations.
    for i in (0..n.min(m)).rev() {
        let l2 = i + 1;
        g = w[i];
        for j in l2..n {
            u[(i, j)] = 0.0;
        }
        if g != 0.0 {
            g = 1.0 / g;
            for j in l2..n {
                let mut s = 0.0;
                for k in l2..m {
                    s += u[(k, i)] * u[(k, j)];
                }
                let f = (s / u[(i, i)]) * g;
                for k in i..m {
                    u[(k, j)] += f * u[(k, i)];
                }
            }
            for j in i..m {
                u[(j, i)] *= g;
            }
        } else {
            for j in i..m {
                u[(j, i)] = 0.0;
            }
        }
        u[(i, i)] += 1.0;
    }

    // Diagonalization of the bidiagonal form.
    let eps = E::EPSILON;
    for k in (0..n).rev() {
        let mut converged = false;
        for _its in 1..=SVD_ITER_CAP {
            let mut flag = true;
            let mut l_idx = k;
            let mut nm = k;
            loop {
                if l_idx == 0 {
                    flag = false;
                    break;
                }
                if rv1[l_idx].abs() <= eps * anorm {
                    flag = false;
                    break;
                }
                nm = l_idx - 1;
                if w[nm].abs() <= eps * anorm {
                    break;
                }
                l_idx -= 1;
            }
            if flag {
                let mut c = 0.0;
                let mut s = 1.0;
                for i in l_idx..=k {
                    let f = s * rv1[i];
                    rv1[i] *= c;
                    if f.abs() <= eps * anorm {
                        break;
                    }
                    g = w[i];
                    let h = (f * f + g * g).sqrt();
                    w[i] = h;
                    c = g / h;
                    s = -f / h;
                    for j in 0..m {
                        let y = u[(j, nm)];
                        let z = u[(j, i)];
                        u[(j, nm)] = y * c + z * s;
                        u[(j, i)] = z * c - y * s;
                    }
                }
            }
            let z = w[k];
            if l_idx == k {
                if z < 0.0 {
                    w[k] = -z;
                    for j in 0..n {
                        v[(j, k)] = -v[(j, k)];
                    }
                }
                converged = true;
                break;
            }

            let mut x = w[l_idx];
            let nm2 = k - 1;
            let mut y = w[nm2];
            g = rv1[nm2];
            let mut h = rv1[k];
            let mut f = ((y - z) * (y + z) + (g - h) * (g + h)) / (2.0 * h * y);
            g = (f * f + 1.0).sqrt();
            f = ((x - z) * (x + z) + h * (y / (f + sign(g, f)) - h)) / x;

            let mut c = 1.0;
            let mut s = 1.0;
            for j in l_idx..=nm2 {
                let i = j + 1;
                g = rv1[i];
                y = w[i];
                h = s * g;
                g *= c;
                let z2 = (f * f + h * h).sqrt();
                rv1[j] = z2;
                c = f / z2;
                s = h / z2;
                f = x * c + g * s;
                g = g * c - x * s;
                h = y * s;
                y *= c;
                for jj in 0..n {
                    let xv = v[(jj, j)];
                    let zv = v[(jj, i)];
                    v[(jj, j)] = xv * c + zv * s;
                    v[(jj, i)] = zv * c - xv * s;
                }
                let z3 = (f * f + h * h).sqrt();
                w[j] = z3;
                if z3 != 0.0 {
                    c = f / z3;
                    s = h / z3;
                }
                f = c * g + s * y;
                x = c * y - s * g;
                for jj in 0..m {
                    let yu = u[(jj, j)];
                    let zu = u[(jj, i)];
                    u[(jj, j)] = yu * c + zu * s;
                    u[(jj, i)] = zu * c - yu * s;
                }
            }
            rv1[l_idx] = 0.0;
            rv1[k] = f;
            w[k] = x;
        }
        if !converged {
            return Err(LinalgError::SvdDidNotConverge);
        }
    }

    Ok((u, w, v))
}

/// Minimum-norm least-squares solution of `W x = b` via SVD, capped at
/// [`SVD_ITER_CAP`] sweeps (`spec.md` §4.1).
pub fn solve_least_squares_svd(w: MatRef<E>, b: &Col<E>) -> Result<Col<E>, LinalgError> {
    if w.nrows() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: w.nrows(),
            expected_cols: 1,
            found_rows: b.nrows(),
            found_cols: 1,
        });
    }
    if w.nrows() < w.ncols() {
        return Err(LinalgError::FactorizationFailed {
            reason: "SVD least-squares solve requires rows >= cols",
        });
    }

    let (u, s, v) = svd_decomposition(w)?;
    let smax = s.iter().cloned().fold(0.0_f64, E::max);
    let tol = (w.nrows().max(w.ncols()) as E) * E::EPSILON * smax;

    let mut y = Col::<E>::zeros(s.len());
    for i in 0..s.len() {
        let mut utb = 0.0;
        for r in 0..w.nrows() {
            utb += u[(r, i)] * b[r];
        }
        if s[i] > tol {
            y[i] = utb / s[i];
        }
    }
    let mut x = Col::<E>::zeros(v.nrows());
    for r in 0..v.nrows() {
        let mut acc = 0.0;
        for c in 0..v.ncols() {
            acc += v[(r, c)] * y[c];
        }
        x[r] = acc;
    }
    Ok(x)
}

/// Symmetric factorization `P A P^T = L D L^T` with diagonal pivoting (largest
/// remaining diagonal magnitude chosen each step) used to solve the saturated
/// KKT system `[I A^T; A 0]` once per projected-CG solve (`spec.md` §4.4).
///
/// Pivots smaller than `PIVOT_FLOOR` are regularized rather than rejected,
/// following the inertia-correction regularization the teacher's `nlp::ipm`
/// documents for its own barrier KKT system.
pub struct Ldlt {
    l: Mat<E>,
    d: Vec<E>,
    perm: Vec<usize>,
}

const PIVOT_FLOOR: E = 1e-10;

/// Factorizes the symmetric matrix `m` with diagonal pivoting. Returns
/// [`LinalgError::DimensionMismatch`] if `m` is not square.
pub fn ldlt_factorization(m: MatRef<E>) -> Result<Ldlt, LinalgError> {
    if m.nrows() != m.ncols() {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: m.nrows(),
            expected_cols: m.nrows(),
            found_rows: m.nrows(),
            found_cols: m.ncols(),
        });
    }
    let n = m.nrows();
    let mut a = m.to_owned();
    let mut perm: Vec<usize> = (0..n).collect();
    let mut l = Mat::<E>::identity(n, n);
    let mut d = vec![0.0; n];

    for k in 0..n {
        let mut piv = k;
        let mut best = a[(k, k)].abs();
        for i in (k + 1)..n {
            if a[(i, i)].abs() > best {
                best = a[(i, i)].abs();
                piv = i;
            }
        }
        if piv != k {
            for j in 0..n {
                let t = a[(k, j)];
                a[(k, j)] = a[(piv, j)];
                a[(piv, j)] = t;
            }
            for i in 0..n {
                let t = a[(i, k)];
                a[(i, k)] = a[(i, piv)];
                a[(i, piv)] = t;
            }
            perm.swap(k, piv);
            for j in 0..k {
                let t = l[(k, j)];
                l[(k, j)] = l[(piv, j)];
                l[(piv, j)] = t;
            }
        }

        let mut dk = a[(k, k)];
        if dk.abs() < PIVOT_FLOOR {
            dk = if dk >= 0.0 { PIVOT_FLOOR } else { -PIVOT_FLOOR };
        }
        d[k] = dk;
        for i in (k + 1)..n {
            l[(i, k)] = a[(i, k)] / dk;
        }
        for i in (k + 1)..n {
            for j in (k + 1)..n {
                a[(i, j)] -= l[(i, k)] * dk * l[(j, k)];
            }
        }
    }

    Ok(Ldlt { l, d, perm })
}

/// Solves the factored system `A x = rhs` (`A` the matrix passed to
/// [`ldlt_factorization`]) for a single right-hand side column.
pub fn ldl_solve(ldlt: &Ldlt, rhs: &Col<E>) -> Result<Col<E>, LinalgError> {
    let n = ldlt.l.nrows();
    if rhs.nrows() != n {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: n,
            expected_cols: 1,
            found_rows: rhs.nrows(),
            found_cols: 1,
        });
    }

    let pb = Col::<E>::from_fn(n, |i| rhs[ldlt.perm[i]]);

    let mut y = Col::<E>::zeros(n);
    for i in 0..n {
        let mut v = pb[i];
        for j in 0..i {
            v -= ldlt.l[(i, j)] * y[j];
        }
        y[i] = v;
    }

    let z = Col::<E>::from_fn(n, |i| y[i] / ldlt.d[i]);

    let mut w = Col::<E>::zeros(n);
    for i in (0..n).rev() {
        let mut v = z[i];
        for j in (i + 1)..n {
            v -= ldlt.l[(j, i)] * w[j];
        }
        w[i] = v;
    }

    let mut x = Col::<E>::zeros(n);
    for i in 0..n {
        x[ldlt.perm[i]] = w[i];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_dispatches_by_shape() {
        let over = Mat::from_fn(4, 2, |i, j| (i + 2 * j + 1) as E);
        let qr = qr_factorization(over.as_ref()).unwrap();
        assert!(!qr.of_transpose);

        let under = Mat::from_fn(2, 4, |i, j| (i + 2 * j + 1) as E);
        let qr2 = qr_factorization(under.as_ref()).unwrap();
        assert!(qr2.of_transpose);
    }

    #[test]
    fn qr_reproduces_the_matrix() {
        let a = Mat::from_fn(4, 3, |i, j| (1 + i * 3 + j) as E + if i == j { 5.0 } else { 0.0 });
        let qr = qr_factorization(a.as_ref()).unwrap();
        let reconstructed = &qr.q * &qr.r;
        for i in 0..4 {
            for j in 0..3 {
                assert!((reconstructed[(i, j)] - a[(i, j)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn least_squares_solves_consistent_system() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 0.0 });
        let b = Mat::from_fn(2, 1, |i, _| (i + 1) as E);
        let qr = qr_factorization(a.as_ref()).unwrap();
        let x = solve_least_squares_qr(&qr, b.as_ref()).unwrap();
        assert!((x[(0, 0)] - 0.5).abs() < 1e-10);
        assert!((x[(1, 0)] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn svd_least_squares_matches_exact_solution_for_square_system() {
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 0.0 });
        let b = Col::from_fn(2, |i| (i + 1) as E);
        let x = solve_least_squares_svd(a.as_ref(), &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-8);
        assert!((x[1] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn svd_matches_exact_solution_for_overdetermined_system() {
        // A well-conditioned 3x2 least-squares problem with a known solution.
        let a = Mat::from_fn(3, 2, |i, j| if i == j { 1.0 } else if i == 2 { 1.0 } else { 0.0 });
        let b = Col::from_fn(3, |i| if i < 2 { (i + 1) as E } else { 3.0 });
        let x = solve_least_squares_svd(a.as_ref(), &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!((x[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ldlt_solves_symmetric_indefinite_system() {
        // [[0, 1], [1, 0]] x = [1, 2] => x = [2, 1]; exercises the pivot swap path.
        let a = Mat::from_fn(2, 2, |i, j| if i != j { 1.0 } else { 0.0 });
        let ldlt = ldlt_factorization(a.as_ref()).unwrap();
        let b = Col::from_fn(2, |i| (i + 1) as E);
        let x = ldl_solve(&ldlt, &b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ldlt_solves_spd_system() {
        let a = Mat::from_fn(3, 3, |i, j| if i == j { 4.0 } else if (i as isize - j as isize).abs() == 1 { 1.0 } else { 0.0 });
        let ldlt = ldlt_factorization(a.as_ref()).unwrap();
        let b = Col::from_fn(3, |i| (i + 1) as E);
        let x = ldl_solve(&ldlt, &b).unwrap();
        let reconstructed = &a * &x;
        for i in 0..3 {
            assert!((reconstructed[i] - b[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn ldlt_rejects_nonsquare() {
        let a = Mat::from_fn(2, 3, |_, _| 1.0);
        assert!(ldlt_factorization(a.as_ref()).is_err());
    }
}
