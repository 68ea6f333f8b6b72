//! Quadratic-model algebra over the packed `QPModel` matrix (`spec.md` §3, §4.2).
//!
//! Row 0 holds the objective model; rows `1..=m` hold the constraint models. Within
//! a row the packed layout is `[alpha0, alpha_L(n), diag(H)(n), strict_lower(H)(n(n-1)/2)]`,
//! following `original_source/QPModelUtils.cpp`. Every accessor here checks shapes at
//! the boundary and raises `Problem` on mismatch: by the time a packed matrix reaches
//! this layer its shape is a crate-internal invariant, not user input (see `DESIGN.md`).

use derive_more::{Display, Error};
use faer::{Col, Mat};
use problemo::Problem;

use crate::E;

#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum QPModelError {
    #[display(
        "QPModel wire layout mismatch: expected {expected_rows}x{expected_cols} for n={n}, m={m}, found {found_rows}x{found_cols}"
    )]
    WireLayoutMismatch {
        n: usize,
        m: usize,
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },
    #[display("expected a vector of length {expected}, found {found}")]
    VectorLengthMismatch { expected: usize, found: usize },
}

/// Number of packed columns per row for `n` variables: `(n+1) + n(n+1)/2`.
pub fn row_width(n: usize) -> usize {
    (n + 1) + n * (n + 1) / 2
}

/// The packed quadratic-model parameter matrix (`spec.md` §3).
#[derive(Debug, Clone)]
pub struct QPModel {
    n: usize,
    m: usize,
    data: Mat<E>,
}

impl QPModel {
    /// Validates the wire layout (`spec.md` §6: "must match bit-for-bit between the
    /// producer and consumer") and wraps `data`. Raises [`QPModelError::WireLayoutMismatch`]
    /// as a `Problem` on any shape mismatch — a true programmer error at this boundary.
    pub fn try_new(n: usize, m: usize, data: Mat<E>) -> Result<Self, Problem> {
        let expected_rows = 1 + m;
        let expected_cols = row_width(n);
        if data.nrows() != expected_rows || data.ncols() != expected_cols {
            return Err(QPModelError::WireLayoutMismatch {
                n,
                m,
                expected_rows,
                expected_cols,
                found_rows: data.nrows(),
                found_cols: data.ncols(),
            }
            .into());
        }
        Ok(Self { n, m, data })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn m(&self) -> usize {
        self.m
    }

    fn check_x(&self, x: &Col<E>) -> Result<(), Problem> {
        if x.nrows() != self.n {
            return Err(QPModelError::VectorLengthMismatch {
                expected: self.n,
                found: x.nrows(),
            }
            .into());
        }
        Ok(())
    }

    fn check_lambda(&self, lambda: &Col<E>) -> Result<(), Problem> {
        if lambda.nrows() != self.m {
            return Err(QPModelError::VectorLengthMismatch {
                expected: self.m,
                found: lambda.nrows(),
            }
            .into());
        }
        Ok(())
    }

    fn alpha0(&self, row: usize) -> E {
        self.data[(row, 0)]
    }

    fn alpha_l(&self, row: usize, j: usize) -> E {
        self.data[(row, 1 + j)]
    }

    fn diag(&self, row: usize, j: usize) -> E {
        self.data[(row, 1 + self.n + j)]
    }

    /// Strict-lower entry `H[i, j]` for `i > j`, packed in row-major order.
    fn lower(&self, row: usize, i: usize, j: usize) -> E {
        debug_assert!(i > j);
        let idx = i * (i - 1) / 2 + j;
        self.data[(row, 1 + 2 * self.n + idx)]
    }

    /// Symmetric `H[i, j]` for any `i, j` (including `i == j` and `i < j`).
    fn h(&self, row: usize, i: usize, j: usize) -> E {
        if i == j {
            self.diag(row, i)
        } else if i > j {
            self.lower(row, i, j)
        } else {
            self.lower(row, j, i)
        }
    }

    /// Dense `n x n` symmetric Hessian of the model in `row` (`spec.md` §4.2:
    /// `hessian(row, x)`). The Hessian of a quadratic model is constant in `x`; the
    /// parameter is kept only to match the documented accessor signature.
    pub fn hessian(&self, row: usize, _x: &Col<E>) -> Mat<E> {
        Mat::from_fn(self.n, self.n, |i, j| self.h(row, i, j))
    }

    fn eval_row(&self, row: usize, x: &Col<E>) -> E {
        let mut v = self.alpha0(row);
        for j in 0..self.n {
            v += self.alpha_l(row, j) * x[j];
        }
        let mut quad = 0.0;
        for i in 0..self.n {
            for j in 0..self.n {
                quad += self.h(row, i, j) * x[i] * x[j];
            }
        }
        v + 0.5 * quad
    }

    fn grad_row(&self, row: usize, x: &Col<E>) -> Col<E> {
        Col::from_fn(self.n, |k| {
            let mut g = self.alpha_l(row, k);
            for j in 0..self.n {
                g += self.h(row, k, j) * x[j];
            }
            g
        })
    }

    pub fn obj(&self, x: &Col<E>) -> Result<E, Problem> {
        self.check_x(x)?;
        Ok(self.eval_row(0, x))
    }

    pub fn obj_grad(&self, x: &Col<E>) -> Result<Col<E>, Problem> {
        self.check_x(x)?;
        Ok(self.grad_row(0, x))
    }

    pub fn cons(&self, x: &Col<E>) -> Result<Col<E>, Problem> {
        self.check_x(x)?;
        Ok(Col::from_fn(self.m, |i| self.eval_row(1 + i, x)))
    }

    /// `m x n` constraint Jacobian; row `i` is `grad(cons_i)(x)^T`.
    pub fn cons_jacobian(&self, x: &Col<E>) -> Result<Mat<E>, Problem> {
        self.check_x(x)?;
        let rows: Vec<Col<E>> = (0..self.m).map(|i| self.grad_row(1 + i, x)).collect();
        Ok(Mat::from_fn(self.m, self.n, |i, j| rows[i][j]))
    }

    /// `sigma * f(x) - lambda^T c(x)` (`spec.md` §3: "the spec signs the Lagrangian
    /// as `L = sigma f - lambda^T c`").
    pub fn lagrangian(&self, x: &Col<E>, lambda: &Col<E>, sigma: E) -> Result<E, Problem> {
        self.check_x(x)?;
        self.check_lambda(lambda)?;
        let f = self.eval_row(0, x);
        let mut lc = 0.0;
        for i in 0..self.m {
            lc += lambda[i] * self.eval_row(1 + i, x);
        }
        Ok(sigma * f - lc)
    }

    pub fn lagrangian_grad(&self, x: &Col<E>, lambda: &Col<E>, sigma: E) -> Result<Col<E>, Problem> {
        self.check_x(x)?;
        self.check_lambda(lambda)?;
        let mut g = self.grad_row(0, x);
        for k in 0..self.n {
            g[k] *= sigma;
        }
        for i in 0..self.m {
            let gi = self.grad_row(1 + i, x);
            for k in 0..self.n {
                g[k] -= lambda[i] * gi[k];
            }
        }
        Ok(g)
    }

    pub fn lagrangian_hessian(&self, x: &Col<E>, lambda: &Col<E>, sigma: E) -> Result<Mat<E>, Problem> {
        self.check_x(x)?;
        self.check_lambda(lambda)?;
        Ok(Mat::from_fn(self.n, self.n, |i, j| {
            let mut v = sigma * self.h(0, i, j);
            for k in 0..self.m {
                v -= lambda[k] * self.h(1 + k, i, j);
            }
            v
        }))
    }

    /// Substitutes the fixed coordinates (`mask[j] == true`) with their value in `x`,
    /// folding their contribution into the constant and linear terms of the model
    /// restricted to the free subspace (`spec.md` §4.2 "Reduction rule").
    pub fn reduce(&self, x: &Col<E>, mask: &[bool]) -> Result<QPModel, Problem> {
        self.check_x(x)?;
        if mask.len() != self.n {
            return Err(QPModelError::VectorLengthMismatch {
                expected: self.n,
                found: mask.len(),
            }
            .into());
        }
        let fixed: Vec<usize> = (0..self.n).filter(|&j| mask[j]).collect();
        let free: Vec<usize> = (0..self.n).filter(|&j| !mask[j]).collect();
        let nf = free.len();
        let new_width = row_width(nf);
        let mut out = Mat::<E>::zeros(1 + self.m, new_width);

        for row in 0..(1 + self.m) {
            let mut alpha0 = self.alpha0(row);
            for &j in &fixed {
                alpha0 += self.alpha_l(row, j) * x[j];
                alpha0 += 0.5 * self.h(row, j, j) * x[j] * x[j];
            }
            for (fi, &i) in fixed.iter().enumerate() {
                for &j in fixed.iter().take(fi) {
                    alpha0 += self.h(row, i, j) * x[i] * x[j];
                }
            }
            out[(row, 0)] = alpha0;

            for (p, &k) in free.iter().enumerate() {
                let mut lp = self.alpha_l(row, k);
                for &j in &fixed {
                    lp += self.h(row, k, j) * x[j];
                }
                out[(row, 1 + p)] = lp;
            }

            for (p, &k) in free.iter().enumerate() {
                out[(row, 1 + nf + p)] = self.diag(row, k);
            }

            for p in 0..nf {
                for q in 0..p {
                    let (i, j) = (free[p], free[q]);
                    let idx = p * (p - 1) / 2 + q;
                    out[(row, 1 + 2 * nf + idx)] = self.h(row, i, j);
                }
            }
        }

        Ok(QPModel { n: nf, m: self.m, data: out })
    }
}
