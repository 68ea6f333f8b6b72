//! Dense matrix/vector primitives shared by every solver in this crate.
//!
//! Values are `faer::Mat<E>` / `faer::Col<E>`; this module adds the named
//! operations `spec.md` §4.1 requires (in-place product, norms, elementwise
//! helpers) on top of `faer`'s own arithmetic, and reports shape mismatches as a
//! recoverable [`LinalgError`] rather than panicking.

use derive_more::{Display, Error};
use faer::{Col, ColRef, Mat, MatRef, unzip, zip};

use crate::E;

/// Non-panicking failure surface for the matrix kernel (`spec.md` §4.1: "All
/// failure modes are reported as booleans + a message string; callers translate
/// them to their own status enums").
#[derive(Debug, Display, Error, PartialEq, Clone)]
pub enum LinalgError {
    #[display("dimension mismatch: expected {expected_rows}x{expected_cols}, found {found_rows}x{found_cols}")]
    DimensionMismatch {
        expected_rows: usize,
        expected_cols: usize,
        found_rows: usize,
        found_cols: usize,
    },
    #[display("SVD did not converge within the iteration cap")]
    SvdDidNotConverge,
    #[display("factorization failed: {reason}")]
    FactorizationFailed { reason: &'static str },
}

fn check_dims(a: MatRef<E>, rows: usize, cols: usize) -> Result<(), LinalgError> {
    if a.nrows() != rows || a.ncols() != cols {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: rows,
            expected_cols: cols,
            found_rows: a.nrows(),
            found_cols: a.ncols(),
        });
    }
    Ok(())
}

/// `out := A * B`, allocating the result. Used off the hot path; see
/// [`inplace_product`] for the hot-path form.
pub fn product(a: MatRef<E>, b: MatRef<E>) -> Result<Mat<E>, LinalgError> {
    if a.ncols() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: a.ncols(),
            expected_cols: b.ncols(),
            found_rows: b.nrows(),
            found_cols: b.ncols(),
        });
    }
    Ok(a * b)
}

/// `out := A * B`, writing into a caller-owned buffer without allocating on the
/// hot path (`spec.md` §4.1).
pub fn inplace_product(out: &mut Mat<E>, a: MatRef<E>, b: MatRef<E>) -> Result<(), LinalgError> {
    if a.ncols() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: a.ncols(),
            expected_cols: b.ncols(),
            found_rows: b.nrows(),
            found_cols: b.ncols(),
        });
    }
    check_dims(out.as_ref(), a.nrows(), b.ncols())?;
    faer::linalg::matmul::matmul(
        out.as_mut(),
        faer::Accum::Replace,
        a,
        b,
        1.0,
        faer::Par::Seq,
    );
    Ok(())
}

/// Transpose as a read-only view; no copy.
pub fn transpose(a: MatRef<E>) -> MatRef<E> {
    a.transpose()
}

pub fn dot(a: ColRef<E>, b: ColRef<E>) -> Result<E, LinalgError> {
    if a.nrows() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected_rows: a.nrows(),
            expected_cols: 1,
            found_rows: b.nrows(),
            found_cols: 1,
        });
    }
    Ok(faer::linalg::matmul::dot::inner_prod(
        a.transpose(),
        faer::Conj::No,
        b,
        faer::Conj::No,
    ))
}

pub fn normsquare(a: ColRef<E>) -> E {
    a.squared_norm_l2()
}

pub fn norm2(a: ColRef<E>) -> E {
    a.norm_l2()
}

pub fn norm_inf(a: ColRef<E>) -> E {
    a.norm_max()
}

pub fn dist_norm2(a: ColRef<E>, b: ColRef<E>) -> E {
    let mut diff = a.to_owned();
    zip!(diff.as_mut(), b).for_each(|unzip!(d, b)| *d -= *b);
    diff.norm_l2()
}

/// In-place scalar multiply: `a := alpha * a`.
pub fn multiply_in_place(a: &mut Mat<E>, alpha: E) {
    zip!(a.as_mut()).for_each(|unzip!(a)| *a *= alpha);
}

/// In-place add: `a := a + b`.
pub fn add_in_place(a: &mut Mat<E>, b: MatRef<E>) -> Result<(), LinalgError> {
    check_dims(b, a.nrows(), a.ncols())?;
    zip!(a.as_mut(), b).for_each(|unzip!(a, b)| *a += *b);
    Ok(())
}

/// In-place subtract: `a := a - b`.
pub fn sub_in_place(a: &mut Mat<E>, b: MatRef<E>) -> Result<(), LinalgError> {
    check_dims(b, a.nrows(), a.ncols())?;
    zip!(a.as_mut(), b).for_each(|unzip!(a, b)| *a -= *b);
    Ok(())
}

pub fn cwise_multiply(a: ColRef<E>, b: ColRef<E>) -> Col<E> {
    let mut out = Col::zeros(a.nrows());
    zip!(out.as_mut(), a, b).for_each(|unzip!(out, a, b)| *out = *a * *b);
    out
}

pub fn cwise_quotient(a: ColRef<E>, b: ColRef<E>) -> Col<E> {
    let mut out = Col::zeros(a.nrows());
    zip!(out.as_mut(), a, b).for_each(|unzip!(out, a, b)| *out = *a / *b);
    out
}

pub fn is_col_positive(a: ColRef<E>) -> bool {
    let mut ok = true;
    zip!(a).for_each(|unzip!(a)| {
        if *a <= 0.0 {
            ok = false;
        }
    });
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(v: &[E]) -> Col<E> {
        Col::from_fn(v.len(), |i| v[i])
    }

    #[test]
    fn dot_matches_definition() {
        let a = col(&[1.0, 2.0, 3.0]);
        let b = col(&[4.0, 5.0, 6.0]);
        assert_eq!(dot(a.as_ref(), b.as_ref()).unwrap(), 32.0);
    }

    #[test]
    fn dot_rejects_mismatched_shapes() {
        let a = col(&[1.0, 2.0]);
        let b = col(&[1.0, 2.0, 3.0]);
        assert!(dot(a.as_ref(), b.as_ref()).is_err());
    }

    #[test]
    fn norms_agree_with_faer() {
        let a = col(&[3.0, 4.0]);
        assert_eq!(norm2(a.as_ref()), 5.0);
        assert_eq!(normsquare(a.as_ref()), 25.0);
        assert_eq!(norm_inf(a.as_ref()), 4.0);
    }

    #[test]
    fn inplace_product_matches_allocating() {
        let a = Mat::from_fn(2, 2, |i, j| (i + j) as E);
        let b = Mat::from_fn(2, 2, |i, j| (i * j + 1) as E);
        let expected = product(a.as_ref(), b.as_ref()).unwrap();
        let mut out = Mat::zeros(2, 2);
        inplace_product(&mut out, a.as_ref(), b.as_ref()).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert!((out[(i, j)] - expected[(i, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn is_col_positive_detects_nonpositive_entries() {
        assert!(is_col_positive(col(&[1.0, 2.0]).as_ref()));
        assert!(!is_col_positive(col(&[1.0, 0.0]).as_ref()));
        assert!(!is_col_positive(col(&[1.0, -2.0]).as_ref()));
    }
}
