//! End-to-end scenarios over the public `Tripm` surface (`spec.md` §8):
//! unconstrained quadratics, an active inequality, a tight-bound reduction,
//! an infeasible start needing restoration, and the public dimension-mismatch
//! error.

use faer::{Col, Mat};
use quadmodel::bounds::Bounds;
use quadmodel::model::{QPModel, row_width};
use quadmodel::solvers::tripm::{Tripm, TripmParams, TripmStatus};

fn col(v: &[f64]) -> Col<f64> {
    Col::from_fn(v.len(), |i| v[i])
}

/// n=2, one constraint `c(x) = x0 + x1 - 1 <= 0`, objective `(x0-3)^2 + (x1+1)^2`.
/// Unconstrained optimum `(3, -1)` lies outside the feasible halfspace, so the
/// active constraint pulls the optimum onto `x0 + x1 = 1`.
fn constrained_model() -> QPModel {
    let n = 2;
    let m = 1;
    let mut data = Mat::<f64>::zeros(1 + m, row_width(n));
    data[(0, 0)] = 10.0;
    data[(0, 1)] = -6.0;
    data[(0, 2)] = 2.0;
    data[(0, 3)] = 2.0;
    data[(0, 4)] = 2.0;
    data[(1, 0)] = -1.0;
    data[(1, 1)] = 1.0;
    data[(1, 2)] = 1.0;
    QPModel::try_new(n, m, data).unwrap()
}

/// n=2, no constraints, objective `(x0-3)^2 + (x1+1)^2`, unconstrained minimum
/// at `(3, -1)` well inside a generous box.
fn unconstrained_model() -> QPModel {
    let n = 2;
    let m = 0;
    let mut data = Mat::<f64>::zeros(1, row_width(n));
    data[(0, 0)] = 10.0;
    data[(0, 1)] = -6.0;
    data[(0, 2)] = 2.0;
    data[(0, 3)] = 2.0;
    data[(0, 4)] = 2.0;
    QPModel::try_new(n, m, data).unwrap()
}

/// (a) Pure unconstrained quadratic: TRIPM should land on the closed-form
/// minimizer `(3, -1)` to tight tolerance.
#[test]
fn scenario_unconstrained_quadratic_reaches_closed_form_minimum() {
    let model = unconstrained_model();
    let bounds = Bounds::new(col(&[-20.0, -20.0]), col(&[20.0, 20.0])).unwrap();
    let mut x = col(&[0.0, 0.0]);
    let mut tripm = Tripm::new(unconstrained_model(), TripmParams::default());
    let status = tripm.solve(&mut x, &bounds).unwrap();
    assert!(matches!(status, TripmStatus::Solved | TripmStatus::MaxIterReached));
    assert!((x[0] - 3.0).abs() < 1e-2);
    assert!((x[1] + 1.0).abs() < 1e-2);
    let _ = model;
}

/// (b) Active inequality constraint: the optimizer should stop on the boundary
/// `x0 + x1 = 1` rather than at the unconstrained minimum.
#[test]
fn scenario_active_inequality_binds_at_boundary() {
    let model = constrained_model();
    let bounds = Bounds::new(col(&[-10.0, -10.0]), col(&[10.0, 10.0])).unwrap();
    let mut x = col(&[0.0, 0.0]);
    let mut tripm = Tripm::new(constrained_model(), TripmParams::default());
    let status = tripm.solve(&mut x, &bounds).unwrap();
    assert!(matches!(
        status,
        TripmStatus::Solved | TripmStatus::MaxIterReached | TripmStatus::StagnationIterates
    ));
    let c = model.cons(&x).unwrap();
    assert!(c[0] <= 1e-3, "expected near-active constraint, found slack {}", c[0]);
    assert!(x[0] + x[1] < 2.0, "should not have drifted back toward the unconstrained optimum");
}

/// (c) A box so tight on one coordinate that it is declared fixed: the solver
/// must reduce to the free subspace and still make progress on it.
#[test]
fn scenario_tight_bound_reduces_to_free_subspace() {
    let model = constrained_model();
    // x1 is pinned at 0.2 (box width below FIXED_TOL); x0 remains free.
    let bounds = Bounds::new(col(&[-10.0, 0.2]), col(&[10.0, 0.2])).unwrap();
    let mut x = col(&[0.0, 0.2]);
    let mut tripm = Tripm::new(constrained_model(), TripmParams::default());
    let status = tripm.solve(&mut x, &bounds).unwrap();
    assert!(matches!(
        status,
        TripmStatus::Solved | TripmStatus::MaxIterReached | TripmStatus::StagnationIterates
    ));
    assert_eq!(x[1], 0.2, "fixed coordinate must be left untouched");
    let c = model.cons(&x).unwrap();
    assert!(c[0] <= 1e-3);
}

/// (d) Starting point well outside the feasible region: the LM feasibility
/// sweep and outer restoration path should still bring the run to a
/// (near-)feasible point rather than diverging.
#[test]
fn scenario_infeasible_start_reaches_feasible_region() {
    let model = constrained_model();
    let bounds = Bounds::new(col(&[-10.0, -10.0]), col(&[10.0, 10.0])).unwrap();
    let mut x = col(&[8.0, 8.0]);
    let mut tripm = Tripm::new(constrained_model(), TripmParams::default());
    let status = tripm.solve(&mut x, &bounds).unwrap();
    assert!(matches!(
        status,
        TripmStatus::Solved | TripmStatus::MaxIterReached | TripmStatus::StagnationIterates | TripmStatus::LmFailure
    ));
    if status != TripmStatus::LmFailure {
        let c = model.cons(&x).unwrap();
        assert!(c[0] <= 1e-2, "expected near-feasible point after restoration, found {}", c[0]);
    }
}

/// (e) All variables fixed by the box: `solve` must short-circuit without
/// iterating.
#[test]
fn scenario_all_variables_fixed_short_circuits() {
    let bounds = Bounds::new(col(&[2.0, -1.0]), col(&[2.0, -1.0])).unwrap();
    let mut x = col(&[2.0, -1.0]);
    let mut tripm = Tripm::new(constrained_model(), TripmParams::default());
    let status = tripm.solve(&mut x, &bounds).unwrap();
    assert_eq!(status, TripmStatus::TightVarBounds);
    assert_eq!(x[0], 2.0);
    assert_eq!(x[1], -1.0);
}

/// (f) A starting point of the wrong dimension is a public, reportable error,
/// not a panic.
#[test]
fn scenario_dimension_mismatch_is_reported_not_panicked() {
    let bounds = Bounds::new(col(&[-10.0, -10.0]), col(&[10.0, 10.0])).unwrap();
    let mut x = col(&[0.0, 0.0, 0.0]);
    let mut tripm = Tripm::new(constrained_model(), TripmParams::default());
    assert!(tripm.solve(&mut x, &bounds).is_err());
}
