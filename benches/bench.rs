//! Micro-benchmarks for the dense linear-algebra kernel and the TRIPM solve
//! loop, in the teacher's `divan` harness style (`benches/lp/netlib.rs`).

use faer::{Col, Mat};
use quadmodel::bounds::Bounds;
use quadmodel::model::{QPModel, row_width};
use quadmodel::solvers::tripm::{Tripm, TripmParams};

fn main() {
    divan::main();
}

fn col(v: &[f64]) -> Col<f64> {
    Col::from_fn(v.len(), |i| v[i])
}

fn bench_model(n: usize) -> QPModel {
    let m = 1;
    let mut data = Mat::<f64>::zeros(1 + m, row_width(n));
    data[(0, 0)] = 1.0;
    for j in 0..n {
        data[(0, 1 + n + j)] = 2.0;
    }
    data[(1, 0)] = -(n as f64);
    for j in 0..n {
        data[(1, 1 + j)] = 1.0;
    }
    QPModel::try_new(n, m, data).unwrap()
}

#[divan::bench(args = [2, 8, 32])]
fn dot_product(n: usize) -> f64 {
    let a = Col::<f64>::from_fn(n, |i| i as f64 + 1.0);
    let b = Col::<f64>::from_fn(n, |i| 1.0 / (i as f64 + 1.0));
    quadmodel::linalg::kernel::dot(a.as_ref(), b.as_ref()).unwrap()
}

#[divan::bench(args = [2, 8, 32])]
fn qr_factorization(n: usize) {
    let a = Mat::<f64>::from_fn(n, n, |i, j| if i == j { 2.0 } else { 0.1 });
    let _ = quadmodel::linalg::factor::qr_factorization(a.as_ref()).unwrap();
}

#[divan::bench(args = [2, 8, 32])]
fn tripm_solve(n: usize) {
    let model = bench_model(n);
    let bounds = Bounds::new(col(&vec![-10.0; n]), col(&vec![10.0; n])).unwrap();
    let mut x = col(&vec![0.0; n]);
    let mut tripm = Tripm::new(bench_model(n), TripmParams::default());
    let _ = tripm.solve(&mut x, &bounds);
}
