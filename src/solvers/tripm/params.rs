//! Tunable parameters for the trust-region interior-point method (`spec.md` §6).

use crate::E;

#[derive(Debug, Clone)]
pub struct TripmParams {
    pub mu_init: E,
    pub mu_decrease: E,
    pub tol_dist_successive_x: E,
    pub max_iter_outer: usize,
    pub max_iter_inner: usize,
    pub verbose_level: u8,
    /// Absolute optimality tolerance for the Waltz–Morales–Nocedal–Orban-style
    /// KKT stopping test (`spec.md` §4.6); not named as a defaulted field in
    /// `spec.md` §6 but required by its stopping criterion — see `DESIGN.md`.
    pub atol_opt: E,
    /// Absolute feasibility tolerance, same stopping test.
    pub atol_feas: E,
}

impl Default for TripmParams {
    fn default() -> Self {
        Self {
            mu_init: 0.1,
            mu_decrease: 10.0,
            tol_dist_successive_x: 1e-13,
            max_iter_outer: 50,
            max_iter_inner: 50,
            verbose_level: 0,
            atol_opt: 1e-6,
            atol_feas: 1e-6,
        }
    }
}
