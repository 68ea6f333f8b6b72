//! # `quadmodel` — model-assisted trial-point generator
//!
//! This crate implements the quadratic-model trust-region interior-point core of a
//! Mesh Adaptive Direct Search (MADS) blackbox optimizer: given a cache of recently
//! evaluated points and a frame center, it fits packed quadratic surrogates for the
//! objective and constraints, drives a trust-region interior-point method (TRIPM)
//! over those surrogates, and returns candidate trial points for the outer MADS
//! driver to evaluate against the true blackbox.
//!
//! The outer MADS poll/search loop, the progressive barrier, cache persistence, and
//! parameter parsing live outside this crate: they are the collaborators named in
//! [`generator`].

pub type E = f64;
pub type I = usize;

pub mod bounds;
pub mod callback;
pub mod generator;
pub mod linalg;
pub mod model;
pub mod solvers;
pub mod terminators;

/// Status of the outer search as observed by the collaborating MADS driver.
///
/// This mirrors the small set of terminal states the trial-point generator can
/// report about a single TRIPM invocation; it is distinct from each solver's own
/// (richer) status enum, which tracks *why* that particular numerical method
/// stopped.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Status {
    #[default]
    InProgress,
    Optimal,
    Infeasible,
    Unknown,
    IterationLimit,
    Interrupted,
    TimeLimit,
}
