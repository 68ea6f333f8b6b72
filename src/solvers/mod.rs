//! The coupled numerical solver stack (`spec.md` §2.3–2.6): Dogleg trust-region
//! least-squares, projected conjugate gradient, Levenberg–Marquardt feasibility
//! restoration, and the trust-region interior-point method that orchestrates them.

pub mod dogleg;
pub mod lm;
pub mod pcg;
pub mod tripm;
