//! Trial-point generator (`spec.md` §4.7): runs TRIPM once for the best feasible
//! frame center and once for the best infeasible one, then snaps and deduplicates
//! the resulting candidates against the outer MADS mesh.

pub mod cache;

use faer::Col;
use problemo::Problem;

use crate::E;
use crate::bounds::Bounds;
use crate::linalg::kernel;
use crate::model::QPModel;
use crate::solvers::tripm::{Tripm, TripmParams, TripmStatus};
use crate::terminators::Terminator;

/// Projects a raw continuum solution onto the outer MADS mesh and reports
/// whether it duplicates an already-proposed point (`spec.md` §4.7: "delegated
/// to an external utility").
pub trait MeshSnapper {
    fn snap(&mut self, x: &Col<E>) -> Col<E>;

    fn is_duplicate(&self, x: &Col<E>) -> bool;
}

/// One TRIPM-produced candidate, tagged with the status the run finished with
/// and which frame center (feasible/infeasible) it came from.
#[derive(Debug, Clone)]
pub struct TrialPoint {
    pub x: Col<E>,
    pub status: TripmStatus,
    pub from_feasible_center: bool,
}

/// A single TRIPM run around one frame center: the model built by the external
/// model-building step (`spec.md` §4.7: "out of scope for this spec"), the
/// center's bounds (possibly mesh-extended), and a strictly-feasible start.
pub struct FrameCenter {
    pub model: QPModel,
    pub bounds: Bounds,
    pub x0: Col<E>,
}

/// Runs TRIPM once per frame center supplied (`spec.md` §4.7: "two calls per
/// outer iteration"), checking `terminator` only at this solver-invocation
/// boundary (`spec.md` §5), then snaps and deduplicates the results.
///
/// Returns early with whatever candidates were already produced if the
/// terminator fires between calls.
pub fn generate_trial_points(
    feasible: Option<FrameCenter>,
    infeasible: Option<FrameCenter>,
    params: &TripmParams,
    snapper: &mut dyn MeshSnapper,
    terminator: &mut dyn Terminator,
) -> Result<Vec<TrialPoint>, Problem> {
    let mut candidates = Vec::new();

    for (center, from_feasible_center) in [(feasible, true), (infeasible, false)] {
        let Some(center) = center else { continue };
        if terminator.terminate().is_some() {
            break;
        }

        let mut x = center.x0;
        let mut tripm = Tripm::new(center.model, params.clone());
        let status = tripm.solve(&mut x, &center.bounds)?;

        let snapped = snapper.snap(&x);
        if snapper.is_duplicate(&snapped) {
            continue;
        }
        candidates.push(TrialPoint { x: snapped, status, from_feasible_center });
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;

    fn col(v: &[E]) -> Col<E> {
        Col::from_fn(v.len(), |i| v[i])
    }

    fn sample_model() -> QPModel {
        let n = 2;
        let m = 1;
        let mut data = Mat::<E>::zeros(1 + m, crate::model::row_width(n));
        data[(0, 0)] = 10.0;
        data[(0, 1)] = -6.0;
        data[(0, 2)] = 2.0;
        data[(0, 3)] = 2.0;
        data[(0, 4)] = 2.0;
        data[(1, 0)] = -1.0;
        QPModel::try_new(n, m, data).unwrap()
    }

    struct IdentitySnapper {
        seen: Vec<Col<E>>,
    }

    impl MeshSnapper for IdentitySnapper {
        fn snap(&mut self, x: &Col<E>) -> Col<E> {
            x.clone()
        }

        fn is_duplicate(&self, x: &Col<E>) -> bool {
            self.seen.iter().any(|p| kernel::dist_norm2(p.as_ref(), x.as_ref()) < 1e-9)
        }
    }

    struct NeverTerminate;
    impl Terminator for NeverTerminate {
        fn terminate(&mut self) -> Option<crate::Status> {
            None
        }
    }

    #[test]
    fn produces_one_candidate_per_supplied_center() {
        let bounds = Bounds::new(col(&[-10.0, -10.0]), col(&[10.0, 10.0])).unwrap();
        let feasible = FrameCenter { model: sample_model(), bounds: bounds.clone(), x0: col(&[0.0, 0.0]) };
        let infeasible = FrameCenter { model: sample_model(), bounds, x0: col(&[1.0, 1.0]) };
        let mut snapper = IdentitySnapper { seen: vec![] };
        let mut terminator = NeverTerminate;
        let params = TripmParams::default();

        let points = generate_trial_points(Some(feasible), Some(infeasible), &params, &mut snapper, &mut terminator).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points[0].from_feasible_center);
        assert!(!points[1].from_feasible_center);
    }

    #[test]
    fn no_centers_yields_no_candidates() {
        let mut snapper = IdentitySnapper { seen: vec![] };
        let mut terminator = NeverTerminate;
        let params = TripmParams::default();
        let points = generate_trial_points(None, None, &params, &mut snapper, &mut terminator).unwrap();
        assert!(points.is_empty());
    }
}
