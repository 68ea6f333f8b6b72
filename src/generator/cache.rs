//! Read-only view over the blackbox evaluation cache (`spec.md` §2.8, §5: "the
//! only potentially shared resource... the core never mutates it").

use faer::Col;

use crate::E;

/// One previously evaluated point: its coordinates, objective value, and
/// constraint values, in the same sign convention as [`crate::model::QPModel`]
/// (`c(x) <= 0` feasible).
#[derive(Debug, Clone)]
pub struct EvaluatedPoint {
    pub x: Col<E>,
    pub f: E,
    pub c: Col<E>,
}

impl EvaluatedPoint {
    pub fn is_feasible(&self) -> bool {
        self.c.iter().all(|&ci| ci <= 0.0)
    }
}

/// Read-only access to the recent evaluation history near a frame center,
/// implemented by the outer framework (cache persistence itself is a
/// `spec.md` §1 non-goal).
pub trait EvaluationCache {
    /// Points evaluated within the current frame/mesh neighborhood, in no
    /// particular order.
    fn recent_points(&self) -> &[EvaluatedPoint];

    /// The best (lowest objective) feasible point recorded so far, if any.
    fn best_feasible(&self) -> Option<&EvaluatedPoint> {
        self.recent_points().iter().filter(|p| p.is_feasible()).min_by(|a, b| a.f.total_cmp(&b.f))
    }

    /// The best infeasible point, ranked by total constraint violation
    /// (`spec.md` §4.7: "best infeasible center from the outer barrier").
    fn best_infeasible(&self) -> Option<&EvaluatedPoint> {
        self.recent_points()
            .iter()
            .filter(|p| !p.is_feasible())
            .min_by(|a, b| violation(a).total_cmp(&violation(b)))
    }
}

fn violation(p: &EvaluatedPoint) -> E {
    p.c.iter().cloned().fold(0.0_f64, |acc, v| acc + v.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCache(Vec<EvaluatedPoint>);
    impl EvaluationCache for FixedCache {
        fn recent_points(&self) -> &[EvaluatedPoint] {
            &self.0
        }
    }

    fn col(v: &[E]) -> Col<E> {
        Col::from_fn(v.len(), |i| v[i])
    }

    #[test]
    fn picks_lowest_objective_feasible_point() {
        let cache = FixedCache(vec![
            EvaluatedPoint { x: col(&[1.0]), f: 2.0, c: col(&[-1.0]) },
            EvaluatedPoint { x: col(&[2.0]), f: 1.0, c: col(&[-0.5]) },
            EvaluatedPoint { x: col(&[3.0]), f: 0.0, c: col(&[1.0]) },
        ]);
        let best = cache.best_feasible().unwrap();
        assert_eq!(best.x[0], 2.0);
    }

    #[test]
    fn picks_least_violating_infeasible_point() {
        let cache = FixedCache(vec![
            EvaluatedPoint { x: col(&[1.0]), f: 2.0, c: col(&[2.0]) },
            EvaluatedPoint { x: col(&[2.0]), f: 1.0, c: col(&[0.5]) },
        ]);
        let best = cache.best_infeasible().unwrap();
        assert_eq!(best.x[0], 2.0);
    }
}
