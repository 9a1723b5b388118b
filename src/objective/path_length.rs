//! Path-length objective: cost of a motion is its metric length

use std::sync::Arc;

use crate::objective::OptimizationObjective;
use crate::space::StateSpace;

/// Minimizes total path length under the state space's own metric.
pub struct PathLengthObjective<S: StateSpace> {
    space: Arc<S>,
}

impl<S: StateSpace> PathLengthObjective<S> {
    pub fn new(space: Arc<S>) -> Self {
        PathLengthObjective { space }
    }
}

impl<S: StateSpace> OptimizationObjective<S::State> for PathLengthObjective<S> {
    type Cost = f64;

    fn identity_cost(&self) -> f64 {
        0.0
    }

    fn infinite_cost(&self) -> f64 {
        f64::INFINITY
    }

    fn motion_cost(&self, from: &S::State, to: &S::State) -> f64 {
        self.space.distance(from, to)
    }

    fn combine(&self, a: &f64, b: &f64) -> f64 {
        a + b
    }

    fn is_cost_less(&self, a: &f64, b: &f64) -> bool {
        a < b
    }
}
