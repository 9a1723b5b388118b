//! Bounded real-vector state space
//!
//! An axis-aligned box in R^n with the Euclidean metric. Free space is the
//! box minus a set of ball and box obstacles; motions are validated by
//! walking the connecting segment at a fixed resolution.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::Rng;

use crate::common::{PlanningError, PlanningResult};
use crate::space::{GoalRegion, StateSpace};

/// Ball-shaped obstacle (a disc in 2-D)
#[derive(Debug, Clone)]
pub struct BallObstacle {
    pub center: DVector<f64>,
    pub radius: f64,
}

impl BallObstacle {
    pub fn new(center: &[f64], radius: f64) -> Self {
        BallObstacle {
            center: DVector::from_row_slice(center),
            radius,
        }
    }

    fn contains(&self, state: &DVector<f64>) -> bool {
        (state - &self.center).norm() <= self.radius
    }
}

/// Axis-aligned box obstacle
#[derive(Debug, Clone)]
pub struct BoxObstacle {
    pub min: DVector<f64>,
    pub max: DVector<f64>,
}

impl BoxObstacle {
    pub fn new(min: &[f64], max: &[f64]) -> Self {
        BoxObstacle {
            min: DVector::from_row_slice(min),
            max: DVector::from_row_slice(max),
        }
    }

    fn contains(&self, state: &DVector<f64>) -> bool {
        state
            .iter()
            .enumerate()
            .all(|(i, &x)| x >= self.min[i] && x <= self.max[i])
    }
}

/// Bounded box in R^n with Euclidean metric and obstacle-based validity
#[derive(Debug, Clone)]
pub struct RealVectorSpace {
    lower: DVector<f64>,
    upper: DVector<f64>,
    resolution: f64,
    balls: Vec<BallObstacle>,
    boxes: Vec<BoxObstacle>,
}

impl RealVectorSpace {
    /// Create a space bounded by `lower` and `upper` corners. `resolution`
    /// is the step length used when validating motions.
    pub fn new(lower: &[f64], upper: &[f64], resolution: f64) -> PlanningResult<Self> {
        if lower.len() != upper.len() || lower.is_empty() {
            return Err(PlanningError::InvalidParameter(
                "bounds must be non-empty and of equal dimension".to_string(),
            ));
        }
        if lower.iter().zip(upper.iter()).any(|(l, u)| l >= u) {
            return Err(PlanningError::InvalidParameter(
                "lower bound must be strictly below upper bound in every dimension".to_string(),
            ));
        }
        if resolution <= 0.0 || !resolution.is_finite() {
            return Err(PlanningError::InvalidParameter(format!(
                "motion validation resolution must be positive, got {}",
                resolution
            )));
        }
        Ok(RealVectorSpace {
            lower: DVector::from_row_slice(lower),
            upper: DVector::from_row_slice(upper),
            resolution,
            balls: Vec::new(),
            boxes: Vec::new(),
        })
    }

    /// The unit square [0, 1]^2, the standard benchmark world.
    pub fn unit_square(resolution: f64) -> Self {
        RealVectorSpace::new(&[0.0, 0.0], &[1.0, 1.0], resolution)
            .expect("unit square bounds are valid")
    }

    pub fn add_ball(&mut self, obstacle: BallObstacle) {
        self.balls.push(obstacle);
    }

    pub fn add_box(&mut self, obstacle: BoxObstacle) {
        self.boxes.push(obstacle);
    }

    pub fn balls(&self) -> &[BallObstacle] {
        &self.balls
    }

    pub fn boxes(&self) -> &[BoxObstacle] {
        &self.boxes
    }

    fn in_bounds(&self, state: &DVector<f64>) -> bool {
        state
            .iter()
            .enumerate()
            .all(|(i, &x)| x >= self.lower[i] && x <= self.upper[i])
    }
}

impl StateSpace for RealVectorSpace {
    type State = DVector<f64>;

    fn dimension(&self) -> usize {
        self.lower.len()
    }

    fn max_extent(&self) -> f64 {
        (&self.upper - &self.lower).norm()
    }

    fn sample_uniform(&self, rng: &mut StdRng) -> Option<Self::State> {
        let dim = self.dimension();
        Some(DVector::from_iterator(
            dim,
            (0..dim).map(|i| rng.gen_range(self.lower[i]..=self.upper[i])),
        ))
    }

    fn distance(&self, a: &Self::State, b: &Self::State) -> f64 {
        (a - b).norm()
    }

    fn interpolate(&self, from: &Self::State, to: &Self::State, t: f64) -> Self::State {
        from + (to - from) * t
    }

    fn check_motion(&self, from: &Self::State, to: &Self::State) -> bool {
        if !self.is_valid(from) {
            return false;
        }
        let d = self.distance(from, to);
        let steps = (d / self.resolution).ceil() as usize;
        for i in 1..=steps {
            let t = i as f64 / steps as f64;
            if !self.is_valid(&self.interpolate(from, to, t)) {
                return false;
            }
        }
        true
    }

    fn is_valid(&self, state: &Self::State) -> bool {
        self.in_bounds(state)
            && !self.balls.iter().any(|b| b.contains(state))
            && !self.boxes.iter().any(|b| b.contains(state))
    }
}

/// Goal region shaped as a ball around a target state
#[derive(Debug, Clone)]
pub struct GoalDisc {
    pub center: DVector<f64>,
    pub radius: f64,
}

impl GoalDisc {
    pub fn new(center: &[f64], radius: f64) -> Self {
        GoalDisc {
            center: DVector::from_row_slice(center),
            radius,
        }
    }
}

impl GoalRegion<DVector<f64>> for GoalDisc {
    fn is_goal(&self, state: &DVector<f64>) -> bool {
        (state - &self.center).norm() <= self.radius
    }

    fn goal_distance(&self, state: &DVector<f64>) -> f64 {
        (state - &self.center).norm()
    }

    fn sample_goal(&self, _rng: &mut StdRng) -> Option<DVector<f64>> {
        Some(self.center.clone())
    }
}
