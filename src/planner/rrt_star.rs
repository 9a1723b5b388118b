//! RRT* path planning algorithm
//!
//! RRT* grows a tree of collision-free motions from the start state and
//! keeps rewiring it so that recorded costs converge to the optimum as
//! iterations accumulate. Compared to plain RRT it adds:
//! - choose-parent: a new node is attached to the cheapest valid node
//!   within a radius that shrinks as the tree grows
//! - rewire: nearby nodes are re-attached through the new node whenever
//!   that strictly lowers their cumulative cost
//! - delayed collision checking: candidate parents are tried in cost
//!   order so the expensive motion validation stops at the first success
//!
//! Reference: Karaman, S., & Frazzoli, E. (2011). "Sampling-based
//! Algorithms for Optimal Motion Planning", IJRR.

use std::cmp::Ordering;
use std::sync::Arc;

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{PlanningError, PlanningResult};
use crate::nearest_neighbors::{make_index, DistanceFn, NearestNeighbors, NearestNeighborsKind};
use crate::objective::OptimizationObjective;
use crate::planner::motion_tree::MotionTree;
use crate::space::{GoalRegion, StateSpace};

/// Payload stored in the nearest-neighbor index: the arena index of a
/// motion plus a clone of its state, so the index metric never needs to
/// reach back into the arena.
#[derive(Clone)]
struct NodeRef<St> {
    id: usize,
    state: St,
}

impl<St> PartialEq for NodeRef<St> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Configuration for the RRT* planner
///
/// A zero for any of the distance-valued fields means "derive a default
/// from the state space" at [`RRTStar::setup`].
#[derive(Debug, Clone)]
pub struct RRTStarConfig {
    /// Probability that an iteration samples the goal instead of the space
    pub goal_bias: f64,
    /// Upper bound on the length of any single motion added to the tree
    pub max_distance: f64,
    /// Multiplicative constant of the rewiring radius schedule; should be
    /// at least the side length of the space's bounding box
    pub ball_radius_const: f64,
    /// Hard ceiling on the rewiring radius; ideally the space diameter
    pub ball_radius_max: f64,
    /// Sort candidate parents by cost and stop validating motions at the
    /// first success
    pub delay_cc: bool,
    /// Which nearest-neighbor structure holds the tree
    pub nearest_neighbors: NearestNeighborsKind,
    /// Accept a best-effort path whose endpoint is within this distance of
    /// the goal as an `Approximate` solution; zero disables
    pub approximate_radius: f64,
    /// Fixed RNG seed for reproducible runs; also replayed by `clear()`
    pub seed: Option<u64>,
    /// Print progress every 100 iterations
    pub verbose: bool,
}

impl Default for RRTStarConfig {
    fn default() -> Self {
        Self {
            goal_bias: 0.05,
            max_distance: 0.0,
            ball_radius_const: 0.0,
            ball_radius_max: 0.0,
            delay_cc: true,
            nearest_neighbors: NearestNeighborsKind::Gnat,
            approximate_radius: 0.0,
            seed: None,
            verbose: false,
        }
    }
}

/// Outcome of a [`RRTStar::solve`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerStatus {
    /// A path ending inside the goal region was found
    Exact,
    /// No exact path, but the best node lies within `approximate_radius`
    /// of the goal
    Approximate,
    /// Termination fired without a solution; a best-effort path is still
    /// available from [`RRTStar::solution`] when the tree grew at all
    Timeout,
    /// No start state survives validity checking
    InvalidStart,
    /// No goal region is installed
    InvalidGoal,
}

/// A path extracted from the tree, ordered start to end
#[derive(Debug, Clone)]
pub struct PlannedPath<St, C> {
    pub states: Vec<St>,
    pub cost: C,
    /// Distance from the path's endpoint to the goal region
    pub goal_distance: f64,
    /// True when the endpoint does not reach the goal region
    pub approximate: bool,
}

/// Snapshot of the exploration tree for inspection
#[derive(Debug, Clone)]
pub struct PlannerData<St, C> {
    pub states: Vec<St>,
    pub parents: Vec<Option<usize>>,
    pub costs: Vec<C>,
}

impl<St, C> PlannerData<St, C> {
    /// Directed parent -> child edges.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.parents
            .iter()
            .enumerate()
            .filter_map(|(child, parent)| parent.map(|p| (p, child)))
            .collect()
    }
}

/// Asymptotically-optimal rapidly-exploring random tree planner
pub struct RRTStar<S, O>
where
    S: StateSpace,
    S::State: 'static,
    O: OptimizationObjective<S::State>,
{
    space: Arc<S>,
    objective: Arc<O>,
    config: RRTStarConfig,
    goal: Option<Box<dyn GoalRegion<S::State>>>,
    start_states: Vec<S::State>,
    tree: MotionTree<S::State, O::Cost>,
    nn: Option<Box<dyn NearestNeighbors<NodeRef<S::State>>>>,
    rng: StdRng,
    // resolved at setup(); zero config fields fall back to space-derived
    // defaults
    steer_range: f64,
    radius_const: f64,
    radius_max: f64,
    best_goal: Option<usize>,
    best_approx: Option<(usize, f64)>,
    solution: Option<PlannedPath<S::State, O::Cost>>,
    num_collision_checks: u64,
    iterations: u64,
    is_setup: bool,
}

impl<S, O> RRTStar<S, O>
where
    S: StateSpace + 'static,
    S::State: 'static,
    O: OptimizationObjective<S::State>,
{
    pub fn new(space: Arc<S>, objective: Arc<O>) -> Self {
        Self::with_config(space, objective, RRTStarConfig::default())
    }

    pub fn with_config(space: Arc<S>, objective: Arc<O>, config: RRTStarConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RRTStar {
            space,
            objective,
            config,
            goal: None,
            start_states: Vec::new(),
            tree: MotionTree::new(),
            nn: None,
            rng,
            steer_range: 0.0,
            radius_const: 0.0,
            radius_max: 0.0,
            best_goal: None,
            best_approx: None,
            solution: None,
            num_collision_checks: 0,
            iterations: 0,
            is_setup: false,
        }
    }

    /// Add a root. Several calls grow a forest with one root per start.
    pub fn add_start_state(&mut self, state: S::State) {
        self.start_states.push(state);
        self.is_setup = false;
    }

    pub fn set_goal(&mut self, goal: Box<dyn GoalRegion<S::State>>) {
        self.goal = Some(goal);
        self.is_setup = false;
    }

    pub fn config(&self) -> &RRTStarConfig {
        &self.config
    }

    /// Replace the configuration; takes effect at the next `setup()`.
    pub fn set_config(&mut self, config: RRTStarConfig) {
        self.config = config;
        self.is_setup = false;
    }

    /// Validate the configuration, resolve space-derived defaults, build
    /// the nearest-neighbor index, and install the start states as roots.
    pub fn setup(&mut self) -> PlanningResult<()> {
        if !(0.0..=1.0).contains(&self.config.goal_bias) {
            return Err(PlanningError::InvalidParameter(format!(
                "goal_bias must be in [0, 1], got {}",
                self.config.goal_bias
            )));
        }
        for (name, value) in [
            ("max_distance", self.config.max_distance),
            ("ball_radius_const", self.config.ball_radius_const),
            ("ball_radius_max", self.config.ball_radius_max),
            ("approximate_radius", self.config.approximate_radius),
        ] {
            if value < 0.0 || !value.is_finite() {
                return Err(PlanningError::InvalidParameter(format!(
                    "{} must be non-negative and finite, got {}",
                    name, value
                )));
            }
        }
        if self.start_states.is_empty() {
            return Err(PlanningError::InvalidParameter(
                "at least one start state is required".to_string(),
            ));
        }
        if self.goal.is_none() {
            return Err(PlanningError::InvalidParameter(
                "a goal region is required".to_string(),
            ));
        }
        let extent = self.space.max_extent();
        if !extent.is_finite() || extent <= 0.0 {
            return Err(PlanningError::InvalidParameter(format!(
                "state space reports a degenerate extent: {}",
                extent
            )));
        }

        self.steer_range = if self.config.max_distance > 0.0 {
            self.config.max_distance
        } else {
            0.2 * extent
        };
        self.radius_const = if self.config.ball_radius_const > 0.0 {
            self.config.ball_radius_const
        } else {
            extent
        };
        self.radius_max = if self.config.ball_radius_max > 0.0 {
            self.config.ball_radius_max
        } else {
            extent
        };
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }

        let space = Arc::clone(&self.space);
        let dist: DistanceFn<NodeRef<S::State>> =
            Box::new(move |a, b| space.distance(&a.state, &b.state));
        let mut nn = make_index(self.config.nearest_neighbors, dist);

        self.tree.clear();
        let identity = self.objective.identity_cost();
        for state in &self.start_states {
            let id = self
                .tree
                .insert(state.clone(), None, identity.clone(), identity.clone());
            nn.add(NodeRef {
                id,
                state: state.clone(),
            });
        }
        self.nn = Some(nn);
        self.best_goal = None;
        self.best_approx = None;
        self.solution = None;
        self.iterations = 0;
        self.num_collision_checks = 0;
        self.is_setup = true;
        Ok(())
    }

    /// Run the planning loop until `terminate` returns true, then extract
    /// the best known path. The predicate is polled once per iteration.
    pub fn solve<F: FnMut() -> bool>(&mut self, mut terminate: F) -> PlannerStatus {
        if self.start_states.is_empty() {
            return PlannerStatus::InvalidStart;
        }
        if self.goal.is_none() {
            return PlannerStatus::InvalidGoal;
        }
        if !self.is_setup && self.setup().is_err() {
            return PlannerStatus::InvalidStart;
        }

        let space = Arc::clone(&self.space);
        let objective = Arc::clone(&self.objective);
        if !self.start_states.iter().any(|s| space.is_valid(s)) {
            return PlannerStatus::InvalidStart;
        }

        let cost_order = |a: &O::Cost, b: &O::Cost| {
            if objective.is_cost_less(a, b) {
                Ordering::Less
            } else if objective.is_cost_less(b, a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        };

        while !terminate() {
            self.iterations += 1;

            // 1. sample, goal-biased
            let mut sampled = None;
            if self.rng.gen::<f64>() < self.config.goal_bias {
                sampled = self
                    .goal
                    .as_ref()
                    .expect("goal checked above")
                    .sample_goal(&mut self.rng);
            }
            if sampled.is_none() {
                sampled = space.sample_uniform(&mut self.rng);
            }
            let x_rand = match sampled {
                Some(s) => s,
                // sampler rejection is an iteration miss, not a failure
                None => continue,
            };

            // 2. nearest existing motion
            let near = match self.nn.as_ref().expect("index allocated in setup").nearest(
                &NodeRef {
                    id: usize::MAX,
                    state: x_rand.clone(),
                },
            ) {
                Ok(n) => n,
                Err(_) => break,
            };

            // 3. steer: cap the motion at the configured range
            let d_near = space.distance(&near.state, &x_rand);
            let x_new = if d_near > self.steer_range {
                space.interpolate(&near.state, &x_rand, self.steer_range / d_near)
            } else {
                x_rand
            };

            // 4. the nearest-node motion must be valid before anything else
            self.num_collision_checks += 1;
            if !space.check_motion(&near.state, &x_new) {
                continue;
            }

            // 5. neighbors within the shrinking rewiring radius
            let radius = self.rewiring_radius(self.tree.len());
            let mut neighbors: Vec<NodeRef<S::State>> = Vec::new();
            self.nn.as_ref().expect("index allocated in setup").nearest_r(
                &NodeRef {
                    id: usize::MAX,
                    state: x_new.clone(),
                },
                radius,
                &mut neighbors,
            );

            // 6. choose parent among the neighbors, falling back to the
            // already-validated nearest node
            let mut candidates: Vec<(usize, O::Cost, O::Cost)> =
                Vec::with_capacity(neighbors.len());
            for nb in &neighbors {
                let inc = objective.motion_cost(&nb.state, &x_new);
                let total = objective.combine(&self.tree.get(nb.id).cost, &inc);
                candidates.push((nb.id, inc, total));
            }
            let near_candidate = {
                let inc = objective.motion_cost(&near.state, &x_new);
                let total = objective.combine(&self.tree.get(near.id).cost, &inc);
                (near.id, inc, total)
            };

            let (parent_id, inc_cost, new_cost) = if candidates.is_empty() {
                near_candidate
            } else if self.config.delay_cc {
                // cost-ordered scan, stopping at the first valid parent;
                // the stable sort keeps the index's distance order on ties
                let order: Vec<usize> = (0..candidates.len())
                    .sorted_by(|&a, &b| cost_order(&candidates[a].2, &candidates[b].2))
                    .collect();
                let mut chosen = None;
                for &ci in &order {
                    let valid = if candidates[ci].0 == near.id {
                        true
                    } else {
                        self.num_collision_checks += 1;
                        space.check_motion(&neighbors[ci].state, &x_new)
                    };
                    if valid {
                        chosen = Some(ci);
                        break;
                    }
                }
                match chosen {
                    Some(ci) => candidates[ci].clone(),
                    None => near_candidate,
                }
            } else {
                // eager: validate every candidate, keep the cheapest
                let mut best: Option<usize> = None;
                for (ci, candidate) in candidates.iter().enumerate() {
                    let valid = if candidate.0 == near.id {
                        true
                    } else {
                        self.num_collision_checks += 1;
                        space.check_motion(&neighbors[ci].state, &x_new)
                    };
                    if valid
                        && best
                            .map_or(true, |b| objective.is_cost_less(&candidate.2, &candidates[b].2))
                    {
                        best = Some(ci);
                    }
                }
                match best {
                    Some(ci) => candidates[ci].clone(),
                    None => near_candidate,
                }
            };

            // 7. install the new motion
            let new_id = self
                .tree
                .insert(x_new.clone(), Some(parent_id), inc_cost, new_cost);
            self.nn.as_mut().expect("index allocated in setup").add(NodeRef {
                id: new_id,
                state: x_new.clone(),
            });

            // 8. rewire neighbors through the new motion on strict
            // improvement only, so equal-cost alternatives cannot oscillate
            let new_node_cost = self.tree.get(new_id).cost.clone();
            for nb in &neighbors {
                if nb.id == parent_id {
                    continue;
                }
                if self.tree.get(nb.id).parent.is_none() {
                    continue;
                }
                let inc = objective.motion_cost(&x_new, &nb.state);
                let through_new = objective.combine(&new_node_cost, &inc);
                let current = self.tree.get(nb.id).cost.clone();
                if objective.is_cost_less(&through_new, &current) {
                    self.num_collision_checks += 1;
                    if space.check_motion(&x_new, &nb.state) {
                        self.tree.reparent(nb.id, new_id, inc, through_new);
                        self.tree.update_child_costs(nb.id, objective.as_ref());
                    }
                }
            }

            // 9. track the best exact and best approximate nodes
            let goal = self.goal.as_ref().expect("goal checked above");
            let goal_distance = goal.goal_distance(&x_new);
            if self
                .best_approx
                .map_or(true, |(_, best)| goal_distance < best)
            {
                self.best_approx = Some((new_id, goal_distance));
            }
            if goal.is_goal(&x_new) {
                let improves = match self.best_goal {
                    None => true,
                    Some(b) => objective
                        .is_cost_less(&self.tree.get(new_id).cost, &self.tree.get(b).cost),
                };
                if improves {
                    self.best_goal = Some(new_id);
                }
            }

            if self.config.verbose && self.iterations % 100 == 0 {
                println!(
                    "RRT* iteration {}: {} nodes, {} collision checks",
                    self.iterations,
                    self.tree.len(),
                    self.num_collision_checks
                );
            }
        }

        self.extract_solution()
    }

    /// Run `solve` for exactly `iterations` iterations.
    pub fn solve_iterations(&mut self, iterations: usize) -> PlannerStatus {
        let mut remaining = iterations;
        self.solve(move || {
            if remaining == 0 {
                true
            } else {
                remaining -= 1;
                false
            }
        })
    }

    /// The best path found by the last `solve` call, if any.
    pub fn solution(&self) -> Option<&PlannedPath<S::State, O::Cost>> {
        self.solution.as_ref()
    }

    /// Drop every motion (releasing its state), empty the index, and reset
    /// the counters. The configuration is preserved; a seeded planner is
    /// re-seeded so the next run replays.
    pub fn clear(&mut self) {
        self.tree.clear();
        if let Some(nn) = self.nn.as_mut() {
            nn.clear();
        }
        self.best_goal = None;
        self.best_approx = None;
        self.solution = None;
        self.iterations = 0;
        self.num_collision_checks = 0;
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.is_setup = false;
    }

    /// Snapshot the tree as a graph of states with parent -> child edges.
    pub fn planner_data(&self) -> PlannerData<S::State, O::Cost> {
        let mut data = PlannerData {
            states: Vec::with_capacity(self.tree.len()),
            parents: Vec::with_capacity(self.tree.len()),
            costs: Vec::with_capacity(self.tree.len()),
        };
        for motion in self.tree.iter() {
            data.states.push(motion.state.clone());
            data.parents.push(motion.parent);
            data.costs.push(motion.cost.clone());
        }
        data
    }

    /// Total calls to the state space's motion validator since the last
    /// setup or clear.
    pub fn num_collision_checks(&self) -> u64 {
        self.num_collision_checks
    }

    /// Iterations performed since the last setup or clear.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn tree_size(&self) -> usize {
        self.tree.len()
    }

    /// The neighbor radius used when the tree holds `tree_size` motions:
    /// `min(radius_max, radius_const * (ln(N + 1) / (N + 1))^(1/d))`.
    /// Meaningful once `setup()` has resolved the schedule constants.
    pub fn rewiring_radius(&self, tree_size: usize) -> f64 {
        let d = self.space.dimension() as f64;
        let n = (tree_size + 1) as f64;
        (self.radius_const * (n.ln() / n).powf(1.0 / d)).min(self.radius_max)
    }

    fn extract_solution(&mut self) -> PlannerStatus {
        let objective = Arc::clone(&self.objective);

        // Final sweep: rewiring may have made a goal node cheaper than the
        // one tracked during the loop.
        let mut best_exact: Option<usize> = None;
        {
            let goal = self.goal.as_ref().expect("goal checked in solve");
            for (id, motion) in self.tree.iter().enumerate() {
                if goal.is_goal(&motion.state) {
                    let better = match best_exact {
                        None => true,
                        Some(b) => objective.is_cost_less(&motion.cost, &self.tree.get(b).cost),
                    };
                    if better {
                        best_exact = Some(id);
                    }
                }
            }
        }
        if let Some(id) = best_exact {
            self.best_goal = Some(id);
            self.solution = Some(self.extract_path(id, false));
            return PlannerStatus::Exact;
        }

        if self.tree.len() <= self.start_states.len() {
            // nothing beyond the roots
            self.solution = None;
            return PlannerStatus::Timeout;
        }

        let mut best: Option<(usize, f64)> = None;
        {
            let goal = self.goal.as_ref().expect("goal checked in solve");
            for (id, motion) in self.tree.iter().enumerate() {
                let gd = goal.goal_distance(&motion.state);
                if best.map_or(true, |(_, bd)| gd < bd) {
                    best = Some((id, gd));
                }
            }
        }
        let (id, goal_distance) = best.expect("tree has nodes");
        self.best_approx = Some((id, goal_distance));
        self.solution = Some(self.extract_path(id, true));
        if self.config.approximate_radius > 0.0 && goal_distance <= self.config.approximate_radius
        {
            PlannerStatus::Approximate
        } else {
            PlannerStatus::Timeout
        }
    }

    fn extract_path(&self, node: usize, approximate: bool) -> PlannedPath<S::State, O::Cost> {
        let mut indices = self.tree.path_to_root(node);
        indices.reverse();
        let states: Vec<S::State> = indices
            .iter()
            .map(|&i| self.tree.get(i).state.clone())
            .collect();
        let goal_distance = self
            .goal
            .as_ref()
            .map(|g| g.goal_distance(&self.tree.get(node).state))
            .unwrap_or(f64::INFINITY);
        PlannedPath {
            states,
            cost: self.tree.get(node).cost.clone(),
            goal_distance,
            approximate,
        }
    }
}
