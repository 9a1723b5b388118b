//! End-to-end RRT* scenarios on the unit square with the path-length
//! objective.

use std::sync::Arc;

use motion_planning::objective::PathLengthObjective;
use motion_planning::planner::{PlannerStatus, RRTStar, RRTStarConfig};
use motion_planning::space::{BallObstacle, BoxObstacle, GoalDisc, RealVectorSpace};
use nalgebra::DVector;

type Planner = RRTStar<RealVectorSpace, PathLengthObjective<RealVectorSpace>>;

fn state(x: f64, y: f64) -> DVector<f64> {
    DVector::from_row_slice(&[x, y])
}

fn base_config(seed: u64) -> RRTStarConfig {
    RRTStarConfig {
        max_distance: 0.2,
        goal_bias: 0.05,
        seed: Some(seed),
        ..Default::default()
    }
}

fn planner_on(
    space: RealVectorSpace,
    config: RRTStarConfig,
    start: (f64, f64),
    goal: (f64, f64),
    goal_radius: f64,
) -> Planner {
    let space = Arc::new(space);
    let objective = Arc::new(PathLengthObjective::new(Arc::clone(&space)));
    let mut planner = RRTStar::with_config(space, objective, config);
    planner.add_start_state(state(start.0, start.1));
    planner.set_goal(Box::new(GoalDisc::new(&[goal.0, goal.1], goal_radius)));
    planner
}

/// Invariant sweep over the snapshot: parent links form an acyclic forest
/// and every recorded cost equals the parent's cost plus the edge length.
fn assert_tree_consistent(planner: &Planner) {
    let data = planner.planner_data();
    let n = data.states.len();
    assert_eq!(planner.tree_size(), n);
    for i in 0..n {
        let mut steps = 0;
        let mut current = data.parents[i];
        while let Some(p) = current {
            steps += 1;
            assert!(steps <= n, "parent links cycle at node {}", i);
            current = data.parents[p];
        }
        match data.parents[i] {
            Some(p) => {
                let edge = (&data.states[p] - &data.states[i]).norm();
                assert!(
                    (data.costs[i] - (data.costs[p] + edge)).abs() < 1e-9,
                    "cost mismatch at node {}",
                    i
                );
            }
            None => assert!(data.costs[i].abs() < 1e-12),
        }
    }
}

#[test]
fn trivial_world_reaches_near_optimal_cost() {
    let optimal = (state(0.1, 0.1) - state(0.9, 0.9)).norm();
    for seed in [1, 2, 3] {
        let mut planner = planner_on(
            RealVectorSpace::unit_square(0.01),
            base_config(seed),
            (0.1, 0.1),
            (0.9, 0.9),
            0.05,
        );
        let status = planner.solve_iterations(1000);
        assert_eq!(status, PlannerStatus::Exact, "seed {}", seed);

        let path = planner.solution().unwrap();
        assert!(!path.approximate);
        assert_eq!(path.states.first().unwrap(), &state(0.1, 0.1));
        assert!(
            path.cost <= 1.15 * optimal,
            "seed {}: cost {} vs optimal {}",
            seed,
            path.cost,
            optimal
        );
        assert_tree_consistent(&planner);
    }
}

fn slit_space() -> RealVectorSpace {
    let mut space = RealVectorSpace::unit_square(0.005);
    space.add_box(BoxObstacle::new(&[0.45, 0.0], &[0.55, 0.45]));
    space.add_box(BoxObstacle::new(&[0.45, 0.60], &[0.55, 1.0]));
    space
}

#[test]
fn rewiring_improves_cost_over_iterations() {
    let mut with_exact = 0;
    let mut strictly_better = 0;
    for seed in 0..20u64 {
        let mut planner = planner_on(slit_space(), base_config(seed), (0.1, 0.5), (0.9, 0.5), 0.05);
        let early_status = planner.solve_iterations(400);
        let early_cost =
            (early_status == PlannerStatus::Exact).then(|| planner.solution().unwrap().cost);

        let late_status = planner.solve_iterations(1000);
        if let Some(c_early) = early_cost {
            with_exact += 1;
            assert_eq!(late_status, PlannerStatus::Exact);
            let c_late = planner.solution().unwrap().cost;
            assert!(
                c_late <= c_early + 1e-9,
                "seed {}: cost increased {} -> {}",
                seed,
                c_early,
                c_late
            );
            if c_late < c_early - 1e-12 {
                strictly_better += 1;
            }
        }
        assert_tree_consistent(&planner);
    }
    assert!(
        with_exact >= 12,
        "only {}/20 seeds solved by iteration 400",
        with_exact
    );
    assert!(
        strictly_better * 10 >= with_exact * 9,
        "rewiring improved only {}/{} runs",
        strictly_better,
        with_exact
    );
}

fn cluttered_space() -> RealVectorSpace {
    let mut space = RealVectorSpace::unit_square(0.01);
    for &(x, y, r) in &[
        (0.3, 0.3, 0.1),
        (0.5, 0.7, 0.12),
        (0.7, 0.35, 0.1),
        (0.25, 0.65, 0.08),
        (0.6, 0.55, 0.07),
    ] {
        space.add_ball(BallObstacle::new(&[x, y], r));
    }
    space
}

#[test]
fn delayed_collision_checking_matches_eager_with_fewer_checks() {
    let delayed_config = RRTStarConfig {
        delay_cc: true,
        ..base_config(42)
    };
    let eager_config = RRTStarConfig {
        delay_cc: false,
        ..base_config(42)
    };
    let mut delayed = planner_on(cluttered_space(), delayed_config, (0.1, 0.1), (0.9, 0.9), 0.05);
    let mut eager = planner_on(cluttered_space(), eager_config, (0.1, 0.1), (0.9, 0.9), 0.05);

    let delayed_status = delayed.solve_iterations(800);
    let eager_status = eager.solve_iterations(800);

    assert_eq!(delayed_status, eager_status);
    assert_eq!(delayed.tree_size(), eager.tree_size());

    let delayed_path = delayed.solution().unwrap();
    let eager_path = eager.solution().unwrap();
    assert_eq!(delayed_path.states, eager_path.states);
    assert_eq!(delayed_path.cost, eager_path.cost);

    assert!(
        delayed.num_collision_checks() < eager.num_collision_checks(),
        "delayed {} vs eager {}",
        delayed.num_collision_checks(),
        eager.num_collision_checks()
    );
}

#[test]
fn rewiring_radius_follows_the_schedule() {
    let mut planner = planner_on(
        RealVectorSpace::unit_square(0.01),
        base_config(3),
        (0.1, 0.1),
        (0.9, 0.9),
        0.05,
    );
    planner.setup().unwrap();

    // defaults resolve to the space extent
    let gamma = 2.0_f64.sqrt();
    let cap = 2.0_f64.sqrt();
    let mut previous = f64::INFINITY;
    for n in 1..=2000usize {
        let r = planner.rewiring_radius(n);
        let size = (n + 1) as f64;
        let expected = (gamma * (size.ln() / size).powf(0.5)).min(cap);
        assert!((r - expected).abs() < 1e-12, "closed form at n={}", n);
        assert!(r <= cap + 1e-12);
        // ln(x)/x rises until x = e, so monotone non-increase holds from
        // the second insertion on
        if n >= 2 {
            assert!(r <= previous + 1e-12, "radius grew at n={}", n);
        }
        previous = r;
    }
}

fn enclosed_space() -> RealVectorSpace {
    let mut space = RealVectorSpace::unit_square(0.005);
    space.add_box(BoxObstacle::new(&[0.60, 0.60], &[0.95, 0.63]));
    space.add_box(BoxObstacle::new(&[0.60, 0.92], &[0.95, 0.95]));
    space.add_box(BoxObstacle::new(&[0.60, 0.60], &[0.63, 0.95]));
    space.add_box(BoxObstacle::new(&[0.92, 0.60], &[0.95, 0.95]));
    space
}

#[test]
fn enclosed_goal_times_out_with_best_effort_path() {
    let mut planner = planner_on(enclosed_space(), base_config(5), (0.1, 0.1), (0.8, 0.8), 0.05);
    let status = planner.solve_iterations(600);
    assert_eq!(status, PlannerStatus::Timeout);

    let path = planner.solution().unwrap();
    assert!(path.approximate);
    assert!(path.goal_distance > 0.05, "the goal is unreachable");

    // the endpoint is the tree's closest node to the goal
    let goal = state(0.8, 0.8);
    let data = planner.planner_data();
    let best = data
        .states
        .iter()
        .map(|s| (s - &goal).norm())
        .fold(f64::INFINITY, f64::min);
    let endpoint = path.states.last().unwrap();
    assert!(((endpoint - &goal).norm() - best).abs() < 1e-9);
    assert_tree_consistent(&planner);
}

#[test]
fn approximate_radius_reports_approximate_status() {
    let config = RRTStarConfig {
        approximate_radius: 0.5,
        ..base_config(5)
    };
    let mut planner = planner_on(enclosed_space(), config, (0.1, 0.1), (0.8, 0.8), 0.05);
    assert_eq!(planner.solve_iterations(600), PlannerStatus::Approximate);
    assert!(planner.solution().unwrap().goal_distance <= 0.5);
}

#[test]
fn clear_resets_and_replays_seeded_runs() {
    let mut planner = planner_on(
        RealVectorSpace::unit_square(0.01),
        base_config(9),
        (0.1, 0.1),
        (0.9, 0.9),
        0.05,
    );
    let first_status = planner.solve_iterations(300);
    let first_path = planner.solution().map(|p| p.states.clone());
    let first_checks = planner.num_collision_checks();
    let first_size = planner.tree_size();

    planner.clear();
    assert_eq!(planner.tree_size(), 0);
    assert_eq!(planner.iterations(), 0);
    assert_eq!(planner.num_collision_checks(), 0);
    assert!(planner.planner_data().states.is_empty());
    assert!(planner.solution().is_none());

    let second_status = planner.solve_iterations(300);
    assert_eq!(first_status, second_status);
    assert_eq!(planner.num_collision_checks(), first_checks);
    assert_eq!(planner.tree_size(), first_size);
    assert_eq!(planner.solution().map(|p| p.states.clone()), first_path);
}

#[test]
fn forest_supports_multiple_start_states() {
    let mut planner = planner_on(
        RealVectorSpace::unit_square(0.01),
        base_config(11),
        (0.1, 0.1),
        (0.9, 0.9),
        0.05,
    );
    planner.add_start_state(state(0.9, 0.1));

    let status = planner.solve_iterations(500);
    assert_eq!(status, PlannerStatus::Exact);

    let path = planner.solution().unwrap();
    let first = path.states.first().unwrap();
    assert!(first == &state(0.1, 0.1) || first == &state(0.9, 0.1));
    assert_tree_consistent(&planner);
}
