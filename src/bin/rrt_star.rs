// RRT* planning demo: a bounded 2-D world with circular obstacles.
// Plans a path, reports planner statistics, and renders the exploration
// tree and the solution to a PNG.
use std::f64::consts::PI;
use std::sync::Arc;

use gnuplot::{AxesCommon, Caption, Color, Figure};
use itertools::iproduct;
use nalgebra::DVector;

use motion_planning::common::{PlanningError, PlanningResult};
use motion_planning::objective::PathLengthObjective;
use motion_planning::planner::{PlannerStatus, RRTStar, RRTStarConfig};
use motion_planning::space::{BallObstacle, GoalDisc, RealVectorSpace};

fn main() -> PlanningResult<()> {
    println!("RRT* path planning start!!");

    // Obstacle list (x, y, radius)
    let obstacle_list = [
        (5.0, 5.0, 1.0),
        (3.0, 6.0, 2.0),
        (3.0, 8.0, 2.0),
        (3.0, 10.0, 2.0),
        (7.0, 5.0, 2.0),
        (9.0, 5.0, 2.0),
        (8.0, 10.0, 1.0),
    ];

    let mut space = RealVectorSpace::new(&[-2.0, -2.0], &[15.0, 15.0], 0.1)?;
    for &(x, y, r) in &obstacle_list {
        space.add_ball(BallObstacle::new(&[x, y], r));
    }
    let space = Arc::new(space);
    let objective = Arc::new(PathLengthObjective::new(Arc::clone(&space)));

    let config = RRTStarConfig {
        max_distance: 3.0,
        goal_bias: 0.05,
        seed: Some(1),
        verbose: true,
        ..Default::default()
    };
    let mut planner = RRTStar::with_config(Arc::clone(&space), objective, config);
    planner.add_start_state(DVector::from_row_slice(&[0.0, 0.0]));
    planner.set_goal(Box::new(GoalDisc::new(&[6.0, 10.0], 0.5)));
    planner.setup()?;

    let status = planner.solve_iterations(2000);
    println!(
        "status: {:?}, {} nodes, {} collision checks",
        status,
        planner.tree_size(),
        planner.num_collision_checks()
    );

    let path = planner.solution().ok_or_else(|| {
        PlanningError::NoSolution("the tree never grew beyond the start".to_string())
    })?;
    if status == PlannerStatus::Exact {
        println!("Found path with {} points, cost {:.3}", path.states.len(), path.cost);
    } else {
        println!(
            "Best-effort path, endpoint {:.3} away from the goal",
            path.goal_distance
        );
    }

    // Render obstacles, tree, and path
    let mut fg = Figure::new();
    let axes = fg.axes2d();

    // Obstacle outlines, 32 samples per circle
    let outline: Vec<(f64, f64)> = iproduct!(obstacle_list.iter(), 0..32)
        .map(|(&(x, y, r), i)| {
            let theta = 2.0 * PI * i as f64 / 32.0;
            (x + r * theta.cos(), y + r * theta.sin())
        })
        .collect();
    let obs_x: Vec<f64> = outline.iter().map(|p| p.0).collect();
    let obs_y: Vec<f64> = outline.iter().map(|p| p.1).collect();
    axes.points(&obs_x, &obs_y, &[Caption("Obstacles"), Color("black")]);

    // Tree edges
    let data = planner.planner_data();
    for (parent, child) in data.edges() {
        axes.lines(
            &[data.states[parent][0], data.states[child][0]],
            &[data.states[parent][1], data.states[child][1]],
            &[Color("blue")],
        );
    }

    // Solution path
    let path_x: Vec<f64> = path.states.iter().map(|s| s[0]).collect();
    let path_y: Vec<f64> = path.states.iter().map(|s| s[1]).collect();
    axes.lines(&path_x, &path_y, &[Caption("RRT* Path"), Color("red")]);

    axes.points(&[0.0], &[0.0], &[Caption("Start"), Color("green")]);
    axes.points(&[6.0], &[10.0], &[Caption("Goal"), Color("blue")]);
    axes.set_title("RRT* Path Planning", &[])
        .set_x_label("X [m]", &[])
        .set_y_label("Y [m]", &[])
        .set_aspect_ratio(gnuplot::AutoOption::Fix(1.0));

    let output_path = "rrt_star_result.png";
    fg.save_to_png(output_path, 800, 600)
        .map_err(|e| PlanningError::VisualizationError(format!("{:?}", e)))?;
    println!("Plot saved to: {}", output_path);

    println!("RRT* path planning finish!!");
    Ok(())
}
