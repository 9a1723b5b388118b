//! Sampling-based planners
//!
//! This module contains the motion tree shared by tree-based planners and
//! the RRT* planner itself.

pub mod motion_tree;
pub mod rrt_star;

pub use motion_tree::{Motion, MotionTree};
pub use rrt_star::{PlannedPath, PlannerData, PlannerStatus, RRTStar, RRTStarConfig};
