//! Common error definitions for motion-planning
//!
//! This module provides the foundational error building blocks used across
//! all planners and data structures in this crate.

pub mod error;

pub use error::*;
