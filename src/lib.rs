//! active_planner - online RRT* exploration planning core
//!
//! This crate grows a tree of candidate trajectory segments around an agent,
//! scores them by expected information gain and cost, and hands the best first
//! step to an executor while keeping the rest of the tree alive.

// Core modules
pub mod common;
pub mod config;
pub mod factory;
pub mod tree;

// Planning modules
pub mod modules;
pub mod generators;
pub mod evaluators;
pub mod maps;
pub mod planner;

// Re-export common types for convenience
pub use common::{Position, Trajectory, TrajectoryPoint};
pub use common::{TrajectoryEvaluator, TrajectoryGenerator, TraversabilityOracle};
pub use common::{PlanningError, PlanningResult};
pub use config::{ModuleArgs, PlannerConfig};
pub use factory::ModuleFactory;
pub use planner::{CycleReport, NextStep, Planner};
pub use tree::{SegmentId, SegmentTree, TrajectorySegment};
