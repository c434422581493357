//! Trajectory generators growing the segment tree

pub mod base;
pub mod rrt;
pub mod rrt_star;

pub use base::{GeneratorBase, GeneratorBaseConfig, TraversabilityPolicy};
pub use rrt::{Rrt, RrtConfig, SamplingMode};
pub use rrt_star::{RrtStar, RrtStarConfig};
