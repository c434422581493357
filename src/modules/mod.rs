//! Leaf modules plugged into the generators

pub mod bounding_volume;
pub mod system_constraints;
pub mod segment_selectors;
pub mod generator_updaters;

pub use bounding_volume::*;
pub use system_constraints::*;
pub use segment_selectors::*;
pub use generator_updaters::*;
