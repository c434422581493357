//! Trajectory segment tree and its spatial index

pub mod segment;
pub mod spatial_index;

pub use segment::*;
pub use spatial_index::*;
