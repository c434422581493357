//! Common types, traits, and error definitions for active_planner
//!
//! This module provides the foundational building blocks shared by
//! the tree, the generators and the evaluators.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
