//! In-memory traversability oracles.
//!
//! These stand in for a volumetric map in tests and in the simulation binary.

use crate::common::{Position, TraversabilityOracle};

/// The same answer everywhere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformMap {
    distance: Option<f64>,
}

impl UniformMap {
    /// Everything is observed with `distance` clearance.
    pub fn observed(distance: f64) -> Self {
        UniformMap {
            distance: Some(distance),
        }
    }

    /// Nothing is observed.
    pub fn unknown() -> Self {
        UniformMap { distance: None }
    }
}

impl TraversabilityOracle for UniformMap {
    fn query_distance(&self, _point: &Position) -> Option<f64> {
        self.distance
    }
}

/// Spherical obstacles, known only inside the observed spheres
#[derive(Debug, Clone, Default)]
pub struct SphereWorld {
    /// Clearance reported far from any obstacle [m]
    max_distance: f64,
    obstacles: Vec<(Position, f64)>,
    observed: Vec<(Position, f64)>,
}

impl SphereWorld {
    pub fn new(max_distance: f64) -> Self {
        SphereWorld {
            max_distance,
            ..Default::default()
        }
    }

    pub fn add_obstacle(&mut self, center: Position, radius: f64) {
        self.obstacles.push((center, radius));
    }

    /// Mark the ball of `radius` around `center` as observed.
    pub fn observe(&mut self, center: Position, radius: f64) {
        self.observed.push((center, radius));
    }

    pub fn is_observed(&self, point: &Position) -> bool {
        self.observed
            .iter()
            .any(|(center, radius)| (point - center).norm() <= *radius)
    }

    pub fn obstacles(&self) -> &[(Position, f64)] {
        &self.obstacles
    }

    /// Distance to the closest obstacle surface, negative inside an obstacle
    pub fn obstacle_distance(&self, point: &Position) -> f64 {
        self.obstacles
            .iter()
            .map(|(center, radius)| (point - center).norm() - radius)
            .fold(self.max_distance, f64::min)
    }
}

impl TraversabilityOracle for SphereWorld {
    fn query_distance(&self, point: &Position) -> Option<f64> {
        self.is_observed(point).then(|| self.obstacle_distance(point))
    }
}
