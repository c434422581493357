//! Common types used throughout active_planner

use nalgebra::Vector3;

/// 3D position in the map frame [m]
pub type Position = Vector3<f64>;

/// Single agent state along a trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub position: Position,
    /// Heading around the z axis [rad]
    pub yaw: f64,
    /// Time since the start of the owning trajectory [s]
    pub time_from_start: f64,
}

impl TrajectoryPoint {
    pub fn new(position: Position, yaw: f64, time_from_start: f64) -> Self {
        Self {
            position,
            yaw,
            time_from_start,
        }
    }

    pub fn from_position(position: Position) -> Self {
        Self::new(position, 0.0, 0.0)
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> Self {
        Self::from_position(Position::new(x, y, z))
    }

    pub fn distance(&self, other: &TrajectoryPoint) -> f64 {
        (self.position - other.position).norm()
    }

    /// Same pose with the time stamp reset, used when a point starts a new trajectory.
    pub fn at_start(&self) -> Self {
        Self::new(self.position, self.yaw, 0.0)
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }
}

impl From<Position> for TrajectoryPoint {
    fn from(position: Position) -> Self {
        Self::from_position(position)
    }
}

/// Ordered sequence of agent states
pub type Trajectory = Vec<TrajectoryPoint>;

/// Summed Euclidean length of a trajectory
pub fn trajectory_length(trajectory: &[TrajectoryPoint]) -> f64 {
    trajectory
        .windows(2)
        .map(|w| w[0].distance(&w[1]))
        .sum()
}

/// Time between the first and the last point of a trajectory
pub fn trajectory_duration(trajectory: &[TrajectoryPoint]) -> f64 {
    match (trajectory.first(), trajectory.last()) {
        (Some(first), Some(last)) => last.time_from_start - first.time_from_start,
        _ => 0.0,
    }
}

/// Normalize an angle to [-pi, pi]
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > std::f64::consts::PI {
        angle -= 2.0 * std::f64::consts::PI;
    }
    while angle < -std::f64::consts::PI {
        angle += 2.0 * std::f64::consts::PI;
    }
    angle
}
