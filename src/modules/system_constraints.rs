//! Kinematic limits of the agent, used to time-parameterize connections

use serde::{Deserialize, Serialize};

use crate::common::{normalize_angle, PlanningResult, Position, Trajectory, TrajectoryPoint};
use crate::config::{ensure_positive, ModuleArgs};
use crate::factory::ModuleFactory;

/// Velocity, acceleration and yaw rate limits
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConstraints {
    /// Maximum velocity [m/s]
    pub v_max: f64,
    /// Maximum acceleration [m/s^2]
    pub a_max: f64,
    /// Maximum yaw rate [rad/s]
    pub yaw_rate_max: f64,
}

impl Default for SystemConstraints {
    fn default() -> Self {
        Self {
            v_max: 1.0,
            a_max: 1.0,
            yaw_rate_max: std::f64::consts::FRAC_PI_2,
        }
    }
}

impl SystemConstraints {
    pub fn create(args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<SystemConstraints>> {
        let constraints: SystemConstraints = args.parse()?;
        constraints.validate()?;
        Ok(Box::new(constraints))
    }

    /// # Errors
    ///
    /// If any limit is not strictly positive.
    pub fn validate(&self) -> PlanningResult<()> {
        ensure_positive("v_max", self.v_max)?;
        ensure_positive("a_max", self.a_max)?;
        ensure_positive("yaw_rate_max", self.yaw_rate_max)
    }

    /// Rest-to-rest travel time along a path of length `distance`
    pub fn travel_time(&self, distance: f64) -> f64 {
        self.time_at(distance, distance)
    }

    /// Time at which arc length `s` is reached on a rest-to-rest trapezoidal profile
    /// over `total` metres.
    pub fn time_at(&self, s: f64, total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        let s = s.clamp(0.0, total);
        let v_peak = self.v_max.min((self.a_max * total).sqrt());
        let d_acc = v_peak * v_peak / (2.0 * self.a_max);
        let t_acc = v_peak / self.a_max;
        if s <= d_acc {
            (2.0 * s / self.a_max).sqrt()
        } else if s <= total - d_acc {
            t_acc + (s - d_acc) / v_peak
        } else {
            let t_total = 2.0 * t_acc + (total - 2.0 * d_acc) / v_peak;
            t_total - (2.0 * (total - s) / self.a_max).sqrt()
        }
    }

    /// Turn `positions` (starting at `start`) into a timed trajectory.
    ///
    /// The yaw turns towards the direction of travel no faster than `yaw_rate_max`.
    pub fn build_trajectory(&self, start: &TrajectoryPoint, positions: &[Position]) -> Trajectory {
        let total: f64 = positions.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        let heading = match (positions.first(), positions.last()) {
            (Some(first), Some(last)) if (last - first).norm() > 0.0 => {
                let d = last - first;
                d.y.atan2(d.x)
            }
            _ => start.yaw,
        };
        let yaw_delta = normalize_angle(heading - start.yaw);

        let mut s = 0.0;
        let mut previous: Option<&Position> = None;
        positions
            .iter()
            .map(|position| {
                if let Some(prev) = previous {
                    s += (position - prev).norm();
                }
                previous = Some(position);
                let t = self.time_at(s, total);
                let max_turn = self.yaw_rate_max * t;
                let yaw = normalize_angle(start.yaw + yaw_delta.clamp(-max_turn, max_turn));
                TrajectoryPoint::new(*position, yaw, t)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_travel_time_trapezoid() {
        let constraints = SystemConstraints::default();
        // Accelerates for 1s (0.5m), cruises 1m, decelerates 1s
        assert_relative_eq!(constraints.travel_time(2.0), 3.0, epsilon = 1e-9);
        // Triangular profile
        assert_relative_eq!(constraints.travel_time(0.5), 2.0 * 0.5_f64.sqrt(), epsilon = 1e-9);
        assert_eq!(constraints.travel_time(0.0), 0.0);
    }

    #[test]
    fn test_time_at_is_monotonic() {
        let constraints = SystemConstraints { v_max: 2.0, a_max: 0.5, yaw_rate_max: 1.0 };
        let total = 7.0;
        let mut last = -1.0;
        for i in 0..=70 {
            let t = constraints.time_at(i as f64 * 0.1, total);
            assert!(t > last);
            last = t;
        }
        assert_relative_eq!(last, constraints.travel_time(total), epsilon = 1e-9);
    }

    #[test]
    fn test_build_trajectory_limits_yaw_rate() {
        let constraints = SystemConstraints { v_max: 1.0, a_max: 1.0, yaw_rate_max: 0.1 };
        let start = TrajectoryPoint::from_xyz(0.0, 0.0, 0.0);
        let positions: Vec<Position> = (0..=10).map(|i| Position::new(0.0, i as f64 * 0.1, 0.0)).collect();
        let trajectory = constraints.build_trajectory(&start, &positions);

        assert_eq!(trajectory.len(), positions.len());
        assert_eq!(trajectory[0].time_from_start, 0.0);
        assert_relative_eq!(trajectory[10].time_from_start, 2.0, epsilon = 1e-9);
        for point in &trajectory {
            assert!(point.yaw <= 0.1 * point.time_from_start + 1e-9);
        }
    }

    #[test]
    fn test_invalid_constraints() {
        let factory = ModuleFactory::with_defaults();
        let args = ModuleArgs::new().with("v_max", -1.0);
        assert!(factory.create::<SystemConstraints>(&args).is_err());
    }
}
