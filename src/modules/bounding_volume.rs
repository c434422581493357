//! Bounding volumes restricting the sampling domain

use serde::{Deserialize, Serialize};

use crate::common::{BoundingVolume, PlanningError, PlanningResult, Position};
use crate::config::ModuleArgs;
use crate::factory::ModuleFactory;

/// Accepts every point; only usable with samplers that do not need extents
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl Unbounded {
    pub fn create(_args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn BoundingVolume>> {
        Ok(Box::new(Unbounded))
    }
}

impl BoundingVolume for Unbounded {
    fn contains(&self, _point: &Position) -> bool {
        true
    }
}

/// Axis aligned box, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    /// # Errors
    ///
    /// If any `min` coordinate exceeds the matching `max` coordinate.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> PlanningResult<Self> {
        let bounds = BoundingBox { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Cube spanning `[low, high]` on every axis
    pub fn cube(low: f64, high: f64) -> PlanningResult<Self> {
        Self::new([low; 3], [high; 3])
    }

    pub fn create(args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn BoundingVolume>> {
        let bounds: BoundingBox = args.parse()?;
        bounds.validate()?;
        Ok(Box::new(bounds))
    }

    fn validate(&self) -> PlanningResult<()> {
        for axis in 0..3 {
            if !(self.min[axis] <= self.max[axis]) {
                return Err(PlanningError::invalid_parameter(
                    "min",
                    format!("axis {}: {} exceeds max {}", axis, self.min[axis], self.max[axis]),
                ));
            }
        }
        Ok(())
    }
}

impl BoundingVolume for BoundingBox {
    fn contains(&self, point: &Position) -> bool {
        (0..3).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    fn extents(&self) -> Option<(Position, Position)> {
        Some((Position::from(self.min), Position::from(self.max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_contains_inclusive() {
        let bounds = BoundingBox::cube(0.0, 10.0).unwrap();
        assert!(bounds.contains(&Position::new(0.0, 10.0, 5.0)));
        assert!(!bounds.contains(&Position::new(-0.01, 5.0, 5.0)));
        assert!(!bounds.contains(&Position::new(5.0, 5.0, 10.5)));
    }

    #[test]
    fn test_box_from_args() {
        let factory = ModuleFactory::with_defaults();
        let args = ModuleArgs::of_type("box")
            .with("min", vec![0.0, 0.0, 0.0])
            .with("max", vec![4.0, 4.0, 2.0]);
        let volume = factory.create::<dyn BoundingVolume>(&args).unwrap();
        let (min, max) = volume.extents().unwrap();
        assert_eq!(min, Position::zeros());
        assert_eq!(max, Position::new(4.0, 4.0, 2.0));
    }

    #[test]
    fn test_box_rejects_inverted_bounds() {
        assert!(BoundingBox::new([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]).is_err());
        let factory = ModuleFactory::with_defaults();
        let args = ModuleArgs::of_type("box").with("min", vec![0.0, 0.0]);
        assert!(factory.create::<dyn BoundingVolume>(&args).is_err());
    }

    #[test]
    fn test_unbounded() {
        assert!(Unbounded.contains(&Position::new(1e9, -1e9, 0.0)));
        assert!(Unbounded.extents().is_none());
    }
}
