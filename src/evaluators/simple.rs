//! Composable gain, cost and value computation

use log::trace;
use serde::{Deserialize, Serialize};

use crate::common::{
    trajectory_duration, trajectory_length, PlanningContext, PlanningResult, Position, TrajectoryEvaluator,
};
use crate::config::{ensure_non_negative, ensure_positive, ModuleArgs};
use crate::factory::ModuleFactory;
use crate::tree::{SegmentTree, TrajectorySegment};

/// How the information gain of a segment is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GainModel {
    /// Unknown volume within the sensor range of the endpoint
    UnknownVolume,
    /// Fixed gain for every segment
    Constant,
}

/// How the cost of a segment is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostModel {
    /// Path length from the root
    CostToCome,
    /// Length of the segment's own trajectory
    Distance,
    /// Execution time of the segment's own trajectory
    Time,
}

/// How gain and cost combine into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueModel {
    /// `gain - cost_weight * cost`
    Linear,
    /// `gain * exp(-cost_weight * cost)`
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimpleEvaluatorConfig {
    pub gain_model: GainModel,
    pub cost_model: CostModel,
    pub value_model: ValueModel,
    pub cost_weight: f64,
    /// Radius of the volume considered for gain [m]
    pub sensor_range: f64,
    /// Lattice spacing of the gain volume [m]
    pub gain_resolution: f64,
    pub constant_gain: f64,
    /// Mark every segment as not informed at each update
    pub reevaluate: bool,
}

impl Default for SimpleEvaluatorConfig {
    fn default() -> Self {
        Self {
            gain_model: GainModel::UnknownVolume,
            cost_model: CostModel::CostToCome,
            value_model: ValueModel::Linear,
            cost_weight: 1.0,
            sensor_range: 3.0,
            gain_resolution: 0.5,
            constant_gain: 1.0,
            reevaluate: false,
        }
    }
}

impl SimpleEvaluatorConfig {
    pub fn validate(&self) -> PlanningResult<()> {
        ensure_non_negative("cost_weight", self.cost_weight)?;
        ensure_positive("sensor_range", self.sensor_range)?;
        ensure_positive("gain_resolution", self.gain_resolution)
    }
}

#[derive(Debug, Clone)]
pub struct SimpleEvaluator {
    config: SimpleEvaluatorConfig,
    // Lattice offsets inside the sensor sphere, computed once.
    offsets: Vec<Position>,
}

impl SimpleEvaluator {
    pub fn new(config: SimpleEvaluatorConfig) -> PlanningResult<Self> {
        config.validate()?;
        let offsets = Self::sphere_offsets(config.sensor_range, config.gain_resolution);
        Ok(SimpleEvaluator { config, offsets })
    }

    pub fn create(args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn TrajectoryEvaluator>> {
        Ok(Box::new(Self::new(args.parse()?)?))
    }

    pub fn config(&self) -> &SimpleEvaluatorConfig {
        &self.config
    }

    fn sphere_offsets(range: f64, resolution: f64) -> Vec<Position> {
        let n = (range / resolution).floor() as i64;
        let mut offsets = Vec::new();
        for i in -n..=n {
            for j in -n..=n {
                for k in -n..=n {
                    let offset = Position::new(i as f64, j as f64, k as f64) * resolution;
                    if offset.norm() <= range {
                        offsets.push(offset);
                    }
                }
            }
        }
        offsets
    }

    fn unknown_volume(&self, center: &Position, ctx: &PlanningContext<'_>) -> f64 {
        let unknown = self
            .offsets
            .iter()
            .filter(|offset| ctx.map.query_distance(&(center + *offset)).is_none())
            .count();
        unknown as f64 * self.config.gain_resolution.powi(3)
    }
}

impl TrajectoryEvaluator for SimpleEvaluator {
    fn compute_gain(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool {
        segment.gain = match self.config.gain_model {
            GainModel::UnknownVolume => self.unknown_volume(&segment.endpoint().position, ctx),
            GainModel::Constant => self.config.constant_gain,
        };
        true
    }

    fn compute_cost(&mut self, segment: &mut TrajectorySegment, _ctx: &PlanningContext<'_>) -> bool {
        segment.cost = match self.config.cost_model {
            CostModel::CostToCome => segment.cost_to_come(),
            CostModel::Distance => trajectory_length(segment.trajectory()),
            CostModel::Time => trajectory_duration(segment.trajectory()),
        };
        true
    }

    fn compute_value(&mut self, segment: &mut TrajectorySegment, _ctx: &PlanningContext<'_>) -> bool {
        let weighted_cost = self.config.cost_weight * segment.cost;
        segment.value = match self.config.value_model {
            ValueModel::Linear => segment.gain - weighted_cost,
            ValueModel::Exponential => segment.gain * (-weighted_cost).exp(),
        };
        true
    }

    fn select_next_best(&mut self, tree: &SegmentTree) -> Option<usize> {
        super::best_child(tree)
    }

    fn update_segments(&mut self, tree: &mut SegmentTree, _ctx: &PlanningContext<'_>) -> bool {
        if self.config.reevaluate {
            trace!("[SimpleEvaluator] reevaluating {} segments", tree.len());
            tree.invalidate_all();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TrajectoryPoint;
    use crate::maps::{SphereWorld, UniformMap};
    use approx::assert_relative_eq;

    fn evaluator(args: ModuleArgs) -> SimpleEvaluator {
        SimpleEvaluator::new(args.parse().unwrap()).unwrap()
    }

    fn segment_tree() -> (SegmentTree, crate::tree::SegmentId) {
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let root = tree.root();
        let first = tree
            .add_child(root, vec![TrajectoryPoint::from_xyz(0.0, 0.0, 0.0), TrajectoryPoint::from_xyz(3.0, 0.0, 0.0)])
            .unwrap();
        let second = tree
            .add_child(
                first,
                vec![
                    TrajectoryPoint::new(Position::new(3.0, 0.0, 0.0), 0.0, 0.0),
                    TrajectoryPoint::new(Position::new(3.0, 4.0, 0.0), 0.0, 2.5),
                ],
            )
            .unwrap();
        (tree, second)
    }

    #[test]
    fn test_invalid_config() {
        assert!(SimpleEvaluator::new(SimpleEvaluatorConfig {
            gain_resolution: 0.0,
            ..Default::default()
        })
        .is_err());
        assert!(SimpleEvaluator::new(SimpleEvaluatorConfig {
            cost_weight: -1.0,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_parse_models() {
        let config: SimpleEvaluatorConfig = ModuleArgs::of_type("simple")
            .with("gain_model", "constant")
            .with("cost_model", "time")
            .with("value_model", "exponential")
            .parse()
            .unwrap();
        assert_eq!(config.gain_model, GainModel::Constant);
        assert_eq!(config.cost_model, CostModel::Time);
        assert_eq!(config.value_model, ValueModel::Exponential);
    }

    #[test]
    fn test_unknown_volume_gain() {
        let factory = ModuleFactory::with_defaults();
        let mut eval = evaluator(ModuleArgs::new().with("sensor_range", 1.0).with("gain_resolution", 1.0));
        let (mut tree, id) = segment_tree();

        // Centre plus the six face neighbours lie within 1m.
        let unknown = UniformMap::unknown();
        let ctx = PlanningContext::new(&unknown, Position::zeros(), &factory);
        assert!(eval.compute_gain(tree.segment_mut(id).unwrap(), &ctx));
        assert_relative_eq!(tree.get(id).unwrap().gain, 7.0);

        let known = UniformMap::observed(2.0);
        let ctx = PlanningContext::new(&known, Position::zeros(), &factory);
        eval.compute_gain(tree.segment_mut(id).unwrap(), &ctx);
        assert_relative_eq!(tree.get(id).unwrap().gain, 0.0);

        // Only the cell below the endpoint is observed.
        let mut world = SphereWorld::new(5.0);
        world.observe(Position::new(3.0, 4.0, -10.0), 9.5);
        let ctx = PlanningContext::new(&world, Position::zeros(), &factory);
        eval.compute_gain(tree.segment_mut(id).unwrap(), &ctx);
        assert_relative_eq!(tree.get(id).unwrap().gain, 6.0);
    }

    #[test]
    fn test_cost_models() {
        let factory = ModuleFactory::with_defaults();
        let map = UniformMap::observed(1.0);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);
        let (mut tree, id) = segment_tree();

        let expected = [(CostModel::CostToCome, 7.0), (CostModel::Distance, 4.0), (CostModel::Time, 2.5)];
        for (model, cost) in expected {
            let mut eval = SimpleEvaluator::new(SimpleEvaluatorConfig {
                cost_model: model,
                ..Default::default()
            })
            .unwrap();
            eval.compute_cost(tree.segment_mut(id).unwrap(), &ctx);
            assert_relative_eq!(tree.get(id).unwrap().cost, cost);
        }
    }

    #[test]
    fn test_value_models() {
        let factory = ModuleFactory::with_defaults();
        let map = UniformMap::observed(1.0);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);
        let (mut tree, id) = segment_tree();
        let segment = tree.segment_mut(id).unwrap();
        segment.gain = 10.0;
        segment.cost = 2.0;

        let mut linear = evaluator(ModuleArgs::new().with("cost_weight", 0.5));
        linear.compute_value(segment, &ctx);
        assert_relative_eq!(segment.value, 9.0);

        let mut exponential = evaluator(ModuleArgs::new().with("value_model", "exponential"));
        exponential.compute_value(segment, &ctx);
        assert_relative_eq!(segment.value, 10.0 * (-2.0_f64).exp());
    }

    #[test]
    fn test_reevaluate_marks_segments() {
        let factory = ModuleFactory::with_defaults();
        let map = UniformMap::observed(1.0);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);
        let (mut tree, id) = segment_tree();
        tree.segment_mut(id).unwrap().informed = true;

        let mut keep = evaluator(ModuleArgs::new());
        assert!(!keep.update_segments(&mut tree, &ctx));
        assert!(tree.get(id).unwrap().informed);

        let mut reevaluate = evaluator(ModuleArgs::new().with("reevaluate", true));
        assert!(reevaluate.update_segments(&mut tree, &ctx));
        assert!(!tree.get(id).unwrap().informed);
    }
}
