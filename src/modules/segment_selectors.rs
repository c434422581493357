//! Policies choosing which tree segment to expand next

use itertools::Itertools;
use log::trace;
use ordered_float::OrderedFloat;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::{PlanningContext, PlanningError, PlanningResult, SegmentSelector};
use crate::config::{ensure_non_negative, ModuleArgs};
use crate::factory::ModuleFactory;
use crate::tree::{SegmentId, SegmentTree};

/// Always expands the root; the generator decides where to connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootSelector;

impl RootSelector {
    pub fn create(_args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn SegmentSelector>> {
        Ok(Box::new(RootSelector))
    }
}

impl SegmentSelector for RootSelector {
    fn select_segment(&mut self, tree: &SegmentTree, _ctx: &PlanningContext<'_>) -> Option<SegmentId> {
        Some(tree.root())
    }
}

/// Expands the informed, active segment with the highest value.
///
/// Ties go to the earliest created segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySelector;

impl GreedySelector {
    pub fn create(_args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn SegmentSelector>> {
        Ok(Box::new(GreedySelector))
    }
}

impl SegmentSelector for GreedySelector {
    fn select_segment(&mut self, tree: &SegmentTree, _ctx: &PlanningContext<'_>) -> Option<SegmentId> {
        tree.iter_depth_first()
            .filter(|(_, s)| s.informed && s.is_active())
            .min_by_key(|(_, s)| (std::cmp::Reverse(OrderedFloat(s.value)), s.serial()))
            .map(|(id, _)| id)
    }
}

/// Configuration of [RandomWeightedSelector]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RandomWeightedConfig {
    /// Exponent applied to segment values
    pub factor: f64,
    /// Share of the probability mass spread uniformly over all segments
    pub uniform_weight: f64,
    pub seed: Option<u64>,
}

impl Default for RandomWeightedConfig {
    fn default() -> Self {
        Self {
            factor: 2.0,
            uniform_weight: 0.0,
            seed: None,
        }
    }
}

/// Picks a segment at random with probability growing with its value
#[derive(Debug)]
pub struct RandomWeightedSelector {
    config: RandomWeightedConfig,
    rng: StdRng,
}

impl RandomWeightedSelector {
    /// # Errors
    ///
    /// If `factor` is negative or `uniform_weight` lies outside [0, 1].
    pub fn new(config: RandomWeightedConfig) -> PlanningResult<Self> {
        ensure_non_negative("factor", config.factor)?;
        if !(0.0..=1.0).contains(&config.uniform_weight) {
            return Err(PlanningError::invalid_parameter("uniform_weight", "must lie in [0, 1]"));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }

    pub fn create(args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn SegmentSelector>> {
        Ok(Box::new(Self::new(args.parse()?)?))
    }
}

impl SegmentSelector for RandomWeightedSelector {
    fn select_segment(&mut self, tree: &SegmentTree, _ctx: &PlanningContext<'_>) -> Option<SegmentId> {
        let (ids, values): (Vec<SegmentId>, Vec<f64>) = tree
            .iter_depth_first()
            .filter(|(_, s)| s.is_active())
            .map(|(id, s)| {
                let value = if s.informed { s.value.max(0.0) } else { 0.0 };
                (id, value.powf(self.config.factor))
            })
            .unzip();
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return Some(tree.root());
        }

        let uniform = self.config.uniform_weight / ids.len() as f64;
        let weights = values
            .iter()
            .map(|v| uniform + (1.0 - self.config.uniform_weight) * v / total)
            .collect_vec();
        let distribution = WeightedIndex::new(&weights).ok()?;
        let selected = ids[distribution.sample(&mut self.rng)];
        trace!("[RandomWeightedSelector] picked segment {}", selected.index());
        Some(selected)
    }
}
