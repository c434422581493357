//! State and behaviour shared by all trajectory generators

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::{
    BoundingVolume, GeneratorUpdater, PlanningContext, PlanningResult, Position, SegmentSelector,
};
use crate::config::{ensure_non_negative, ModuleArgs};
use crate::factory::{LazyModule, ModuleFactory};
use crate::modules::system_constraints::SystemConstraints;
use crate::tree::{SegmentId, SegmentTree};

/// Traversability parameters common to every generator
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorBaseConfig {
    /// Treat unknown space as free
    pub collision_optimistic: bool,
    /// Minimum clearance to observed obstacles [m]
    pub collision_radius: f64,
    /// Unknown space within this distance of the agent counts as free [m]
    pub clearing_radius: f64,
}

impl Default for GeneratorBaseConfig {
    fn default() -> Self {
        Self {
            collision_optimistic: false,
            collision_radius: 0.35,
            clearing_radius: 0.0,
        }
    }
}

impl GeneratorBaseConfig {
    /// # Errors
    ///
    /// If a radius is negative.
    pub fn validate(&self) -> PlanningResult<()> {
        ensure_non_negative("collision_radius", self.collision_radius)?;
        ensure_non_negative("clearing_radius", self.clearing_radius)
    }
}

/// Decides whether the agent may occupy a position
pub struct TraversabilityPolicy {
    pub collision_optimistic: bool,
    pub collision_radius: f64,
    pub clearing_radius: f64,
    bounding_volume: Box<dyn BoundingVolume>,
}

impl fmt::Debug for TraversabilityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversabilityPolicy")
            .field("collision_optimistic", &self.collision_optimistic)
            .field("collision_radius", &self.collision_radius)
            .field("clearing_radius", &self.clearing_radius)
            .finish()
    }
}

impl TraversabilityPolicy {
    pub fn new(
        collision_optimistic: bool,
        collision_radius: f64,
        clearing_radius: f64,
        bounding_volume: Box<dyn BoundingVolume>,
    ) -> Self {
        Self {
            collision_optimistic,
            collision_radius,
            clearing_radius,
            bounding_volume,
        }
    }

    pub fn bounding_volume(&self) -> &dyn BoundingVolume {
        self.bounding_volume.as_ref()
    }

    /// Each rule is only consulted when the previous ones are inconclusive:
    /// bounding volume, observed distance, clearing radius, optimism.
    pub fn check_traversable(&self, position: &Position, ctx: &PlanningContext<'_>) -> bool {
        if !self.bounding_volume.contains(position) {
            return false;
        }
        if let Some(distance) = ctx.map.query_distance(position) {
            return distance > self.collision_radius;
        }
        if self.clearing_radius > 0.0 && (ctx.current_position - position).norm() < self.clearing_radius {
            return true;
        }
        self.collision_optimistic
    }
}

/// Shared generator state: traversability policy, system constraints and the lazily
/// created segment selector and generator updater.
#[derive(Debug)]
pub struct GeneratorBase {
    pub policy: TraversabilityPolicy,
    pub constraints: SystemConstraints,
    selector: LazyModule<dyn SegmentSelector>,
    updater: LazyModule<dyn GeneratorUpdater>,
}

impl GeneratorBase {
    /// Read the common parameters and nested module arguments from `args`.
    ///
    /// The bounding volume and system constraints are created immediately; the
    /// selector and updater are only validated and created on first use.
    ///
    /// # Errors
    ///
    /// If a parameter is invalid or a nested module cannot be created.
    pub fn from_args(args: &ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Self> {
        let config: GeneratorBaseConfig = args.parse()?;
        config.validate()?;
        let bounding_volume = factory.create::<dyn BoundingVolume>(&args.sub_module("bounding_volume")?)?;
        let constraints = *factory.create::<SystemConstraints>(&args.sub_module("system_constraints")?)?;
        let selector = LazyModule::pending(args.sub_module("segment_selector")?, factory)?;
        let updater = LazyModule::pending(args.sub_module("generator_updater")?, factory)?;
        debug!(
            "[GeneratorBase] collision_radius={:.2} clearing_radius={:.2} optimistic={}",
            config.collision_radius, config.clearing_radius, config.collision_optimistic
        );

        Ok(GeneratorBase {
            policy: TraversabilityPolicy::new(
                config.collision_optimistic,
                config.collision_radius,
                config.clearing_radius,
                bounding_volume,
            ),
            constraints,
            selector,
            updater,
        })
    }

    pub fn check_traversable(&self, position: &Position, ctx: &PlanningContext<'_>) -> bool {
        self.policy.check_traversable(position, ctx)
    }

    pub fn bounding_volume(&self) -> &dyn BoundingVolume {
        self.policy.bounding_volume()
    }

    pub fn select_segment(&mut self, tree: &SegmentTree, ctx: &PlanningContext<'_>) -> PlanningResult<Option<SegmentId>> {
        let selector = self.selector.get_or_create(ctx.factory)?;
        Ok(selector.select_segment(tree, ctx))
    }

    pub fn update_segments(&mut self, tree: &mut SegmentTree, ctx: &PlanningContext<'_>) -> PlanningResult<bool> {
        let updater = self.updater.get_or_create(ctx.factory)?;
        Ok(updater.update_segments(tree, ctx, &self.policy))
    }

    pub fn selector_resolved(&self) -> bool {
        self.selector.is_resolved()
    }

    pub fn updater_resolved(&self) -> bool {
        self.updater.is_resolved()
    }
}
