//! Common traits defining the pluggable interfaces of the planning core

use crate::common::error::PlanningResult;
use crate::common::types::*;
use crate::factory::ModuleFactory;
use crate::generators::{GeneratorBase, TraversabilityPolicy};
use crate::tree::{SegmentId, SegmentTree, TrajectorySegment};

/// Map abstraction answering traversability queries.
///
/// The core never mutates the map.
pub trait TraversabilityOracle {
    /// Distance to the closest obstacle if the point is observed, `None` if unknown
    fn query_distance(&self, point: &Position) -> Option<f64>;
}

/// Membership test restricting the sampling domain
pub trait BoundingVolume {
    fn contains(&self, point: &Position) -> bool;

    /// Axis aligned (min, max) corners when the volume is bounded
    fn extents(&self) -> Option<(Position, Position)> {
        None
    }
}

/// Everything a module may consult during one planning cycle
pub struct PlanningContext<'a> {
    pub map: &'a dyn TraversabilityOracle,
    pub current_position: Position,
    pub factory: &'a ModuleFactory,
}

impl<'a> PlanningContext<'a> {
    pub fn new(
        map: &'a dyn TraversabilityOracle,
        current_position: Position,
        factory: &'a ModuleFactory,
    ) -> Self {
        Self {
            map,
            current_position,
            factory,
        }
    }
}

/// Chooses which tree segment to expand next
pub trait SegmentSelector {
    fn select_segment(&mut self, tree: &SegmentTree, ctx: &PlanningContext<'_>) -> Option<SegmentId>;
}

/// Refreshes stale parts of the tree once per planning cycle
pub trait GeneratorUpdater {
    /// `policy` is the traversability check of the owning generator.
    fn update_segments(
        &mut self,
        tree: &mut SegmentTree,
        ctx: &PlanningContext<'_>,
        policy: &TraversabilityPolicy,
    ) -> bool;
}

/// Receives per-segment values for external rendering
pub trait SegmentObserver {
    fn visualize_value(&mut self, id: SegmentId, segment: &TrajectorySegment);
}

/// Grows the trajectory tree.
///
/// Implementors embed a [GeneratorBase] and expose it through `base`/`base_mut`;
/// selection, updating and the traversability check default to it.
pub trait TrajectoryGenerator {
    fn base(&self) -> &GeneratorBase;

    fn base_mut(&mut self) -> &mut GeneratorBase;

    /// Attempt one growth step from `target`, pushing created segments to `new_segments`.
    ///
    /// Returns `false` when no feasible segment was found; the tree is left unchanged.
    fn expand_segment(
        &mut self,
        tree: &mut SegmentTree,
        target: SegmentId,
        ctx: &PlanningContext<'_>,
        new_segments: &mut Vec<SegmentId>,
    ) -> bool;

    fn select_segment(
        &mut self,
        tree: &SegmentTree,
        ctx: &PlanningContext<'_>,
    ) -> PlanningResult<Option<SegmentId>> {
        self.base_mut().select_segment(tree, ctx)
    }

    fn update_segments(
        &mut self,
        tree: &mut SegmentTree,
        ctx: &PlanningContext<'_>,
    ) -> PlanningResult<bool> {
        self.base_mut().update_segments(tree, ctx)
    }

    /// Called before the root advances to its child at index `next`.
    ///
    /// Returns the (possibly shifted) index of that child, or `None` if the tree
    /// has to be regrown from the new position.
    fn rewire_root(
        &mut self,
        tree: &mut SegmentTree,
        next: usize,
        _ctx: &PlanningContext<'_>,
    ) -> Option<usize> {
        (next < tree.children(tree.root()).len()).then_some(next)
    }

    /// Trajectory handed to the executor
    fn extract_trajectory_to_publish(&self, segment: &TrajectorySegment) -> Trajectory {
        segment.trajectory().to_vec()
    }

    fn check_traversable(&self, position: &Position, ctx: &PlanningContext<'_>) -> bool {
        self.base().check_traversable(position, ctx)
    }
}

/// Computes gain, cost and value of segments and picks the next step
pub trait TrajectoryEvaluator {
    fn compute_gain(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool;

    fn compute_cost(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool;

    fn compute_value(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool;

    /// Index among the root's children of the segment to execute next
    fn select_next_best(&mut self, tree: &SegmentTree) -> Option<usize>;

    fn update_segments(&mut self, tree: &mut SegmentTree, ctx: &PlanningContext<'_>) -> bool;

    fn visualize_value(
        &self,
        id: SegmentId,
        segment: &TrajectorySegment,
        observer: &mut dyn SegmentObserver,
    ) {
        observer.visualize_value(id, segment);
    }
}
