//! Evaluator adapter for rewiring generators.
//!
//! RRT* replaces the trajectory leading to a segment whenever it rewires it, so
//! only the endpoint of a segment is stable. The adapter hands the wrapped
//! evaluator a view of the segment reduced to its last point and restores the
//! full trajectory afterwards.

use std::fmt;

use crate::common::{PlanningContext, PlanningResult, SegmentObserver, TrajectoryEvaluator};
use crate::config::ModuleArgs;
use crate::factory::ModuleFactory;
use crate::tree::{SegmentId, SegmentTree, TrajectorySegment};

pub struct RrtStarEvaluatorAdapter {
    following: Box<dyn TrajectoryEvaluator>,
}

impl RrtStarEvaluatorAdapter {
    pub fn new(following: Box<dyn TrajectoryEvaluator>) -> Self {
        RrtStarEvaluatorAdapter { following }
    }

    /// Wraps the evaluator described by the `following_evaluator` table.
    pub fn create(args: &ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Box<dyn TrajectoryEvaluator>> {
        let following = factory.create::<dyn TrajectoryEvaluator>(&args.sub_module("following_evaluator")?)?;
        Ok(Box::new(Self::new(following)))
    }
}

impl fmt::Debug for RrtStarEvaluatorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RrtStarEvaluatorAdapter").finish_non_exhaustive()
    }
}

impl TrajectoryEvaluator for RrtStarEvaluatorAdapter {
    fn compute_gain(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool {
        let following = &mut self.following;
        segment.with_endpoint_view(|view| following.compute_gain(view, ctx))
    }

    fn compute_cost(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool {
        let following = &mut self.following;
        segment.with_endpoint_view(|view| following.compute_cost(view, ctx))
    }

    fn compute_value(&mut self, segment: &mut TrajectorySegment, ctx: &PlanningContext<'_>) -> bool {
        let following = &mut self.following;
        segment.with_endpoint_view(|view| following.compute_value(view, ctx))
    }

    fn select_next_best(&mut self, tree: &SegmentTree) -> Option<usize> {
        super::best_child(tree)
    }

    fn update_segments(&mut self, tree: &mut SegmentTree, ctx: &PlanningContext<'_>) -> bool {
        self.following.update_segments(tree, ctx)
    }

    fn visualize_value(&self, id: SegmentId, segment: &TrajectorySegment, observer: &mut dyn SegmentObserver) {
        self.following.visualize_value(id, segment, observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Position, TrajectoryPoint};
    use crate::maps::UniformMap;
    use approx::assert_relative_eq;

    fn adapter_with(following: ModuleArgs) -> Box<dyn TrajectoryEvaluator> {
        let factory = ModuleFactory::with_defaults();
        factory
            .create::<dyn TrajectoryEvaluator>(
                &ModuleArgs::of_type("rrt_star_adapter").with_module("following_evaluator", following),
            )
            .unwrap()
    }

    #[test]
    fn test_scores_endpoint_only() {
        let factory = ModuleFactory::with_defaults();
        let map = UniformMap::observed(1.0);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let root = tree.root();
        let id = tree
            .add_child(root, vec![TrajectoryPoint::from_xyz(0.0, 0.0, 0.0), TrajectoryPoint::from_xyz(2.0, 0.0, 0.0)])
            .unwrap();

        let mut adapter = adapter_with(ModuleArgs::of_type("simple").with("cost_model", "distance"));
        let segment = tree.segment_mut(id).unwrap();
        assert!(adapter.compute_cost(segment, &ctx));
        // The view has no extent; the full trajectory is restored afterwards.
        assert_relative_eq!(segment.cost, 0.0);
        assert_eq!(segment.trajectory().len(), 2);

        let mut adapter = adapter_with(ModuleArgs::of_type("simple"));
        adapter.compute_cost(segment, &ctx);
        assert_relative_eq!(segment.cost, 2.0);
    }

    #[test]
    fn test_default_following_evaluator() {
        let factory = ModuleFactory::with_defaults();
        let map = UniformMap::unknown();
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);
        let mut adapter = factory
            .create::<dyn TrajectoryEvaluator>(&ModuleArgs::of_type("rrt_star_adapter"))
            .unwrap();
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let root = tree.root();
        let id = tree
            .add_child(root, vec![TrajectoryPoint::from_xyz(0.0, 0.0, 0.0), TrajectoryPoint::from_xyz(1.0, 0.0, 0.0)])
            .unwrap();
        let segment = tree.segment_mut(id).unwrap();
        assert!(adapter.compute_gain(segment, &ctx));
        assert!(segment.gain > 0.0);
    }

    #[test]
    fn test_unknown_following_evaluator() {
        let factory = ModuleFactory::with_defaults();
        let args = ModuleArgs::of_type("rrt_star_adapter").with_module("following_evaluator", ModuleArgs::of_type("oracle"));
        assert!(factory.create::<dyn TrajectoryEvaluator>(&args).is_err());
    }

    #[test]
    fn test_select_next_best_among_root_children() {
        let mut adapter = adapter_with(ModuleArgs::of_type("simple"));
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let root = tree.root();
        for (x, value) in [(1.0, 3.0), (2.0, 5.0)] {
            let id = tree
                .add_child(root, vec![TrajectoryPoint::from_xyz(0.0, 0.0, 0.0), TrajectoryPoint::from_xyz(x, 0.0, 0.0)])
                .unwrap();
            let segment = tree.segment_mut(id).unwrap();
            segment.value = value;
            segment.informed = true;
        }
        assert_eq!(adapter.select_next_best(&tree), Some(1));
    }
}
