//! Policies refreshing the tree at the start of every planning cycle

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::{GeneratorUpdater, PlanningContext, PlanningResult};
use crate::config::ModuleArgs;
use crate::factory::ModuleFactory;
use crate::generators::TraversabilityPolicy;
use crate::tree::{SegmentId, SegmentTree};

/// Keeps the tree as it is
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateNothing;

impl UpdateNothing {
    pub fn create(_args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn GeneratorUpdater>> {
        Ok(Box::new(UpdateNothing))
    }
}

impl GeneratorUpdater for UpdateNothing {
    fn update_segments(&mut self, _tree: &mut SegmentTree, _ctx: &PlanningContext<'_>, _policy: &TraversabilityPolicy) -> bool {
        true
    }
}

/// Drops every segment below the root so the tree regrows each cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetTree;

impl ResetTree {
    pub fn create(_args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn GeneratorUpdater>> {
        Ok(Box::new(ResetTree))
    }
}

impl GeneratorUpdater for ResetTree {
    fn update_segments(&mut self, tree: &mut SegmentTree, _ctx: &PlanningContext<'_>, _policy: &TraversabilityPolicy) -> bool {
        let children = tree.children(tree.root()).to_vec();
        children.into_iter().all(|child| tree.prune(child).is_ok())
    }
}

/// Configuration of [RecheckCollision]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecheckCollisionConfig {
    /// Remove blocked subtrees instead of only deactivating them
    pub prune_inactive: bool,
}

impl Default for RecheckCollisionConfig {
    fn default() -> Self {
        Self { prune_inactive: true }
    }
}

/// Re-validates every trajectory against the current map.
///
/// Segments crossing space that became blocked are deactivated together with their
/// subtree and, by default, pruned.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecheckCollision {
    config: RecheckCollisionConfig,
}

impl RecheckCollision {
    pub fn new(config: RecheckCollisionConfig) -> Self {
        Self { config }
    }

    pub fn create(args: &ModuleArgs, _factory: &ModuleFactory) -> PlanningResult<Box<dyn GeneratorUpdater>> {
        Ok(Box::new(Self::new(args.parse()?)))
    }
}

impl GeneratorUpdater for RecheckCollision {
    fn update_segments(&mut self, tree: &mut SegmentTree, ctx: &PlanningContext<'_>, policy: &TraversabilityPolicy) -> bool {
        let root = tree.root();
        let mut blocked: Vec<SegmentId> = Vec::new();
        for (id, segment) in tree.iter_depth_first() {
            if id == root || !segment.is_active() {
                continue;
            }
            // Descendants of a blocked segment go with it.
            if blocked.iter().any(|&b| tree.is_ancestor(b, id)) {
                continue;
            }
            if !segment
                .trajectory()
                .iter()
                .all(|point| policy.check_traversable(&point.position, ctx))
            {
                blocked.push(id);
            }
        }

        if !blocked.is_empty() {
            debug!("[RecheckCollision] {} subtrees became blocked", blocked.len());
        }
        for id in blocked {
            if self.config.prune_inactive {
                if tree.prune(id).is_err() {
                    return false;
                }
            } else {
                tree.deactivate_subtree(id);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Position, TrajectoryPoint};
    use crate::maps::{SphereWorld, UniformMap};
    use crate::modules::bounding_volume::BoundingBox;

    fn two_branch_tree() -> (SegmentTree, SegmentId, SegmentId, SegmentId) {
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let root = tree.root();
        let start = TrajectoryPoint::from_xyz(0.0, 0.0, 0.0);
        let a = tree
            .add_child(root, vec![start, TrajectoryPoint::from_xyz(2.0, 0.0, 0.0)])
            .unwrap();
        let b = tree
            .add_child(root, vec![start, TrajectoryPoint::from_xyz(-2.0, 0.0, 0.0)])
            .unwrap();
        let c = tree
            .add_child(
                a,
                vec![TrajectoryPoint::from_xyz(2.0, 0.0, 0.0), TrajectoryPoint::from_xyz(2.0, 2.0, 0.0)],
            )
            .unwrap();
        (tree, a, b, c)
    }

    fn policy() -> TraversabilityPolicy {
        TraversabilityPolicy::new(
            false,
            0.35,
            0.0,
            Box::new(BoundingBox::cube(-10.0, 10.0).unwrap()),
        )
    }

    #[test]
    fn test_reset_tree() {
        let factory = ModuleFactory::with_defaults();
        let map = UniformMap::observed(1.0);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);
        let (mut tree, ..) = two_branch_tree();
        assert!(ResetTree.update_segments(&mut tree, &ctx, &policy()));
        assert_eq!(tree.len(), 1);
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_recheck_collision_prunes_blocked_branch() {
        let factory = ModuleFactory::with_defaults();
        let mut map = SphereWorld::new(10.0);
        map.observe(Position::zeros(), 20.0);
        map.add_obstacle(Position::new(2.0, 0.0, 0.0), 0.2);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);

        let (mut tree, a, b, c) = two_branch_tree();
        let mut updater = RecheckCollision::default();
        assert!(updater.update_segments(&mut tree, &ctx, &policy()));
        assert!(!tree.contains(a));
        assert!(!tree.contains(c));
        assert!(tree.contains(b));
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_recheck_collision_can_only_deactivate() {
        let factory = ModuleFactory::with_defaults();
        let mut map = SphereWorld::new(10.0);
        map.observe(Position::zeros(), 20.0);
        map.add_obstacle(Position::new(2.0, 0.0, 0.0), 0.2);
        let ctx = PlanningContext::new(&map, Position::zeros(), &factory);

        let (mut tree, a, b, c) = two_branch_tree();
        let mut updater = RecheckCollision::new(RecheckCollisionConfig { prune_inactive: false });
        assert!(updater.update_segments(&mut tree, &ctx, &policy()));
        assert!(!tree.get(a).unwrap().is_active());
        assert!(!tree.get(c).unwrap().is_active());
        assert!(tree.get(b).unwrap().is_active());
    }
}
