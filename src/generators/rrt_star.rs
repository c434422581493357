//! RRT* extension of the RRT generator
//!
//! New segments are connected to the neighbour that minimizes their cost to come,
//! neighbours are rewired through new segments when that is cheaper, and when the
//! root advances the branches that would otherwise be discarded are moved below the
//! new root where possible.
//!
//! Evaluation must be based on segment endpoints only (see
//! [RrtStarEvaluatorAdapter](crate::evaluators::RrtStarEvaluatorAdapter)), since
//! rewiring replaces the trajectories leading to them.

use itertools::Itertools;
use log::{debug, trace, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::common::{PlanningContext, PlanningError, PlanningResult, Position, TrajectoryGenerator};
use crate::config::{ensure_positive, ModuleArgs};
use crate::factory::ModuleFactory;
use crate::generators::{GeneratorBase, Rrt};
use crate::tree::{SegmentId, SegmentTree, TREE_TOLERANCE};

/// Rewiring parameters for [RrtStar]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RrtStarConfig {
    /// Move the siblings of the executed segment below the new root when it advances
    pub rewire_root: bool,
    /// Rewire existing neighbours through newly added segments
    pub rewire_intermediate: bool,
    /// Distance within which rewiring is possible [m], defaults to the extension range + 0.1
    pub max_rewire_range: Option<f64>,
    /// Number of nearest neighbours considered for rewiring
    pub n_neighbors: usize,
}

impl Default for RrtStarConfig {
    fn default() -> Self {
        Self {
            rewire_root: true,
            rewire_intermediate: true,
            max_rewire_range: None,
            n_neighbors: 10,
        }
    }
}

/// RRT* trajectory generator
#[derive(Debug)]
pub struct RrtStar {
    rrt: Rrt,
    config: RrtStarConfig,
    max_rewire_range: f64,
}

impl RrtStar {
    /// # Errors
    ///
    /// If the rewire range is not positive or no neighbours are allowed.
    pub fn new(rrt: Rrt, config: RrtStarConfig) -> PlanningResult<Self> {
        let max_rewire_range = config
            .max_rewire_range
            .unwrap_or(rrt.config().max_extension_range + 0.1);
        ensure_positive("max_rewire_range", max_rewire_range)?;
        if config.n_neighbors == 0 {
            return Err(PlanningError::invalid_parameter("n_neighbors", "must be at least 1"));
        }
        Ok(RrtStar {
            rrt,
            config,
            max_rewire_range,
        })
    }

    pub fn from_args(args: &ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Self> {
        Self::new(Rrt::from_args(args, factory)?, args.parse()?)
    }

    pub fn create(args: &ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Box<dyn TrajectoryGenerator>> {
        Ok(Box::new(Self::from_args(args, factory)?))
    }

    pub fn config(&self) -> &RrtStarConfig {
        &self.config
    }

    pub fn max_rewire_range(&self) -> f64 {
        self.max_rewire_range
    }

    /// Segments within the rewire range of `point`, closest first and at most
    /// `n_neighbors` of them. Returns `false` if there are none.
    pub fn find_nearby_candidates(&mut self, tree: &SegmentTree, point: &Position, result: &mut Vec<SegmentId>) -> bool {
        let found = self
            .rrt
            .index_mut()
            .within(tree, point, self.max_rewire_range, self.config.n_neighbors);
        result.extend(found.into_iter().map(|(id, _)| id));
        !result.is_empty()
    }

    /// Reparent `segment` below the candidate that gives it the lowest cost to come.
    ///
    /// Only applied if that cost is strictly lower than the current one. Returns
    /// whether the segment was rewired.
    pub fn rewire_to_best_parent(
        &self,
        tree: &mut SegmentTree,
        segment: SegmentId,
        candidates: &[SegmentId],
        ctx: &PlanningContext<'_>,
    ) -> bool {
        self.rewire_to_best_parent_with(tree, segment, candidates, ctx, false)
    }

    fn rewire_to_best_parent_with(
        &self,
        tree: &mut SegmentTree,
        segment: SegmentId,
        candidates: &[SegmentId],
        ctx: &PlanningContext<'_>,
        force: bool,
    ) -> bool {
        if segment == tree.root() {
            return false;
        }
        let (Some(current_cost), Some(endpoint)) = (tree.cost_to_come(segment), tree.endpoint(segment).copied()) else {
            return false;
        };
        let current_parent = tree.parent(segment);

        // Cheapest candidates first; the first feasible connection wins.
        let ranked = candidates
            .iter()
            .copied()
            .filter(|&c| c != segment && Some(c) != current_parent && !tree.is_ancestor(segment, c))
            .filter_map(|c| {
                let parent = tree.get(c)?;
                if !parent.is_active() {
                    return None;
                }
                let cost = parent.cost_to_come()
                    + SegmentTree::local_cost(&parent.endpoint().position, &endpoint.position);
                Some((c, cost))
            })
            .filter(|&(_, cost)| force || cost < current_cost - TREE_TOLERANCE)
            .sorted_by_key(|&(c, cost)| (OrderedFloat(cost), c))
            .collect_vec();

        for (candidate, cost) in ranked {
            let Some(trajectory) = self.rrt.connect(tree, candidate, &endpoint.position, ctx) else {
                continue;
            };
            match tree.reparent(segment, candidate, trajectory) {
                Ok(()) => {
                    trace!(
                        "[RrtStar] rewired {} below {} ({:.3} -> {:.3})",
                        segment.index(),
                        candidate.index(),
                        current_cost,
                        cost
                    );
                    return true;
                }
                Err(e) => warn!("[RrtStar] rewiring {} failed: {}", segment.index(), e),
            }
        }
        false
    }

    /// Move a freshly inserted segment below its cheapest neighbour, then (with
    /// `rewire_intermediate`) move neighbours below it where that is cheaper.
    /// Returns the number of neighbours rewired through it.
    fn rewire_new_segment(&mut self, tree: &mut SegmentTree, id: SegmentId, ctx: &PlanningContext<'_>) -> usize {
        let Some(endpoint) = tree.endpoint(id).map(|p| p.position) else {
            return 0;
        };
        let mut candidates = Vec::new();
        // Without neighbours the segment simply keeps its RRT parent.
        if !self.find_nearby_candidates(tree, &endpoint, &mut candidates) {
            return 0;
        }
        candidates.retain(|&c| c != id);
        self.rewire_to_best_parent(tree, id, &candidates, ctx);
        if !self.config.rewire_intermediate {
            return 0;
        }
        let rewired = self.rewire_intermediate(tree, id, &candidates, ctx);
        if rewired > 0 {
            trace!("[RrtStar] rewired {} neighbours through {}", rewired, id.index());
        }
        rewired
    }

    /// Rewire the neighbours of `new_segment` through it where that is cheaper.
    fn rewire_intermediate(
        &self,
        tree: &mut SegmentTree,
        new_segment: SegmentId,
        neighbours: &[SegmentId],
        ctx: &PlanningContext<'_>,
    ) -> usize {
        let root = tree.root();
        let mut rewired = 0;
        for &neighbour in neighbours {
            if neighbour != new_segment
                && neighbour != root
                && self.rewire_to_best_parent(tree, neighbour, &[new_segment], ctx)
            {
                rewired += 1;
            }
        }
        rewired
    }
}

impl TrajectoryGenerator for RrtStar {
    fn base(&self) -> &GeneratorBase {
        self.rrt.base()
    }

    fn base_mut(&mut self) -> &mut GeneratorBase {
        self.rrt.base_mut()
    }

    fn expand_segment(
        &mut self,
        tree: &mut SegmentTree,
        target: SegmentId,
        ctx: &PlanningContext<'_>,
        new_segments: &mut Vec<SegmentId>,
    ) -> bool {
        let first_new = new_segments.len();
        if !self.rrt.expand_segment(tree, target, ctx, new_segments) {
            return false;
        }

        for id in new_segments[first_new..].to_vec() {
            self.rewire_new_segment(tree, id, ctx);
        }
        true
    }

    /// Rescued siblings take the cheapest surviving parent even when that raises their
    /// cost-to-come, so this is the one rewiring step that may increase costs.
    fn rewire_root(&mut self, tree: &mut SegmentTree, next: usize, ctx: &PlanningContext<'_>) -> Option<usize> {
        let root = tree.root();
        let children = tree.children(root).to_vec();
        let next_root = *children.get(next)?;
        let next_position = tree.endpoint(next_root)?.position;
        if !self.check_traversable(&next_position, ctx) {
            warn!("[RrtStar] next segment {} is no longer traversable", next_root.index());
            tree.deactivate_subtree(next_root);
            return None;
        }

        if self.config.rewire_root {
            let mut to_rewire: Vec<SegmentId> = children.into_iter().filter(|&c| c != next_root).collect();
            let mut rescued = 0;
            let mut rewired_something = true;
            while rewired_something && !to_rewire.is_empty() {
                rewired_something = false;
                let mut remaining = Vec::with_capacity(to_rewire.len());
                for segment in to_rewire {
                    let Some(position) = tree.endpoint(segment).map(|p| p.position) else {
                        continue;
                    };
                    // Only parents that survive the re-rooting qualify.
                    let candidates = self
                        .rrt
                        .index_mut()
                        .within(tree, &position, self.max_rewire_range, usize::MAX)
                        .into_iter()
                        .map(|(id, _)| id)
                        .filter(|&c| c == next_root || tree.is_ancestor(next_root, c))
                        .take(self.config.n_neighbors)
                        .collect_vec();
                    if self.rewire_to_best_parent_with(tree, segment, &candidates, ctx, true) {
                        rescued += 1;
                        rewired_something = true;
                    } else {
                        remaining.push(segment);
                    }
                }
                to_rewire = remaining;
            }
            debug!(
                "[RrtStar] kept {} branches alive, {} will be pruned",
                rescued,
                to_rewire.len()
            );
        }

        tree.children(root).iter().position(|&c| c == next_root)
    }
}
