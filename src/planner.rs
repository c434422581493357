//! Planning driver.
//!
//! Owns the segment tree together with the generator and evaluator created from
//! the configuration, and runs them in the order: update, expand, evaluate,
//! select, re-root. All calls happen on the caller's thread.

use log::{debug, info, warn};

use crate::common::{
    PlanningContext, PlanningError, PlanningResult, Position, SegmentObserver, Trajectory, TrajectoryEvaluator,
    TrajectoryGenerator, TrajectoryPoint, TraversabilityOracle,
};
use crate::config::PlannerConfig;
use crate::factory::ModuleFactory;
use crate::tree::{SegmentId, SegmentTree};

/// Outcome of one [Planner::plan_cycle]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Segments added to the tree
    pub expanded: usize,
    pub failed_expansions: usize,
    /// Segments whose gain, cost and value were computed
    pub evaluated: usize,
    /// Segments in the tree including the root
    pub tree_size: usize,
}

/// What the agent should do next
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    Execute(Trajectory),
    /// No feasible segment; the tree was regrown from the current state.
    Replan,
}

pub struct Planner {
    config: PlannerConfig,
    factory: ModuleFactory,
    generator: Box<dyn TrajectoryGenerator>,
    evaluator: Box<dyn TrajectoryEvaluator>,
    tree: SegmentTree,
    observer: Option<Box<dyn SegmentObserver>>,
    new_segments: Vec<SegmentId>,
}

impl Planner {
    /// # Errors
    ///
    /// If the configuration is inconsistent or names modules the factory cannot create.
    pub fn new(config: PlannerConfig, factory: ModuleFactory, start: TrajectoryPoint) -> PlanningResult<Self> {
        config.validate()?;
        let generator = factory.create::<dyn TrajectoryGenerator>(&config.trajectory_generator)?;
        let evaluator = factory.create::<dyn TrajectoryEvaluator>(&config.trajectory_evaluator)?;
        info!(
            "[Planner] initialized at ({:.2}, {:.2}, {:.2})",
            start.position.x, start.position.y, start.position.z
        );
        Ok(Planner {
            config,
            factory,
            generator,
            evaluator,
            tree: SegmentTree::new(start),
            observer: None,
            new_segments: Vec::new(),
        })
    }

    pub fn set_observer(&mut self, observer: Box<dyn SegmentObserver>) {
        self.observer = Some(observer);
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn tree(&self) -> &SegmentTree {
        &self.tree
    }

    pub fn factory(&self) -> &ModuleFactory {
        &self.factory
    }

    /// Drop the tree and restart from `current`.
    pub fn reset(&mut self, current: TrajectoryPoint) {
        debug!("[Planner] resetting tree with {} segments", self.tree.len());
        self.tree.reset(current);
    }

    fn expansion_limit_reached(&self) -> bool {
        self.config.max_new_segments > 0 && self.tree.len() > self.config.max_new_segments
    }

    /// Whether enough segments exist to request the next step.
    pub fn is_ready(&mut self) -> bool {
        self.tree.len() > self.config.min_new_segments && self.evaluator.select_next_best(&self.tree).is_some()
    }

    /// Run one planning cycle against the current map.
    pub fn plan_cycle(&mut self, map: &dyn TraversabilityOracle, current: &Position) -> PlanningResult<CycleReport> {
        let ctx = PlanningContext::new(map, *current, &self.factory);
        let mut report = CycleReport::default();

        self.generator.update_segments(&mut self.tree, &ctx)?;
        self.evaluator.update_segments(&mut self.tree, &ctx);

        for _ in 0..self.config.expand_batch {
            if self.expansion_limit_reached() {
                break;
            }
            let Some(target) = self.generator.select_segment(&self.tree, &ctx)? else {
                report.failed_expansions += 1;
                continue;
            };
            self.new_segments.clear();
            if !self
                .generator
                .expand_segment(&mut self.tree, target, &ctx, &mut self.new_segments)
            {
                report.failed_expansions += 1;
                continue;
            }
            report.expanded += self.new_segments.len();
            for &id in &self.new_segments {
                if Self::evaluate(self.evaluator.as_mut(), &mut self.tree, id, &ctx, self.observer.as_mut()) {
                    report.evaluated += 1;
                }
            }
        }

        // Rewiring and map updates leave segments that need fresh scores.
        let root = self.tree.root();
        let stale: Vec<SegmentId> = self
            .tree
            .iter_depth_first()
            .filter(|(id, segment)| *id != root && !segment.informed)
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            if Self::evaluate(self.evaluator.as_mut(), &mut self.tree, id, &ctx, self.observer.as_mut()) {
                report.evaluated += 1;
            }
        }

        report.tree_size = self.tree.len();
        if self.config.verbose {
            info!("[Planner] cycle: {:?}", report);
        } else {
            debug!("[Planner] cycle: {:?}", report);
        }
        Ok(report)
    }

    /// Plan until [Planner::is_ready] or the cycle budget is spent. Returns the cycles run.
    pub fn run_until_ready(&mut self, map: &dyn TraversabilityOracle, current: &Position) -> PlanningResult<usize> {
        let mut cycles = 0;
        while cycles < self.config.max_cycle_attempts && !self.is_ready() {
            self.plan_cycle(map, current)?;
            cycles += 1;
            if self.expansion_limit_reached() {
                break;
            }
        }
        if !self.is_ready() {
            warn!("[Planner] no executable segment after {} cycles", cycles);
        }
        Ok(cycles)
    }

    /// Pick the best child of the root, advance the root to it and return its trajectory.
    ///
    /// # Errors
    ///
    /// If the tree is found in an inconsistent state after re-rooting.
    pub fn request_next(&mut self, map: &dyn TraversabilityOracle, current: &TrajectoryPoint) -> PlanningResult<NextStep> {
        let ctx = PlanningContext::new(map, current.position, &self.factory);
        let Some(next) = self.evaluator.select_next_best(&self.tree) else {
            warn!("[Planner] no informed segment to execute");
            self.tree.reset(*current);
            return Ok(NextStep::Replan);
        };
        let Some(next) = self.generator.rewire_root(&mut self.tree, next, &ctx) else {
            warn!("[Planner] selected segment became infeasible, regrowing tree");
            self.tree.reset(*current);
            return Ok(NextStep::Replan);
        };

        let root = self.tree.root();
        let child = self
            .tree
            .children(root)
            .get(next)
            .copied()
            .ok_or(PlanningError::InvalidSegment(next))?;
        let segment = self.tree.get(child).ok_or(PlanningError::InvalidSegment(child.index()))?;
        let trajectory = self.generator.extract_trajectory_to_publish(segment);
        debug!(
            "[Planner] executing segment {} (value {:.3}, {} points)",
            child.index(),
            segment.value,
            trajectory.len()
        );

        self.tree.advance_root(child)?;
        self.tree.check_invariants()?;
        Ok(NextStep::Execute(trajectory))
    }

    fn evaluate(
        evaluator: &mut dyn TrajectoryEvaluator,
        tree: &mut SegmentTree,
        id: SegmentId,
        ctx: &PlanningContext<'_>,
        observer: Option<&mut Box<dyn SegmentObserver>>,
    ) -> bool {
        let Some(segment) = tree.segment_mut(id) else {
            return false;
        };
        let scored = evaluator.compute_gain(segment, ctx)
            && evaluator.compute_cost(segment, ctx)
            && evaluator.compute_value(segment, ctx);
        segment.informed = scored;
        if let Some(observer) = observer {
            evaluator.visualize_value(id, segment, &mut **observer);
        }
        scored
    }
}
