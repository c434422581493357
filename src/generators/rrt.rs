//! RRT (Rapidly-exploring Random Tree) expansion of the segment tree
//!
//! Every expansion draws a goal inside the bounding volume, connects it with a
//! straight, collision checked line from the closest segment of the target's
//! subtree and appends the result as a new segment.

use log::{debug, trace, warn};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::common::{PlanningContext, PlanningError, PlanningResult, Position, Trajectory, TrajectoryGenerator};
use crate::config::{ensure_non_negative, ensure_positive, ModuleArgs};
use crate::factory::ModuleFactory;
use crate::generators::GeneratorBase;
use crate::tree::{SegmentId, SegmentTree, SpatialIndex, TREE_TOLERANCE};

/// How expansion goals are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Uniformly inside the bounding volume's extents
    Uniform,
    /// Normally distributed around the agent's current position
    Gaussian,
}

/// Configuration for the RRT generator
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RrtConfig {
    /// Maximum length of a new segment [m], 0 for unlimited
    pub max_extension_range: f64,
    /// Spacing of collision checks and trajectory points [m]
    pub path_resolution: f64,
    /// Sampling attempts per expansion
    pub maximum_tries: usize,
    pub sampling_mode: SamplingMode,
    /// Standard deviation of gaussian sampling [m]
    pub sampling_std_dev: f64,
    /// Shorten blocked connections instead of discarding them
    pub crop_segments: bool,
    /// Distance kept from the first blocked point when cropping [m]
    pub crop_margin: f64,
    /// Minimum length of a cropped segment [m]
    pub min_path_length: f64,
    /// Seed for reproducible sampling
    pub seed: Option<u64>,
}

impl Default for RrtConfig {
    fn default() -> Self {
        Self {
            max_extension_range: 1.0,
            path_resolution: 0.1,
            maximum_tries: 100,
            sampling_mode: SamplingMode::Uniform,
            sampling_std_dev: 2.0,
            crop_segments: false,
            crop_margin: 0.3,
            min_path_length: 0.5,
            seed: None,
        }
    }
}

impl RrtConfig {
    /// # Errors
    ///
    /// If a length is negative, the resolution is not positive or no tries are allowed.
    pub fn validate(&self) -> PlanningResult<()> {
        ensure_non_negative("max_extension_range", self.max_extension_range)?;
        ensure_positive("path_resolution", self.path_resolution)?;
        ensure_positive("sampling_std_dev", self.sampling_std_dev)?;
        ensure_non_negative("crop_margin", self.crop_margin)?;
        ensure_non_negative("min_path_length", self.min_path_length)?;
        if self.maximum_tries == 0 {
            return Err(PlanningError::invalid_parameter("maximum_tries", "must be at least 1"));
        }
        Ok(())
    }
}

/// RRT trajectory generator
#[derive(Debug)]
pub struct Rrt {
    base: GeneratorBase,
    config: RrtConfig,
    index: SpatialIndex,
    rng: StdRng,
}

impl Rrt {
    /// # Errors
    ///
    /// If the configuration is invalid or uniform sampling is requested inside an
    /// unbounded volume.
    pub fn new(base: GeneratorBase, config: RrtConfig) -> PlanningResult<Self> {
        config.validate()?;
        if config.sampling_mode == SamplingMode::Uniform && base.bounding_volume().extents().is_none() {
            return Err(PlanningError::invalid_parameter(
                "sampling_mode",
                "uniform sampling requires a bounded bounding_volume",
            ));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Rrt {
            base,
            config,
            index: SpatialIndex::new(),
            rng,
        })
    }

    pub fn from_args(args: &ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Self> {
        let base = GeneratorBase::from_args(args, factory)?;
        Self::new(base, args.parse()?)
    }

    pub fn create(args: &ModuleArgs, factory: &ModuleFactory) -> PlanningResult<Box<dyn TrajectoryGenerator>> {
        Ok(Box::new(Self::from_args(args, factory)?))
    }

    pub fn config(&self) -> &RrtConfig {
        &self.config
    }

    pub fn index_mut(&mut self) -> &mut SpatialIndex {
        &mut self.index
    }

    /// Draw one goal; `None` if it fell outside the bounding volume.
    fn sample_goal(&mut self, ctx: &PlanningContext<'_>) -> Option<Position> {
        let goal = match self.config.sampling_mode {
            SamplingMode::Uniform => {
                let (min, max) = self.base.bounding_volume().extents()?;
                Position::new(
                    self.rng.gen_range(min.x..=max.x),
                    self.rng.gen_range(min.y..=max.y),
                    self.rng.gen_range(min.z..=max.z),
                )
            }
            SamplingMode::Gaussian => {
                let normal = Normal::new(0.0, self.config.sampling_std_dev).ok()?;
                ctx.current_position
                    + Position::new(
                        normal.sample(&mut self.rng),
                        normal.sample(&mut self.rng),
                        normal.sample(&mut self.rng),
                    )
            }
        };
        self.base.bounding_volume().contains(&goal).then_some(goal)
    }

    /// Closest active segment to `goal` inside the subtree of `target`.
    fn nearest_in_subtree(&mut self, tree: &SegmentTree, target: SegmentId, goal: &Position) -> Option<(SegmentId, f64)> {
        if target == tree.root() {
            return self.index.nearest(tree, goal);
        }
        tree.subtree(target)
            .into_iter()
            .filter_map(|id| tree.get(id).map(|s| (id, s)))
            .filter(|(_, s)| s.is_active())
            .map(|(id, s)| (id, (s.endpoint().position - goal).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn straight_line(start: &Position, end: &Position, length: f64, resolution: f64) -> Vec<Position> {
        let distance = (end - start).norm();
        if distance < TREE_TOLERANCE || length <= 0.0 {
            return vec![*start];
        }
        let direction = (end - start) / distance;
        let steps = (length / resolution).ceil().max(1.0) as usize;
        (0..=steps)
            .map(|i| start + direction * (length * i as f64 / steps as f64))
            .collect()
    }

    /// Steer from `parent` towards `goal`, honouring the extension range and cropping.
    fn steer(&self, tree: &SegmentTree, parent: SegmentId, goal: &Position, ctx: &PlanningContext<'_>) -> Option<Trajectory> {
        let start = tree.endpoint(parent)?.at_start();
        let distance = (goal - start.position).norm();
        let mut length = if self.config.max_extension_range > 0.0 {
            distance.min(self.config.max_extension_range)
        } else {
            distance
        };

        let mut positions = Self::straight_line(&start.position, goal, length, self.config.path_resolution);
        if let Some(blocked) = positions
            .iter()
            .skip(1)
            .position(|p| !self.base.check_traversable(p, ctx))
        {
            if !self.config.crop_segments {
                return None;
            }
            // `blocked` indexes the slice without the start point, so it is also the
            // index of the last free position.
            let free_length = length * blocked as f64 / (positions.len() - 1) as f64;
            length = free_length - self.config.crop_margin;
            if length < self.config.min_path_length || length < TREE_TOLERANCE {
                return None;
            }
            positions = Self::straight_line(&start.position, goal, length, self.config.path_resolution);
            trace!("[Rrt] cropped segment to {:.2}m", length);
        }
        Some(self.base.constraints.build_trajectory(&start, &positions))
    }

    /// Collision checked straight connection from `from` to `to` without length limit.
    ///
    /// A zero-length connection is feasible and consists of a single point.
    pub fn connect(&self, tree: &SegmentTree, from: SegmentId, to: &Position, ctx: &PlanningContext<'_>) -> Option<Trajectory> {
        let start = tree.endpoint(from)?.at_start();
        let distance = (to - start.position).norm();
        if distance < TREE_TOLERANCE {
            return Some(vec![start]);
        }
        let mut positions = Self::straight_line(&start.position, to, distance, self.config.path_resolution);
        if !positions.iter().skip(1).all(|p| self.base.check_traversable(p, ctx)) {
            return None;
        }
        // Pin the final point exactly onto the existing endpoint.
        if let Some(last) = positions.last_mut() {
            *last = *to;
        }
        Some(self.base.constraints.build_trajectory(&start, &positions))
    }
}

impl TrajectoryGenerator for Rrt {
    fn base(&self) -> &GeneratorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut GeneratorBase {
        &mut self.base
    }

    fn expand_segment(
        &mut self,
        tree: &mut SegmentTree,
        target: SegmentId,
        ctx: &PlanningContext<'_>,
        new_segments: &mut Vec<SegmentId>,
    ) -> bool {
        if !tree.contains(target) {
            warn!("[Rrt] expansion target {} is not part of the tree", target.index());
            return false;
        }
        for _ in 0..self.config.maximum_tries {
            let Some(goal) = self.sample_goal(ctx) else {
                continue;
            };
            if !self.config.crop_segments && !self.base.check_traversable(&goal, ctx) {
                continue;
            }
            let Some((parent, distance)) = self.nearest_in_subtree(tree, target, &goal) else {
                continue;
            };
            // Duplicate samples add no new information.
            if distance < TREE_TOLERANCE {
                continue;
            }
            let Some(trajectory) = self.steer(tree, parent, &goal, ctx) else {
                continue;
            };
            match tree.add_child(parent, trajectory) {
                Ok(id) => {
                    self.index.insert(tree, id);
                    new_segments.push(id);
                    trace!("[Rrt] added segment {} below {}", id.index(), parent.index());
                    return true;
                }
                Err(e) => warn!("[Rrt] rejected connection: {}", e),
            }
        }
        debug!("[Rrt] no feasible expansion after {} tries", self.config.maximum_tries);
        false
    }
}
