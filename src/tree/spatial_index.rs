//! K-d tree over segment endpoints for nearest neighbour queries.
//!
//! The index remembers the tree generation it was built for and rebuilds on the
//! next query whenever the tree has changed in any other way than the insertions
//! it was told about. Stale handles therefore never leak out of a query.
//!
//! kiddo splits a full bucket on one axis and cannot do so when every point in it
//! shares that coordinate. Endpoints are stored in a fixed tilted frame, so a planar
//! or axis aligned layout does not repeat coordinates, and a point that would still
//! fill a bucket with one coordinate value goes to a linearly scanned overflow list.

use kiddo::{KdTree, SquaredEuclidean};
use log::trace;
use nalgebra::Rotation3;
use ordered_float::OrderedFloat;
use std::collections::HashMap;

use crate::common::Position;
use crate::tree::{SegmentId, SegmentTree};

// Bucket size of `kiddo::KdTree`.
const BUCKET_SIZE: usize = 32;

/// Nearest neighbour index over the active segments of a [SegmentTree]
pub struct SpatialIndex {
    kdtree: KdTree<f64, 3>,
    // Kd items are positions in `entries`.
    entries: Vec<(SegmentId, Position)>,
    overflow: Vec<usize>,
    axis_counts: [HashMap<OrderedFloat<f64>, usize>; 3],
    frame: Rotation3<f64>,
    // Generation of the tree the index matches, `None` before the first build.
    generation: Option<u64>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("generation", &self.generation)
            .field("count", &self.entries.len())
            .field("overflow", &self.overflow.len())
            .finish()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        SpatialIndex {
            kdtree: KdTree::new(),
            entries: Vec::new(),
            overflow: Vec::new(),
            axis_counts: Default::default(),
            frame: Rotation3::from_euler_angles(0.37, 0.61, 1.13),
            generation: None,
        }
    }

    /// Force a rebuild on the next query.
    pub fn invalidate(&mut self) {
        self.generation = None;
    }

    pub fn is_current(&self, tree: &SegmentTree) -> bool {
        self.generation == Some(tree.generation())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of endpoints answered by linear scan instead of the k-d tree
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    fn clear(&mut self) {
        self.kdtree = KdTree::new();
        self.entries.clear();
        self.overflow.clear();
        for counts in self.axis_counts.iter_mut() {
            counts.clear();
        }
    }

    fn local(&self, position: &Position) -> [f64; 3] {
        let local = self.frame * position;
        [local.x, local.y, local.z]
    }

    fn add(&mut self, id: SegmentId, position: Position) {
        let item = self.entries.len();
        self.entries.push((id, position));
        let local = self.local(&position);
        let crowded = local.iter().zip(self.axis_counts.iter()).any(|(value, counts)| {
            counts.get(&OrderedFloat(*value)).map_or(false, |&n| n + 1 >= BUCKET_SIZE)
        });
        if crowded {
            self.overflow.push(item);
            return;
        }
        for (value, counts) in local.iter().zip(self.axis_counts.iter_mut()) {
            *counts.entry(OrderedFloat(*value)).or_insert(0) += 1;
        }
        self.kdtree.add(&local, item as u64);
    }

    fn kd_len(&self) -> usize {
        self.entries.len() - self.overflow.len()
    }

    fn entry_distance(&self, item: usize, point: &Position) -> (SegmentId, f64) {
        let (id, position) = self.entries[item];
        (id, (position - point).norm())
    }

    /// Rebuild if the tree changed since the last build.
    pub fn sync(&mut self, tree: &SegmentTree) {
        if self.is_current(tree) {
            return;
        }
        self.clear();
        for (id, segment) in tree.iter_depth_first() {
            if segment.is_active() {
                self.add(id, segment.endpoint().position);
            }
        }
        self.generation = Some(tree.generation());
        trace!(
            "[SpatialIndex] rebuilt with {} segments ({} unindexed) at generation {}",
            self.entries.len(),
            self.overflow.len(),
            tree.generation()
        );
    }

    /// Register a segment that was just added to `tree`.
    ///
    /// Extends the index in place when that insertion is the only change since the
    /// index was last synchronised, otherwise rebuilds.
    pub fn insert(&mut self, tree: &SegmentTree, id: SegmentId) {
        let incremental = self.generation.map_or(false, |g| g + 1 == tree.generation());
        match tree.get(id) {
            Some(segment) if incremental && segment.is_active() => {
                self.add(id, segment.endpoint().position);
                self.generation = Some(tree.generation());
            }
            _ => {
                self.invalidate();
                self.sync(tree);
            }
        }
    }

    /// Closest active segment endpoint and its distance.
    pub fn nearest(&mut self, tree: &SegmentTree, point: &Position) -> Option<(SegmentId, f64)> {
        self.sync(tree);
        let from_kdtree = if self.kd_len() > 0 {
            let nearest = self.kdtree.nearest_one::<SquaredEuclidean>(&self.local(point));
            Some(nearest.item as usize)
        } else {
            None
        };
        from_kdtree
            .into_iter()
            .chain(self.overflow.iter().copied())
            .map(|item| self.entry_distance(item, point))
            .min_by_key(|(id, distance)| (OrderedFloat(*distance), *id))
    }

    /// Active segments within `radius` of `point`, closest first, at most `max_count`.
    pub fn within(
        &mut self,
        tree: &SegmentTree,
        point: &Position,
        radius: f64,
        max_count: usize,
    ) -> Vec<(SegmentId, f64)> {
        self.sync(tree);
        if self.entries.is_empty() || radius <= 0.0 {
            return Vec::new();
        }
        let mut items: Vec<usize> = self.overflow.clone();
        if self.kd_len() > 0 {
            // Slack for rounding in the tilted frame; distances are rechecked below.
            let squared = radius * radius * (1.0 + 1e-9) + 1e-12;
            items.extend(
                self.kdtree
                    .within::<SquaredEuclidean>(&self.local(point), squared)
                    .into_iter()
                    .map(|n| n.item as usize),
            );
        }
        let mut found: Vec<(SegmentId, f64)> = items
            .into_iter()
            .map(|item| self.entry_distance(item, point))
            .filter(|(_, distance)| *distance <= radius)
            .collect();
        found.sort_by_key(|(id, distance)| (OrderedFloat(*distance), *id));
        found.truncate(max_count);
        found
    }
}
