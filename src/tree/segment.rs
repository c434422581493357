//! Arena-backed trajectory segment tree.
//!
//! Segments live in a slot vector and refer to each other by [SegmentId]; detaching
//! and attaching a subtree is an index reassignment. Every structural change bumps
//! [SegmentTree::generation] so that derived structures (the spatial index, pending
//! expansion goals) can detect that they are stale.

use log::trace;

use crate::common::{Position, PlanningError, PlanningResult, Trajectory, TrajectoryPoint};

/// Tolerance for trajectory continuity and cost-to-come checks
pub const TREE_TOLERANCE: f64 = 1e-6;

/// Stable handle of a segment inside a [SegmentTree]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(usize);

impl SegmentId {
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn from_index(index: usize) -> Self {
        SegmentId(index)
    }
}

/// One edge-plus-endpoint of the candidate tree
#[derive(Debug, Clone)]
pub struct TrajectorySegment {
    /// Expected information gain of executing this segment
    pub gain: f64,
    /// Expected expenditure of executing this segment
    pub cost: f64,
    /// Ranking score combining gain and cost
    pub value: f64,
    /// Whether gain/cost/value are up to date
    pub informed: bool,

    trajectory: Trajectory,
    active: bool,
    parent: Option<SegmentId>,
    // Ordered to keep traversals and tie-breaks deterministic.
    children: Vec<SegmentId>,
    cost_to_come: f64,
    serial: u64,
}

impl TrajectorySegment {
    fn new(trajectory: Trajectory, parent: Option<SegmentId>, cost_to_come: f64, serial: u64) -> Self {
        TrajectorySegment {
            gain: 0.0,
            cost: 0.0,
            value: 0.0,
            informed: false,
            trajectory,
            active: true,
            parent,
            children: Vec::new(),
            cost_to_come,
            serial,
        }
    }

    pub fn trajectory(&self) -> &[TrajectoryPoint] {
        &self.trajectory
    }

    /// Last state of the trajectory
    pub fn endpoint(&self) -> &TrajectoryPoint {
        // Trajectories are validated non-empty on insertion.
        &self.trajectory[self.trajectory.len() - 1]
    }

    pub fn parent(&self) -> Option<SegmentId> {
        self.parent
    }

    pub fn children(&self) -> &[SegmentId] {
        &self.children
    }

    pub fn cost_to_come(&self) -> f64 {
        self.cost_to_come
    }

    /// Creation order within the owning tree
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Run `f` while the trajectory is reduced to its last point.
    ///
    /// The full trajectory is restored afterwards.
    pub fn with_endpoint_view<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let full = std::mem::take(&mut self.trajectory);
        if let Some(last) = full.last() {
            self.trajectory.push(*last);
        }
        let result = f(self);
        self.trajectory = full;
        result
    }
}

/// DFS iterator over a [SegmentTree], children visited in insertion order
pub struct DepthFirstIterator<'a> {
    tree: &'a SegmentTree,
    stack: Vec<SegmentId>,
}

impl<'a> Iterator for DepthFirstIterator<'a> {
    type Item = (SegmentId, &'a TrajectorySegment);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let segment = self.tree.get(id)?;
        // Reverse so that the left-most child is processed first
        self.stack.extend(segment.children.iter().rev().copied());
        Some((id, segment))
    }
}

/// Tree of candidate trajectories rooted at the agent's current state
#[derive(Debug, Clone)]
pub struct SegmentTree {
    slots: Vec<Option<TrajectorySegment>>,
    free: Vec<usize>,
    root: SegmentId,
    len: usize,
    generation: u64,
    next_serial: u64,
}

impl SegmentTree {
    /// Construct a tree whose root holds the single state `root_point`.
    pub fn new(root_point: TrajectoryPoint) -> Self {
        let mut root = TrajectorySegment::new(vec![root_point.at_start()], None, 0.0, 0);
        root.informed = true;
        SegmentTree {
            slots: vec![Some(root)],
            free: Vec::new(),
            root: SegmentId(0),
            len: 1,
            generation: 0,
            next_serial: 1,
        }
    }

    /// Drop all segments and restart from `root_point`.
    pub fn reset(&mut self, root_point: TrajectoryPoint) {
        let generation = self.generation + 1;
        *self = SegmentTree::new(root_point);
        self.generation = generation;
    }

    pub fn root(&self) -> SegmentId {
        self.root
    }

    /// Number of live segments, root included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len <= 1
    }

    /// Counter bumped on every structural change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: SegmentId) -> Option<&TrajectorySegment> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Mutable access for scoring; structure can only change through the tree.
    pub fn segment_mut(&mut self, id: SegmentId) -> Option<&mut TrajectorySegment> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    pub fn parent(&self, id: SegmentId) -> Option<SegmentId> {
        self.get(id).and_then(|s| s.parent)
    }

    pub fn children(&self, id: SegmentId) -> &[SegmentId] {
        self.get(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn endpoint(&self, id: SegmentId) -> Option<&TrajectoryPoint> {
        self.get(id).map(|s| s.endpoint())
    }

    pub fn cost_to_come(&self, id: SegmentId) -> Option<f64> {
        self.get(id).map(|s| s.cost_to_come)
    }

    /// Cost of connecting two states, shared by insertion and rewiring
    pub fn local_cost(from: &Position, to: &Position) -> f64 {
        (to - from).norm()
    }

    pub fn iter_depth_first(&self) -> DepthFirstIterator<'_> {
        DepthFirstIterator {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// All segments of the subtree rooted at `id`, in depth first order
    pub fn subtree(&self, id: SegmentId) -> Vec<SegmentId> {
        if !self.contains(id) {
            return Vec::new();
        }
        DepthFirstIterator {
            tree: self,
            stack: vec![id],
        }
        .map(|(id, _)| id)
        .collect()
    }

    /// True if `ancestor` lies on the path from `id` to the root (exclusive of `id`).
    pub fn is_ancestor(&self, ancestor: SegmentId, id: SegmentId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Append `trajectory` as a new child of `parent`.
    ///
    /// # Errors
    ///
    /// If the parent is not in the tree, the trajectory is empty, or it does not
    /// start at the parent's endpoint.
    pub fn add_child(&mut self, parent: SegmentId, trajectory: Trajectory) -> PlanningResult<SegmentId> {
        let parent_segment = self.live(parent)?;
        Self::check_continuity(parent, parent_segment.endpoint(), &trajectory)?;
        let cost_to_come = parent_segment.cost_to_come
            + Self::local_cost(
                &parent_segment.endpoint().position,
                &trajectory[trajectory.len() - 1].position,
            );

        let segment = TrajectorySegment::new(trajectory, Some(parent), cost_to_come, self.next_serial);
        self.next_serial += 1;
        let id = self.alloc(segment);
        self.live_mut(parent)?.children.push(id);
        self.len += 1;
        self.generation += 1;
        Ok(id)
    }

    /// Move `id` (with its subtree) below `new_parent`, replacing its trajectory.
    ///
    /// The segment is detached before it is attached, cost-to-come is recomputed for
    /// the whole subtree and the subtree is marked not informed.
    ///
    /// # Errors
    ///
    /// If `id` is the root, either segment is missing, `new_parent` lies inside the
    /// subtree of `id`, or the trajectory does not join the two endpoints.
    pub fn reparent(&mut self, id: SegmentId, new_parent: SegmentId, trajectory: Trajectory) -> PlanningResult<()> {
        if id == self.root {
            return Err(PlanningError::invariant(id.0, "the root cannot be reparented"));
        }
        if id == new_parent || self.is_ancestor(id, new_parent) {
            return Err(PlanningError::invariant(id.0, "reparenting would create a cycle"));
        }
        let endpoint = *self.live(id)?.endpoint();
        let parent_endpoint = *self.live(new_parent)?.endpoint();
        Self::check_continuity(new_parent, &parent_endpoint, &trajectory)?;
        if trajectory[trajectory.len() - 1].distance(&endpoint) > TREE_TOLERANCE {
            return Err(PlanningError::invariant(id.0, "new trajectory does not end at the segment endpoint"));
        }

        if let Some(old_parent) = self.live(id)?.parent {
            self.live_mut(old_parent)?.children.retain(|&c| c != id);
        }
        self.live_mut(new_parent)?.children.push(id);
        let cost_to_come = self.live(new_parent)?.cost_to_come
            + Self::local_cost(&parent_endpoint.position, &endpoint.position);
        let segment = self.live_mut(id)?;
        segment.parent = Some(new_parent);
        segment.trajectory = trajectory;
        segment.cost_to_come = cost_to_come;

        self.propagate_cost_to_leaves(id);
        self.invalidate_subtree(id);
        self.generation += 1;
        trace!("[SegmentTree] reparented {} under {} (cost {:.3})", id.0, new_parent.0, cost_to_come);
        Ok(())
    }

    /// Remove `id` and everything below it.
    ///
    /// # Errors
    ///
    /// If `id` is the root or not in the tree.
    pub fn prune(&mut self, id: SegmentId) -> PlanningResult<()> {
        if id == self.root {
            return Err(PlanningError::invariant(id.0, "the root cannot be pruned"));
        }
        if let Some(parent) = self.live(id)?.parent {
            self.live_mut(parent)?.children.retain(|&c| c != id);
        }
        self.release_subtree(id);
        self.generation += 1;
        Ok(())
    }

    /// Make `child` (a child of the root) the new root.
    ///
    /// The new root is installed first; the old root and its other subtrees are
    /// pruned afterwards. Cost-to-come values below the new root are recomputed
    /// relative to it, which leaves every descendant not informed.
    ///
    /// # Errors
    ///
    /// If `child` is not a direct child of the root.
    pub fn advance_root(&mut self, child: SegmentId) -> PlanningResult<()> {
        let old_root = self.root;
        if self.parent(child) != Some(old_root) {
            return Err(PlanningError::invariant(child.0, "new root must be a child of the current root"));
        }

        let segment = self.live_mut(child)?;
        let endpoint = segment.endpoint().at_start();
        segment.trajectory = vec![endpoint];
        segment.parent = None;
        segment.cost_to_come = 0.0;
        self.root = child;
        self.propagate_cost_to_leaves(child);
        self.invalidate_subtree(child);
        if let Some(root) = self.segment_mut(child) {
            root.informed = true;
        }

        let siblings: Vec<SegmentId> = self
            .live(old_root)?
            .children
            .iter()
            .copied()
            .filter(|&c| c != child)
            .collect();
        for sibling in siblings {
            self.release_subtree(sibling);
        }
        self.slots[old_root.0] = None;
        self.free.push(old_root.0);
        self.len -= 1;
        self.generation += 1;
        Ok(())
    }

    /// Mark `id` and its descendants inactive.
    pub fn deactivate_subtree(&mut self, id: SegmentId) {
        for member in self.subtree(id) {
            if let Some(segment) = self.segment_mut(member) {
                segment.active = false;
            }
        }
        self.generation += 1;
    }

    /// Clear `informed` for `id` and its descendants.
    pub fn invalidate_subtree(&mut self, id: SegmentId) {
        for member in self.subtree(id) {
            if let Some(segment) = self.segment_mut(member) {
                segment.informed = false;
            }
        }
    }

    /// Clear `informed` for every segment except the root.
    pub fn invalidate_all(&mut self) {
        let root = self.root;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(segment) = slot {
                if index != root.0 {
                    segment.informed = false;
                }
            }
        }
    }

    /// Verify single root, acyclicity, parent/child symmetry, trajectory continuity
    /// and cost-to-come consistency.
    ///
    /// # Errors
    ///
    /// Names the first offending segment.
    pub fn check_invariants(&self) -> PlanningResult<()> {
        let root = self.live(self.root)?;
        if root.parent.is_some() {
            return Err(PlanningError::invariant(self.root.0, "root has a parent"));
        }

        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![self.root];
        let mut count = 0;
        while let Some(id) = stack.pop() {
            if visited[id.0] {
                return Err(PlanningError::invariant(id.0, "segment reachable twice"));
            }
            visited[id.0] = true;
            count += 1;

            let segment = self.live(id)?;
            if segment.trajectory.is_empty() {
                return Err(PlanningError::invariant(id.0, "empty trajectory"));
            }
            for &child in &segment.children {
                let child_segment = self.live(child)?;
                if child_segment.parent != Some(id) {
                    return Err(PlanningError::invariant(child.0, "parent back-reference mismatch"));
                }
                Self::check_continuity(id, segment.endpoint(), &child_segment.trajectory)?;
                let expected = segment.cost_to_come
                    + Self::local_cost(&segment.endpoint().position, &child_segment.endpoint().position);
                if (child_segment.cost_to_come - expected).abs() > TREE_TOLERANCE {
                    return Err(PlanningError::invariant(
                        child.0,
                        format!("cost to come {:.6} != {:.6}", child_segment.cost_to_come, expected),
                    ));
                }
                stack.push(child);
            }
        }

        if count != self.len {
            return Err(PlanningError::invariant(
                self.root.0,
                format!("{} segments reachable, {} stored", count, self.len),
            ));
        }
        Ok(())
    }

    fn live(&self, id: SegmentId) -> PlanningResult<&TrajectorySegment> {
        self.get(id).ok_or(PlanningError::InvalidSegment(id.0))
    }

    fn live_mut(&mut self, id: SegmentId) -> PlanningResult<&mut TrajectorySegment> {
        self.segment_mut(id).ok_or(PlanningError::InvalidSegment(id.0))
    }

    fn alloc(&mut self, segment: TrajectorySegment) -> SegmentId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(segment);
                SegmentId(index)
            }
            None => {
                self.slots.push(Some(segment));
                SegmentId(self.slots.len() - 1)
            }
        }
    }

    // Frees the slots of a subtree that has already been detached from its parent.
    fn release_subtree(&mut self, id: SegmentId) {
        for member in self.subtree(id) {
            self.slots[member.0] = None;
            self.free.push(member.0);
            self.len -= 1;
        }
    }

    fn propagate_cost_to_leaves(&mut self, id: SegmentId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let (base_cost, base_point, children) = match self.get(current) {
                Some(s) => (s.cost_to_come, s.endpoint().position, s.children.clone()),
                None => continue,
            };
            for child in children {
                if let Some(segment) = self.segment_mut(child) {
                    segment.cost_to_come =
                        base_cost + Self::local_cost(&base_point, &segment.endpoint().position);
                    stack.push(child);
                }
            }
        }
    }

    fn check_continuity(parent: SegmentId, parent_end: &TrajectoryPoint, trajectory: &[TrajectoryPoint]) -> PlanningResult<()> {
        match trajectory.first() {
            None => Err(PlanningError::invariant(parent.0, "child trajectory is empty")),
            Some(first) if first.distance(parent_end) > TREE_TOLERANCE => Err(PlanningError::invariant(
                parent.0,
                "child trajectory does not start at the parent endpoint",
            )),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(from: [f64; 3], to: [f64; 3]) -> Trajectory {
        vec![
            TrajectoryPoint::from_xyz(from[0], from[1], from[2]),
            TrajectoryPoint::from_xyz(to[0], to[1], to[2]),
        ]
    }

    fn sample_tree() -> (SegmentTree, Vec<SegmentId>) {
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let root = tree.root();
        let a = tree.add_child(root, line([0.0, 0.0, 0.0], [1.0, 0.0, 0.0])).unwrap();
        let b = tree.add_child(root, line([0.0, 0.0, 0.0], [0.0, 2.0, 0.0])).unwrap();
        let c = tree.add_child(a, line([1.0, 0.0, 0.0], [2.0, 0.0, 0.0])).unwrap();
        let d = tree.add_child(b, line([0.0, 2.0, 0.0], [0.0, 3.0, 0.0])).unwrap();
        (tree, vec![a, b, c, d])
    }

    #[test]
    fn test_add_child_cost_to_come() {
        let (tree, ids) = sample_tree();
        assert_eq!(tree.len(), 5);
        assert_relative_eq!(tree.cost_to_come(ids[2]).unwrap(), 2.0);
        assert_relative_eq!(tree.cost_to_come(ids[3]).unwrap(), 3.0);
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_add_child_rejects_discontinuous_trajectory() {
        let (mut tree, ids) = sample_tree();
        let before = tree.generation();
        assert!(tree.add_child(ids[0], line([5.0, 0.0, 0.0], [6.0, 0.0, 0.0])).is_err());
        assert!(tree.add_child(ids[0], Vec::new()).is_err());
        assert_eq!(tree.generation(), before);
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_tree_dfs() {
        let (tree, ids) = sample_tree();
        let order: Vec<SegmentId> = tree.iter_depth_first().map(|(id, _)| id).collect();
        assert_eq!(order, vec![tree.root(), ids[0], ids[2], ids[1], ids[3]]);
    }

    #[test]
    fn test_reparent_updates_subtree() {
        let (mut tree, ids) = sample_tree();
        tree.segment_mut(ids[3]).unwrap().informed = true;
        // Move b (0,2,0) below a (1,0,0)
        tree.reparent(ids[1], ids[0], line([1.0, 0.0, 0.0], [0.0, 2.0, 0.0])).unwrap();

        assert_eq!(tree.parent(ids[1]), Some(ids[0]));
        assert!(!tree.children(tree.root()).contains(&ids[1]));
        let expected = 1.0 + 5.0_f64.sqrt();
        assert_relative_eq!(tree.cost_to_come(ids[1]).unwrap(), expected);
        assert_relative_eq!(tree.cost_to_come(ids[3]).unwrap(), expected + 1.0);
        assert!(!tree.get(ids[3]).unwrap().informed);
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_reparent_rejects_cycle() {
        let (mut tree, ids) = sample_tree();
        let result = tree.reparent(ids[0], ids[2], line([2.0, 0.0, 0.0], [1.0, 0.0, 0.0]));
        assert!(matches!(result, Err(PlanningError::InvariantViolation { .. })));
        assert_eq!(tree.parent(ids[0]), Some(tree.root()));
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_prune_removes_subtree() {
        let (mut tree, ids) = sample_tree();
        tree.prune(ids[0]).unwrap();
        assert_eq!(tree.len(), 3);
        assert!(!tree.contains(ids[0]));
        assert!(!tree.contains(ids[2]));
        assert!(tree.prune(tree.root()).is_err());
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_advance_root_keeps_relative_costs() {
        let (mut tree, ids) = sample_tree();
        tree.advance_root(ids[1]).unwrap();

        assert_eq!(tree.root(), ids[1]);
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(ids[0]));
        assert!(!tree.contains(ids[2]));
        assert_eq!(tree.get(ids[1]).unwrap().trajectory().len(), 1);
        assert_relative_eq!(tree.cost_to_come(ids[3]).unwrap(), 1.0);
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_advance_root_invalidates_descendants() {
        let (mut tree, ids) = sample_tree();
        for &id in &ids {
            tree.segment_mut(id).unwrap().informed = true;
        }
        tree.advance_root(ids[1]).unwrap();
        assert!(tree.get(ids[1]).unwrap().informed);
        assert!(!tree.get(ids[3]).unwrap().informed);
        assert!(tree
            .iter_depth_first()
            .filter(|(id, _)| *id != tree.root())
            .all(|(_, segment)| !segment.informed));
    }

    #[test]
    fn test_advance_root_requires_child_of_root() {
        let (mut tree, ids) = sample_tree();
        assert!(tree.advance_root(ids[2]).is_err());
        assert!(tree.check_invariants().is_ok());
    }

    #[test]
    fn test_slot_reuse_after_prune() {
        let (mut tree, ids) = sample_tree();
        let generation = tree.generation();
        tree.prune(ids[3]).unwrap();
        let e = tree.add_child(ids[1], line([0.0, 2.0, 0.0], [0.0, 2.0, 1.0])).unwrap();
        assert_eq!(e, ids[3]);
        assert!(tree.generation() >= generation + 2);
        assert!(tree.get(e).unwrap().serial() > tree.get(ids[2]).unwrap().serial());
    }

    #[test]
    fn test_endpoint_view_restores_trajectory() {
        let (mut tree, ids) = sample_tree();
        let segment = tree.segment_mut(ids[0]).unwrap();
        let len = segment.with_endpoint_view(|s| s.trajectory().len());
        assert_eq!(len, 1);
        assert_eq!(segment.trajectory().len(), 2);
    }

    #[test]
    fn test_invalidate_all_keeps_root() {
        let (mut tree, ids) = sample_tree();
        for &id in &ids {
            tree.segment_mut(id).unwrap().informed = true;
        }
        tree.invalidate_all();
        assert!(tree.get(tree.root()).unwrap().informed);
        assert!(ids.iter().all(|&id| !tree.get(id).unwrap().informed));
    }
}
