//! Trajectory evaluators scoring tree segments

pub mod rrt_star_adapter;
pub mod simple;

pub use rrt_star_adapter::RrtStarEvaluatorAdapter;
pub use simple::{CostModel, GainModel, SimpleEvaluator, SimpleEvaluatorConfig, ValueModel};

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::tree::SegmentTree;

/// Index among the root's children of the informed, active child with the highest value.
///
/// Ties go to the lower cost, then to the earlier created segment.
pub fn best_child(tree: &SegmentTree) -> Option<usize> {
    tree.children(tree.root())
        .iter()
        .enumerate()
        .filter_map(|(i, &id)| tree.get(id).map(|s| (i, s)))
        .filter(|(_, s)| s.informed && s.is_active())
        .max_by_key(|(_, s)| (OrderedFloat(s.value), Reverse(OrderedFloat(s.cost)), Reverse(s.serial())))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TrajectoryPoint;
    use crate::tree::SegmentId;

    fn child(tree: &mut SegmentTree, x: f64) -> SegmentId {
        let root = tree.root();
        tree.add_child(root, vec![TrajectoryPoint::from_xyz(0.0, 0.0, 0.0), TrajectoryPoint::from_xyz(x, 0.0, 0.0)])
            .unwrap()
    }

    fn score(tree: &mut SegmentTree, id: SegmentId, value: f64, cost: f64) {
        let segment = tree.segment_mut(id).unwrap();
        segment.value = value;
        segment.cost = cost;
        segment.informed = true;
    }

    #[test]
    fn test_best_child_prefers_value_then_cost_then_age() {
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        let a = child(&mut tree, 1.0);
        let b = child(&mut tree, 2.0);
        let c = child(&mut tree, 3.0);
        score(&mut tree, a, 1.0, 1.0);
        score(&mut tree, b, 2.0, 3.0);
        score(&mut tree, c, 2.0, 2.0);
        assert_eq!(best_child(&tree), Some(2));

        score(&mut tree, b, 2.0, 2.0);
        assert_eq!(best_child(&tree), Some(1));
        // Deterministic across calls
        assert_eq!(best_child(&tree), Some(1));
    }

    #[test]
    fn test_best_child_ignores_uninformed() {
        let mut tree = SegmentTree::new(TrajectoryPoint::from_xyz(0.0, 0.0, 0.0));
        assert_eq!(best_child(&tree), None);
        let a = child(&mut tree, 1.0);
        let b = child(&mut tree, 2.0);
        assert_eq!(best_child(&tree), None);

        score(&mut tree, a, 1.0, 0.0);
        score(&mut tree, b, 5.0, 0.0);
        tree.segment_mut(b).unwrap().informed = false;
        assert_eq!(best_child(&tree), Some(0));
    }
}
