//! k-NN and range search with triangle-inequality pruning.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::index::mtree::MTree;
use crate::index::mtree::node::{Node, NodeHandle};
use crate::vector::types::rank_cmp;
use crate::vector::{SearchHit, SearchStats, Vector};

/// Relative slack added to every pruning threshold.
///
/// Lower bounds are differences of rounded distances; a bound that exceeds
/// the threshold by less than this fraction of the distances involved is not
/// trusted and the subtree is visited.
const PRUNE_SLACK: f32 = 1e-5;

/// Whether a lower bound safely rules out everything within `threshold`.
#[inline]
fn beyond(lower_bound: f32, scale: f32, threshold: f32) -> bool {
    lower_bound > threshold + PRUNE_SLACK * scale
}

/// A candidate in the k-NN result heap; the worst candidate is on top.
#[derive(Debug)]
struct Candidate {
    distance: f32,
    vector: Arc<Vector>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_cmp(self.distance, &self.vector.id, other.distance, &other.vector.id)
    }
}

/// Bounded set of the best `k` candidates seen so far.
pub(super) struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    pub(super) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(1024) + 1),
        }
    }

    /// Current pruning radius: the k-th best distance, or infinity.
    fn threshold(&self) -> f32 {
        if self.heap.len() < self.k {
            f32::INFINITY
        } else {
            self.heap.peek().map_or(f32::INFINITY, |c| c.distance)
        }
    }

    fn offer(&mut self, distance: f32, vector: &Arc<Vector>) {
        if self.heap.len() < self.k {
            self.heap.push(Candidate {
                distance,
                vector: Arc::clone(vector),
            });
            return;
        }
        let better = self.heap.peek().is_some_and(|worst| {
            rank_cmp(distance, &vector.id, worst.distance, &worst.vector.id) == Ordering::Less
        });
        if better {
            self.heap.pop();
            self.heap.push(Candidate {
                distance,
                vector: Arc::clone(vector),
            });
        }
    }

    pub(super) fn into_hits(self) -> Vec<SearchHit> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| hit(c.distance, &c.vector))
            .collect()
    }
}

fn hit(distance: f32, vector: &Vector) -> SearchHit {
    SearchHit {
        id: vector.id.clone(),
        distance,
        metadata: vector.metadata.clone(),
    }
}

impl MTree {
    /// Depth-first k-NN traversal below `handle`.
    ///
    /// `parent_distance` is the distance from the query to the routing object
    /// of `handle` (absent at the root).
    pub(super) fn knn_visit(
        &self,
        handle: NodeHandle,
        query: &[f32],
        parent_distance: Option<f32>,
        top: &mut TopK,
        stats: &mut SearchStats,
    ) {
        stats.nodes_visited += 1;
        match self.arena.get(handle) {
            Node::Leaf(entries) => {
                for entry in entries {
                    if let Some(dq) = parent_distance {
                        let bound = (dq - entry.parent_distance).abs();
                        if beyond(bound, dq + entry.parent_distance, top.threshold()) {
                            continue;
                        }
                    }
                    let distance = self.space.distance(query, &entry.vector.data);
                    stats.distance_computations += 1;
                    top.offer(distance, &entry.vector);
                }
            }
            Node::Internal(entries) => {
                let mut children = Vec::with_capacity(entries.len());
                for entry in entries {
                    if let Some(dq) = parent_distance {
                        let bound = (dq - entry.parent_distance).abs() - entry.radius;
                        let scale = dq + entry.parent_distance + entry.radius;
                        if beyond(bound, scale, top.threshold()) {
                            continue;
                        }
                    }
                    let distance = self.space.distance(query, &entry.pivot.data);
                    stats.distance_computations += 1;
                    let bound = (distance - entry.radius).max(0.0);
                    if beyond(bound, distance + entry.radius, top.threshold()) {
                        continue;
                    }
                    children.push((bound, distance, entry.radius, entry.child));
                }
                // Most promising subtree first so the threshold tightens early.
                children.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (bound, distance, radius, child) in children {
                    if beyond(bound, distance + radius, top.threshold()) {
                        break;
                    }
                    self.knn_visit(child, query, Some(distance), top, stats);
                }
            }
        }
    }

    /// Collect every vector within `radius` of `query` below `handle`.
    pub(super) fn range_visit(
        &self,
        handle: NodeHandle,
        query: &[f32],
        radius: f32,
        parent_distance: Option<f32>,
        hits: &mut Vec<SearchHit>,
        stats: &mut SearchStats,
    ) {
        stats.nodes_visited += 1;
        match self.arena.get(handle) {
            Node::Leaf(entries) => {
                for entry in entries {
                    if let Some(dq) = parent_distance {
                        let bound = (dq - entry.parent_distance).abs();
                        if beyond(bound, dq + entry.parent_distance, radius) {
                            continue;
                        }
                    }
                    let distance = self.space.distance(query, &entry.vector.data);
                    stats.distance_computations += 1;
                    if distance <= radius {
                        hits.push(hit(distance, &entry.vector));
                    }
                }
            }
            Node::Internal(entries) => {
                for entry in entries {
                    if let Some(dq) = parent_distance {
                        let bound = (dq - entry.parent_distance).abs() - entry.radius;
                        let scale = dq + entry.parent_distance + entry.radius;
                        if beyond(bound, scale, radius) {
                            continue;
                        }
                    }
                    let distance = self.space.distance(query, &entry.pivot.data);
                    stats.distance_computations += 1;
                    if beyond(distance - entry.radius, distance + entry.radius, radius) {
                        continue;
                    }
                    self.range_visit(entry.child, query, radius, Some(distance), hits, stats);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: &str) -> Arc<Vector> {
        Arc::new(Vector::new(id, vec![0.0]))
    }

    #[test]
    fn test_top_k_keeps_best_with_id_tie_break() {
        let mut top = TopK::new(2);
        assert_eq!(top.threshold(), f32::INFINITY);

        top.offer(1.0, &v("c"));
        top.offer(1.0, &v("b"));
        assert_eq!(top.threshold(), 1.0);

        // Same distance, lower id: replaces "c".
        top.offer(1.0, &v("a"));
        // Same distance, higher id: rejected.
        top.offer(1.0, &v("d"));
        top.offer(0.5, &v("z"));

        let ids: Vec<String> = top.into_hits().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["z", "a"]);
    }

    #[test]
    fn test_beyond_is_conservative() {
        assert!(!beyond(1.0, 2.0, 1.0));
        assert!(!beyond(1.0 + 1e-7, 2.0, 1.0));
        assert!(beyond(1.1, 2.0, 1.0));
        assert!(!beyond(5.0, 10.0, f32::INFINITY));
    }
}
