//! Top-down insertion with upward split propagation.

use std::sync::Arc;

use log::debug;

use crate::index::mtree::MTree;
use crate::index::mtree::node::{LeafEntry, Node, NodeHandle, RoutingEntry};
use crate::index::mtree::split::split;
use crate::vector::{MetricSpace, Vector};

/// A routing object produced by a split, not yet placed in a parent.
#[derive(Debug)]
struct Promoted {
    pivot: Arc<Vector>,
    radius: f32,
    child: NodeHandle,
}

impl MTree {
    /// Insert an already validated vector.
    pub(super) fn insert_arc(&mut self, vector: Arc<Vector>) {
        let root = self.root;
        if let Some((left, right)) = self.insert_at(root, &vector, None, 0.0) {
            let entries = vec![self.routing_entry(left, None), self.routing_entry(right, None)];
            self.root = self.arena.alloc(Node::Internal(entries));
            self.height += 1;
            debug!(
                "m-tree root split at {} vectors, height is now {}",
                self.vectors.len() + 1,
                self.height
            );
        }
        self.vectors.insert(vector.id.clone(), vector);
    }

    /// Insert below `handle`, whose routing object in the parent is `parent`.
    ///
    /// `parent_distance` is the distance from `vector` to `parent`. Returns
    /// the two replacement routing objects when `handle` had to split.
    fn insert_at(
        &mut self,
        handle: NodeHandle,
        vector: &Arc<Vector>,
        parent: Option<&Arc<Vector>>,
        parent_distance: f32,
    ) -> Option<(Promoted, Promoted)> {
        let descend = match self.arena.get_mut(handle) {
            Node::Leaf(entries) => {
                entries.push(LeafEntry {
                    vector: Arc::clone(vector),
                    parent_distance,
                });
                None
            }
            Node::Internal(entries) => {
                let (slot, distance) = choose_subtree(&self.space, entries, &vector.data);
                let entry = &mut entries[slot];
                if distance > entry.radius {
                    entry.radius = distance;
                }
                Some((slot, distance, entry.child, Arc::clone(&entry.pivot)))
            }
        };

        if let Some((slot, distance, child, pivot)) = descend {
            if let Some((left, right)) = self.insert_at(child, vector, Some(&pivot), distance) {
                let left = self.routing_entry(left, parent);
                let right = self.routing_entry(right, parent);
                if let Node::Internal(entries) = self.arena.get_mut(handle) {
                    entries[slot] = left;
                    entries.push(right);
                }
            }
        }

        if self.arena.get(handle).len() > self.config.capacity {
            Some(self.split_node(handle))
        } else {
            None
        }
    }

    /// Split the node at `handle`; the first half keeps the handle.
    fn split_node(&mut self, handle: NodeHandle) -> (Promoted, Promoted) {
        let policy = self.config.promotion;
        let min_fill = self.config.min_fill;
        self.splits += 1;

        match self.arena.take(handle) {
            Node::Leaf(entries) => {
                let (left, right) = split(&self.space, entries, policy, min_fill);
                self.arena.put(handle, Node::Leaf(left.members));
                let sibling = self.arena.alloc(Node::Leaf(right.members));
                (
                    Promoted {
                        pivot: left.pivot,
                        radius: left.radius,
                        child: handle,
                    },
                    Promoted {
                        pivot: right.pivot,
                        radius: right.radius,
                        child: sibling,
                    },
                )
            }
            Node::Internal(entries) => {
                let (left, right) = split(&self.space, entries, policy, min_fill);
                self.arena.put(handle, Node::Internal(left.members));
                let sibling = self.arena.alloc(Node::Internal(right.members));
                (
                    Promoted {
                        pivot: left.pivot,
                        radius: left.radius,
                        child: handle,
                    },
                    Promoted {
                        pivot: right.pivot,
                        radius: right.radius,
                        child: sibling,
                    },
                )
            }
        }
    }

    fn routing_entry(&self, promoted: Promoted, parent: Option<&Arc<Vector>>) -> RoutingEntry {
        let parent_distance = parent
            .map(|p| self.space.distance(&promoted.pivot.data, &p.data))
            .unwrap_or(0.0);
        RoutingEntry {
            pivot: promoted.pivot,
            radius: promoted.radius,
            parent_distance,
            child: promoted.child,
        }
    }
}

/// Pick the child to descend into.
///
/// Minimises the radius growth needed to cover `data`, then the distance to
/// the routing object: a covering child (growth 0) closest to `data` wins,
/// otherwise the child needing the smallest enlargement.
fn choose_subtree(space: &MetricSpace, entries: &[RoutingEntry], data: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY, f32::INFINITY);
    for (slot, entry) in entries.iter().enumerate() {
        let distance = space.distance(data, &entry.pivot.data);
        let growth = (distance - entry.radius).max(0.0);
        if growth < best.2 || (growth == best.2 && distance < best.1) {
            best = (slot, distance, growth);
        }
    }
    (best.0, best.1)
}
