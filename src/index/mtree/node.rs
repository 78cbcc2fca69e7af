//! Node storage for the M-Tree.
//!
//! Nodes live in a flat arena and refer to their children by handle. Parents
//! own their children exclusively; no node knows its parent, so restructuring
//! after a split only rewrites handles.

use std::sync::Arc;

use crate::vector::Vector;

/// Index of a node inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeHandle(pub(super) usize);

/// A stored vector and its distance to the routing object of its node.
#[derive(Debug, Clone)]
pub(crate) struct LeafEntry {
    pub vector: Arc<Vector>,
    pub parent_distance: f32,
}

/// A routing object guarding one child subtree.
#[derive(Debug, Clone)]
pub(crate) struct RoutingEntry {
    pub pivot: Arc<Vector>,
    /// Upper bound on the distance from `pivot` to any vector below `child`.
    pub radius: f32,
    pub parent_distance: f32,
    pub child: NodeHandle,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Leaf(Vec<LeafEntry>),
    Internal(Vec<RoutingEntry>),
}

impl Node {
    pub fn len(&self) -> usize {
        match self {
            Node::Leaf(entries) => entries.len(),
            Node::Internal(entries) => entries.len(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}

/// Anything a split can redistribute between two nodes.
pub(crate) trait Member {
    /// The object distances are measured from.
    fn object(&self) -> &Arc<Vector>;

    /// How far below the object the entry reaches (its covering radius).
    fn reach(&self) -> f32;

    fn set_parent_distance(&mut self, distance: f32);
}

impl Member for LeafEntry {
    fn object(&self) -> &Arc<Vector> {
        &self.vector
    }

    fn reach(&self) -> f32 {
        0.0
    }

    fn set_parent_distance(&mut self, distance: f32) {
        self.parent_distance = distance;
    }
}

impl Member for RoutingEntry {
    fn object(&self) -> &Arc<Vector> {
        &self.pivot
    }

    fn reach(&self) -> f32 {
        self.radius
    }

    fn set_parent_distance(&mut self, distance: f32) {
        self.parent_distance = distance;
    }
}

/// Owner of every node of one tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn alloc(&mut self, node: Node) -> NodeHandle {
        self.nodes.push(node);
        NodeHandle(self.nodes.len() - 1)
    }

    pub fn get(&self, handle: NodeHandle) -> &Node {
        &self.nodes[handle.0]
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> &mut Node {
        &mut self.nodes[handle.0]
    }

    /// Move a node's contents out, leaving an empty leaf in its slot.
    pub fn take(&mut self, handle: NodeHandle) -> Node {
        std::mem::replace(&mut self.nodes[handle.0], Node::Leaf(Vec::new()))
    }

    pub fn put(&mut self, handle: NodeHandle, node: Node) {
        self.nodes[handle.0] = node;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }
}
