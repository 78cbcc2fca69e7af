//! M-Tree metric index.
//!
//! A balanced tree over an arbitrary metric space. Leaves hold vectors,
//! internal nodes hold routing objects with a covering radius: every vector
//! below a routing object lies within that radius of it. Searches use the
//! triangle inequality to skip subtrees that cannot contain a result.
//!
//! # Module Structure
//!
//! - `node`: Arena-allocated nodes and entries
//! - `insert`: Top-down insertion, split propagation
//! - `split`: Promotion and balanced partition
//! - `search`: k-NN and range traversal

mod insert;
mod node;
mod search;
mod split;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};
use crate::index::config::MTreeConfig;
use crate::index::mtree::node::{Arena, Node, NodeHandle};
use crate::index::mtree::search::TopK;
use crate::vector::{Metric, MetricSpace, QueryResult, SearchStats, Vector, VectorId};

/// Relative tolerance used when verifying cached distances and radii.
const CHECK_TOLERANCE: f32 = 1e-4;

/// Result of inserting a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// The vector was added.
    Inserted,
    /// A vector with the same id and identical coordinates was already
    /// stored; nothing changed.
    AlreadyPresent,
}

/// Structural statistics of an M-Tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of stored vectors.
    pub vectors: usize,
    /// Number of nodes (leaves included).
    pub nodes: usize,
    /// Number of leaf nodes.
    pub leaves: usize,
    /// Node splits performed since the tree was (re)built.
    pub splits: u64,
    /// Edges on every root-to-leaf path.
    pub height: usize,
    /// Node capacity.
    pub capacity: usize,
}

/// A single-writer M-Tree.
///
/// Mutation takes `&mut self` and queries `&self`; shards wrap the tree in a
/// read/write lock so a split never interleaves with a traversal.
#[derive(Debug, Clone)]
pub struct MTree {
    config: MTreeConfig,
    space: MetricSpace,
    arena: Arena,
    root: NodeHandle,
    height: usize,
    vectors: AHashMap<VectorId, Arc<Vector>>,
    splits: u64,
}

impl MTree {
    /// Create an empty tree using the configured built-in metric.
    pub fn new(config: MTreeConfig) -> Result<Self> {
        config.validate()?;
        let space = MetricSpace::new(config.dimension, config.distance_metric)?;
        Ok(Self::with_space(config, space))
    }

    /// Create an empty tree over a custom metric.
    ///
    /// The metric must satisfy the triangle inequality; pruning relies on it.
    pub fn with_metric(config: MTreeConfig, metric: Arc<dyn Metric>) -> Result<Self> {
        config.validate()?;
        let space = MetricSpace::with_metric(config.dimension, metric)?;
        Ok(Self::with_space(config, space))
    }

    fn with_space(config: MTreeConfig, space: MetricSpace) -> Self {
        let mut arena = Arena::default();
        let root = arena.alloc(Node::Leaf(Vec::new()));
        Self {
            config,
            space,
            arena,
            root,
            height: 0,
            vectors: AHashMap::new(),
            splits: 0,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &MTreeConfig {
        &self.config
    }

    /// Get the metric space.
    pub fn space(&self) -> &MetricSpace {
        &self.space
    }

    /// Insert a vector.
    ///
    /// Re-inserting an id with bit-identical coordinates is a no-op that
    /// returns [`InsertOutcome::AlreadyPresent`]; re-inserting it with
    /// different coordinates fails with [`XiphosError::DuplicateId`].
    pub fn insert(&mut self, vector: Vector) -> Result<InsertOutcome> {
        vector.validate_id()?;
        self.space.validate(&vector.data)?;

        if let Some(existing) = self.vectors.get(&vector.id) {
            if existing.same_coordinates(&vector.data) {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            return Err(XiphosError::DuplicateId(vector.id));
        }

        self.insert_arc(Arc::new(vector));
        Ok(InsertOutcome::Inserted)
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Results are ordered by ascending distance, ties by ascending id. Fewer
    /// than `k` hits are returned when the tree holds fewer vectors.
    pub fn search_knn(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        if k == 0 {
            return Err(XiphosError::invalid_argument("k must be at least 1"));
        }
        self.space.validate(query)?;

        let start = Instant::now();
        let mut stats = SearchStats::default();
        let mut top = TopK::new(k);
        if !self.vectors.is_empty() {
            self.knn_visit(self.root, query, None, &mut top, &mut stats);
        }
        stats.search_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(QueryResult {
            hits: top.into_hits(),
            stats,
        })
    }

    /// Find every vector within `radius` of `query` (inclusive).
    pub fn search_range(&self, query: &[f32], radius: f32) -> Result<QueryResult> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(XiphosError::invalid_argument(format!(
                "radius must be a finite non-negative number, got {radius}"
            )));
        }
        self.space.validate(query)?;

        let start = Instant::now();
        let mut stats = SearchStats::default();
        let mut result = QueryResult::new();
        if !self.vectors.is_empty() {
            self.range_visit(self.root, query, radius, None, &mut result.hits, &mut stats);
        }
        result.sort();
        stats.search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        result.stats = stats;
        Ok(result)
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Edges on the root-to-leaf path; a lone leaf root has height 0.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Structural statistics.
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            vectors: self.vectors.len(),
            nodes: self.arena.len(),
            leaves: self.arena.iter().filter(|n| n.is_leaf()).count(),
            splits: self.splits,
            height: self.height,
            capacity: self.config.capacity,
        }
    }

    /// Identifiers of all stored vectors, sorted.
    pub fn ids(&self) -> Vec<VectorId> {
        let mut ids: Vec<VectorId> = self.vectors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get a stored vector by id.
    pub fn get(&self, id: &str) -> Option<Arc<Vector>> {
        self.vectors.get(id).cloned()
    }

    /// Whether a vector with this id is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.vectors.contains_key(id)
    }

    /// Remove the given vectors and hand them back.
    ///
    /// The tree does not delete in place: the remaining vectors are
    /// re-inserted into a fresh tree in id order. Unknown ids are ignored.
    pub fn release(&mut self, ids: &[VectorId]) -> Vec<Arc<Vector>> {
        let released: Vec<Arc<Vector>> = ids
            .iter()
            .filter_map(|id| self.vectors.remove(id))
            .collect();
        if released.is_empty() {
            return released;
        }

        let mut retained: Vec<Arc<Vector>> = self.vectors.drain().map(|(_, v)| v).collect();
        retained.sort_by(|a, b| a.id.cmp(&b.id));

        let mut arena = Arena::default();
        self.root = arena.alloc(Node::Leaf(Vec::new()));
        self.arena = arena;
        self.height = 0;
        self.splits = 0;
        for vector in retained {
            self.insert_arc(vector);
        }
        released
    }

    /// Verify every structural invariant of the tree.
    ///
    /// Checks the covering radius of every routing object against every
    /// vector below it, cached parent distances, node capacity and minimum
    /// fill, uniform leaf depth, and that the tree and the id map agree.
    /// Any violation is an [`XiphosError::Index`] error.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = 0;
        self.check_node(self.root, None, 0, &mut seen)?;
        if seen != self.vectors.len() {
            return Err(XiphosError::index(format!(
                "tree holds {seen} entries but {} ids are registered",
                self.vectors.len()
            )));
        }
        Ok(())
    }

    /// Check the subtree at `handle` and return the vectors below it.
    fn check_node(
        &self,
        handle: NodeHandle,
        parent: Option<&Arc<Vector>>,
        depth: usize,
        seen: &mut usize,
    ) -> Result<Vec<Arc<Vector>>> {
        let node = self.arena.get(handle);
        if node.len() > self.config.capacity {
            return Err(XiphosError::index(format!(
                "node at depth {depth} holds {} entries, capacity is {}",
                node.len(),
                self.config.capacity
            )));
        }
        if handle != self.root && node.len() < self.config.min_fill {
            return Err(XiphosError::index(format!(
                "node at depth {depth} holds {} entries, minimum is {}",
                node.len(),
                self.config.min_fill
            )));
        }

        let expect_parent_distance = |object: &Vector, cached: f32| -> Result<()> {
            let actual = parent.map_or(0.0, |p| self.space.distance(&object.data, &p.data));
            if !within(cached, actual) || !within(actual, cached) {
                return Err(XiphosError::index(format!(
                    "cached parent distance {cached} of '{}' differs from {actual}",
                    object.id
                )));
            }
            Ok(())
        };

        match node {
            Node::Leaf(entries) => {
                if depth != self.height {
                    return Err(XiphosError::index(format!(
                        "leaf at depth {depth}, tree height is {}",
                        self.height
                    )));
                }
                let mut below = Vec::with_capacity(entries.len());
                for entry in entries {
                    expect_parent_distance(&entry.vector, entry.parent_distance)?;
                    match self.vectors.get(&entry.vector.id) {
                        Some(registered) if Arc::ptr_eq(registered, &entry.vector) => {}
                        _ => {
                            return Err(XiphosError::index(format!(
                                "leaf entry '{}' is not registered",
                                entry.vector.id
                            )));
                        }
                    }
                    *seen += 1;
                    below.push(Arc::clone(&entry.vector));
                }
                Ok(below)
            }
            Node::Internal(entries) => {
                if depth >= self.height {
                    return Err(XiphosError::index(format!(
                        "internal node at depth {depth}, tree height is {}",
                        self.height
                    )));
                }
                let mut below = Vec::new();
                for entry in entries {
                    expect_parent_distance(&entry.pivot, entry.parent_distance)?;
                    let subtree = self.check_node(entry.child, Some(&entry.pivot), depth + 1, seen)?;
                    for vector in &subtree {
                        let d = self.space.distance(&vector.data, &entry.pivot.data);
                        if !within(d, entry.radius) {
                            return Err(XiphosError::index(format!(
                                "'{}' lies at {d} from routing object '{}' with radius {}",
                                vector.id, entry.pivot.id, entry.radius
                            )));
                        }
                    }
                    below.extend(subtree);
                }
                Ok(below)
            }
        }
    }
}

/// `value <= bound` up to rounding.
fn within(value: f32, bound: f32) -> bool {
    value <= bound + CHECK_TOLERANCE * value.abs().max(bound.abs()).max(1.0)
}
