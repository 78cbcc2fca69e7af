//! Consistent-hashing ring with virtual replicas.
//!
//! Every node owns `replica_count` positions on a 64-bit circle. A key belongs
//! to the node owning the first position at or after the key's hash, wrapping
//! around to the lowest position. Adding a node only takes over the arcs that
//! end at its new positions; removing one hands its arcs to the successors.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use ahash::RandomState;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

/// Fixed seeds so every ring in the process (and every process of the same
/// build) places keys and replicas identically.
const RING_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn ring_hasher() -> &'static RandomState {
    static HASHER: OnceLock<RandomState> = OnceLock::new();
    HASHER.get_or_init(|| {
        RandomState::with_seeds(RING_SEEDS[0], RING_SEEDS[1], RING_SEEDS[2], RING_SEEDS[3])
    })
}

/// Ring position of a key.
pub fn key_hash(key: &str) -> u64 {
    ring_hasher().hash_one(key)
}

/// Ring position of one virtual replica of a node.
pub fn replica_hash(node_id: &str, replica: u32) -> u64 {
    ring_hasher().hash_one((node_id, replica))
}

/// A ring member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    /// Node identifier.
    pub node_id: String,
    /// Reachability information, opaque to the ring.
    pub address: String,
    /// Ring positions owned by this node, ascending.
    pub replica_hashes: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RingPoint {
    hash: u64,
    node_id: String,
}

/// An immutable-by-convention ring value.
///
/// Mutating methods take `&mut self`; shared rings are replaced wholesale
/// (see [`crate::ring::Membership`]), never edited in place.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    points: Vec<RingPoint>,
    nodes: BTreeMap<String, ShardDescriptor>,
}

/// A key whose owner differs between two rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMove {
    pub key: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Share of the hash space owned by one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOwnership {
    pub node_id: String,
    pub address: String,
    pub replicas: usize,
    /// Fraction of the circle, in `0.0..=1.0`.
    pub ownership: f64,
}

/// Read-only summary of a ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingStatus {
    pub total_nodes: usize,
    pub virtual_points: usize,
    pub nodes: Vec<NodeOwnership>,
}

impl HashRing {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with `replica_count` virtual replicas.
    ///
    /// Replicas of different nodes may share a position; the node with the
    /// smallest id owns it, whatever order the nodes joined in.
    pub fn add_node(
        &mut self,
        node_id: &str,
        address: &str,
        replica_count: usize,
    ) -> Result<&ShardDescriptor> {
        if node_id.is_empty() {
            return Err(XiphosError::invalid_argument("node id must not be empty"));
        }
        if replica_count == 0 {
            return Err(XiphosError::invalid_argument(
                "a node needs at least one virtual replica",
            ));
        }
        if self.nodes.contains_key(node_id) {
            return Err(XiphosError::invalid_argument(format!(
                "node '{node_id}' is already a ring member"
            )));
        }
        let replica_count = u32::try_from(replica_count).map_err(|_| {
            XiphosError::invalid_argument(format!("too many replicas: {replica_count}"))
        })?;

        let hashes = (0..replica_count).map(|replica| replica_hash(node_id, replica));
        Ok(self.place(node_id, address, hashes))
    }

    /// Insert a new member's points, kept ordered by (hash, node id).
    fn place(
        &mut self,
        node_id: &str,
        address: &str,
        hashes: impl IntoIterator<Item = u64>,
    ) -> &ShardDescriptor {
        let mut owned: Vec<u64> = hashes.into_iter().collect();
        owned.sort_unstable();
        owned.dedup();

        for &hash in &owned {
            let slot = self
                .points
                .partition_point(|p| (p.hash, p.node_id.as_str()) < (hash, node_id));
            if let Some(shared) = self.points[slot.saturating_sub(1)..]
                .iter()
                .take(2)
                .find(|p| p.hash == hash)
            {
                warn!(
                    "node '{node_id}' shares ring position {hash:#018x} with '{}'",
                    shared.node_id
                );
            }
            self.points.insert(
                slot,
                RingPoint {
                    hash,
                    node_id: node_id.to_string(),
                },
            );
        }

        self.nodes
            .entry(node_id.to_string())
            .or_insert(ShardDescriptor {
                node_id: node_id.to_string(),
                address: address.to_string(),
                replica_hashes: owned,
            })
    }

    /// Remove a node and all of its replicas.
    pub fn remove_node(&mut self, node_id: &str) -> Result<ShardDescriptor> {
        let descriptor = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| XiphosError::UnknownNode(node_id.to_string()))?;
        self.points.retain(|p| p.node_id != node_id);
        Ok(descriptor)
    }

    /// Change the address of a member.
    pub fn set_address(&mut self, node_id: &str, address: &str) -> Result<()> {
        let descriptor = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| XiphosError::UnknownNode(node_id.to_string()))?;
        descriptor.address = address.to_string();
        Ok(())
    }

    /// Index of the first point at or after `hash`, wrapping to 0. Among
    /// points sharing a position this is the one with the smallest node id.
    fn successor(&self, hash: u64) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let slot = self.points.partition_point(|p| p.hash < hash);
        Some(if slot == self.points.len() { 0 } else { slot })
    }

    /// Node owning `key`, or `None` for an empty ring.
    pub fn locate(&self, key: &str) -> Option<&str> {
        self.successor(key_hash(key))
            .map(|slot| self.points[slot].node_id.as_str())
    }

    /// Up to `count` distinct nodes found walking clockwise from `key`.
    ///
    /// The first element is always `locate(key)`.
    pub fn locate_replicas(&self, key: &str, count: usize) -> Vec<&str> {
        let wanted = count.min(self.nodes.len());
        let mut found: Vec<&str> = Vec::with_capacity(wanted);
        let Some(start) = self.successor(key_hash(key)) else {
            return found;
        };
        let mut seen = HashSet::with_capacity(wanted);
        for offset in 0..self.points.len() {
            if found.len() == wanted {
                break;
            }
            let node = self.points[(start + offset) % self.points.len()].node_id.as_str();
            if seen.insert(node) {
                found.push(node);
            }
        }
        found
    }

    /// Whether `node_id` is a member.
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Member identifiers, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Descriptor of a member.
    pub fn descriptor(&self, node_id: &str) -> Option<&ShardDescriptor> {
        self.nodes.get(node_id)
    }

    /// All descriptors, sorted by node id.
    pub fn descriptors(&self) -> impl Iterator<Item = &ShardDescriptor> {
        self.nodes.values()
    }

    /// Number of member nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the ring has no members.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of positions on the circle.
    pub fn virtual_points(&self) -> usize {
        self.points.len()
    }

    /// Fraction of the hash space owned by each node.
    pub fn ownership(&self) -> BTreeMap<String, f64> {
        let mut shares: BTreeMap<String, f64> =
            self.nodes.keys().map(|id| (id.clone(), 0.0)).collect();
        if self.points.len() == 1 {
            shares.insert(self.points[0].node_id.clone(), 1.0);
            return shares;
        }
        const CIRCLE: f64 = u64::MAX as f64 + 1.0;
        for (i, point) in self.points.iter().enumerate() {
            let previous = if i == 0 {
                self.points[self.points.len() - 1].hash
            } else {
                self.points[i - 1].hash
            };
            let arc = point.hash.wrapping_sub(previous) as f64 / CIRCLE;
            if let Some(share) = shares.get_mut(&point.node_id) {
                *share += arc;
            }
        }
        shares
    }

    /// Membership and ownership summary.
    pub fn status(&self) -> RingStatus {
        let ownership = self.ownership();
        RingStatus {
            total_nodes: self.nodes.len(),
            virtual_points: self.points.len(),
            nodes: self
                .nodes
                .values()
                .map(|d| NodeOwnership {
                    node_id: d.node_id.clone(),
                    address: d.address.clone(),
                    replicas: d.replica_hashes.len(),
                    ownership: ownership.get(&d.node_id).copied().unwrap_or(0.0),
                })
                .collect(),
        }
    }

    /// Keys whose owner differs between this ring and `next`.
    pub fn plan_moves<I, S>(&self, next: &HashRing, keys: I) -> Vec<KeyMove>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        keys.into_iter()
            .filter_map(|key| {
                let key = key.as_ref();
                let from = self.locate(key);
                let to = next.locate(key);
                (from != to).then(|| KeyMove {
                    key: key.to_string(),
                    from: from.map(str::to_string),
                    to: to.map(str::to_string),
                })
            })
            .collect()
    }
}
