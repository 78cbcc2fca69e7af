//! Distributed query coordination.
//!
//! The coordinator routes writes to the shard owning the vector id and fans
//! every query out to all live shards, merging their ordered partial results
//! into one globally ranked answer. Shards that cannot be reached in time are
//! left out of the merge and reported alongside the result.
//!
//! # Module Structure
//!
//! - `executor`: Shard registry, routing and concurrent fan-out
//! - `merger`: k-way merge of ordered partial results
//! - `rebalance`: Vector transfer on membership changes

pub mod executor;
pub mod merger;
pub mod rebalance;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};
use crate::ring::RingStatus;
use crate::shard::ShardStatus;
use crate::vector::{SearchHit, SearchStats};

pub use self::executor::QueryCoordinator;
pub use self::rebalance::RebalanceReport;

/// Configuration for the query coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Deadline for each shard request, in milliseconds.
    pub shard_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            shard_timeout_ms: 10_000,
        }
    }
}

impl CoordinatorConfig {
    /// Config with the given per-shard timeout.
    pub fn with_timeout_ms(shard_timeout_ms: u64) -> Self {
        Self { shard_timeout_ms }
    }

    /// Per-shard deadline.
    pub fn shard_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_timeout_ms)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.shard_timeout_ms == 0 {
            return Err(XiphosError::config("shard timeout must be at least 1 ms"));
        }
        Ok(())
    }
}

/// A shard left out of a coordinated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardFailure {
    pub node_id: String,
    pub reason: String,
}

/// Answer to a coordinated query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatedResult {
    /// Hits ordered by (distance, id).
    pub hits: Vec<SearchHit>,
    /// Shards that did not answer; non-empty means a partial result.
    pub unavailable: Vec<ShardFailure>,
    /// Number of shards the query was sent to.
    pub shards_queried: usize,
    /// Whether the hits are exact over the shards that answered.
    pub exact: bool,
    /// Work summed over the answering shards.
    pub stats: SearchStats,
}

impl CoordinatedResult {
    /// Whether some shard's data is missing from the answer.
    pub fn is_partial(&self) -> bool {
        !self.unavailable.is_empty()
    }

    /// Get the number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Check if there are no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Identifiers in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

/// One shard's entry in a cluster status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardReport {
    pub node_id: String,
    pub address: String,
    /// Present when the shard answered.
    pub status: Option<ShardStatus>,
    /// Present when it did not.
    pub error: Option<String>,
}

/// Read-only snapshot of the whole cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub captured_at: DateTime<Utc>,
    pub ring: RingStatus,
    pub shards: Vec<ShardReport>,
    /// Vectors held by the shards that answered.
    pub total_vectors: usize,
}
