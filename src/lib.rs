//! # Xiphos
//!
//! Distributed similarity search over metric spaces.
//!
//! ## Features
//!
//! - M-Tree metric index with triangle-inequality pruning
//! - Exact k-nearest-neighbour and range queries
//! - Consistent-hashing ring with virtual replicas
//! - Concurrent query fan-out with per-shard deadlines and partial results
//! - Vector transfer on node join and graceful leave

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod ring;
pub mod shard;
pub mod vector;

pub mod prelude {
    pub use crate::coordinator::{CoordinatedResult, QueryCoordinator};
    pub use crate::error::{Result, XiphosError};
    pub use crate::index::{MTree, MTreeConfig};
    pub use crate::ring::HashRing;
    pub use crate::shard::{LocalShard, ShardClient};
    pub use crate::vector::{DistanceMetric, MetricSpace, SearchHit, Vector};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
