//! The contract between the coordinator and a shard.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::InsertOutcome;
use crate::vector::{QueryResult, Vector, VectorId};

/// Read-only snapshot of one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardStatus {
    /// Node identifier.
    pub node_id: String,
    /// Number of stored vectors.
    pub vector_count: usize,
    /// Height of the local index.
    pub height: usize,
    /// Nodes in the local index.
    pub node_count: usize,
    /// Insert requests served.
    pub inserts: u64,
    /// Search requests served.
    pub queries: u64,
}

/// A shard as seen by the coordinator.
///
/// Implemented in-process by [`crate::shard::LocalShard`]; a networked
/// transport implements the same trait for remote nodes. Implementations must
/// preserve coordinates and identifiers exactly.
///
/// Errors that mean "this shard could not be reached" should be reported as
/// [`crate::error::XiphosError::ShardUnavailable`],
/// [`crate::error::XiphosError::Timeout`] or an I/O error: the coordinator
/// tolerates those and answers from the remaining shards. Any other error
/// aborts the coordinated request.
///
/// # Examples
///
/// ```
/// use xiphos::index::MTreeConfig;
/// use xiphos::shard::{LocalShard, ShardClient};
/// use xiphos::vector::Vector;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> xiphos::error::Result<()> {
/// let shard = LocalShard::new("node-0", MTreeConfig::new(2))?;
/// shard.insert(Vector::new("a", vec![0.0, 1.0])).await?;
///
/// let result = shard.search_knn(&[0.0, 0.0], 1).await?;
/// assert_eq!(result.ids(), vec!["a"]);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ShardClient: Send + Sync + Debug {
    /// Identifier of the node this client talks to.
    fn node_id(&self) -> &str;

    /// Store a vector on this shard.
    ///
    /// # Returns
    ///
    /// Whether the vector was added or was already present with identical
    /// coordinates.
    async fn insert(&self, vector: Vector) -> Result<InsertOutcome>;

    /// Store several vectors.
    ///
    /// The default implementation calls `insert` sequentially and stops at
    /// the first error.
    async fn insert_batch(&self, vectors: Vec<Vector>) -> Result<Vec<InsertOutcome>> {
        let mut outcomes = Vec::with_capacity(vectors.len());
        for vector in vectors {
            outcomes.push(self.insert(vector).await?);
        }
        Ok(outcomes)
    }

    /// The `k` nearest local vectors to `query`.
    ///
    /// # Arguments
    ///
    /// * `query` - Query coordinates
    /// * `k` - Maximum number of hits, at least 1
    ///
    /// # Returns
    ///
    /// At most `k` hits ordered by (distance, id).
    async fn search_knn(&self, query: &[f32], k: usize) -> Result<QueryResult>;

    /// Every local vector within `radius` of `query`, ordered by (distance, id).
    async fn search_range(&self, query: &[f32], radius: f32) -> Result<QueryResult>;

    /// Current shard statistics.
    async fn status(&self) -> Result<ShardStatus>;

    /// Identifiers of every stored vector.
    async fn list_ids(&self) -> Result<Vec<VectorId>>;

    /// Copies of the given vectors, left in place. Unknown ids are ignored.
    async fn fetch(&self, ids: &[VectorId]) -> Result<Vec<Vector>>;

    /// Remove the given vectors and return them. Unknown ids are ignored.
    async fn release(&self, ids: &[VectorId]) -> Result<Vec<Vector>>;
}
