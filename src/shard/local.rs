//! In-process shard.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use crate::error::Result;
use crate::index::{InsertOutcome, MTree, MTreeConfig};
use crate::shard::client::{ShardClient, ShardStatus};
use crate::vector::{QueryResult, Vector, VectorId};

/// A shard holding one M-Tree behind a single read/write lock.
///
/// Inserts and releases take the write lock, searches the read lock, so
/// queries run concurrently with each other but never observe a split in
/// progress.
#[derive(Debug)]
pub struct LocalShard {
    node_id: String,
    tree: RwLock<MTree>,
    inserts: AtomicU64,
    queries: AtomicU64,
}

impl LocalShard {
    /// Create a shard with an empty tree.
    pub fn new<S: Into<String>>(node_id: S, config: MTreeConfig) -> Result<Self> {
        Ok(Self::with_tree(node_id, MTree::new(config)?))
    }

    /// Create a shard around an existing tree.
    pub fn with_tree<S: Into<String>>(node_id: S, tree: MTree) -> Self {
        Self {
            node_id: node_id.into(),
            tree: RwLock::new(tree),
            inserts: AtomicU64::new(0),
            queries: AtomicU64::new(0),
        }
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    /// Whether the shard stores nothing.
    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    /// Run `f` against the tree under the read lock.
    pub fn with_index<R>(&self, f: impl FnOnce(&MTree) -> R) -> R {
        f(&self.tree.read())
    }
}

#[async_trait]
impl ShardClient for LocalShard {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn insert(&self, vector: Vector) -> Result<InsertOutcome> {
        self.inserts.fetch_add(1, Ordering::Relaxed);
        self.tree.write().insert(vector)
    }

    async fn insert_batch(&self, vectors: Vec<Vector>) -> Result<Vec<InsertOutcome>> {
        self.inserts
            .fetch_add(vectors.len() as u64, Ordering::Relaxed);
        let mut tree = self.tree.write();
        vectors.into_iter().map(|v| tree.insert(v)).collect()
    }

    async fn search_knn(&self, query: &[f32], k: usize) -> Result<QueryResult> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let result = self.tree.read().search_knn(query, k)?;
        debug!(
            "shard '{}' k-NN: {} hits, {} distance computations",
            self.node_id,
            result.len(),
            result.stats.distance_computations
        );
        Ok(result)
    }

    async fn search_range(&self, query: &[f32], radius: f32) -> Result<QueryResult> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.tree.read().search_range(query, radius)
    }

    async fn status(&self) -> Result<ShardStatus> {
        let tree = self.tree.read();
        let stats = tree.stats();
        Ok(ShardStatus {
            node_id: self.node_id.clone(),
            vector_count: stats.vectors,
            height: stats.height,
            node_count: stats.nodes,
            inserts: self.inserts.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
        })
    }

    async fn list_ids(&self) -> Result<Vec<VectorId>> {
        Ok(self.tree.read().ids())
    }

    async fn fetch(&self, ids: &[VectorId]) -> Result<Vec<Vector>> {
        let tree = self.tree.read();
        Ok(ids
            .iter()
            .filter_map(|id| tree.get(id))
            .map(Arc::unwrap_or_clone)
            .collect())
    }

    async fn release(&self, ids: &[VectorId]) -> Result<Vec<Vector>> {
        let released = self.tree.write().release(ids);
        debug!("shard '{}' released {} vectors", self.node_id, released.len());
        Ok(released.into_iter().map(Arc::unwrap_or_clone).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::XiphosError;

    fn shard() -> LocalShard {
        LocalShard::new("node-0", MTreeConfig::new(2)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_search() -> Result<()> {
        let shard = shard();
        for i in 0..20 {
            shard
                .insert(Vector::new(format!("v{i:02}"), vec![i as f32, 0.0]))
                .await?;
        }
        assert_eq!(shard.len(), 20);

        let result = shard.search_knn(&[4.2, 0.0], 3).await?;
        assert_eq!(result.ids(), vec!["v04", "v05", "v03"]);

        let result = shard.search_range(&[10.0, 0.0], 1.0).await?;
        assert_eq!(result.ids(), vec!["v10", "v09", "v11"]);

        let status = shard.status().await?;
        assert_eq!(status.vector_count, 20);
        assert_eq!(status.inserts, 20);
        assert_eq!(status.queries, 2);
        assert!(status.height >= 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let shard = shard();
        let err = shard
            .insert(Vector::new("bad", vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, XiphosError::DimensionMismatch { .. }));
        assert!(!err.is_shard_unavailability());
    }

    #[tokio::test]
    async fn test_fetch_leaves_vectors_in_place() -> Result<()> {
        let shard = shard();
        shard.insert(Vector::new("a", vec![1.0, 2.0])).await?;
        shard.insert(Vector::new("b", vec![3.0, 4.0])).await?;

        let ids = vec!["b".to_string(), "missing".to_string()];
        let copies = shard.fetch(&ids).await?;
        assert_eq!(copies, vec![Vector::new("b", vec![3.0, 4.0])]);
        assert_eq!(shard.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_release_transfers_vectors() -> Result<()> {
        let source = shard();
        let target = LocalShard::new("node-1", MTreeConfig::new(2))?;
        let vectors: Vec<Vector> = (0..30)
            .map(|i| Vector::new(format!("v{i:02}"), vec![i as f32, -(i as f32)]))
            .collect();
        source.insert_batch(vectors).await?;

        let moving: Vec<VectorId> = source
            .list_ids()
            .await?
            .into_iter()
            .filter(|id| id.ends_with('5'))
            .collect();
        let released = source.release(&moving).await?;
        assert_eq!(released.len(), 3);
        target.insert_batch(released).await?;

        assert_eq!(source.len(), 27);
        assert_eq!(target.list_ids().await?, vec!["v05", "v15", "v25"]);
        source.with_index(MTree::check_invariants)?;
        target.with_index(MTree::check_invariants)?;
        Ok(())
    }
}
