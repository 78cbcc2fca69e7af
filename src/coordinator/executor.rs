//! Shard registry, write routing and concurrent query fan-out.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, warn};
use parking_lot::RwLock;
use tokio::time::{Instant, timeout, timeout_at};

use crate::coordinator::merger::{merge_knn, merge_range};
use crate::coordinator::{
    ClusterStatus, CoordinatedResult, CoordinatorConfig, ShardFailure, ShardReport,
};
use crate::error::{Result, XiphosError};
use crate::index::InsertOutcome;
use crate::ring::{HashRing, Membership};
use crate::shard::{ShardClient, ShardStatus};
use crate::vector::{MetricSpace, QueryResult, SearchHit, SearchStats, Vector};

/// Answers collected from one fan-out.
struct Gathered {
    lists: Vec<Vec<SearchHit>>,
    unavailable: Vec<ShardFailure>,
    shards_queried: usize,
    stats: SearchStats,
}

/// Routes writes to owning shards and answers queries across all of them.
///
/// The coordinator holds no index state of its own. Each query reads one
/// ring snapshot, so a concurrent membership change is either fully visible
/// to it or not at all.
#[derive(Debug)]
pub struct QueryCoordinator {
    pub(super) config: CoordinatorConfig,
    pub(super) space: MetricSpace,
    pub(super) membership: Membership,
    pub(super) shards: RwLock<BTreeMap<String, Arc<dyn ShardClient>>>,
    /// Serializes registration and deregistration, including the data
    /// transfer that follows them.
    pub(super) admin: tokio::sync::Mutex<()>,
}

impl QueryCoordinator {
    /// Create a coordinator with no shards.
    pub fn new(space: MetricSpace, replicas: usize, config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            space,
            membership: Membership::new(replicas)?,
            shards: RwLock::new(BTreeMap::new()),
            admin: tokio::sync::Mutex::new(()),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Get the metric space queries are validated against.
    pub fn space(&self) -> &MetricSpace {
        &self.space
    }

    /// Get the ring membership.
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// The current ring snapshot.
    pub fn ring(&self) -> Arc<HashRing> {
        self.membership.snapshot()
    }

    /// Client registered for `node_id`.
    pub fn shard(&self, node_id: &str) -> Option<Arc<dyn ShardClient>> {
        self.shards.read().get(node_id).cloned()
    }

    /// Clients of every ring member in `ring`, by node id.
    pub(super) fn clients_for(&self, ring: &HashRing) -> Vec<(String, Arc<dyn ShardClient>)> {
        let shards = self.shards.read();
        ring.node_ids()
            .into_iter()
            .filter_map(|id| shards.get(&id).cloned().map(|client| (id, client)))
            .collect()
    }

    /// Store a vector on the shard owning its id.
    pub async fn insert(&self, vector: Vector) -> Result<InsertOutcome> {
        vector.validate_id()?;
        self.space.validate(&vector.data)?;

        let ring = self.membership.snapshot();
        let owner = ring
            .locate(&vector.id)
            .ok_or(XiphosError::NoShardsAvailable)?
            .to_string();
        let client = self
            .shard(&owner)
            .ok_or_else(|| XiphosError::shard_unavailable(&owner, "no client registered"))?;

        debug!("routing '{}' to shard '{owner}'", vector.id);
        match timeout(self.config.shard_timeout(), client.insert(vector)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(XiphosError::timeout(format!(
                "shard '{owner}' did not acknowledge the insert within {} ms",
                self.config.shard_timeout_ms
            ))),
        }
    }

    /// The `k` nearest vectors to `query` across the cluster.
    ///
    /// Every live shard is asked for its local top `k`; the answers are
    /// merged by (distance, id). Shards that are unreachable or miss the
    /// deadline are listed in [`CoordinatedResult::unavailable`]. Fails with
    /// [`XiphosError::NoShardsAvailable`] when no shard answers.
    pub async fn knn(&self, query: &[f32], k: usize) -> Result<CoordinatedResult> {
        if k == 0 {
            return Err(XiphosError::invalid_argument("k must be at least 1"));
        }
        self.space.validate(query)?;

        let query: Arc<[f32]> = Arc::from(query);
        let gathered = self
            .scatter(query, move |client, query| async move {
                client.search_knn(&query, k).await
            })
            .await?;

        Ok(CoordinatedResult {
            hits: merge_knn(gathered.lists, k),
            unavailable: gathered.unavailable,
            shards_queried: gathered.shards_queried,
            exact: true,
            stats: gathered.stats,
        })
    }

    /// Every vector within `radius` of `query` across the cluster.
    pub async fn range(&self, query: &[f32], radius: f32) -> Result<CoordinatedResult> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(XiphosError::invalid_argument(format!(
                "radius must be a finite non-negative number, got {radius}"
            )));
        }
        self.space.validate(query)?;

        let query: Arc<[f32]> = Arc::from(query);
        let gathered = self
            .scatter(query, move |client, query| async move {
                client.search_range(&query, radius).await
            })
            .await?;

        Ok(CoordinatedResult {
            hits: merge_range(gathered.lists),
            unavailable: gathered.unavailable,
            shards_queried: gathered.shards_queried,
            exact: true,
            stats: gathered.stats,
        })
    }

    /// Send a query to every live shard and sort the answers into hit lists
    /// and tolerated failures.
    async fn scatter<F, Fut>(
        &self,
        query: Arc<[f32]>,
        call: F,
    ) -> Result<Gathered>
    where
        F: Fn(Arc<dyn ShardClient>, Arc<[f32]>) -> Fut,
        Fut: Future<Output = Result<QueryResult>> + Send + 'static,
    {
        let ring = self.membership.snapshot();
        let targets = self.clients_for(&ring);
        if targets.is_empty() {
            return Err(XiphosError::NoShardsAvailable);
        }
        let shards_queried = targets.len();

        let answers = self
            .fan_out(targets, |client| call(client, Arc::clone(&query)))
            .await;

        let mut lists = Vec::with_capacity(answers.len());
        let mut unavailable = Vec::new();
        let mut stats = SearchStats::default();
        for (node_id, answer) in answers {
            match answer {
                Ok(result) => {
                    stats.absorb(&result.stats);
                    lists.push(result.hits);
                }
                Err(err) if err.is_shard_unavailability() => {
                    warn!("shard '{node_id}' left out of query: {err}");
                    unavailable.push(ShardFailure {
                        node_id,
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        if lists.is_empty() {
            return Err(XiphosError::NoShardsAvailable);
        }
        if !unavailable.is_empty() {
            warn!(
                "partial result: {} of {shards_queried} shards answered",
                lists.len()
            );
        }
        Ok(Gathered {
            lists,
            unavailable,
            shards_queried,
            stats,
        })
    }

    /// Run one task per shard under a shared deadline.
    ///
    /// A task still running at the deadline is reported as a timeout and
    /// left to finish on its own; nothing waits for it.
    pub(super) async fn fan_out<T, F, Fut>(
        &self,
        targets: Vec<(String, Arc<dyn ShardClient>)>,
        call: F,
    ) -> Vec<(String, Result<T>)>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn ShardClient>) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let deadline = Instant::now() + self.config.shard_timeout();
        let timeout_ms = self.config.shard_timeout_ms;

        let pending = targets.into_iter().map(|(node_id, client)| {
            let task = tokio::spawn(call(client));
            async move {
                let outcome = match timeout_at(deadline, task).await {
                    Ok(Ok(answer)) => answer,
                    Ok(Err(join_error)) => Err(XiphosError::other(format!(
                        "request to shard '{node_id}' failed: {join_error}"
                    ))),
                    Err(_) => Err(XiphosError::timeout(format!(
                        "shard '{node_id}' did not answer within {timeout_ms} ms"
                    ))),
                };
                (node_id, outcome)
            }
        });
        join_all(pending).await
    }

    /// Ring membership and per-shard statistics.
    ///
    /// Shards that do not answer are listed with their error; this never
    /// fails.
    pub async fn status(&self) -> ClusterStatus {
        let ring = self.membership.snapshot();
        let targets = self.clients_for(&ring);
        let answers: Vec<(String, Result<ShardStatus>)> = self
            .fan_out(targets, |client| async move { client.status().await })
            .await;
        let mut answers: BTreeMap<String, Result<ShardStatus>> = answers.into_iter().collect();

        let mut total_vectors = 0;
        let shards = ring
            .descriptors()
            .map(|descriptor| {
                let (status, error) = match answers.remove(&descriptor.node_id) {
                    Some(Ok(status)) => {
                        total_vectors += status.vector_count;
                        (Some(status), None)
                    }
                    Some(Err(err)) => (None, Some(err.to_string())),
                    None => (None, Some("no client registered".to_string())),
                };
                ShardReport {
                    node_id: descriptor.node_id.clone(),
                    address: descriptor.address.clone(),
                    status,
                    error,
                }
            })
            .collect();

        ClusterStatus {
            captured_at: Utc::now(),
            ring: ring.status(),
            shards,
            total_vectors,
        }
    }
}
