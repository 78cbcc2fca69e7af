//! Node registration and vector transfer on membership changes.
//!
//! Vectors are placed by id on the ring, so a membership change only affects
//! the ids whose owner changed: on a join they move from their current shard
//! to the new node, on a graceful leave the departing shard is drained to the
//! successors of its arcs. A transfer copies vectors to the target first and
//! releases them at the source only once the target holds them, so every
//! vector stays visible to queries throughout.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::coordinator::ShardFailure;
use crate::coordinator::executor::QueryCoordinator;
use crate::error::{Result, XiphosError};
use crate::ring::HashRing;
use crate::shard::ShardClient;
use crate::vector::{Vector, VectorId};

/// What a membership change did to the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceReport {
    /// Vectors transferred between shards.
    pub moved: usize,
    /// Vectors received per target node.
    pub moved_to: BTreeMap<String, usize>,
    /// Node whose data left the cluster without being transferred.
    pub lost_shard: Option<String>,
    /// Vectors known to be no longer served.
    pub lost: usize,
    /// Vectors still served, but by a shard that does not own their id.
    pub stranded: usize,
    /// Shards that could not be rebalanced.
    pub skipped: Vec<ShardFailure>,
}

impl RebalanceReport {
    fn record(&mut self, target: &str, count: usize) {
        self.moved += count;
        *self.moved_to.entry(target.to_string()).or_insert(0) += count;
    }

    fn skip(&mut self, node_id: &str, err: &XiphosError) {
        self.skipped.push(ShardFailure {
            node_id: node_id.to_string(),
            reason: err.to_string(),
        });
    }
}

impl QueryCoordinator {
    /// Add a shard to the cluster, or update the address of a known one.
    ///
    /// A new node joins the ring and then receives every vector whose owner
    /// changed to it.
    pub async fn register_node(
        &self,
        node_id: &str,
        address: &str,
        client: Arc<dyn ShardClient>,
    ) -> Result<RebalanceReport> {
        if client.node_id() != node_id {
            return Err(XiphosError::invalid_argument(format!(
                "client for '{}' registered as '{node_id}'",
                client.node_id()
            )));
        }
        let _admin = self.admin.lock().await;

        if self.membership.snapshot().contains(node_id) {
            self.membership.set_address(node_id, address)?;
            self.shards.write().insert(node_id.to_string(), client);
            info!("node '{node_id}' re-registered at {address}");
            return Ok(RebalanceReport::default());
        }

        self.shards.write().insert(node_id.to_string(), client);
        let change = match self.membership.join(node_id, address) {
            Ok(change) => change,
            Err(err) => {
                self.shards.write().remove(node_id);
                return Err(err);
            }
        };

        let mut report = RebalanceReport::default();
        for (source_id, source) in self.clients_for(&change.previous) {
            if let Err(err) = self
                .move_misplaced(&source_id, &source, &change.current, &mut report)
                .await
            {
                if !err.is_shard_unavailability() {
                    return Err(err);
                }
                warn!("could not rebalance shard '{source_id}': {err}");
                report.skip(&source_id, &err);
            }
        }
        info!(
            "node '{node_id}' joined, {} vectors moved to it",
            report.moved
        );
        Ok(report)
    }

    /// Remove a shard from the cluster.
    ///
    /// With `graceful`, the departing shard's vectors are copied to their new
    /// owners while it still answers queries, then it leaves the ring and a
    /// second pass picks up vectors inserted meanwhile. A target that refuses
    /// a batch is replaced by the next distinct node clockwise; vectors no
    /// node accepts are counted as lost. Without `graceful`, the shard's data
    /// is no longer served: there is no replica to recover it from.
    pub async fn deregister_node(&self, node_id: &str, graceful: bool) -> Result<RebalanceReport> {
        let _admin = self.admin.lock().await;
        let client = self
            .shard(node_id)
            .ok_or_else(|| XiphosError::UnknownNode(node_id.to_string()))?;

        let mut report = RebalanceReport::default();
        if !graceful {
            self.membership.leave(node_id)?;
            self.shards.write().remove(node_id);
            warn!("node '{node_id}' removed without draining, its vectors are no longer served");
            report.lost_shard = Some(node_id.to_string());
            return Ok(report);
        }

        let mut next = HashRing::clone(&self.membership.snapshot());
        next.remove_node(node_id)?;

        let mut handed_off = HashSet::new();
        let first_pass = self
            .hand_off(&client, &next, &mut handed_off, &mut report)
            .await;
        let change = self.membership.leave(node_id)?;
        let drained = match first_pass {
            Ok(()) => {
                self.hand_off(&client, &change.current, &mut handed_off, &mut report)
                    .await
            }
            Err(err) => Err(err),
        };
        self.shards.write().remove(node_id);

        if let Err(err) = drained {
            warn!("could not drain node '{node_id}': {err}");
            report.lost_shard = Some(node_id.to_string());
            report.skip(node_id, &err);
        }
        if report.lost > 0 {
            warn!(
                "node '{node_id}' left, {} of its vectors are no longer served",
                report.lost
            );
            report.lost_shard = Some(node_id.to_string());
        }

        let ids: Vec<VectorId> = handed_off.into_iter().collect();
        if let Err(err) = self.within_deadline(node_id, client.release(&ids)).await {
            warn!("node '{node_id}' left without releasing its copies: {err}");
        }
        info!(
            "node '{node_id}' drained, {} vectors re-homed",
            report.moved
        );
        Ok(report)
    }

    /// Move every vector on `source` whose owner in `ring` is another node.
    ///
    /// A batch the target refuses stays on the source and is reported as
    /// stranded.
    async fn move_misplaced(
        &self,
        source_id: &str,
        source: &Arc<dyn ShardClient>,
        ring: &HashRing,
        report: &mut RebalanceReport,
    ) -> Result<()> {
        let misplaced = self
            .copy_out(source, |id| {
                ring.locate(id).is_some_and(|owner| owner != source_id)
            })
            .await?;

        for (target, vectors) in self.group_by_owner(ring, misplaced) {
            let ids: Vec<VectorId> = vectors.iter().map(|v| v.id.clone()).collect();
            if let Err(err) = self.deliver(&target, vectors).await {
                warn!(
                    "transfer {source_id} -> {target} failed, {} vectors stay on '{source_id}': {err}",
                    ids.len()
                );
                report.stranded += ids.len();
                report.skip(&target, &err);
                continue;
            }
            report.record(&target, ids.len());
            self.within_deadline(source_id, source.release(&ids))
                .await?;
        }
        Ok(())
    }

    /// Copy the vectors of a leaving `client` not yet in `done` to their
    /// owners in `ring`, and add their ids to `done`.
    async fn hand_off(
        &self,
        client: &Arc<dyn ShardClient>,
        ring: &HashRing,
        done: &mut HashSet<VectorId>,
        report: &mut RebalanceReport,
    ) -> Result<()> {
        let pending = self.copy_out(client, |id| !done.contains(id)).await?;
        done.extend(pending.iter().map(|v| v.id.clone()));

        if ring.is_empty() {
            report.lost += pending.len();
            return Ok(());
        }
        let undelivered = self.deliver_with_fallback(ring, pending, report).await;
        report.lost += undelivered.len();
        Ok(())
    }

    /// Copies of the vectors on `client` whose ids pass `select`.
    async fn copy_out(
        &self,
        client: &Arc<dyn ShardClient>,
        select: impl Fn(&VectorId) -> bool,
    ) -> Result<Vec<Vector>> {
        let node_id = client.node_id();
        let ids: Vec<VectorId> = self
            .within_deadline(node_id, client.list_ids())
            .await?
            .into_iter()
            .filter(|id| select(id))
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.within_deadline(node_id, client.fetch(&ids)).await
    }

    /// Deliver each vector to its owner in `ring`, or to the next distinct
    /// node clockwise when the owner refuses. Returns the vectors no node
    /// accepted.
    async fn deliver_with_fallback(
        &self,
        ring: &HashRing,
        vectors: Vec<Vector>,
        report: &mut RebalanceReport,
    ) -> Vec<Vector> {
        let mut failed: HashSet<String> = HashSet::new();
        let mut undelivered = Vec::new();
        let mut pending = vectors;

        while !pending.is_empty() {
            let mut groups: BTreeMap<String, Vec<Vector>> = BTreeMap::new();
            for vector in std::mem::take(&mut pending) {
                let target = ring
                    .locate_replicas(&vector.id, ring.len())
                    .into_iter()
                    .find(|node_id| !failed.contains(*node_id));
                match target {
                    Some(target) => groups.entry(target.to_string()).or_default().push(vector),
                    None => undelivered.push(vector),
                }
            }

            for (target, batch) in groups {
                let stranded = batch
                    .iter()
                    .filter(|v| ring.locate(&v.id) != Some(target.as_str()))
                    .count();
                match self.deliver(&target, batch.clone()).await {
                    Ok(()) => {
                        report.record(&target, batch.len());
                        if stranded > 0 {
                            warn!("{stranded} vectors placed on '{target}', which does not own them");
                            report.stranded += stranded;
                        }
                    }
                    Err(err) => {
                        warn!("transfer to '{target}' failed, trying the next node: {err}");
                        report.skip(&target, &err);
                        failed.insert(target);
                        pending.extend(batch);
                    }
                }
            }
        }
        undelivered
    }

    fn group_by_owner(&self, ring: &HashRing, vectors: Vec<Vector>) -> BTreeMap<String, Vec<Vector>> {
        let mut groups: BTreeMap<String, Vec<Vector>> = BTreeMap::new();
        for vector in vectors {
            if let Some(owner) = ring.locate(&vector.id) {
                groups.entry(owner.to_string()).or_default().push(vector);
            }
        }
        groups
    }

    async fn deliver(&self, target: &str, vectors: Vec<Vector>) -> Result<()> {
        let client = self
            .shard(target)
            .ok_or_else(|| XiphosError::shard_unavailable(target, "no client registered"))?;
        self.within_deadline(target, client.insert_batch(vectors))
            .await?;
        Ok(())
    }

    async fn within_deadline<T, F>(&self, node_id: &str, request: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.shard_timeout(), request).await {
            Ok(answer) => answer,
            Err(_) => Err(XiphosError::timeout(format!(
                "shard '{node_id}' did not answer within {} ms",
                self.config.shard_timeout_ms
            ))),
        }
    }
}
