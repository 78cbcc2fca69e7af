//! Cluster membership: the current ring behind a snapshot pointer.
//!
//! Readers call [`Membership::snapshot`] and keep one complete ring for the
//! whole of a query. Writers serialize on a mutex, clone the current ring,
//! apply their change and publish the new ring in one atomic store, so no
//! reader ever observes a half-updated ring.

use std::sync::Arc;

use arc_swap::ArcSwap;
use log::info;
use parking_lot::Mutex;

use crate::error::{Result, XiphosError};
use crate::ring::hash_ring::HashRing;

/// The rings on either side of a membership change.
#[derive(Debug, Clone)]
pub struct RingChange {
    pub previous: Arc<HashRing>,
    pub current: Arc<HashRing>,
}

/// Shared, read-mostly ring membership.
#[derive(Debug)]
pub struct Membership {
    ring: ArcSwap<HashRing>,
    writer: Mutex<()>,
    replicas: usize,
}

impl Membership {
    /// Create an empty membership giving every node `replicas` virtual replicas.
    pub fn new(replicas: usize) -> Result<Self> {
        if replicas == 0 {
            return Err(XiphosError::config("replicas per node must be at least 1"));
        }
        Ok(Self {
            ring: ArcSwap::from_pointee(HashRing::new()),
            writer: Mutex::new(()),
            replicas,
        })
    }

    /// Virtual replicas per node.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// The current ring.
    #[inline]
    pub fn snapshot(&self) -> Arc<HashRing> {
        self.ring.load_full()
    }

    /// Add a node to the ring.
    pub fn join(&self, node_id: &str, address: &str) -> Result<RingChange> {
        let change = self.update(|ring| ring.add_node(node_id, address, self.replicas).map(|_| ()))?;
        info!(
            "node '{node_id}' joined the ring at {address} ({} nodes, {} points)",
            change.current.len(),
            change.current.virtual_points()
        );
        Ok(change)
    }

    /// Remove a node from the ring.
    pub fn leave(&self, node_id: &str) -> Result<RingChange> {
        let change = self.update(|ring| ring.remove_node(node_id).map(|_| ()))?;
        info!(
            "node '{node_id}' left the ring ({} nodes remain)",
            change.current.len()
        );
        Ok(change)
    }

    /// Update the address of a member.
    pub fn set_address(&self, node_id: &str, address: &str) -> Result<RingChange> {
        self.update(|ring| ring.set_address(node_id, address))
    }

    fn update<F>(&self, mutate: F) -> Result<RingChange>
    where
        F: FnOnce(&mut HashRing) -> Result<()>,
    {
        let _guard = self.writer.lock();
        let previous = self.ring.load_full();
        let mut next = (*previous).clone();
        mutate(&mut next)?;
        let current = Arc::new(next);
        self.ring.store(Arc::clone(&current));
        Ok(RingChange { previous, current })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_leave_publish_new_snapshots() -> Result<()> {
        let membership = Membership::new(10)?;
        let empty = membership.snapshot();

        let change = membership.join("a", "a:1")?;
        assert!(Arc::ptr_eq(&change.previous, &empty));
        assert!(change.current.contains("a"));
        assert!(empty.is_empty());

        membership.join("b", "b:1")?;
        let held = membership.snapshot();
        membership.leave("a")?;

        // A snapshot taken earlier is unaffected by later changes.
        assert_eq!(held.node_ids(), vec!["a", "b"]);
        assert_eq!(membership.snapshot().node_ids(), vec!["b"]);
        Ok(())
    }

    #[test]
    fn test_failed_change_keeps_current_ring() -> Result<()> {
        let membership = Membership::new(4)?;
        membership.join("a", "a:1")?;
        let before = membership.snapshot();

        assert!(membership.join("a", "again").is_err());
        assert!(membership.leave("missing").is_err());
        assert!(Arc::ptr_eq(&before, &membership.snapshot()));
        Ok(())
    }

    #[test]
    fn test_zero_replicas_rejected() {
        assert!(Membership::new(0).is_err());
    }

    #[test]
    fn test_concurrent_joins_are_all_applied() -> Result<()> {
        let membership = Arc::new(Membership::new(8)?);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let membership = Arc::clone(&membership);
                std::thread::spawn(move || membership.join(&format!("n{i}"), "addr").map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap()?;
        }
        let ring = membership.snapshot();
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.virtual_points(), 64);
        Ok(())
    }
}
