//! Consistent-hashing ring and cluster membership.
//!
//! # Module Structure
//!
//! - `hash_ring`: The immutable ring value (virtual replicas, lookups)
//! - `membership`: Snapshot-replace holder serializing membership changes

pub mod hash_ring;
pub mod membership;

pub use self::hash_ring::{HashRing, KeyMove, NodeOwnership, RingStatus, ShardDescriptor};
pub use self::membership::{Membership, RingChange};
