//! Shards: the nodes that own a slice of the data.
//!
//! # Module Structure
//!
//! - `client`: The boundary contract every shard implementation satisfies
//! - `local`: In-process shard over one M-Tree

pub mod client;
pub mod local;

pub use self::client::{ShardClient, ShardStatus};
pub use self::local::LocalShard;
