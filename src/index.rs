//! Local metric index.
//!
//! Each shard keeps its vectors in an [`MTree`], a balanced tree that
//! partitions the metric space into nested balls. Every routing object
//! carries the covering radius of its subtree, which lets queries discard
//! whole subtrees using the triangle inequality alone.

pub mod config;
pub mod mtree;

pub use self::config::{MTreeConfig, PromotionPolicy};
pub use self::mtree::{IndexStats, InsertOutcome, MTree};
