//! Vectors, metric spaces and result types.
//!
//! # Module Structure
//!
//! - `core`: Core data structures (vector, distance, metric space)
//! - `types`: Search hits and ordered query results

pub mod core;
pub mod types;

pub use self::core::distance::{DistanceMetric, Metric};
pub use self::core::space::MetricSpace;
pub use self::core::vector::{Vector, VectorId};
pub use self::types::{QueryResult, SearchHit, SearchStats};
