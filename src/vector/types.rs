//! Result types shared by the index, the shards and the coordinator.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::vector::core::vector::VectorId;

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Vector identifier.
    pub id: VectorId,
    /// Distance to the query (lower is more similar).
    pub distance: f32,
    /// Metadata stored with the vector.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SearchHit {
    /// Create a hit without metadata.
    pub fn new<S: Into<VectorId>>(id: S, distance: f32) -> Self {
        Self {
            id: id.into(),
            distance,
            metadata: HashMap::new(),
        }
    }

    /// Result order: ascending distance, then ascending id.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        rank_cmp(self.distance, &self.id, other.distance, &other.id)
    }
}

/// Total order over (distance, id) pairs used everywhere results are ranked.
#[inline]
pub fn rank_cmp(a_distance: f32, a_id: &str, b_distance: f32, b_id: &str) -> Ordering {
    a_distance
        .total_cmp(&b_distance)
        .then_with(|| a_id.cmp(b_id))
}

/// Work done by one local search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Distance computations performed.
    pub distance_computations: usize,
    /// Tree nodes whose entries were examined.
    pub nodes_visited: usize,
    /// Search execution time in milliseconds.
    pub search_time_ms: f64,
}

impl SearchStats {
    /// Accumulate another search's counters.
    pub fn absorb(&mut self, other: &SearchStats) {
        self.distance_computations += other.distance_computations;
        self.nodes_visited += other.nodes_visited;
        self.search_time_ms = self.search_time_ms.max(other.search_time_ms);
    }
}

/// Ordered results of one local query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Hits sorted by (distance, id).
    pub hits: Vec<SearchHit>,
    /// Work counters.
    pub stats: SearchStats,
}

impl QueryResult {
    /// Create new empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if results are empty.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Get the number of results.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Sort results by (distance, id).
    pub fn sort(&mut self) {
        self.hits.sort_by(SearchHit::rank_cmp);
    }

    /// Whether hits are in result order.
    pub fn is_sorted(&self) -> bool {
        self.hits
            .windows(2)
            .all(|w| w[0].rank_cmp(&w[1]) != Ordering::Greater)
    }

    /// Identifiers in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_order_breaks_ties_by_id() {
        let mut result = QueryResult {
            hits: vec![
                SearchHit::new("b", 1.0),
                SearchHit::new("c", 0.5),
                SearchHit::new("a", 1.0),
            ],
            stats: SearchStats::default(),
        };
        assert!(!result.is_sorted());

        result.sort();
        assert!(result.is_sorted());
        assert_eq!(result.ids(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = SearchStats::default();
        total.absorb(&SearchStats {
            distance_computations: 10,
            nodes_visited: 2,
            search_time_ms: 1.5,
        });
        total.absorb(&SearchStats {
            distance_computations: 5,
            nodes_visited: 1,
            search_time_ms: 0.5,
        });
        assert_eq!(total.distance_computations, 15);
        assert_eq!(total.nodes_visited, 3);
        assert_eq!(total.search_time_ms, 1.5);
    }
}
