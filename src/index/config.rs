//! Configuration types for the M-Tree index.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};
use crate::vector::DistanceMetric;

/// How an overflowing node chooses its two new routing objects.
///
/// All policies share the same partition step (nearest routing object with a
/// minimum fill per side); they only differ in which pair is promoted. The
/// choice affects query cost, never correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// The two entries with the largest pairwise distance.
    #[default]
    MaxSpread,
    /// The pair minimising the larger of the two resulting covering radii.
    MinMaxRadius,
    /// The pair minimising the sum of the two resulting covering radii.
    MinSumRadius,
}

impl PromotionPolicy {
    /// Get the name of this policy.
    pub fn name(&self) -> &'static str {
        match self {
            PromotionPolicy::MaxSpread => "max_spread",
            PromotionPolicy::MinMaxRadius => "min_max_radius",
            PromotionPolicy::MinSumRadius => "min_sum_radius",
        }
    }
}

/// Configuration for an M-Tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MTreeConfig {
    /// Vector dimension.
    pub dimension: usize,
    /// Maximum entries per node (`M`).
    pub capacity: usize,
    /// Minimum entries each half of a split receives.
    pub min_fill: usize,
    /// Distance metric.
    pub distance_metric: DistanceMetric,
    /// Split promotion heuristic.
    pub promotion: PromotionPolicy,
}

impl Default for MTreeConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            capacity: 4,
            min_fill: 2,
            distance_metric: DistanceMetric::Euclidean,
            promotion: PromotionPolicy::MaxSpread,
        }
    }
}

impl MTreeConfig {
    /// Config for `dimension`-dimensional vectors with default tuning.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    /// Set the node capacity and reset the minimum fill to `capacity / 2`.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self.min_fill = (capacity / 2).max(1);
        self
    }

    /// Set the distance metric.
    pub fn distance_metric(mut self, metric: DistanceMetric) -> Self {
        self.distance_metric = metric;
        self
    }

    /// Set the promotion policy.
    pub fn promotion(mut self, promotion: PromotionPolicy) -> Self {
        self.promotion = promotion;
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(XiphosError::config("dimension must be at least 1"));
        }
        if self.capacity < 2 {
            return Err(XiphosError::config(format!(
                "capacity must be at least 2, got {}",
                self.capacity
            )));
        }
        // Both halves of a split of capacity + 1 entries must reach min_fill.
        if self.min_fill == 0 || self.min_fill > self.capacity / 2 {
            return Err(XiphosError::config(format!(
                "min_fill must be in 1..={} for capacity {}, got {}",
                self.capacity / 2,
                self.capacity,
                self.min_fill
            )));
        }
        Ok(())
    }
}
