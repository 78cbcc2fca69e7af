//! Distance metrics for metric-space search.
//!
//! Every metric here satisfies symmetry, non-negativity, identity of
//! indiscernibles and the triangle inequality. The M-Tree prunes subtrees
//! with the triangle inequality, so "distances" that break it (cosine
//! distance, negated dot product) are not offered.

use std::fmt::Debug;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

/// A distance function over coordinate slices of equal length.
///
/// Implementations must be true metrics. Callers guarantee that both slices
/// have the same length; [`crate::vector::core::space::MetricSpace`] checks
/// this at every public entry point.
pub trait Metric: Send + Sync + Debug {
    /// Distance between `a` and `b`.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Short name used in logs and status output.
    fn name(&self) -> &str;

    /// Whether the metric is undefined for the zero vector.
    fn requires_non_zero(&self) -> bool {
        false
    }
}

/// Built-in distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance
    #[default]
    Euclidean,
    /// Manhattan (L1) distance
    Manhattan,
    /// Chebyshev (L-infinity) distance
    Chebyshev,
    /// Angle between the two vectors, in radians
    Angular,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    pub fn checked_distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(XiphosError::dimension_mismatch(a.len(), b.len()));
        }
        Ok(Metric::distance(self, a, b))
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Chebyshev => "chebyshev",
            DistanceMetric::Angular => "angular",
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            "chebyshev" | "linf" => Ok(DistanceMetric::Chebyshev),
            "angular" => Ok(DistanceMetric::Angular),
            "cosine" | "dot_product" | "dot" => Err(XiphosError::invalid_argument(format!(
                "'{s}' does not satisfy the triangle inequality; use 'angular' instead"
            ))),
            _ => Err(XiphosError::invalid_argument(format!(
                "Unknown distance metric: {s}"
            ))),
        }
    }

    /// Calculate distance between a query vector and multiple vectors in parallel.
    pub fn batch_distance_parallel(&self, query: &[f32], vectors: &[&[f32]]) -> Vec<f32> {
        if vectors.len() < 100 {
            return vectors
                .iter()
                .map(|v| Metric::distance(self, query, v))
                .collect();
        }

        vectors
            .par_iter()
            .map(|v| Metric::distance(self, query, v))
            .collect()
    }
}

impl Metric for DistanceMetric {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Chebyshev => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f32::max),
            DistanceMetric::Angular => angle_between(a, b),
        }
    }

    fn name(&self) -> &str {
        DistanceMetric::name(self)
    }

    fn requires_non_zero(&self) -> bool {
        matches!(self, DistanceMetric::Angular)
    }
}

/// Angle between `a` and `b`, in radians.
///
/// Computed in f64 as `2 * atan2(|a' - b'|, |a' + b'|)` on the unit vectors
/// `a'` and `b'`. An f32 `acos` of the cosine flattens angles below about
/// 3e-4 to zero, and squaring tiny coordinates in f32 underflows.
fn angle_between(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        // Zero vectors are rejected on entry.
        return std::f32::consts::FRAC_PI_2;
    }

    let mut difference = 0.0f64;
    let mut sum = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let x = f64::from(*x) / norm_a;
        let y = f64::from(*y) / norm_b;
        difference += (x - y) * (x - y);
        sum += (x + y) * (x + y);
    }
    (2.0 * difference.sqrt().atan2(sum.sqrt())) as f32
}

fn norm(v: &[f32]) -> f64 {
    v.iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}
