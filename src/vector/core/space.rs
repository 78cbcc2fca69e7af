//! Metric space: a dimensionality plus a distance function.

use std::sync::Arc;

use crate::error::{Result, XiphosError};
use crate::vector::core::distance::{DistanceMetric, Metric};

/// The space every vector of an index (or a whole cluster) lives in.
///
/// All coordinates entering the system pass through [`MetricSpace::validate`],
/// so the distance hot path can assume equal lengths and finite values.
#[derive(Debug, Clone)]
pub struct MetricSpace {
    dimension: usize,
    metric: Arc<dyn Metric>,
}

impl MetricSpace {
    /// Create a space over one of the built-in metrics.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Result<Self> {
        Self::with_metric(dimension, Arc::new(metric))
    }

    /// Create a space over a custom metric.
    pub fn with_metric(dimension: usize, metric: Arc<dyn Metric>) -> Result<Self> {
        if dimension == 0 {
            return Err(XiphosError::invalid_argument(
                "dimension must be at least 1",
            ));
        }
        Ok(Self { dimension, metric })
    }

    /// Number of coordinates per vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The distance function.
    pub fn metric(&self) -> &dyn Metric {
        self.metric.as_ref()
    }

    /// Distance between two validated coordinate slices.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.metric.distance(a, b)
    }

    /// Check that `data` is a valid point of this space.
    pub fn validate(&self, data: &[f32]) -> Result<()> {
        if data.len() != self.dimension {
            return Err(XiphosError::dimension_mismatch(self.dimension, data.len()));
        }
        if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
            return Err(XiphosError::invalid_argument(format!(
                "coordinate {pos} is not finite"
            )));
        }
        if self.metric.requires_non_zero() && data.iter().all(|x| *x == 0.0) {
            return Err(XiphosError::invalid_argument(format!(
                "the zero vector has no direction under the {} metric",
                self.metric.name()
            )));
        }
        Ok(())
    }
}
