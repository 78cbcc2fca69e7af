//! Whole-system configuration.
//!
//! Settings are read from JSON and can be overridden by environment
//! variables:
//!
//! | Variable                  | Setting                         |
//! |---------------------------|---------------------------------|
//! | `XIPHOS_MTREE_CAPACITY`   | `index.capacity`                |
//! | `XIPHOS_MTREE_MIN_FILL`   | `index.min_fill`                |
//! | `XIPHOS_DISTANCE_METRIC`  | `index.distance_metric`         |
//! | `XIPHOS_DIMENSION`        | `index.dimension`               |
//! | `XIPHOS_RING_REPLICAS`    | `ring.replicas`                 |
//! | `XIPHOS_SHARD_TIMEOUT_MS` | `coordinator.shard_timeout_ms`  |
//!
//! Setting the capacity alone also resets the minimum fill to half of it.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coordinator::{CoordinatorConfig, QueryCoordinator};
use crate::error::{Result, XiphosError};
use crate::index::MTreeConfig;
use crate::vector::{DistanceMetric, MetricSpace};

/// Consistent-hashing ring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Virtual replicas per node.
    pub replicas: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self { replicas: 100 }
    }
}

/// Configuration of a whole cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XiphosConfig {
    /// Per-shard index settings.
    pub index: MTreeConfig,
    /// Ring settings.
    pub ring: RingConfig,
    /// Coordinator settings.
    pub coordinator: CoordinatorConfig,
}

impl XiphosConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides looked up by variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dimension) = parse_var(&lookup, "XIPHOS_DIMENSION")? {
            self.index.dimension = dimension;
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "XIPHOS_MTREE_CAPACITY")? {
            self.index = self.index.clone().capacity(capacity);
        }
        if let Some(min_fill) = parse_var(&lookup, "XIPHOS_MTREE_MIN_FILL")? {
            self.index.min_fill = min_fill;
        }
        if let Some(metric) = lookup("XIPHOS_DISTANCE_METRIC") {
            self.index.distance_metric = DistanceMetric::parse_str(&metric)
                .map_err(|e| XiphosError::config(format!("XIPHOS_DISTANCE_METRIC: {e}")))?;
        }
        if let Some(replicas) = parse_var(&lookup, "XIPHOS_RING_REPLICAS")? {
            self.ring.replicas = replicas;
        }
        if let Some(timeout) = parse_var(&lookup, "XIPHOS_SHARD_TIMEOUT_MS")? {
            self.coordinator.shard_timeout_ms = timeout;
        }
        self.validate()
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.index.validate()?;
        if self.ring.replicas == 0 {
            return Err(XiphosError::config("ring.replicas must be at least 1"));
        }
        self.coordinator.validate()
    }

    /// Build an empty coordinator from this configuration.
    pub fn coordinator(&self) -> Result<QueryCoordinator> {
        let space = MetricSpace::new(self.index.dimension, self.index.distance_metric)?;
        QueryCoordinator::new(space, self.ring.replicas, self.coordinator.clone())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| XiphosError::config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = XiphosConfig::default();
        assert_eq!(config.index.capacity, 4);
        assert_eq!(config.index.min_fill, 2);
        assert_eq!(config.index.distance_metric, DistanceMetric::Euclidean);
        assert_eq!(config.ring.replicas, 100);
        assert_eq!(config.coordinator.shard_timeout_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() -> Result<()> {
        let mut config = XiphosConfig::default();
        config.apply_overrides(lookup(&[
            ("XIPHOS_MTREE_CAPACITY", "16"),
            ("XIPHOS_DISTANCE_METRIC", "manhattan"),
            ("XIPHOS_RING_REPLICAS", " 20 "),
            ("XIPHOS_SHARD_TIMEOUT_MS", "250"),
            ("XIPHOS_DIMENSION", "8"),
        ]))?;
        assert_eq!(config.index.capacity, 16);
        assert_eq!(config.index.min_fill, 8);
        assert_eq!(config.index.dimension, 8);
        assert_eq!(config.index.distance_metric, DistanceMetric::Manhattan);
        assert_eq!(config.ring.replicas, 20);
        assert_eq!(config.coordinator.shard_timeout_ms, 250);

        config.apply_overrides(lookup(&[("XIPHOS_MTREE_MIN_FILL", "3")]))?;
        assert_eq!(config.index.min_fill, 3);
        Ok(())
    }

    #[test]
    fn test_bad_overrides() {
        let mut config = XiphosConfig::default();
        assert!(matches!(
            config.apply_overrides(lookup(&[("XIPHOS_RING_REPLICAS", "many")])),
            Err(XiphosError::Config(_))
        ));
        assert!(matches!(
            config.apply_overrides(lookup(&[("XIPHOS_DISTANCE_METRIC", "cosine")])),
            Err(XiphosError::Config(_))
        ));
        let mut config = XiphosConfig::default();
        assert!(
            config
                .apply_overrides(lookup(&[("XIPHOS_MTREE_MIN_FILL", "3")]))
                .is_err()
        );
    }

    #[test]
    fn test_json_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"index": {{"dimension": 16, "distance_metric": "chebyshev"}}, "ring": {{"replicas": 50}}}}"#
        )?;
        let config = XiphosConfig::from_json_file(file.path())?;
        assert_eq!(config.index.dimension, 16);
        assert_eq!(config.index.capacity, 4);
        assert_eq!(config.index.distance_metric, DistanceMetric::Chebyshev);
        assert_eq!(config.ring.replicas, 50);
        assert_eq!(config.coordinator.shard_timeout_ms, 10_000);

        assert!(XiphosConfig::from_json_str(r#"{"ring": {"replicas": 0}}"#).is_err());
        assert!(XiphosConfig::from_json_str("not json").is_err());
        Ok(())
    }
}
