//! Command line argument parsing for the Xiphos CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::index::PromotionPolicy;
use crate::vector::DistanceMetric;

/// Xiphos - distributed similarity search over metric spaces
#[derive(Parser, Debug, Clone)]
#[command(name = "xiphos")]
#[command(about = "Distributed similarity search over metric spaces")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct XiphosArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Cluster configuration file (JSON); environment overrides still apply
    #[arg(short, long, value_name = "CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl XiphosArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1, // Default to normal
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run an in-process cluster and check its answers against a linear scan
    Simulate(SimulateArgs),

    /// Show how keys spread over a ring and how many move when a node joins
    Ring(RingArgs),
}

/// Arguments for the cluster simulation
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of shards to start with
    #[arg(short = 'n', long, default_value = "3")]
    pub nodes: usize,

    /// Number of vectors to insert
    #[arg(long, default_value = "1000")]
    pub vectors: usize,

    /// Number of k-NN queries to run
    #[arg(long, default_value = "20")]
    pub queries: usize,

    /// Neighbours per query
    #[arg(short, long, default_value = "10")]
    pub k: usize,

    /// Vector dimension (overrides the configuration)
    #[arg(short, long)]
    pub dimension: Option<usize>,

    /// Distance metric (overrides the configuration)
    #[arg(short, long)]
    pub metric: Option<MetricArg>,

    /// Node capacity (overrides the configuration)
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Split promotion policy (overrides the configuration)
    #[arg(long)]
    pub promotion: Option<PromotionArg>,

    /// Join one more node after loading and query again
    #[arg(long)]
    pub join: bool,

    /// Seed for the random data
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

/// Arguments for the ring report
#[derive(Parser, Debug, Clone)]
pub struct RingArgs {
    /// Number of nodes on the ring
    #[arg(short = 'n', long, default_value = "4")]
    pub nodes: usize,

    /// Virtual replicas per node (overrides the configuration)
    #[arg(short, long)]
    pub replicas: Option<usize>,

    /// Number of synthetic keys to place
    #[arg(long, default_value = "10000")]
    pub keys: usize,
}

/// Distance metrics selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricArg {
    Euclidean,
    Manhattan,
    Chebyshev,
    Angular,
}

impl From<MetricArg> for DistanceMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Euclidean => DistanceMetric::Euclidean,
            MetricArg::Manhattan => DistanceMetric::Manhattan,
            MetricArg::Chebyshev => DistanceMetric::Chebyshev,
            MetricArg::Angular => DistanceMetric::Angular,
        }
    }
}

/// Split promotion policies selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromotionArg {
    MaxSpread,
    MinMaxRadius,
    MinSumRadius,
}

impl From<PromotionArg> for PromotionPolicy {
    fn from(arg: PromotionArg) -> Self {
        match arg {
            PromotionArg::MaxSpread => PromotionPolicy::MaxSpread,
            PromotionArg::MinMaxRadius => PromotionPolicy::MinMaxRadius,
            PromotionArg::MinSumRadius => PromotionPolicy::MinSumRadius,
        }
    }
}

/// Output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_defaults() {
        let args = XiphosArgs::try_parse_from(["xiphos", "simulate"]).unwrap();

        assert_eq!(args.verbosity(), 1);
        assert_eq!(args.output_format, OutputFormat::Human);
        assert!(args.config.is_none());
        if let Command::Simulate(simulate) = args.command {
            assert_eq!(simulate.nodes, 3);
            assert_eq!(simulate.vectors, 1000);
            assert_eq!(simulate.k, 10);
            assert!(simulate.metric.is_none());
            assert!(!simulate.join);
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_simulate_overrides() {
        let args = XiphosArgs::try_parse_from([
            "xiphos",
            "simulate",
            "--nodes",
            "5",
            "--metric",
            "manhattan",
            "--promotion",
            "min-sum-radius",
            "--capacity",
            "8",
            "--join",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.verbosity(), 2);
        if let Command::Simulate(simulate) = args.command {
            assert_eq!(simulate.nodes, 5);
            assert_eq!(simulate.metric, Some(MetricArg::Manhattan));
            assert_eq!(
                simulate.promotion.map(PromotionPolicy::from),
                Some(PromotionPolicy::MinSumRadius)
            );
            assert_eq!(simulate.capacity, Some(8));
            assert!(simulate.join);
        } else {
            panic!("Expected Simulate command");
        }
    }

    #[test]
    fn test_ring_args_and_global_flags() {
        let args = XiphosArgs::try_parse_from([
            "xiphos", "ring", "--replicas", "16", "--format", "json", "--pretty", "-q",
        ])
        .unwrap();

        assert_eq!(args.verbosity(), 0);
        assert_eq!(args.output_format, OutputFormat::Json);
        assert!(args.pretty);
        if let Command::Ring(ring) = args.command {
            assert_eq!(ring.nodes, 4);
            assert_eq!(ring.replicas, Some(16));
            assert_eq!(ring.keys, 10_000);
        } else {
            panic!("Expected Ring command");
        }
    }

    #[test]
    fn test_rejects_unknown_metric() {
        assert!(XiphosArgs::try_parse_from(["xiphos", "simulate", "--metric", "cosine"]).is_err());
    }
}
