//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, XiphosArgs};
use crate::coordinator::{ClusterStatus, RebalanceReport};
use crate::error::Result;

/// Queries run against one cluster layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRound {
    pub label: String,
    pub nodes: usize,
    pub queries: usize,
    /// Queries whose ids differ from the linear scan.
    pub mismatches: usize,
    /// Queries answered without every shard.
    pub partial: usize,
    pub average_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Distance computations per query, summed over shards.
    pub average_distance_computations: f64,
    /// Fraction of a linear scan's distance computations.
    pub scan_ratio: f64,
}

/// Result of `xiphos simulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub dimension: usize,
    pub metric: String,
    pub promotion: String,
    pub capacity: usize,
    pub vectors: usize,
    pub k: usize,
    pub load_duration_ms: u64,
    pub rounds: Vec<QueryRound>,
    pub join: Option<RebalanceReport>,
    pub cluster: ClusterStatus,
}

impl SimulationReport {
    /// Queries that disagreed with the linear scan, over all rounds.
    pub fn mismatches(&self) -> usize {
        self.rounds.iter().map(|r| r.mismatches).sum()
    }
}

/// Keys held by one ring member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLoad {
    pub node_id: String,
    pub keys: usize,
    pub key_share: f64,
    /// Share of the hash space owned by the node's virtual replicas.
    pub ownership: f64,
}

/// Result of `xiphos ring`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingReport {
    pub nodes: usize,
    pub replicas: usize,
    pub keys: usize,
    pub distribution: Vec<NodeLoad>,
    pub joined_node: String,
    pub moved: usize,
    pub moved_fraction: f64,
    pub expected_fraction: f64,
    /// Moves whose destination is not the joining node.
    pub moved_elsewhere: usize,
}

/// Types that know how to print themselves for a terminal.
pub trait HumanOutput {
    fn print_human(&self);
}

impl HumanOutput for SimulationReport {
    fn print_human(&self) {
        println!("Simulation:");
        println!("═══════════");
        println!(
            "{} vectors, dimension {}, {} metric",
            self.vectors, self.dimension, self.metric
        );
        println!(
            "M-Tree capacity {}, {} promotion",
            self.capacity, self.promotion
        );
        println!("Load time: {}", format_duration(self.load_duration_ms));

        for round in &self.rounds {
            println!();
            println!("{} ({} nodes):", round.label, round.nodes);
            println!("─────────────");
            println!("Queries: {} (k = {})", round.queries, self.k);
            println!("Mismatches vs. linear scan: {}", round.mismatches);
            if round.partial > 0 {
                println!("Partial answers: {}", round.partial);
            }
            println!(
                "Latency: {:.2}ms average, {:.2}ms max",
                round.average_latency_ms, round.max_latency_ms
            );
            println!(
                "Distance computations: {:.1} per query ({:.1}% of a scan)",
                round.average_distance_computations,
                round.scan_ratio * 100.0
            );
        }

        if let Some(join) = &self.join {
            println!();
            println!("Join:");
            println!("─────");
            println!("Vectors moved: {}", join.moved);
            for (node_id, count) in &join.moved_to {
                println!("  -> {node_id}: {count}");
            }
            if join.stranded > 0 {
                println!("Left on a non-owner: {}", join.stranded);
            }
            for failure in &join.skipped {
                println!("  skipped {}: {}", failure.node_id, failure.reason);
            }
        }

        println!();
        println!("Shards:");
        println!("───────");
        for shard in &self.cluster.shards {
            match (&shard.status, &shard.error) {
                (Some(status), _) => println!(
                    "{:<10} {:>7} vectors  height {}  {} nodes",
                    shard.node_id, status.vector_count, status.height, status.node_count
                ),
                (None, Some(error)) => println!("{:<10} unavailable: {error}", shard.node_id),
                (None, None) => println!("{:<10} unknown", shard.node_id),
            }
        }
        println!("Total vectors: {}", self.cluster.total_vectors);
    }
}

impl HumanOutput for RingReport {
    fn print_human(&self) {
        println!("Ring:");
        println!("═════");
        println!(
            "{} nodes x {} replicas, {} keys",
            self.nodes, self.replicas, self.keys
        );
        println!();
        println!("{:<10} {:>8} {:>8} {:>10}", "node", "keys", "share", "ownership");
        for load in &self.distribution {
            println!(
                "{:<10} {:>8} {:>7.2}% {:>9.2}%",
                load.node_id,
                load.keys,
                load.key_share * 100.0,
                load.ownership * 100.0
            );
        }
        println!();
        println!(
            "Joining {}: {} keys move ({:.2}%, expected about {:.2}%)",
            self.joined_node,
            self.moved,
            self.moved_fraction * 100.0,
            self.expected_fraction * 100.0
        );
        if self.moved_elsewhere > 0 {
            println!("Keys moved between existing nodes: {}", self.moved_elsewhere);
        }
    }
}

/// Output a result in the specified format.
pub fn output_result<T>(message: &str, result: &T, args: &XiphosArgs) -> Result<()>
where
    T: Serialize + HumanOutput,
{
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 1 {
                println!("{message}");
                println!();
            }
            result.print_human();
            Ok(())
        }
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &XiphosArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a millisecond duration for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1500), "1.5s");
        assert_eq!(format_duration(125_000), "2m 5s");
    }

    #[test]
    fn test_ring_report_serializes() {
        let report = RingReport {
            nodes: 1,
            replicas: 4,
            keys: 2,
            distribution: vec![NodeLoad {
                node_id: "node-0".to_string(),
                keys: 2,
                key_share: 1.0,
                ownership: 1.0,
            }],
            joined_node: "node-1".to_string(),
            moved: 1,
            moved_fraction: 0.5,
            expected_fraction: 0.5,
            moved_elsewhere: 0,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["distribution"][0]["node_id"], "node-0");
        assert_eq!(value["moved"], 1);
    }
}
