//! Command implementations for the Xiphos CLI.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::XiphosConfig;
use crate::coordinator::{QueryCoordinator, RebalanceReport};
use crate::error::{Result, XiphosError};
use crate::index::MTreeConfig;
use crate::ring::HashRing;
use crate::shard::LocalShard;
use crate::vector::types::rank_cmp;
use crate::vector::{DistanceMetric, Vector};

/// Execute a CLI command.
pub fn execute_command(args: XiphosArgs) -> Result<()> {
    match &args.command {
        Command::Simulate(simulate_args) => simulate(simulate_args.clone(), &args),
        Command::Ring(ring_args) => ring_report(ring_args.clone(), &args),
    }
}

/// Read the configuration file if one was given, then apply environment
/// overrides.
pub fn load_config(cli_args: &XiphosArgs) -> Result<XiphosConfig> {
    let mut config = match &cli_args.config {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            XiphosConfig::from_json_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => XiphosConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

/// Run an in-process cluster and compare its answers to a linear scan.
fn simulate(args: SimulateArgs, cli_args: &XiphosArgs) -> Result<()> {
    if args.nodes == 0 {
        return Err(XiphosError::invalid_argument("--nodes must be at least 1"));
    }

    let mut config = load_config(cli_args)?;
    if let Some(dimension) = args.dimension {
        config.index.dimension = dimension;
    }
    if let Some(capacity) = args.capacity {
        config.index = config.index.capacity(capacity);
    }
    if let Some(metric) = args.metric {
        config.index.distance_metric = metric.into();
    }
    if let Some(promotion) = args.promotion {
        config.index.promotion = promotion.into();
    }
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let report = runtime.block_on(run_simulation(&args, &config))?;

    output_result("Simulation finished", &report, cli_args)?;

    match report.mismatches() {
        0 => Ok(()),
        n => Err(XiphosError::other(format!(
            "{n} queries disagreed with the linear scan"
        ))),
    }
}

async fn run_simulation(args: &SimulateArgs, config: &XiphosConfig) -> Result<SimulationReport> {
    let coordinator = config.coordinator()?;
    for i in 0..args.nodes {
        add_local_node(&coordinator, &config.index, i).await?;
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let dimension = config.index.dimension;
    let data: Vec<Vector> = (0..args.vectors)
        .map(|i| Vector::new(format!("vec-{i:06}"), random_point(&mut rng, dimension)))
        .collect();
    let queries: Vec<Vec<f32>> = (0..args.queries)
        .map(|_| random_point(&mut rng, dimension))
        .collect();

    let start = Instant::now();
    for vector in &data {
        coordinator.insert(vector.clone()).await?;
    }
    let load_duration_ms = start.elapsed().as_millis() as u64;
    info!("loaded {} vectors in {load_duration_ms}ms", data.len());

    let metric = config.index.distance_metric;
    let mut rounds = vec![
        query_round("Queries", &coordinator, &data, &queries, args.k, metric).await?,
    ];

    let mut join = None;
    if args.join {
        let report: RebalanceReport =
            add_local_node(&coordinator, &config.index, args.nodes).await?;
        info!("join moved {} vectors", report.moved);
        join = Some(report);
        rounds.push(
            query_round("After join", &coordinator, &data, &queries, args.k, metric).await?,
        );
    }

    Ok(SimulationReport {
        dimension,
        metric: metric.name().to_string(),
        promotion: config.index.promotion.name().to_string(),
        capacity: config.index.capacity,
        vectors: data.len(),
        k: args.k,
        load_duration_ms,
        rounds,
        join,
        cluster: coordinator.status().await,
    })
}

async fn add_local_node(
    coordinator: &QueryCoordinator,
    index: &MTreeConfig,
    ordinal: usize,
) -> Result<RebalanceReport> {
    let node_id = format!("node-{ordinal}");
    let shard = Arc::new(LocalShard::new(node_id.clone(), index.clone())?);
    coordinator
        .register_node(&node_id, &format!("local://{node_id}"), shard)
        .await
}

async fn query_round(
    label: &str,
    coordinator: &QueryCoordinator,
    data: &[Vector],
    queries: &[Vec<f32>],
    k: usize,
    metric: DistanceMetric,
) -> Result<QueryRound> {
    let points: Vec<&[f32]> = data.iter().map(|v| v.data.as_slice()).collect();

    let mut mismatches = 0;
    let mut partial = 0;
    let mut total_latency_ms = 0.0;
    let mut max_latency_ms: f64 = 0.0;
    let mut computations = 0;

    for query in queries {
        let start = Instant::now();
        let result = coordinator.knn(query, k).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        total_latency_ms += latency_ms;
        max_latency_ms = max_latency_ms.max(latency_ms);
        computations += result.stats.distance_computations;
        if result.is_partial() {
            partial += 1;
        }

        let expected = linear_scan(metric, query, data, &points, k);
        if result.ids() != expected {
            debug!("mismatch: got {:?}, expected {expected:?}", result.ids());
            mismatches += 1;
        }
    }

    let count = queries.len().max(1) as f64;
    let average_distance_computations = computations as f64 / count;
    Ok(QueryRound {
        label: label.to_string(),
        nodes: coordinator.ring().len(),
        queries: queries.len(),
        mismatches,
        partial,
        average_latency_ms: total_latency_ms / count,
        max_latency_ms,
        average_distance_computations,
        scan_ratio: average_distance_computations / data.len().max(1) as f64,
    })
}

/// Ids of the `k` nearest points by exhaustive comparison.
fn linear_scan<'a>(
    metric: DistanceMetric,
    query: &[f32],
    data: &'a [Vector],
    points: &[&[f32]],
    k: usize,
) -> Vec<&'a str> {
    let distances = metric.batch_distance_parallel(query, points);
    let mut ranked: Vec<(f32, &str)> = distances
        .into_iter()
        .zip(data)
        .map(|(d, v)| (d, v.id.as_str()))
        .collect();
    ranked.sort_by(|a, b| rank_cmp(a.0, a.1, b.0, b.1));
    ranked.into_iter().take(k).map(|(_, id)| id).collect()
}

fn random_point(rng: &mut StdRng, dimension: usize) -> Vec<f32> {
    (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Place synthetic keys on a ring and measure the effect of one join.
fn ring_report(args: RingArgs, cli_args: &XiphosArgs) -> Result<()> {
    if args.nodes == 0 {
        return Err(XiphosError::invalid_argument("--nodes must be at least 1"));
    }
    let config = load_config(cli_args)?;
    let replicas = args.replicas.unwrap_or(config.ring.replicas);

    let mut ring = HashRing::new();
    for i in 0..args.nodes {
        let node_id = format!("node-{i}");
        ring.add_node(&node_id, &format!("local://{node_id}"), replicas)?;
    }

    let keys: Vec<String> = (0..args.keys).map(|_| Uuid::new_v4().to_string()).collect();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for key in &keys {
        if let Some(owner) = ring.locate(key) {
            *counts.entry(owner.to_string()).or_insert(0) += 1;
        }
    }

    let ownership = ring.ownership();
    let total_keys = keys.len().max(1) as f64;
    let distribution = ring
        .node_ids()
        .into_iter()
        .map(|node_id| {
            let held = counts.get(&node_id).copied().unwrap_or(0);
            NodeLoad {
                ownership: ownership.get(&node_id).copied().unwrap_or(0.0),
                key_share: held as f64 / total_keys,
                keys: held,
                node_id,
            }
        })
        .collect();

    let joined_node = format!("node-{}", args.nodes);
    let mut next = ring.clone();
    next.add_node(&joined_node, &format!("local://{joined_node}"), replicas)?;
    let moves = ring.plan_moves(&next, &keys);
    let moved_elsewhere = moves
        .iter()
        .filter(|m| m.to.as_deref() != Some(joined_node.as_str()))
        .count();

    let report = RingReport {
        nodes: args.nodes,
        replicas,
        keys: keys.len(),
        distribution,
        moved: moves.len(),
        moved_fraction: moves.len() as f64 / total_keys,
        expected_fraction: 1.0 / (args.nodes + 1) as f64,
        moved_elsewhere,
        joined_node,
    };
    output_result("Ring report", &report, cli_args)
}
