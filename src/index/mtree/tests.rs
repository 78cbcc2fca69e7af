use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, XiphosError};
use crate::index::config::{MTreeConfig, PromotionPolicy};
use crate::index::mtree::{InsertOutcome, MTree};
use crate::vector::{DistanceMetric, Metric, MetricSpace, SearchHit, Vector};

const POLICIES: [PromotionPolicy; 3] = [
    PromotionPolicy::MaxSpread,
    PromotionPolicy::MinMaxRadius,
    PromotionPolicy::MinSumRadius,
];

fn random_vectors(rng: &mut StdRng, n: usize, dimension: usize) -> Vec<Vector> {
    (0..n)
        .map(|i| {
            let data = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
            Vector::new(format!("v{i:04}"), data)
        })
        .collect()
}

fn brute_force(space: &MetricSpace, data: &[Vector], query: &[f32]) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = data
        .iter()
        .map(|v| SearchHit::new(v.id.clone(), space.distance(query, &v.data)))
        .collect();
    hits.sort_by(SearchHit::rank_cmp);
    hits
}

fn id_distance(hits: &[SearchHit]) -> Vec<(String, f32)> {
    hits.iter().map(|h| (h.id.clone(), h.distance)).collect()
}

#[test]
fn test_empty_tree() -> Result<()> {
    let tree = MTree::new(MTreeConfig::new(3))?;
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert!(tree.search_knn(&[0.0, 0.0, 0.0], 5)?.is_empty());
    assert!(tree.search_range(&[0.0, 0.0, 0.0], 10.0)?.is_empty());
    tree.check_invariants()?;
    Ok(())
}

#[test]
fn test_argument_errors() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(3))?;
    tree.insert(Vector::new("a", vec![1.0, 2.0, 3.0]))?;

    assert!(matches!(
        tree.insert(Vector::new("b", vec![1.0, 2.0])),
        Err(XiphosError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert!(matches!(
        tree.search_knn(&[0.0, 0.0, 0.0], 0),
        Err(XiphosError::InvalidArgument(_))
    ));
    assert!(matches!(
        tree.search_knn(&[0.0, 0.0], 1),
        Err(XiphosError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        tree.search_range(&[0.0, 0.0, 0.0], -1.0),
        Err(XiphosError::InvalidArgument(_))
    ));
    assert!(matches!(
        tree.search_range(&[0.0, 0.0, 0.0], f32::NAN),
        Err(XiphosError::InvalidArgument(_))
    ));
    assert_eq!(tree.len(), 1);
    Ok(())
}

#[test]
fn test_duplicate_insert_is_idempotent() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(2))?;
    assert_eq!(
        tree.insert(Vector::new("a", vec![1.0, 1.0]))?,
        InsertOutcome::Inserted
    );
    assert_eq!(
        tree.insert(Vector::new("a", vec![1.0, 1.0]))?,
        InsertOutcome::AlreadyPresent
    );
    assert!(matches!(
        tree.insert(Vector::new("a", vec![2.0, 1.0])),
        Err(XiphosError::DuplicateId(id)) if id == "a"
    ));
    assert_eq!(tree.len(), 1);

    let result = tree.search_knn(&[1.0, 1.0], 10)?;
    assert_eq!(result.ids(), vec!["a"]);
    Ok(())
}

#[test]
fn test_invariants_hold_after_every_insert() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let data = random_vectors(&mut rng, 200, 4);
    for policy in POLICIES {
        let config = MTreeConfig::new(4).capacity(4).promotion(policy);
        let mut tree = MTree::new(config)?;
        for v in &data {
            tree.insert(v.clone())?;
            tree.check_invariants()?;
        }
        assert_eq!(tree.len(), 200);
        assert!(tree.height() >= 3, "{policy:?}: height {}", tree.height());
        assert!(tree.stats().splits > 0);
    }
    Ok(())
}

#[test]
fn test_knn_matches_brute_force() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let data = random_vectors(&mut rng, 300, 6);
    let queries = random_vectors(&mut rng, 10, 6);

    for metric in [
        DistanceMetric::Euclidean,
        DistanceMetric::Manhattan,
        DistanceMetric::Chebyshev,
        DistanceMetric::Angular,
    ] {
        for policy in POLICIES {
            let config = MTreeConfig::new(6)
                .capacity(5)
                .distance_metric(metric)
                .promotion(policy);
            let mut tree = MTree::new(config)?;
            for v in &data {
                tree.insert(v.clone())?;
            }
            tree.check_invariants()?;

            for q in &queries {
                let expected = brute_force(tree.space(), &data, &q.data);
                for k in [1, 3, 10, 50] {
                    let result = tree.search_knn(&q.data, k)?;
                    assert!(result.is_sorted());
                    assert_eq!(
                        id_distance(&result.hits),
                        id_distance(&expected[..k]),
                        "{metric:?} {policy:?} k={k}"
                    );
                }
            }
        }
    }
    Ok(())
}

#[test]
fn test_knn_prunes() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let data = random_vectors(&mut rng, 2000, 2);
    let mut tree = MTree::new(MTreeConfig::new(2).capacity(8))?;
    for v in &data {
        tree.insert(v.clone())?;
    }
    let result = tree.search_knn(&[0.1, 0.2], 5)?;
    assert_eq!(result.len(), 5);
    assert!(result.stats.distance_computations < data.len());
    Ok(())
}

#[test]
fn test_k_larger_than_tree() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(1))?;
    for (i, x) in [3.0, 1.0, 2.0].into_iter().enumerate() {
        tree.insert(Vector::new(format!("v{i}"), vec![x]))?;
    }
    let result = tree.search_knn(&[0.0], 10)?;
    assert_eq!(result.ids(), vec!["v1", "v2", "v0"]);
    Ok(())
}

#[test]
fn test_range_matches_brute_force() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(21);
    let data = random_vectors(&mut rng, 300, 3);
    let queries = random_vectors(&mut rng, 10, 3);
    let mut tree = MTree::new(MTreeConfig::new(3).capacity(4))?;
    for v in &data {
        tree.insert(v.clone())?;
    }

    for q in &queries {
        for radius in [0.0, 0.25, 0.6, 1.5, 10.0] {
            let expected: Vec<SearchHit> = brute_force(tree.space(), &data, &q.data)
                .into_iter()
                .filter(|h| h.distance <= radius)
                .collect();
            let result = tree.search_range(&q.data, radius)?;
            assert_eq!(id_distance(&result.hits), id_distance(&expected));
        }
    }
    Ok(())
}

#[test]
fn test_range_is_inclusive() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(1))?;
    tree.insert(Vector::new("edge", vec![2.0]))?;
    tree.insert(Vector::new("out", vec![2.5]))?;
    let result = tree.search_range(&[0.0], 2.0)?;
    assert_eq!(result.ids(), vec!["edge"]);
    Ok(())
}

#[test]
fn test_ties_broken_by_id() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(2))?;
    for id in ["d", "b", "e", "a", "c", "f"] {
        tree.insert(Vector::new(id, vec![1.0, 0.0]))?;
    }
    tree.check_invariants()?;
    let result = tree.search_knn(&[0.0, 0.0], 3)?;
    assert_eq!(result.ids(), vec!["a", "b", "c"]);
    Ok(())
}

#[test]
fn test_metadata_is_returned() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(1))?;
    let mut v = Vector::new("doc", vec![0.5]);
    v.add_metadata("title".to_string(), "hello".to_string());
    tree.insert(v)?;
    let result = tree.search_knn(&[0.0], 1)?;
    assert_eq!(
        result.hits[0].metadata.get("title").map(String::as_str),
        Some("hello")
    );
    Ok(())
}

#[test]
fn test_release_rebuilds_without_released_vectors() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let data = random_vectors(&mut rng, 100, 3);
    let mut tree = MTree::new(MTreeConfig::new(3))?;
    for v in &data {
        tree.insert(v.clone())?;
    }

    let to_release: Vec<String> = data.iter().step_by(3).map(|v| v.id.clone()).collect();
    let released = tree.release(&to_release);
    assert_eq!(released.len(), to_release.len());
    assert_eq!(tree.len(), data.len() - to_release.len());
    tree.check_invariants()?;
    for id in &to_release {
        assert!(!tree.contains(id));
    }

    let kept: Vec<Vector> = data
        .iter()
        .filter(|v| !to_release.contains(&v.id))
        .cloned()
        .collect();
    let q = [0.0, 0.0, 0.0];
    let expected = brute_force(tree.space(), &kept, &q);
    let result = tree.search_knn(&q, 10)?;
    assert_eq!(id_distance(&result.hits), id_distance(&expected[..10]));

    assert!(tree.release(&["missing".to_string()]).is_empty());
    Ok(())
}

#[derive(Debug)]
struct Discrete;

impl Metric for Discrete {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        if a == b { 0.0 } else { 1.0 }
    }

    fn name(&self) -> &str {
        "discrete"
    }
}

#[test]
fn test_custom_metric() -> Result<()> {
    let mut tree = MTree::with_metric(MTreeConfig::new(1), Arc::new(Discrete))?;
    for i in 0..20 {
        tree.insert(Vector::new(format!("v{i:02}"), vec![(i % 4) as f32]))?;
    }
    tree.check_invariants()?;

    let result = tree.search_knn(&[2.0], 6)?;
    assert_eq!(
        result.ids(),
        vec!["v02", "v06", "v10", "v14", "v18", "v00"]
    );
    assert_eq!(tree.search_range(&[3.0], 0.0)?.len(), 5);
    Ok(())
}

#[test]
fn test_stats() -> Result<()> {
    let mut tree = MTree::new(MTreeConfig::new(1).capacity(2))?;
    for i in 0..10 {
        tree.insert(Vector::new(format!("v{i}"), vec![i as f32]))?;
    }
    let stats = tree.stats();
    assert_eq!(stats.vectors, 10);
    assert_eq!(stats.capacity, 2);
    assert_eq!(stats.height, tree.height());
    assert!(stats.leaves >= 5);
    assert!(stats.nodes > stats.leaves);
    assert_eq!(tree.ids().len(), 10);
    assert_eq!(tree.get("v3").map(|v| v.data.clone()), Some(vec![3.0]));
    Ok(())
}
