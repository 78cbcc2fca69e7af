use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use xiphos::error::Result;
use xiphos::index::{InsertOutcome, MTree, MTreeConfig, PromotionPolicy};
use xiphos::vector::{DistanceMetric, Metric, SearchHit, Vector};

fn random_vectors(rng: &mut StdRng, count: usize, dimension: usize) -> Vec<Vector> {
    (0..count)
        .map(|i| {
            let data = (0..dimension).map(|_| rng.random_range(0.0..1.0)).collect();
            Vector::new(format!("v{i:04}"), data)
        })
        .collect()
}

fn brute_force(metric: DistanceMetric, data: &[Vector], query: &[f32]) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = data
        .iter()
        .map(|v| SearchHit::new(v.id.clone(), metric.distance(query, &v.data)))
        .collect();
    hits.sort_by(SearchHit::rank_cmp);
    hits
}

fn build(config: MTreeConfig, data: &[Vector]) -> Result<MTree> {
    let mut tree = MTree::new(config)?;
    for vector in data {
        assert_eq!(tree.insert(vector.clone())?, InsertOutcome::Inserted);
    }
    Ok(tree)
}

#[test]
fn thousand_points_in_eight_dimensions_stay_shallow() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(1000);
    let data = random_vectors(&mut rng, 1000, 8);
    let tree = build(MTreeConfig::new(8).capacity(4), &data)?;

    tree.check_invariants()?;
    assert_eq!(tree.len(), 1000);
    assert!(tree.height() <= 6, "height {} exceeds 6", tree.height());

    let stats = tree.stats();
    assert_eq!(stats.vectors, 1000);
    assert_eq!(stats.height, tree.height());
    assert!(stats.splits > 0);

    let known = &data[417];
    let result = tree.search_knn(&known.data, 10)?;
    assert_eq!(result.hits[0].id, known.id);
    assert_eq!(result.hits[0].distance, 0.0);
    assert!(result.is_sorted());
    Ok(())
}

#[test]
fn knn_and_range_agree_with_linear_scan() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let data = random_vectors(&mut rng, 600, 8);
    let queries = random_vectors(&mut rng, 25, 8);

    for policy in [
        PromotionPolicy::MaxSpread,
        PromotionPolicy::MinMaxRadius,
        PromotionPolicy::MinSumRadius,
    ] {
        let config = MTreeConfig::new(8).capacity(6).promotion(policy);
        let tree = build(config, &data)?;
        tree.check_invariants()?;

        for query in &queries {
            let expected = brute_force(DistanceMetric::Euclidean, &data, &query.data);

            let knn = tree.search_knn(&query.data, 10)?;
            let expected_ids: Vec<&str> = expected[..10].iter().map(|h| h.id.as_str()).collect();
            assert_eq!(knn.ids(), expected_ids, "k-NN under {}", policy.name());
            assert!(knn.stats.distance_computations > 0);

            let radius = expected[20].distance;
            let range = tree.search_range(&query.data, radius)?;
            let within: Vec<&str> = expected
                .iter()
                .filter(|h| h.distance <= radius)
                .map(|h| h.id.as_str())
                .collect();
            assert_eq!(range.ids(), within, "range under {}", policy.name());
        }
    }
    Ok(())
}

#[test]
fn pruning_skips_most_of_a_clustered_dataset() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let mut data = Vec::new();
    for cluster in 0..10 {
        let center = cluster as f32 * 100.0;
        for i in 0..100 {
            let data_point = (0..4).map(|_| center + rng.random_range(-1.0..1.0)).collect();
            data.push(Vector::new(format!("c{cluster}-{i:03}"), data_point));
        }
    }
    let tree = build(MTreeConfig::new(4).capacity(8), &data)?;

    let result = tree.search_knn(&[0.0, 0.0, 0.0, 0.0], 5)?;
    assert!(result.hits.iter().all(|h| h.id.starts_with("c0-")));
    assert!(
        result.stats.distance_computations < data.len() / 2,
        "{} distance computations for {} points",
        result.stats.distance_computations,
        data.len()
    );
    Ok(())
}

#[test]
fn every_metric_answers_exactly() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let data = random_vectors(&mut rng, 300, 5);
    let query = random_vectors(&mut rng, 1, 5).remove(0);

    for metric in [
        DistanceMetric::Euclidean,
        DistanceMetric::Manhattan,
        DistanceMetric::Chebyshev,
        DistanceMetric::Angular,
    ] {
        let tree = build(MTreeConfig::new(5).distance_metric(metric), &data)?;
        tree.check_invariants()?;
        let expected = brute_force(metric, &data, &query.data);
        let result = tree.search_knn(&query.data, 7)?;
        let expected_ids: Vec<&str> = expected[..7].iter().map(|h| h.id.as_str()).collect();
        assert_eq!(result.ids(), expected_ids, "{}", metric.name());
    }
    Ok(())
}

#[test]
fn reinserting_the_same_vector_changes_nothing() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(5);
    let data = random_vectors(&mut rng, 50, 3);
    let mut tree = build(MTreeConfig::new(3), &data)?;
    let before = tree.stats();

    for vector in &data {
        assert_eq!(tree.insert(vector.clone())?, InsertOutcome::AlreadyPresent);
    }
    assert_eq!(tree.stats(), before);

    let mut changed = data[0].clone();
    changed.data[0] += 1.0;
    assert!(tree.insert(changed).is_err());
    assert_eq!(tree.len(), 50);
    Ok(())
}

#[test]
fn angular_search_separates_near_duplicates() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(29);
    let base: Vec<f32> = (0..16).map(|_| rng.random_range(0.5..1.5)).collect();
    let nudge = |rng: &mut StdRng| -> Vec<f32> {
        base.iter()
            .map(|x| x + rng.random_range(-1e-3..1e-3))
            .collect()
    };
    let data: Vec<Vector> = (0..400)
        .map(|i| Vector::new(format!("n{i:04}"), nudge(&mut rng)))
        .collect();

    let config = MTreeConfig::new(16)
        .capacity(8)
        .distance_metric(DistanceMetric::Angular);
    let tree = build(config, &data)?;
    tree.check_invariants()?;

    for _ in 0..100 {
        let query = nudge(&mut rng);
        let expected = brute_force(DistanceMetric::Angular, &data, &query);
        let expected_ids: Vec<&str> = expected[..5].iter().map(|h| h.id.as_str()).collect();
        assert!(expected[0].distance > 0.0);

        let result = tree.search_knn(&query, 5)?;
        assert_eq!(result.ids(), expected_ids);
    }
    Ok(())
}
