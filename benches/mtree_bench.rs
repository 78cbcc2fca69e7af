use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use xiphos::index::{MTree, MTreeConfig, PromotionPolicy};
use xiphos::vector::Vector;

fn generate_test_vectors(count: usize, dimension: usize) -> Vec<Vector> {
    let mut vectors = Vec::with_capacity(count);
    for i in 0..count {
        let mut data = Vec::with_capacity(dimension);
        for j in 0..dimension {
            let value = ((i as f32 * 0.37 + j as f32 * 1.13).sin() * 0.5 + 0.5) * 2.0 - 1.0;
            data.push(value);
        }
        vectors.push(Vector::new(format!("v{i:06}"), data));
    }
    vectors
}

fn build_tree(config: MTreeConfig, vectors: &[Vector]) -> MTree {
    let mut tree = MTree::new(config).unwrap();
    for vector in vectors {
        tree.insert(vector.clone()).unwrap();
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let dimension = 16;
    let vectors = generate_test_vectors(2_000, dimension);

    let mut group = c.benchmark_group("mtree_insert");
    group.sample_size(10);
    for policy in [
        PromotionPolicy::MaxSpread,
        PromotionPolicy::MinMaxRadius,
        PromotionPolicy::MinSumRadius,
    ] {
        let config = MTreeConfig::new(dimension).capacity(16).promotion(policy);
        group.bench_function(policy.name(), |b| {
            b.iter(|| black_box(build_tree(config.clone(), &vectors)))
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let dimension = 16;
    let vectors = generate_test_vectors(10_000, dimension);
    let queries = generate_test_vectors(50, dimension);
    let tree = build_tree(MTreeConfig::new(dimension).capacity(16), &vectors);

    let mut group = c.benchmark_group("mtree_knn");
    for k in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| {
                for query in &queries {
                    let _ = black_box(tree.search_knn(black_box(&query.data), k).unwrap());
                }
            })
        });
    }
    group.finish();

    c.bench_function("mtree_range", |b| {
        b.iter(|| {
            for query in &queries {
                let _ = black_box(tree.search_range(black_box(&query.data), 0.5).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
