//! Benchmark contrast estimation and full bivariate invocations
//!
//! Run with: cargo bench --bench hics_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;
use std::collections::HashSet;

use fexum::pipeline::{
    categorical_columns, ColumnarTable, FeatureCatalog, HicsConfig, HicsRequest, InMemoryStorage,
    IncrementalCorrelation, SliceIndex, DEFAULT_ALPHA,
};

/// Synthetic table with a categorical target driven by the first feature
fn generate_test_table(n_rows: usize, n_features: usize, seed: u64) -> ColumnarTable {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut columns: Vec<(String, Vec<f64>)> = Vec::with_capacity(n_features + 1);

    for i in 0..n_features {
        let values: Vec<f64> = match i % 3 {
            0 => (0..n_rows).map(|_| rng.gen::<f64>() * 100.0).collect(),
            1 => (0..n_rows)
                .map(|_| {
                    let v = rng.gen::<f64>();
                    (v * v * v) * 100.0
                })
                .collect(),
            // Small integer range, profiled as categorical
            _ => (0..n_rows).map(|_| rng.gen_range(0..5) as f64).collect(),
        };
        columns.push((format!("feature_{}", i), values));
    }

    let target: Vec<f64> = columns[0]
        .1
        .iter()
        .map(|v| if *v + rng.gen::<f64>() * 20.0 > 60.0 { 1.0 } else { 0.0 })
        .collect();
    columns.push(("target".to_string(), target));

    ColumnarTable::new(columns).unwrap()
}

/// Contrast of a single feature for varying row counts
fn benchmark_contrast_by_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("contrast_by_rows");
    group.sample_size(30);

    for n_rows in [1_000, 10_000, 100_000] {
        let table = generate_test_table(n_rows, 4, 42);
        let categorical = categorical_columns(&table);
        let index = SliceIndex::new(&table, &categorical);
        let sampler = index.sampler("target", DEFAULT_ALPHA).unwrap();
        let subset = vec!["feature_0".to_string()];

        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::new("bivariate", n_rows), &subset, |b, subset| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(7);
            b.iter(|| {
                let _ = sampler.contrast(black_box(subset), black_box(100), &mut rng);
            });
        });
    }

    group.finish();
}

/// Contrast of growing subsets; each added dimension narrows every slice bound
fn benchmark_contrast_by_dimensions(c: &mut Criterion) {
    let mut group = c.benchmark_group("contrast_by_dimensions");
    group.sample_size(30);

    let table = generate_test_table(10_000, 8, 42);
    let categorical = categorical_columns(&table);
    let index = SliceIndex::new(&table, &categorical);
    let sampler = index.sampler("target", DEFAULT_ALPHA).unwrap();

    for dims in [1, 2, 4, 8] {
        let subset: Vec<String> = (0..dims).map(|i| format!("feature_{}", i)).collect();
        group.bench_with_input(BenchmarkId::new("subset", dims), &subset, |b, subset| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(7);
            b.iter(|| {
                let _ = sampler.contrast(black_box(subset), black_box(100), &mut rng);
            });
        });
    }

    group.finish();
}

/// One bivariate invocation (evaluation plus commit) for varying feature counts
fn benchmark_bivariate_invocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("bivariate_invocation");
    group.sample_size(10);

    for n_features in [10, 50] {
        let table = generate_test_table(10_000, n_features, 42);
        let categorical: HashSet<String> = categorical_columns(&table);
        let config = HicsConfig {
            seed: Some(1),
            ..Default::default()
        };

        group.throughput(Throughput::Elements(n_features as u64));
        group.bench_with_input(
            BenchmarkId::new("features", n_features),
            &table,
            |b, table| {
                b.iter(|| {
                    let storage = InMemoryStorage::new(FeatureCatalog::from_table(table));
                    let result_set = storage.create_result_set("target").unwrap();
                    let mut engine = IncrementalCorrelation::new(
                        table,
                        &categorical,
                        &storage,
                        result_set,
                        config.clone(),
                    )
                    .unwrap();
                    let mode = HicsRequest::bivariate().mode().unwrap();
                    let evidence = engine.evaluate(black_box(&mode)).unwrap();
                    let summary = engine.commit(evidence).unwrap();
                    summary.relevancies.len()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_contrast_by_rows,
    benchmark_contrast_by_dimensions,
    benchmark_bivariate_invocation
);
criterion_main!(benches);
