use criterion::{Criterion, black_box, criterion_group, criterion_main};
use lidarmap::{FrustumQuery, PointStore, StoreConfig, TimedPoint};

fn forward_pyramid() -> FrustumQuery {
    FrustumQuery::new(
        [0.0, 0.0, 0.0],
        vec![
            [1.0, 0.5, 0.5],
            [1.0, -0.5, 0.5],
            [1.0, -0.5, -0.5],
            [1.0, 0.5, -0.5],
        ],
    )
}

/// Roughly one second of returns from a 100k points/s sensor.
fn seeded_store() -> PointStore {
    let store = PointStore::new(StoreConfig {
        max_age_ms: 1000.0,
        clean_interval_ms: 50.0,
    });
    store.add_points((0..100_000).map(|i| {
        let angle = i as f64 * 0.01;
        TimedPoint::new(
            5.0 * angle.cos(),
            5.0 * angle.sin(),
            (i % 32) as f64 * 0.1 - 1.6,
            i as f64 * 0.01,
        )
    }));
    store
}

fn bench_query(c: &mut Criterion) {
    let store = seeded_store();
    let query = forward_pyramid();

    c.bench_function("query_points_in_frustum_100k", |b| {
        b.iter(|| lidarmap::query(black_box(&store), black_box(&query)).unwrap())
    });
}

fn bench_ingest(c: &mut Criterion) {
    let store = seeded_store();
    let mut t = 1000.0;

    c.bench_function("add_point_steady_state", |b| {
        b.iter(|| {
            t += 0.01;
            store.add_point(black_box(1.0), black_box(2.0), black_box(0.5), t);
        })
    });
}

criterion_group!(hot_paths, bench_query, bench_ingest);
criterion_main!(hot_paths);
