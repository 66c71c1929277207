//! Store behaviour with ingestion and queries running on separate threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use lidarmap::{FrustumQuery, PointStore, QueryError, StoreConfig, TimedPoint};

fn forward_pyramid() -> FrustumQuery {
    FrustumQuery::new(
        [0.0, 0.0, 0.0],
        vec![
            [1.0, 1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
        ],
    )
}

#[test]
fn documented_eviction_scenario() {
    let store = PointStore::new(StoreConfig {
        max_age_ms: 1000.0,
        clean_interval_ms: 500.0,
    });
    store.add_point(1.0, 1.0, 1.0, 0.0);
    store.add_point(1.0, 1.0, 1.0, 2000.0);
    store.add_point(1.0, 1.0, 1.0, 2100.0);

    let points = lidarmap::query(&store, &forward_pyramid()).unwrap();
    assert_eq!(
        points,
        vec![
            TimedPoint::new(1.0, 1.0, 1.0, 2000.0),
            TimedPoint::new(1.0, 1.0, 1.0, 2100.0),
        ]
    );
}

#[test]
fn query_errors_surface_to_caller() {
    let store = PointStore::default();

    let short = FrustumQuery::new([0.0; 3], vec![[1.0, 0.0, 0.0]; 3]);
    assert!(matches!(
        lidarmap::query(&store, &short),
        Err(QueryError::InvalidQueryInput(_))
    ));

    let collinear = FrustumQuery::new([0.0; 3], vec![[1.0, 0.0, 0.0]; 4]);
    assert!(matches!(
        lidarmap::query(&store, &collinear),
        Err(QueryError::DegenerateVolume(_))
    ));
}

#[test]
fn concurrent_ingestion_and_queries() {
    let store = Arc::new(PointStore::new(StoreConfig {
        max_age_ms: 200.0,
        clean_interval_ms: 20.0,
    }));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let store = store.clone();
        let done = done.clone();
        thread::spawn(move || {
            for i in 0..20_000u32 {
                let t = i as f64 * 0.1;
                // Alternate in front of and behind the apex.
                let x = if i % 2 == 0 { 5.0 } else { -5.0 };
                store.add_point(x, 0.0, 0.0, t);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let query = forward_pyramid();
    let mut rounds = 0;
    while !done.load(Ordering::SeqCst) || rounds == 0 {
        let points = lidarmap::query(&store, &query).unwrap();
        assert!(points.iter().all(|p| p.x > 0.0));
        // Insertion order is preserved in results.
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        rounds += 1;
    }
    writer.join().unwrap();

    let stats = store.stats();
    let newest = 19_999.0 * 0.1;
    for point in store.snapshot() {
        assert!(stats.last_clean_ms - point.timestamp <= stats.max_age_ms);
        assert!(point.timestamp <= newest);
    }
}
