//! ServerCore - main public API for lidarmap-server

use std::sync::Arc;

use lidarmap::{FrustumQuery, PointStore, QueryError, StoreConfig, StoreStats, TimedPoint};
use thiserror::Error;

use crate::ingest::HeightFilter;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Query task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Point store shared by the HTTP handlers and bus ingestion
#[derive(Clone)]
pub struct ServerCore {
    store: Arc<PointStore>,
    filter: HeightFilter,
}

impl ServerCore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            store: Arc::new(PointStore::new(config)),
            filter: HeightFilter::default(),
        }
    }

    /// Discard ingested points outside `filter`
    pub fn with_filter(mut self, filter: HeightFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn store(&self) -> &Arc<PointStore> {
        &self.store
    }

    pub fn filter(&self) -> &HeightFilter {
        &self.filter
    }

    /// Store the points that pass the height filter. Returns how many were
    /// kept.
    pub fn ingest<I>(&self, points: I) -> usize
    where
        I: IntoIterator<Item = TimedPoint>,
    {
        let filter = self.filter;
        self.store
            .add_points(points.into_iter().filter(|p| filter.admits(p)))
    }

    /// Run a frustum query (runs on blocking thread pool)
    pub async fn query(&self, query: FrustumQuery) -> Result<Vec<TimedPoint>, CoreError> {
        let store = self.store.clone();
        let points = tokio::task::spawn_blocking(move || lidarmap::query(&store, &query)).await??;
        Ok(points)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}

impl Default for ServerCore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
