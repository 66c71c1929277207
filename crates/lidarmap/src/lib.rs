//! lidarmap - live point store with volumetric queries
//!
//! Keeps a rolling window of timestamped lidar returns and answers
//! "which points are inside this viewing volume right now".
//!
//! ## Quick Start
//!
//! ```ignore
//! use lidarmap::{FrustumQuery, PointStore, StoreConfig};
//!
//! let store = PointStore::new(StoreConfig {
//!     max_age_ms: 1000.0,
//!     clean_interval_ms: 50.0,
//! });
//!
//! // Ingestion thread
//! store.add_point(1.0, 0.2, 0.1, timestamp_ms);
//!
//! // Query caller
//! let query = FrustumQuery::new(
//!     [0.0, 0.0, 0.0],
//!     vec![[1.0, 1.0, 1.0], [1.0, -1.0, 1.0], [1.0, -1.0, -1.0], [1.0, 1.0, -1.0]],
//! );
//! let points = lidarmap::query(&store, &query)?;
//! ```
//!
//! ## Volumes
//!
//! A [`Frustum`] is four half-spaces through a common apex. Outward normals,
//! a point is inside when its signed distance to every plane is `<= 0`.

pub mod geometry;
pub mod query;
pub mod store;

use thiserror::Error;

// ============ Primary Public API ============

pub use geometry::{Frustum, GeometryError, Plane};
pub use query::FrustumQuery;
pub use store::{PointStore, StoreConfig, StoreStats, TimedPoint};

/// Validate `query` and scan `store` with the resulting volume.
pub fn query(store: &PointStore, query: &FrustumQuery) -> Result<Vec<TimedPoint>, QueryError> {
    let frustum = query.to_frustum()?;
    Ok(store.query_points_in_frustum(&frustum))
}

// ============ Errors ============

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid query input: {0}")]
    InvalidQueryInput(String),
    #[error("Degenerate volume: {0}")]
    DegenerateVolume(#[from] GeometryError),
}
