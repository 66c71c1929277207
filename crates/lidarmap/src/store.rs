//! Time-bounded point store
//!
//! Points are appended as they stream in from the sensor. Eviction is driven
//! by the stream itself: whenever an insert's timestamp has moved more than
//! `clean_interval_ms` past the previous clean, every point older than
//! `max_age_ms` (relative to that timestamp) is dropped before the insert
//! returns. No background timer is involved.
//!
//! Queries are full linear scans. All access goes through one `RwLock`, so a
//! query never observes a collection that is being resized.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, trace};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::Frustum;

/// A single sensor return with its capture time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl TimedPoint {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { x, y, z, timestamp }
    }

    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.timestamp.is_finite()
    }
}

/// Retention settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Points older than this (relative to the newest clean time) are evicted
    pub max_age_ms: f64,
    /// Minimum timestamp advance between two eviction passes
    pub clean_interval_ms: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 1000.0,
            clean_interval_ms: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoreStats {
    pub points: usize,
    pub max_age_ms: f64,
    pub clean_interval_ms: f64,
    pub last_clean_ms: f64,
}

struct StoreState {
    points: Vec<TimedPoint>,
    last_clean_ms: f64,
}

impl StoreState {
    /// Returns false if the point was rejected.
    fn push(&mut self, point: TimedPoint, config: &StoreConfig) -> bool {
        if !point.is_finite() {
            trace!("Dropping non-finite point {:?}", point);
            return false;
        }

        self.points.push(point);

        let now = point.timestamp;
        if now - self.last_clean_ms > config.clean_interval_ms {
            let before = self.points.len();
            self.points
                .retain(|p| now - p.timestamp <= config.max_age_ms);
            self.last_clean_ms = now;

            let evicted = before - self.points.len();
            if evicted > 0 {
                debug!(
                    "Evicted {} points at t={}ms, {} remain",
                    evicted,
                    now,
                    self.points.len()
                );
            }
        }
        true
    }
}

/// Live set of sensor points, safe to share between an ingestion thread and
/// query callers.
pub struct PointStore {
    config: StoreConfig,
    state: RwLock<StoreState>,
}

impl PointStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: RwLock::new(StoreState {
                points: Vec::new(),
                last_clean_ms: 0.0,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one point, running an eviction pass first if it is due.
    ///
    /// Points with a non-finite coordinate or timestamp are dropped.
    pub fn add_point(&self, x: f64, y: f64, z: f64, timestamp: f64) {
        self.write()
            .push(TimedPoint::new(x, y, z, timestamp), &self.config);
    }

    /// Append a batch under a single lock acquisition.
    ///
    /// Behaves exactly like calling [`add_point`](Self::add_point) for each
    /// point in order. Returns the number of points stored.
    pub fn add_points<I>(&self, points: I) -> usize
    where
        I: IntoIterator<Item = TimedPoint>,
    {
        let mut state = self.write();
        let mut accepted = 0;
        for point in points {
            if state.push(point, &self.config) {
                accepted += 1;
            }
        }
        accepted
    }

    /// All live points inside `frustum`, in insertion order.
    pub fn query_points_in_frustum(&self, frustum: &Frustum) -> Vec<TimedPoint> {
        self.read()
            .points
            .iter()
            .filter(|p| frustum.contains_xyz(p.x, p.y, p.z))
            .copied()
            .collect()
    }

    /// Copy of every live point.
    pub fn snapshot(&self) -> Vec<TimedPoint> {
        self.read().points.clone()
    }

    pub fn len(&self) -> usize {
        self.read().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().points.is_empty()
    }

    /// Drop every point. The clean clock is left untouched.
    pub fn clear(&self) {
        self.write().points.clear();
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.read();
        StoreStats {
            points: state.points.len(),
            max_age_ms: self.config.max_age_ms,
            clean_interval_ms: self.config.clean_interval_ms,
            last_clean_ms: state.last_clean_ms,
        }
    }
}

impl Default for PointStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}
