//! Request and response bodies for the HTTP API

use lidarmap::{FrustumQuery, StoreStats, TimedPoint};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// Viewing volume: an apex and four edge directions relative to it, in
/// winding order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub origin: Vec3,
    pub directions: Vec<Vec3>,
}

impl From<QueryRequest> for FrustumQuery {
    fn from(req: QueryRequest) -> Self {
        FrustumQuery::new(
            req.origin.into(),
            req.directions.into_iter().map(Into::into).collect(),
        )
    }
}

/// A point with its capture time in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PointBody {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: f64,
}

impl From<TimedPoint> for PointBody {
    fn from(p: TimedPoint) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            timestamp: p.timestamp,
        }
    }
}

impl From<PointBody> for TimedPoint {
    fn from(p: PointBody) -> Self {
        TimedPoint::new(p.x, p.y, p.z, p.timestamp)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PointsResponse {
    pub points: Vec<PointBody>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestRequest {
    pub points: Vec<PointBody>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    /// Points stored after filtering
    pub accepted: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub points: usize,
    pub max_age_ms: f64,
    pub clean_interval_ms: f64,
    pub last_clean_ms: f64,
}

impl From<StoreStats> for StatsResponse {
    fn from(s: StoreStats) -> Self {
        Self {
            points: s.points,
            max_age_ms: s.max_age_ms,
            clean_interval_ms: s.clean_interval_ms,
            last_clean_ms: s.last_clean_ms,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
