//! HTTP REST handlers

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use log::{debug, info, warn};

use crate::core::ServerCore;
use crate::error::AppError;
use crate::state::{
    ErrorResponse, IngestRequest, IngestResponse, PointsResponse, QueryRequest, StatsResponse,
};

/// Points currently inside a viewing volume
#[utoipa::path(
    post,
    path = "/query",
    request_body = QueryRequest,
    responses(
        (
            status = 200,
            description = "Live points in the volume, oldest first",
            body = PointsResponse
        ),
        (status = 400, description = "Malformed query", body = ErrorResponse),
        (status = 422, description = "Directions do not span a volume", body = ErrorResponse)
    )
)]
pub async fn query(
    State(core): State<Arc<ServerCore>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<PointsResponse>, AppError> {
    let start = Instant::now();
    let Json(request) = body?;
    debug!("POST /query: {:?}", request);

    let points = match core.query(request.into()).await {
        Ok(points) => points,
        Err(e) => {
            warn!("Query failed in {:.2?}: {}", start.elapsed(), e);
            return Err(e.into());
        }
    };

    info!(
        "Query succeeded in {:.2?}, {} points",
        start.elapsed(),
        points.len()
    );
    Ok(Json(PointsResponse {
        points: points.into_iter().map(Into::into).collect(),
    }))
}

/// Add points directly, bypassing the message bus
#[utoipa::path(
    post,
    path = "/points",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Number of points stored", body = IngestResponse),
        (status = 400, description = "Malformed body", body = ErrorResponse)
    )
)]
pub async fn ingest_points(
    State(core): State<Arc<ServerCore>>,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    let Json(request) = body?;
    let received = request.points.len();
    let accepted = core.ingest(request.points.into_iter().map(Into::into));
    info!("POST /points: stored {}/{}", accepted, received);
    Ok(Json(IngestResponse { accepted }))
}

/// Store size and retention settings
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Store statistics", body = StatsResponse)
    )
)]
pub async fn stats(State(core): State<Arc<ServerCore>>) -> Json<StatsResponse> {
    debug!("GET /stats");
    Json(core.stats().into())
}
