//! Shared API error type for HTTP handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use lidarmap::QueryError;

use crate::core::CoreError;
use crate::state::ErrorResponse;

/// Application error type surfaced by handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        let status = match e {
            QueryError::InvalidQueryInput(_) => StatusCode::BAD_REQUEST,
            QueryError::DegenerateVolume(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        AppError::new(status, e.to_string())
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Query(e) => e.into(),
            CoreError::Task(e) => AppError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }
}

/// Malformed JSON is an invalid query, whatever axum would have said.
impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, e.body_text())
    }
}
