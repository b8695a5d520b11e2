//! Error-to-response mapping shared by every service

use agentrelay_core::{Error, ErrorBody};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NotRegistered(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::VersionConflict { .. } => StatusCode::CONFLICT,
        Error::InvalidCard(_) => StatusCode::BAD_REQUEST,
        // A dependency (remote registry, database) is down; callers may retry.
        Error::Http(_) | Error::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}
