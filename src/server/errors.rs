use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::query::QueryError;

/// Anything a handler can fail with, rendered as `{"detail": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Rejected(#[from] JsonRejection),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub fn query_status(err: &QueryError) -> StatusCode {
    match err {
        QueryError::InvalidInput(_) | QueryError::InvalidRequest { .. } => {
            StatusCode::BAD_REQUEST
        }
        QueryError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        QueryError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
        QueryError::NotFound { .. } => StatusCode::NOT_FOUND,
        QueryError::UpstreamService { .. }
        | QueryError::UnknownUpstream { .. }
        | QueryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Undecodable and mistyped bodies are both 422; other rejections keep
/// axum's status (415 for a missing JSON content type).
pub fn rejection_status(rejection: &JsonRejection) -> StatusCode {
    match rejection {
        JsonRejection::JsonSyntaxError(_) | JsonRejection::JsonDataError(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        other => other.status(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Query(e) => (query_status(&e), e.to_string()),
            ApiError::Rejected(rejection) => {
                let status = rejection_status(&rejection);
                warn!(status = %status, error = %rejection, "request body rejected");
                (status, rejection.body_text())
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}
