//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use envmon_stats::StatsError;
use envmon_workflow::DeskError;
use tracing::warn;

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub error: String,
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthorized",
            error: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: "validation",
            error: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            error: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            kind: "conflict",
            error: msg.into(),
        }
    }
}

impl From<DeskError> for ApiError {
    fn from(e: DeskError) -> Self {
        let status = match &e {
            DeskError::Validation(_) | DeskError::Stats(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DeskError::NotFound { .. } => StatusCode::NOT_FOUND,
            DeskError::Access(_) => StatusCode::FORBIDDEN,
            DeskError::Transition(_) | DeskError::Locked { .. } => StatusCode::CONFLICT,
        };
        Self {
            status,
            kind: e.kind(),
            error: e.to_string(),
        }
    }
}

impl From<StatsError> for ApiError {
    fn from(e: StatsError) -> Self {
        DeskError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = self.status.as_u16(), kind = self.kind, "request refused: {}", self.error);
        (
            self.status,
            Json(ErrorResponse {
                error: self.error,
                kind: self.kind.to_string(),
            }),
        )
            .into_response()
    }
}
