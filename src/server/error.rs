use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::assignment::AssignmentError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    /// Room full, special-purpose target, duplicate unique key, copies
    /// still issued.
    #[error("{0}")]
    Conflict(String),

    /// Student/room relationship disagrees with the request.
    #[error("{0}")]
    Mismatch(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Internal error")]
    Db(#[from] sqlx::Error),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Mismatch(_) => "mismatch",
            ApiError::Validation(_) => "validation",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Db(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::Mismatch(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Db(ref e) = self {
            tracing::error!("database error: {}", e);
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::RoomNotFound(_) | AssignmentError::StudentNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            AssignmentError::SpecialPurposeRoom { .. } | AssignmentError::RoomFull(_) => {
                ApiError::Conflict(err.to_string())
            }
            AssignmentError::Mismatch { .. } => ApiError::Mismatch(err.to_string()),
            AssignmentError::Db(e) => ApiError::Db(e),
        }
    }
}
