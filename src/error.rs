use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::models::ValidationError;
use crate::store::StoreError;

/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            Self::Store(StoreError::DuplicateEnrollment) => {
                (StatusCode::BAD_REQUEST, "duplicate_enrollment")
            }
            Self::Store(StoreError::AlreadyCompleted(_)) => (StatusCode::BAD_REQUEST, "validation"),
            Self::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = self.parts();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "storage error");
            "internal storage error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

// Malformed requests are validation errors rather than axum's plain-text rejections.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(ValidationError::new(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(ValidationError::new(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(ValidationError::new(rejection.body_text()))
    }
}
