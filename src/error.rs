use crate::store::StoreError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// A single rejected field in a request body or query.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced to HTTP clients. Every variant renders as a JSON object
/// with a `message` field.
#[derive(Debug)]
pub enum HttpError {
    BadRequest(&'static str),
    Unauthorized,
    NotFound,
    Validation(&'static str, Vec<FieldError>),
    Internal(&'static str),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "message": msg }))).into_response()
            }
            HttpError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Unauthorized" })),
            )
                .into_response(),
            HttpError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response()
            }
            HttpError::Validation(msg, errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": msg, "errors": errors })),
            )
                .into_response(),
            HttpError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": msg })),
            )
                .into_response(),
        }
    }
}

impl From<StoreError> for HttpError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => HttpError::NotFound,
            StoreError::Database(e) => {
                error!("database error: {}", e);
                HttpError::Internal("Internal Server Error")
            }
        }
    }
}
