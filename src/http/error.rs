use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::FetchError;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// The only failure a data route reports: a status plus a message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn fetch(what: &str, err: FetchError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to fetch {}: {}", what, err),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
