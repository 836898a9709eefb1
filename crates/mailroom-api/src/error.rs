use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use mailroom_dispatch::DispatchError;
use mailroom_types::api::ErrorResponse;

/// Handler error rendered as `{ status, error, message }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Invalid username or password.")]
    Unauthorized,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Dispatch(DispatchError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Dispatch(DispatchError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Dispatch(DispatchError::Store(_)) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "An unexpected error occurred.".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
