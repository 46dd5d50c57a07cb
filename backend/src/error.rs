use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::ErrorBody;
use thiserror::Error;

/// Error taxonomy for every core operation.
///
/// Each variant carries a stable code + message pair so the UI can act on
/// failures without parsing free-form text; no unstructured error crosses
/// the API boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no authenticated user")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("malformed week id: {0}")]
    MalformedWeekId(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// A persisted JSON column failed to encode or decode
    #[error("storage failure: {0}")]
    StorageEncoding(#[from] serde_json::Error),
}

impl AppError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "unauthenticated",
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::MalformedWeekId(_) => "malformed_week_id",
            AppError::Storage(_) | AppError::StorageEncoding(_) => "storage_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::MalformedWeekId(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::StorageEncoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Storage(_) | AppError::StorageEncoding(_)) {
            tracing::error!("storage error: {self}");
        }
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
