//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sharing::ShareError;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Forbidden(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    TooManyRequests(String),
    Internal(String),
}

impl From<ShareError> for AppError {
    fn from(err: ShareError) -> Self {
        match err {
            ShareError::InvalidToken => {
                AppError::Forbidden("Access denied: Invalid or missing token".to_string())
            }
            ShareError::RateLimited { .. } => AppError::TooManyRequests(err.to_string()),
            ShareError::UnsupportedType(msg) => AppError::UnsupportedMediaType(msg),
            ShareError::PayloadTooLarge { max } => AppError::PayloadTooLarge(format!(
                "File too large: Maximum file size is {}MB",
                max / (1024 * 1024)
            )),
            ShareError::MalformedMultipart(msg) => AppError::BadRequest(format!("Bad request: {}", msg)),
            ShareError::TransferIo(_) => {
                tracing::error!("{}", err);
                AppError::Internal(format!("Error downloading file: {}", err))
            }
            ShareError::StorageIo(_) => {
                tracing::error!("{}", err);
                AppError::Internal(format!("Server error: {}", err))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            AppError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}
