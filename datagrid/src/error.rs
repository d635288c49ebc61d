use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::envelope::JsonEnvelope;
use crate::session::SessionError;

/// HTTP 层错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    /// 请求格式错误或参数非法
    #[error("{0}")]
    BadRequest(String),

    /// DDL 执行失败
    #[error(transparent)]
    Database(#[from] db_driver::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(err) => match err {
                SessionError::InvalidTarget(_) | SessionError::UnknownSession(_) => {
                    StatusCode::NOT_FOUND
                }
                SessionError::InvalidState { .. } | SessionError::DuplicateSession(_) => {
                    StatusCode::CONFLICT
                }
                SessionError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
                SessionError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(err) if err.is_not_found() => StatusCode::GONE,
            ApiError::Database(db_driver::Error::ConnectionFailed(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }
        (status, Json(JsonEnvelope::error(self.to_string()))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
