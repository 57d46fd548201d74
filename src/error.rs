use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::db::ConflictingOp;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("password required")]
    PasswordRequired,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation conflict: base_version {base_version} is behind {current_version}")]
    OpConflict {
        current_version: i64,
        base_version: i64,
        conflicting_ops: Vec<ConflictingOp>,
    },

    #[error("sync session expired or unknown")]
    SessionExpired,

    #[error("SQLite error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Error::PasswordRequired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "password required", "password_required": true })),
            )
                .into_response(),
            Error::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Error::OpConflict {
                current_version,
                base_version,
                conflicting_ops,
            } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "operation conflict",
                    "current_version": current_version,
                    "base_version": base_version,
                    "conflicting_ops": conflicting_ops,
                })),
            )
                .into_response(),
            Error::SessionExpired => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "sync session expired or unknown" })),
            )
                .into_response(),
            Error::Db(e) => {
                tracing::error!("store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
            Error::Internal(message) => {
                tracing::error!("internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
