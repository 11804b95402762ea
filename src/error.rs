use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShopfloorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ShopfloorResult<T> = Result<T, ShopfloorError>;

impl IntoResponse for ShopfloorError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ShopfloorError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            ShopfloorError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            ShopfloorError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ShopfloorError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ShopfloorError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ShopfloorError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            ShopfloorError::Network(ref e) => {
                tracing::error!("Network error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "Upstream request failed".to_string())
            }
            ShopfloorError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            other => {
                tracing::error!("Unhandled error: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));

        (status, body).into_response()
    }
}
