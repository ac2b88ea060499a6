// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Too many requests: {message}")]
    ResourceExhausted {
        message: String,
        retry_after_seconds: i64,
    },

    #[error("Expired: {0}")]
    DeadlineExceeded(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Precondition failed: {0}")]
    FailedPrecondition(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            AppError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid-argument"),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AppError::PermissionDenied(_) => (StatusCode::FORBIDDEN, "permission-denied"),
            AppError::ResourceExhausted { .. } => (StatusCode::TOO_MANY_REQUESTS, "resource-exhausted"),
            AppError::DeadlineExceeded(_) => (StatusCode::GONE, "deadline-exceeded"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not-found"),
            AppError::AlreadyExists(_) => (StatusCode::CONFLICT, "already-exists"),
            AppError::FailedPrecondition(_) => (StatusCode::PRECONDITION_FAILED, "failed-precondition"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Database internals never reach the client
        let message = match &self {
            AppError::MongoDB(_) => "Database error".to_string(),
            other => other.to_string(),
        };

        let mut body = json!({
            "success": false,
            "error": code,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let AppError::ResourceExhausted { retry_after_seconds, .. } = &self {
            body["retry_after_seconds"] = json!(retry_after_seconds);
        }

        (status, Json(body)).into_response()
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing failed: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Internal(format!("HTTP request failed: {}", err))
    }
}

// Helper constructors
impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidArgument(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        AppError::PermissionDenied(msg.into())
    }

    pub fn expired(msg: impl Into<String>) -> Self {
        AppError::DeadlineExceeded(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>, retry_after_seconds: i64) -> Self {
        AppError::ResourceExhausted {
            message: msg.into(),
            retry_after_seconds,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
