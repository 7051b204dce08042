use std::error::Error;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Unified application error.
///
/// Backend failures, bad input and configuration problems all end up here
/// so handlers can propagate with `?` and still answer with a sensible status.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Network(String),
    Parse(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Validation(String),
    Upstream { status: u16, message: String },
    Unknown(String),
}

impl AppError {
    /// Map a non-success backend status to an error.
    pub fn from_backend_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => AppError::Unauthorized(message),
            403 => AppError::Forbidden(message),
            404 => AppError::NotFound(message),
            422 => AppError::Validation(message),
            _ => AppError::Upstream { status, message },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Network(_) | AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Parse(_) | AppError::Unknown(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message without the kind prefix, for inline banners.
    pub fn message(&self) -> &str {
        match self {
            AppError::Config(msg)
            | AppError::Network(msg)
            | AppError::Parse(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Unknown(msg) => msg,
            AppError::Upstream { message, .. } => message,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Unauthorized(_))
    }

    /// The backend refused the caller's credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AppError::Unauthorized(_) | AppError::Forbidden(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Parse(msg) => write!(f, "Parse error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream { status, message } => {
                write!(f, "Backend error (HTTP {}): {}", status, message)
            }
            AppError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let body = Json(json!({ "success": false, "message": self.message() }));
        (status, body).into_response()
    }
}
