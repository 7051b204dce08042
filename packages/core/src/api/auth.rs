//! JSON auth routes under `/api/auth`.
//!
//! Every response carries `success` and `message`; failures never leak
//! anything beyond the fixed messages below.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::app::SharedState;
use crate::auth::AuthError;

pub const NO_TOKEN: &str = "No token provided";

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn failure(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn auth_failure(err: &AuthError) -> Response {
    let status = match err {
        AuthError::MissingCredentials => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials | AuthError::UserNotFound | AuthError::InvalidToken(_) => {
            StatusCode::UNAUTHORIZED
        }
        AuthError::Issue(_) => {
            tracing::error!("Login API error: {}", err);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };
    failure(status, &err.to_string())
}

/// `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

pub async fn login(
    State(state): State<SharedState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::error!("Login API error: {}", rejection.body_text());
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    let username = request.username.unwrap_or_default();
    let password = request.password.unwrap_or_default();
    match state.auth.login(&username, &password) {
        Ok(outcome) => {
            state.metrics.record_login("success");
            Json(json!({
                "success": true,
                "message": "Login successful",
                "user": outcome.user,
                "token": outcome.token,
            }))
            .into_response()
        }
        Err(err) => {
            state.metrics.record_login(match err {
                AuthError::InvalidCredentials => "invalid",
                AuthError::MissingCredentials => "missing",
                _ => "error",
            });
            auth_failure(&err)
        }
    }
}

pub async fn verify(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return failure(StatusCode::UNAUTHORIZED, NO_TOKEN);
    };

    match state.auth.verify(token) {
        Ok(user) => Json(json!({
            "success": true,
            "user": user,
            "message": "Token is valid",
        }))
        .into_response(),
        Err(err) => {
            tracing::debug!("Token verification failed: {:?}", err);
            auth_failure(&err)
        }
    }
}

/// Stateless: the client discards its token. Only the header's presence is checked.
pub async fn logout(headers: HeaderMap) -> Response {
    if bearer_token(&headers).is_none() {
        return failure(StatusCode::UNAUTHORIZED, NO_TOKEN);
    }
    Json(json!({ "success": true, "message": "Logout successful" })).into_response()
}

pub fn create_auth_router() -> Router<SharedState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", get(verify))
        .route("/api/auth/logout", post(logout))
        .layer(cors)
}
