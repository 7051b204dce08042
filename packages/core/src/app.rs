//! Router assembly and shared state.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::api::{self, frames, health};
use crate::auth::{AuthService, TokenIssuer, UserDirectory, DEFAULT_TOKEN_TTL};
use crate::config::Config;
use crate::metrics::AppMetrics;
use crate::services::BackendClient;
use crate::viewer::{FrameStore, PlaybackRegistry};
use crate::web::{guard, pages, session};

/// Largest video accepted by `POST /upload`.
pub const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub backend: Arc<BackendClient>,
    pub auth: AuthService,
    pub frames: Arc<FrameStore>,
    pub playback: Arc<PlaybackRegistry>,
    pub metrics: Arc<AppMetrics>,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(config: &Config, users: UserDirectory, metrics: Arc<AppMetrics>) -> Self {
        let backend = BackendClient::new(config.api_base_url.clone())
            .with_timeouts(config.request_timeout, config.upload_timeout)
            .with_metrics(metrics.clone());
        let frames = FrameStore::new(config.frame_cache_ttl, config.frame_batch_size)
            .with_metrics(metrics.clone());

        Self {
            backend: Arc::new(backend),
            auth: AuthService::new(users, TokenIssuer::new(&config.jwt_secret, DEFAULT_TOKEN_TTL)),
            frames: Arc::new(frames),
            playback: Arc::new(PlaybackRegistry::new()),
            metrics,
            secure_cookies: config.secure_cookies,
        }
    }
}

/// Count and time every request, labelled by its route template.
async fn track_requests(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    state
        .metrics
        .http_request_duration
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    response
}

pub fn build_router(state: SharedState) -> Router {
    let pages = Router::new()
        .route("/", get(pages::patient_directory))
        .route(
            "/upload",
            post(pages::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/patients/:id", get(pages::patient_detail))
        .route("/patients/:id/delete", post(pages::delete_patient))
        .route("/result/:id", get(pages::video_result))
        .route("/result/:id/frames/:index", get(frames::frame_image))
        .route("/result/:id/play", get(frames::play))
        .route("/result/:id/pause", post(frames::pause))
        .route("/result/:id/status", get(frames::load_status))
        .route("/result/:id/annotation/:offset", get(frames::annotation))
        .route("/login", get(session::login_page).post(session::login_submit))
        .route("/logout", post(session::logout));

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .merge(pages)
        .merge(api::auth::create_auth_router())
        .layer(middleware::from_fn(guard::guard))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
