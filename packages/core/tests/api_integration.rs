//! Integration tests for the HTTP surface.
//!
//! Each test boots the full Axum router (same assembly as `main.rs`) using
//! `tower::ServiceExt::oneshot`, so no live server or analysis backend is needed.
//!
//! `build_test_app()` wires together:
//! - A wiremocked analysis backend with two patients and one three-frame video;
//!   its frame endpoint answers 401 unless the request carries a bearer token
//! - The built-in demo accounts
//! - Prometheus `AppMetrics`
//! - The complete router returned by `build_router`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{header as header_is, header_exists, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use blinkdx_review::{
    app::{build_router, AppState, SharedState},
    auth::UserDirectory,
    config::Config,
    metrics::AppMetrics,
};

// ---- Helpers ----------------------------------------------------------------

const SECRET: &str = "integration-test-secret";

const VIDEO_JSON: &str = r#"{
    "id": 7,
    "filePath": "uploads/1/blink_01.mp4",
    "uploadDatetime": "2024-05-02T10:15:00",
    "numFrames": 3,
    "milliSeconds": 100,
    "fps": 30,
    "width": 640,
    "height": 480,
    "statuses": [{"id": 1, "videoID": 7, "status": "Ready", "statusDatetime": "2024-05-02T10:20:00", "owner": "worker"}]
}"#;

/// JPEG magic bytes, base64-encoded: enough for the frame route to serve.
const FRAME_B64: &str = "/9j/4AAQ";

fn test_config(api_base_url: String) -> Config {
    Config {
        api_base_url,
        jwt_secret: SECRET.to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        secure_cookies: false,
        frame_batch_size: 2,
        frame_cache_ttl: Duration::from_secs(60),
        upload_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        users_file: None,
    }
}

fn build_app_for(base_url: String) -> (Router, SharedState) {
    let metrics = Arc::new(AppMetrics::new().unwrap());
    let state = Arc::new(AppState::new(
        &test_config(base_url),
        UserDirectory::demo(),
        metrics,
    ));
    (build_router(state.clone()), state)
}

/// Build the complete test router over a stubbed backend.
///
/// Returns `(Router, SharedState, MockServer)`. The `MockServer` must stay
/// alive for the duration of the test because the backend client targets its URL.
async fn build_test_app() -> (Router, SharedState, MockServer) {
    let mock_server = MockServer::start().await;

    let patients = json!([
        {"id": 1, "researchID": "RID-001", "createdDatetime": "2024-05-01T09:00:00", "videos": []},
        {"id": 2, "researchID": "RID-002", "createdDatetime": "2024-05-01T09:30:00"}
    ]);
    Mock::given(method("GET"))
        .and(path("/video/7/frames"))
        .and(header_exists("authorization"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("{0}\n{0}\n{0}\n", FRAME_B64)),
        )
        .mount(&mock_server)
        .await;
    let stubs = [
        ("/patients/", ResponseTemplate::new(200).set_body_json(patients)),
        (
            "/video/7/info",
            ResponseTemplate::new(200).set_body_raw(VIDEO_JSON, "application/json"),
        ),
        ("/video/7/frames", not_authenticated()),
        (
            "/video/7/annotations",
            ResponseTemplate::new(200).set_body_string("<path d=\"M0 0\"/>\n"),
        ),
        (
            "/video/7/summary",
            ResponseTemplate::new(200).set_body_json(json!({
                "columns": ["r_close_peak_vel_mean", "l_close_peak_vel_mean"],
                "data": {"r_close_peak_vel_mean": [12.5], "l_close_peak_vel_mean": [11.25]},
                "abnormal": {"is_abnormal": false, "status": "Normal"}
            })),
        ),
        (
            "/video/7/params",
            ResponseTemplate::new(200).set_body_json(json!({
                "columns": ["EAR Right", "EAR Left"],
                "data": {"EAR Right": [0.3, 0.2, 0.3], "EAR Left": [0.31, 0.21, 0.29]}
            })),
        ),
    ];
    for (route, response) in stubs {
        stub_get(&mock_server, route, response).await;
    }

    let (app, state) = build_app_for(mock_server.uri());
    (app, state, mock_server)
}

async fn stub_get(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn not_authenticated() -> ResponseTemplate {
    ResponseTemplate::new(401).set_body_json(json!({"detail": "Not authenticated"}))
}

fn login_token(state: &SharedState) -> String {
    state.auth.login("admin", "password123").unwrap().token
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("authToken={}", token))
        .body(Body::empty())
        .unwrap()
}

fn post_with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::COOKIE, format!("authToken={}", token))
        .body(Body::empty())
        .unwrap()
}

/// One `multipart/form-data` part: `(name, file name, content)`.
type Part<'a> = (&'a str, Option<&'a str>, &'a str);

const BOUNDARY: &str = "blinkdx-test-boundary";

fn upload_request(token: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file_name {
            Some(file_name) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: video/mp4\r\n\r\n",
                name, file_name
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::COOKIE, format!("authToken={}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Convenience: collect body bytes and parse as JSON.
async fn json_body(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(resp: &axum::response::Response) -> &str {
    resp.headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Poll the load status until the frames of video 7 are ready.
async fn wait_for_frames(app: &Router, token: &str) -> Value {
    for _ in 0..100 {
        let resp = app
            .clone()
            .oneshot(get_with_cookie("/result/7/status", token))
            .await
            .unwrap();
        let status = json_body(resp.into_body()).await;
        if status["ready"] == true {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("frames never finished loading");
}

fn set_cookie(resp: &axum::response::Response) -> String {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---- GET /health ------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_with_ok_body() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

// ---- Route guard ------------------------------------------------------------

#[tokio::test]
async fn protected_page_without_cookie_redirects_to_login() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app.oneshot(get("/patients/1")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn expired_cookie_is_cleared_on_redirect() {
    let (app, _state, _mock) = build_test_app().await;
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let expired = format!(
        "{}.{}.sig",
        engine.encode(r#"{"alg":"HS256"}"#),
        engine.encode(r#"{"userId":"1","exp":1}"#)
    );

    let resp = app.oneshot(get_with_cookie("/", &expired)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    assert!(set_cookie(&resp).contains("authToken="));
}

#[tokio::test]
async fn login_page_with_live_cookie_redirects_home() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app.oneshot(get_with_cookie("/login", &token)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn login_page_renders_without_cookie() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app.oneshot(get("/login")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(text_body(resp.into_body()).await.contains("Sign In"));
}

// ---- Browser sign-in --------------------------------------------------------

#[tokio::test]
async fn login_form_sets_cookie_and_redirects_home() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=doctor&password=doctor123"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    let cookie = set_cookie(&resp);
    assert!(cookie.contains("authToken="));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn login_form_with_bad_password_shows_error() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("username=doctor&password=wrong"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(resp.headers().get(header::SET_COOKIE).is_none());
    assert!(text_body(resp.into_body()).await.contains("Invalid username or password"));
}

// ---- /api/auth --------------------------------------------------------------

#[tokio::test]
async fn api_login_returns_token_and_user() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app
        .oneshot(post_json(
            "/api/auth/login",
            r#"{"username":"admin","password":"password123"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["username"], "admin");
    assert!(json["user"].get("password").is_none());
    assert_eq!(json["token"].as_str().unwrap().split('.').count(), 3);
}

#[tokio::test]
async fn api_login_failures_map_to_status_codes() {
    let (app, _state, _mock) = build_test_app().await;

    let resp = app
        .clone()
        .oneshot(post_json("/api/auth/login", r#"{"username":"admin"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp.into_body()).await["success"], false);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            r#"{"username":"admin","password":"nope"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp.into_body()).await["message"], "Invalid username or password");

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            r#"{"username":"   ","password":"password123"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(post_json("/api/auth/login", "not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(resp.into_body()).await["message"], "Internal server error");
}

#[tokio::test]
async fn api_verify_requires_bearer_token() {
    let (app, state, _mock) = build_test_app().await;

    let resp = app.clone().oneshot(get("/api/auth/verify")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp.into_body()).await["message"], "No token provided");

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/verify")
                .header(header::AUTHORIZATION, format!("Bearer {}", login_token(&state)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp.into_body()).await;
    assert_eq!(json["user"]["id"], "1");
    assert_eq!(json["message"], "Token is valid");
}

#[tokio::test]
async fn api_logout_checks_header_presence() {
    let (app, _state, _mock) = build_test_app().await;

    let resp = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/api/auth/logout").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::AUTHORIZATION, "Bearer anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp.into_body()).await["success"], true);
}

#[tokio::test]
async fn api_preflight_allows_any_origin() {
    let (app, _state, _mock) = build_test_app().await;
    let resp = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/auth/login")
                .header(header::ORIGIN, "http://localhost:3001")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

// ---- Patient directory ------------------------------------------------------

#[tokio::test]
async fn directory_lists_and_filters_patients() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app.clone().oneshot(get_with_cookie("/", &token)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Research ID: RID-001"));
    assert!(html.contains("Research ID: RID-002"));

    let resp = app.oneshot(get_with_cookie("/?q=rid-002", &token)).await.unwrap();
    let html = text_body(resp.into_body()).await;
    assert!(!html.contains("Research ID: RID-001"));
    assert!(html.contains("Research ID: RID-002"));
}

#[tokio::test]
async fn directory_shows_banner_when_backend_is_down() {
    let (app, state) = build_app_for("http://127.0.0.1:9".to_string());
    let token = login_token(&state);

    let resp = app.oneshot(get_with_cookie("/", &token)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Failed to load patient data. Please try again later."));
}

#[tokio::test]
async fn backend_rejecting_token_signs_the_user_out() {
    let mock_server = MockServer::start().await;
    stub_get(&mock_server, "/patients/", not_authenticated()).await;
    let (app, state) = build_app_for(mock_server.uri());
    let token = login_token(&state);

    let resp = app.oneshot(get_with_cookie("/", &token)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    assert!(set_cookie(&resp).contains("Max-Age=0"));
}

// ---- Upload -----------------------------------------------------------------

#[tokio::test]
async fn upload_without_a_file_asks_for_one() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app
        .oneshot(upload_request(&token, &[("patient_id", None, "1")]))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Please select a video file to upload."));
    assert!(html.contains("Research ID: RID-001"));
}

#[tokio::test]
async fn upload_for_new_patient_requires_a_name() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app
        .oneshot(upload_request(
            &token,
            &[
                ("patient_id", None, "new"),
                ("research_id", None, "   "),
                ("video", Some("blink.mp4"), "not really a video"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Please enter a name for the new patient."));
}

#[tokio::test]
async fn upload_creates_patient_then_forwards_video() {
    let (app, state, mock_server) = build_test_app().await;
    let token = login_token(&state);
    Mock::given(method("POST"))
        .and(path("/patient/"))
        .and(query_param("researchID", "RID-003"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3, "researchID": "RID-003", "createdDatetime": "2024-05-03T08:00:00"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/patient/3/video/"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(VIDEO_JSON, "application/json"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let resp = app
        .oneshot(upload_request(
            &token,
            &[
                ("patient_id", None, "new"),
                ("research_id", None, "RID-003"),
                ("video", Some("blink.mp4"), "not really a video"),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?notice=uploaded");
}

// ---- Delete -----------------------------------------------------------------

#[tokio::test]
async fn delete_patient_redirects_with_notice() {
    let (app, state, mock_server) = build_test_app().await;
    let token = login_token(&state);
    Mock::given(method("DELETE"))
        .and(path("/patient/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let resp = app
        .oneshot(post_with_cookie("/patients/2/delete", &token))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?notice=deleted");
}

#[tokio::test]
async fn failed_delete_shows_error_banner() {
    let (app, state, mock_server) = build_test_app().await;
    let token = login_token(&state);
    Mock::given(method("DELETE"))
        .and(path("/patient/1"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "database locked"})))
        .mount(&mock_server)
        .await;

    let resp = app
        .clone()
        .oneshot(post_with_cookie("/patients/1/delete", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/?error=delete");

    let resp = app
        .oneshot(get_with_cookie("/?error=delete", &token))
        .await
        .unwrap();
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Failed to delete patient. Please try again."));
    assert!(html.contains("Research ID: RID-001"));
}

// ---- Patient detail ---------------------------------------------------------

#[tokio::test]
async fn patient_page_compares_videos_and_marks_missing_summaries() {
    let (app, state, mock_server) = build_test_app().await;
    let token = login_token(&state);
    let first: Value = serde_json::from_str(VIDEO_JSON).unwrap();
    let second = json!({
        "id": 8,
        "filePath": "uploads/1/blink_02.mp4",
        "uploadDatetime": "2024-05-04T11:00:00",
        "numFrames": 3,
        "milliSeconds": 100,
        "fps": 30,
        "width": 640,
        "height": 480,
        "statuses": []
    });
    stub_get(
        &mock_server,
        "/patient/1",
        ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "researchID": "RID-001", "createdDatetime": "2024-05-01T09:00:00"
        })),
    )
    .await;
    stub_get(
        &mock_server,
        "/patient/1/videos/",
        ResponseTemplate::new(200).set_body_json(json!([first, second])),
    )
    .await;
    stub_get(
        &mock_server,
        "/video/8/summary",
        ResponseTemplate::new(500).set_body_json(json!({"detail": "analysis crashed"})),
    )
    .await;

    let resp = app.oneshot(get_with_cookie("/patients/1", &token)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Research ID: RID-001"));
    assert!(html.contains("2 videos"));
    assert!(html.contains("uploads/1/blink_01.mp4"));
    assert!(html.contains("uploads/1/blink_02.mp4"));
    assert!(html.contains("R = 12.50"));
    assert!(html.contains("L = 11.25"));
    assert!(html.contains("R = N/A"));
    assert!(html.contains(r#"href="/result/8""#));
}

#[tokio::test]
async fn patient_page_reports_backend_failure() {
    let (app, state, mock_server) = build_test_app().await;
    let token = login_token(&state);
    let missing = || ResponseTemplate::new(404).set_body_json(json!({"detail": "Patient not found"}));
    stub_get(&mock_server, "/patient/99", missing()).await;
    stub_get(&mock_server, "/patient/99/videos/", missing()).await;

    let resp = app.oneshot(get_with_cookie("/patients/99", &token)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Failed to Load Patient Data"));
    assert!(html.contains("Could not retrieve information for patient with ID: 99"));
}

// ---- Video review -----------------------------------------------------------

#[tokio::test]
async fn result_rejects_non_numeric_id() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app.oneshot(get_with_cookie("/result/abc", &token)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(text_body(resp.into_body()).await.contains("Invalid Video ID"));
}

#[tokio::test]
async fn result_loads_frames_then_renders_viewer() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app
        .clone()
        .oneshot(get_with_cookie("/result/7", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let status = wait_for_frames(&app, &token).await;
    assert_eq!(status["loaded"], 3);
    assert_eq!(status["total"], 3);

    let resp = app
        .clone()
        .oneshot(get_with_cookie("/result/7?frame=2", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = text_body(resp.into_body()).await;
    assert!(html.contains("Blink Analysis Summary"));
    assert!(html.contains("current-frame-line"));
    assert!(!html.contains("frames could not be loaded"));

    let resp = app
        .clone()
        .oneshot(get_with_cookie("/result/7/frames/1", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
    let etag = resp.headers()[header::ETAG].to_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/result/7/frames/1")
                .header(header::COOKIE, format!("authToken={}", token))
                .header(header::IF_NONE_MATCH, etag)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

    let resp = app
        .oneshot(get_with_cookie("/result/7/frames/3", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn frames_are_fetched_with_the_viewers_token() {
    let mock_server = MockServer::start().await;
    let (app, state) = build_app_for(mock_server.uri());
    let token = login_token(&state);
    Mock::given(method("GET"))
        .and(path("/video/7/frames"))
        .and(header_is("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("{0}\n{0}\n{0}\n", FRAME_B64)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;
    stub_get(&mock_server, "/video/7/frames", not_authenticated()).await;
    stub_get(
        &mock_server,
        "/video/7/info",
        ResponseTemplate::new(200).set_body_raw(VIDEO_JSON, "application/json"),
    )
    .await;

    let resp = app
        .clone()
        .oneshot(get_with_cookie("/result/7", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let status = wait_for_frames(&app, &token).await;
    assert_eq!(status["loaded"], 3);
    assert_eq!(status["total"], 3);
}

#[tokio::test]
async fn frame_load_rejected_by_backend_signs_the_user_out() {
    let mock_server = MockServer::start().await;
    stub_get(
        &mock_server,
        "/video/7/info",
        ResponseTemplate::new(200).set_body_raw(VIDEO_JSON, "application/json"),
    )
    .await;
    stub_get(&mock_server, "/video/7/frames", not_authenticated()).await;
    let (app, state) = build_app_for(mock_server.uri());
    let token = login_token(&state);

    let resp = app
        .clone()
        .oneshot(get_with_cookie("/result/7", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(text_body(resp.into_body()).await.contains("Loading Video Analysis"));

    let mut rejected = false;
    for _ in 0..100 {
        let resp = app
            .clone()
            .oneshot(get_with_cookie("/result/7/status", &token))
            .await
            .unwrap();
        if resp.status() == StatusCode::UNAUTHORIZED {
            rejected = true;
            break;
        }
        assert_eq!(json_body(resp.into_body()).await["ready"], false);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(rejected, "status never reported the rejection");

    let resp = app.oneshot(get_with_cookie("/result/7", &token)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
    assert!(set_cookie(&resp).contains("Max-Age=0"));
}

#[tokio::test]
async fn play_streams_indices_that_wrap_to_the_start() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);
    app.clone()
        .oneshot(get_with_cookie("/result/7", &token))
        .await
        .unwrap();
    wait_for_frames(&app, &token).await;

    let resp = app
        .oneshot(get_with_cookie("/result/7/play?from=1", &token))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/event-stream");

    let mut body = resp.into_body();
    let mut pending = String::new();
    let mut indices = Vec::new();
    while indices.len() < 3 {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("playback stalled")
            .expect("stream ended early")
            .unwrap();
        if let Ok(data) = frame.into_data() {
            pending.push_str(std::str::from_utf8(&data).unwrap());
        }
        while let Some(end) = pending.find("\n\n") {
            let event: String = pending.drain(..end + 2).collect();
            if let Some(index) = event.lines().find_map(|line| line.strip_prefix("data:")) {
                indices.push(index.trim().parse::<usize>().unwrap());
            }
        }
    }

    assert_eq!(indices, vec![2, 0, 1]);
}

#[tokio::test]
async fn frame_route_is_404_before_loading() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app
        .oneshot(get_with_cookie("/result/7/frames/0", &token))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pause_without_playback_is_no_content() {
    let (app, state, _mock) = build_test_app().await;
    let token = login_token(&state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/result/7/pause")
                .header(header::COOKIE, format!("authToken={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.playback.active(), 0);
}

// ---- GET /metrics -----------------------------------------------------------

#[tokio::test]
async fn metrics_reports_request_counter() {
    let (app, _state, _mock) = build_test_app().await;
    app.clone().oneshot(get("/health")).await.unwrap();

    let resp = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = text_body(resp.into_body()).await;
    assert!(body.contains("blinkdx_http_requests_total"));
    assert!(body.contains("/health"));
}
