use std::sync::Arc;
use std::time::Duration;

use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::MAX_FRAME_BATCH;
use crate::error::AppError;
use crate::metrics::AppMetrics;
use crate::models::{AnnotationFrame, Patient, Video, VideoMetadata, VideoParams, VideoSummary};

/// Lines of SVG markup the backend emits per annotated frame.
pub const ANNOTATION_LINES_PER_FRAME: usize = 6;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(1800);

/// REST client for the analysis backend.
///
/// Cheap to clone; [`BackendClient::authorized`] returns a copy that sends
/// the caller's bearer token.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    http: Client,
    bearer: Option<String>,
    request_timeout: Duration,
    upload_timeout: Duration,
    metrics: Option<Arc<AppMetrics>>,
}

/// A video file received from the browser, ready to forward.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl BackendClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
            bearer: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_timeouts(mut self, request: Duration, upload: Duration) -> Self {
        self.request_timeout = request;
        self.upload_timeout = upload;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Copy of this client that authenticates as the holder of `token`.
    pub fn authorized(&self, token: &str) -> Self {
        let mut client = self.clone();
        client.bearer = Some(token.to_string());
        client
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method, url)
            .timeout(self.request_timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, AppError> {
        tracing::debug!(endpoint, "backend request");

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let message = describe_error_body(&body).unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unexpected status")
                        .to_string()
                });
                tracing::error!(endpoint, status = status.as_u16(), "backend error: {}", message);
                Err(AppError::from_backend_status(status.as_u16(), message))
            }
            Err(err) => {
                tracing::error!(endpoint, "no response from backend: {}", err);
                if err.is_timeout() {
                    Err(AppError::Network(format!("{} timed out", endpoint)))
                } else {
                    Err(AppError::Network(err.to_string()))
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_backend(endpoint, result.is_ok());
        }
        result
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, path: &str) -> Result<T, AppError> {
        let response = self.send(endpoint, self.request(Method::GET, path)).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Parse(format!("{}: {}", endpoint, err)))
    }

    async fn get_text(&self, endpoint: &str, request: RequestBuilder) -> Result<String, AppError> {
        let response = self.send(endpoint, request).await?;
        response
            .text()
            .await
            .map_err(|err| AppError::Parse(format!("{}: {}", endpoint, err)))
    }
}

// ---- Patients ----

impl BackendClient {
    pub async fn list_patients(&self) -> Result<Vec<Patient>, AppError> {
        let patients: Vec<Patient> = self.get_json("list_patients", "/patients/").await?;
        tracing::debug!("received {} patients", patients.len());
        Ok(patients)
    }

    pub async fn create_patient(&self, research_id: &str) -> Result<Patient, AppError> {
        let request = self
            .request(Method::POST, "/patient/")
            .query(&[("researchID", research_id)]);
        let response = self.send("create_patient", request).await?;
        let patient = response
            .json::<Patient>()
            .await
            .map_err(|err| AppError::Parse(format!("create_patient: {}", err)))?;
        tracing::info!(patient_id = patient.id, "created patient");
        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: i64) -> Result<Patient, AppError> {
        self.get_json("get_patient", &format!("/patient/{}", patient_id))
            .await
    }

    pub async fn list_patient_videos(
        &self,
        patient_id: i64,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Video>, AppError> {
        let request = self
            .request(Method::GET, &format!("/patient/{}/videos/", patient_id))
            .query(&[("skip", skip), ("limit", limit)]);
        let response = self.send("list_patient_videos", request).await?;
        response
            .json::<Vec<Video>>()
            .await
            .map_err(|err| AppError::Parse(format!("list_patient_videos: {}", err)))
    }

    pub async fn delete_patient(&self, patient_id: i64) -> Result<(), AppError> {
        let request = self.request(Method::DELETE, &format!("/patient/{}", patient_id));
        self.send("delete_patient", request).await?;
        tracing::info!(patient_id, "deleted patient");
        Ok(())
    }

    /// Forward a video file as multipart field `video`.
    pub async fn upload_video(
        &self,
        patient_id: i64,
        upload: VideoUpload,
    ) -> Result<Video, AppError> {
        tracing::info!(
            patient_id,
            file = %upload.file_name,
            size = upload.bytes.len(),
            "uploading video"
        );

        let mut part = multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        if let Some(mime) = upload.content_type.as_deref() {
            part = part
                .mime_str(mime)
                .map_err(|err| AppError::Validation(format!("invalid content type: {}", err)))?;
        }
        let form = multipart::Form::new().part("video", part);

        let request = self
            .request(Method::POST, &format!("/patient/{}/video/", patient_id))
            .timeout(self.upload_timeout)
            .multipart(form);

        let response = self.send("upload_video", request).await.map_err(|err| match err {
            AppError::Network(msg) if msg.ends_with("timed out") => AppError::Network(
                "Video upload timed out. The file might be too large or network too slow."
                    .to_string(),
            ),
            other => other,
        })?;

        response
            .json::<Video>()
            .await
            .map_err(|err| AppError::Parse(format!("upload_video: {}", err)))
    }
}

// ---- Videos ----

impl BackendClient {
    pub async fn video_info(&self, video_id: i64) -> Result<VideoMetadata, AppError> {
        self.get_json("video_info", &format!("/video/{}/info", video_id))
            .await
    }

    /// Fetch up to `count` frames starting at `offset` as base64 strings.
    pub async fn video_frames(
        &self,
        video_id: i64,
        offset: usize,
        count: usize,
    ) -> Result<Vec<String>, AppError> {
        let request = self
            .request(Method::GET, &format!("/video/{}/frames", video_id))
            .query(&[("offset", offset), ("num", count.min(MAX_FRAME_BATCH))]);
        let body = self.get_text("video_frames", request).await?;
        Ok(split_frames(&body))
    }

    /// A single frame, `None` when the backend has nothing at `offset`.
    pub async fn video_frame(&self, video_id: i64, offset: usize) -> Result<Option<String>, AppError> {
        Ok(self.video_frames(video_id, offset, 1).await?.into_iter().next())
    }

    /// Raw SVG path markup for one frame.
    pub async fn video_annotation(&self, video_id: i64, offset: usize) -> Result<String, AppError> {
        let request = self.request(
            Method::GET,
            &format!("/video/{}/annotation/{}", video_id, offset),
        );
        let body = self.get_text("video_annotation", request).await?;
        Ok(body.trim().to_string())
    }

    pub async fn video_annotations(&self, video_id: i64) -> Result<Vec<AnnotationFrame>, AppError> {
        let request = self.request(Method::GET, &format!("/video/{}/annotations", video_id));
        let body = self.get_text("video_annotations", request).await?;
        Ok(parse_annotations(&body))
    }

    pub async fn video_params(&self, video_id: i64) -> Result<VideoParams, AppError> {
        self.get_json("video_params", &format!("/video/{}/params", video_id))
            .await
    }

    pub async fn video_summary(&self, video_id: i64) -> Result<VideoSummary, AppError> {
        self.get_json("video_summary", &format!("/video/{}/summary", video_id))
            .await
    }
}

// ---- Body parsing ----

/// Strip whitespace and one pair of surrounding quotes. A lone quote is
/// no frame at all.
pub fn clean_base64(line: &str) -> &str {
    let trimmed = line.trim();
    if trimmed == "\"" {
        ""
    } else if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Newline-separated base64 frames; blank lines are dropped.
pub fn split_frames(body: &str) -> Vec<String> {
    body.split('\n')
        .map(clean_base64)
        .filter(|frame| !frame.is_empty())
        .map(str::to_string)
        .collect()
}

/// Group the annotation dump into frames of six lines, keeping only
/// `<path d=` lines. Frames without any path are omitted.
pub fn parse_annotations(body: &str) -> Vec<AnnotationFrame> {
    let lines: Vec<&str> = body.trim().split('\n').collect();

    lines
        .chunks(ANNOTATION_LINES_PER_FRAME)
        .enumerate()
        .filter_map(|(offset, chunk)| {
            let svg_paths = chunk
                .iter()
                .filter(|line| line.trim().starts_with("<path d="))
                .copied()
                .collect::<Vec<_>>()
                .join("\n");
            (!svg_paths.is_empty()).then_some(AnnotationFrame { offset, svg_paths })
        })
        .collect()
}

/// Pull a human-readable message out of an error body.
///
/// FastAPI validation errors arrive as `detail: [{loc, msg}]` and are
/// flattened to `"<loc.joined> <msg>"` lines.
pub fn describe_error_body(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;

    let from_detail = match json.get("detail") {
        Some(Value::String(detail)) => Some(detail.clone()),
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .map(|entry| {
                    let loc = entry
                        .get("loc")
                        .and_then(Value::as_array)
                        .map(|parts| {
                            parts
                                .iter()
                                .map(|p| match p {
                                    Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(".")
                        });
                    let msg = entry.get("msg").and_then(Value::as_str).unwrap_or("invalid");
                    match loc {
                        Some(loc) if !loc.is_empty() => format!("{} {}", loc, msg),
                        _ => msg.to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        Some(other) => Some(other.to_string()),
        None => None,
    };

    from_detail.or_else(|| json.get("message").and_then(Value::as_str).map(str::to_string))
}
