//! Page handlers behind the session guard.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use futures::future::join_all;
use serde::Deserialize;

use crate::app::SharedState;
use crate::error::AppError;
use crate::models::{AnnotationFrame, Patient, Video};
use crate::services::{BackendClient, VideoUpload};
use crate::viewer::chart::{parse_selection, render_chart};
use crate::viewer::summary::ComparisonRow;
use crate::viewer::{FrameKey, FrameStatus, Playback};
use super::session::{expire_session, CurrentUser};
use super::templates::{self, Banner, ViewerPage};

pub const LOAD_PATIENTS_FAILED: &str = "Failed to load patient data. Please try again later.";
pub const DELETE_FAILED: &str = "Failed to delete patient. Please try again.";
pub const NO_FILE_SELECTED: &str = "Please select a video file to upload.";
pub const NEW_PATIENT_NAME_REQUIRED: &str = "Please enter a name for the new patient.";

/// Videos requested per patient page.
const PATIENT_VIDEO_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct DirectoryQuery {
    pub q: Option<String>,
    pub notice: Option<String>,
    pub error: Option<String>,
}

fn notice_banner(query: &DirectoryQuery) -> Vec<Banner> {
    let mut banners = Vec::new();
    match query.notice.as_deref() {
        Some("uploaded") => banners.push(Banner::success("Video uploaded successfully.")),
        Some("deleted") => banners.push(Banner::success("Patient deleted.")),
        _ => {}
    }
    if query.error.as_deref() == Some("delete") {
        banners.push(Banner::error(DELETE_FAILED));
    }
    banners
}

async fn render_directory(
    backend: &BackendClient,
    current: &CurrentUser,
    query: &str,
    status: StatusCode,
    mut banners: Vec<Banner>,
) -> Response {
    match backend.list_patients().await {
        Ok(patients) => (
            status,
            templates::patients_page(&current.user, Some(patients.as_slice()), query, &banners),
        )
            .into_response(),
        Err(err) if err.is_auth_failure() => expire_session(),
        Err(err) => {
            tracing::error!("Failed to load patients: {}", err);
            banners.insert(0, Banner::error(LOAD_PATIENTS_FAILED));
            (status, templates::patients_page(&current.user, None, query, &banners)).into_response()
        }
    }
}

pub async fn patient_directory(
    State(state): State<SharedState>,
    current: CurrentUser,
    Query(query): Query<DirectoryQuery>,
) -> Response {
    let backend = state.backend.authorized(&current.token);
    let banners = notice_banner(&query);
    let filter = query.q.as_deref().unwrap_or("");
    render_directory(&backend, &current, filter, StatusCode::OK, banners).await
}

/// Fields of the upload form.
#[derive(Debug, Default)]
struct UploadForm {
    patient_id: Option<String>,
    research_id: Option<String>,
    video: Option<VideoUpload>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Validation(err.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::Validation(err.body_text()))?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    form.video = Some(VideoUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "patient_id" | "research_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::Validation(err.body_text()))?;
                if name == "patient_id" {
                    form.patient_id = Some(value);
                } else {
                    form.research_id = Some(value);
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn create_and_upload(backend: &BackendClient, form: UploadForm) -> Result<(), AppError> {
    let video = form
        .video
        .ok_or_else(|| AppError::Validation(NO_FILE_SELECTED.to_string()))?;

    let patient_id = match form.patient_id.as_deref().map(str::trim) {
        Some("new") => {
            let research_id = form.research_id.as_deref().map(str::trim).unwrap_or("");
            if research_id.is_empty() {
                return Err(AppError::Validation(NEW_PATIENT_NAME_REQUIRED.to_string()));
            }
            let patient = backend.create_patient(research_id).await?;
            tracing::info!(patient_id = patient.id, "Created new patient");
            patient.id
        }
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| AppError::Validation("Please select a patient.".to_string()))?,
        None => return Err(AppError::Validation("Please select a patient.".to_string())),
    };

    backend.upload_video(patient_id, video).await?;
    Ok(())
}

pub async fn upload(
    State(state): State<SharedState>,
    current: CurrentUser,
    multipart: Multipart,
) -> Response {
    let backend = state.backend.authorized(&current.token);
    let result = match read_upload_form(multipart).await {
        Ok(form) => create_and_upload(&backend, form).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => Redirect::to("/?notice=uploaded").into_response(),
        Err(err) if err.is_auth_failure() => expire_session(),
        Err(err) => {
            tracing::warn!("Upload failed: {}", err);
            let banners = vec![Banner::error(err.message())];
            render_directory(&backend, &current, "", err.status_code(), banners).await
        }
    }
}

pub async fn delete_patient(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path(patient_id): Path<i64>,
) -> Response {
    let backend = state.backend.authorized(&current.token);
    match backend.delete_patient(patient_id).await {
        Ok(()) => Redirect::to("/?notice=deleted").into_response(),
        Err(err) if err.is_auth_failure() => expire_session(),
        Err(err) => {
            tracing::error!(patient_id, "Failed to delete patient: {}", err);
            Redirect::to("/?error=delete").into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub q: Option<String>,
}

async fn load_patient(
    backend: &BackendClient,
    patient_id: i64,
) -> Result<(Patient, Vec<Video>), AppError> {
    tokio::try_join!(
        backend.get_patient(patient_id),
        backend.list_patient_videos(patient_id, 0, PATIENT_VIDEO_LIMIT)
    )
}

pub async fn patient_detail(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path(raw_id): Path<String>,
    Query(filter): Query<FilterQuery>,
) -> Response {
    let backend = state.backend.authorized(&current.token);
    let loaded = match raw_id.parse::<i64>() {
        Ok(id) => load_patient(&backend, id).await,
        Err(_) => Err(AppError::Validation("Invalid patient ID".to_string())),
    };

    let (patient, videos) = match loaded {
        Ok(loaded) => loaded,
        Err(err) if err.is_auth_failure() => return expire_session(),
        Err(err) => {
            tracing::error!(patient = %raw_id, "Failed to load patient: {}", err);
            let detail = format!(
                "Could not retrieve information for patient with ID: {}. Error: {}",
                raw_id,
                err.message()
            );
            let page = templates::error_page(
                Some(&current.user),
                "Failed to Load Patient Data",
                &detail,
            );
            return (err.status_code(), page).into_response();
        }
    };

    let query = filter.q.unwrap_or_default();
    let visible: Vec<_> = videos
        .iter()
        .filter(|video| video.matches_file_path(&query))
        .cloned()
        .collect();

    let summaries = join_all(visible.iter().map(|video| {
        let backend = &backend;
        async move {
            match backend.video_summary(video.id).await {
                Ok(summary) => Some(summary),
                Err(err) => {
                    tracing::warn!(video_id = video.id, "Summary unavailable: {}", err);
                    None
                }
            }
        }
    }))
    .await;

    let rows: Vec<_> = visible
        .into_iter()
        .zip(summaries.iter())
        .map(|(video, summary)| (video, ComparisonRow::from_summary(summary.as_ref())))
        .collect();

    templates::patient_page(&current.user, &patient, videos.len(), &rows, &query).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultQuery {
    pub frame: Option<usize>,
    pub params: Option<String>,
}

/// `Some(id)` for a positive integer id.
pub fn parse_video_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|id| *id > 0)
}

pub async fn video_result(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path(raw_id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> Response {
    let Some(video_id) = parse_video_id(&raw_id) else {
        return (
            StatusCode::BAD_REQUEST,
            templates::error_page(
                Some(&current.user),
                "Invalid Video ID",
                "The provided video ID is not valid.",
            ),
        )
            .into_response();
    };

    let backend = state.backend.authorized(&current.token);
    let metadata = match backend.video_info(video_id).await {
        Ok(metadata) => metadata,
        Err(err) => return analysis_error(&current, video_id, err),
    };

    let key = FrameKey::new(current.user.id.as_str(), video_id);
    let status = state
        .frames
        .ensure_loaded(Arc::new(backend.clone()), key.clone(), metadata.num_frames)
        .await;
    let buffer = match status {
        FrameStatus::Ready { .. } => state.frames.buffer(&key).await,
        FrameStatus::Rejected => {
            state.frames.forget(&key).await;
            return expire_session();
        }
        _ => None,
    };
    let Some(buffer) = buffer else {
        let (loaded, total) = match status {
            FrameStatus::Loading { loaded, total } => (loaded, total),
            _ => (0, metadata.num_frames),
        };
        return templates::loading_page(&current.user, video_id, loaded, total).into_response();
    };

    let (annotations, summary, params) = tokio::join!(
        backend.video_annotations(video_id),
        backend.video_summary(video_id),
        backend.video_params(video_id)
    );
    let annotations = annotations.unwrap_or_else(|err| {
        tracing::warn!(video_id, "Annotations unavailable: {}", err);
        Vec::new()
    });
    let summary = match summary {
        Ok(summary) => summary,
        Err(err) => return analysis_error(&current, video_id, err),
    };
    let params = match params {
        Ok(params) => params,
        Err(err) => return analysis_error(&current, video_id, err),
    };

    let total = buffer.total();
    let mut playback = Playback::new(total, Some(metadata.fps));
    let current_frame = playback.seek(query.frame.unwrap_or(0));
    let time_secs = playback.time_secs();
    let mut stepper = playback;
    let prev_frame = stepper.prev();
    stepper.seek(current_frame);
    let next_frame = stepper.next();

    let selected = parse_selection(query.params.as_deref(), &params.columns);
    let chart_svg = render_chart(&params, &selected, total, current_frame);

    let annotations_json = annotations_map(&annotations);
    let current_annotation = annotations
        .iter()
        .find(|a| a.offset == current_frame)
        .map(|a| a.svg_paths.as_str())
        .unwrap_or("");

    let page = ViewerPage {
        video_id,
        metadata: &metadata,
        total_frames: total,
        current: current_frame,
        prev_frame,
        next_frame,
        time_secs,
        current_available: buffer.get(current_frame).is_some(),
        annotations_json,
        current_annotation,
        columns: &params.columns,
        selected: &selected,
        chart_svg,
        summary: &summary,
        missing_frames: total - buffer.loaded(),
    };
    templates::viewer_page(&current.user, &page).into_response()
}

fn annotations_map(annotations: &[AnnotationFrame]) -> String {
    let map: HashMap<usize, &str> = annotations
        .iter()
        .map(|a| (a.offset, a.svg_paths.as_str()))
        .collect();
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

fn analysis_error(current: &CurrentUser, video_id: i64, err: AppError) -> Response {
    if err.is_auth_failure() {
        return expire_session();
    }
    tracing::error!(video_id, "Failed to load video analysis: {}", err);
    let page = templates::error_page(
        Some(&current.user),
        "Failed to Load Video Analysis",
        err.message(),
    );
    (err.status_code(), page).into_response()
}
