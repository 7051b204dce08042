//! Frame image, playback stream and load status for the review screen.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

use crate::app::SharedState;
use crate::error::AppError;
use crate::viewer::{frame_interval, FrameKey, FrameStatus, Playback, PlaybackRegistry};
use crate::web::CurrentUser;
use super::headers::{compute_etag, if_none_match_matches, private_cache_control};

/// Frames never change once loaded; browsers may reuse them for an hour.
const FRAME_MAX_AGE: u32 = 3600;

pub async fn frame_image(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path((video_id, index)): Path<(i64, usize)>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let buffer = state
        .frames
        .buffer(&FrameKey::new(current.user.id.as_str(), video_id))
        .await
        .ok_or_else(|| AppError::NotFound(format!("frames for video {} are not loaded", video_id)))?;
    let bytes = buffer
        .decode(index)
        .ok_or_else(|| AppError::NotFound(format!("frame {} of video {} is unavailable", index, video_id)))?;

    let etag = compute_etag(&bytes);
    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, private_cache_control(FRAME_MAX_AGE));
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }

    if if_none_match_matches(&request_headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, headers).into_response());
    }

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    Ok((StatusCode::OK, headers, bytes).into_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayQuery {
    pub from: Option<usize>,
}

/// Event stream of frame indices. Starting a stream replaces any other
/// playback this user has running on the same video; dropping it stops it.
pub async fn play(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path(video_id): Path<i64>,
    Query(query): Query<PlayQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let buffer = state
        .frames
        .buffer(&FrameKey::new(current.user.id.as_str(), video_id))
        .await
        .ok_or_else(|| AppError::NotFound(format!("frames for video {} are not loaded", video_id)))?;
    let metadata = state
        .backend
        .authorized(&current.token)
        .video_info(video_id)
        .await?;

    let fps = Some(metadata.fps).filter(|fps| *fps > 0.0);
    let mut playback = Playback::new(buffer.total(), fps);
    playback.seek(query.from.unwrap_or(0));

    let key = PlaybackRegistry::key(&current.user.id, video_id);
    tracing::debug!(video_id, from = playback.current(), "playback started");
    let rx = state.playback.start(key, playback, frame_interval(fps));

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|index| (Ok::<_, Infallible>(Event::default().data(index.to_string())), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Stop this user's playback of the video, if any is running.
pub async fn pause(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path(video_id): Path<i64>,
) -> StatusCode {
    let key = PlaybackRegistry::key(&current.user.id, video_id);
    if state.playback.stop(&key) {
        tracing::debug!(video_id, "playback stopped");
    }
    StatusCode::NO_CONTENT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadStatus {
    pub loaded: usize,
    pub total: usize,
    pub ready: bool,
}

impl From<FrameStatus> for LoadStatus {
    fn from(status: FrameStatus) -> Self {
        match status {
            FrameStatus::Absent | FrameStatus::Rejected => {
                LoadStatus { loaded: 0, total: 0, ready: false }
            }
            FrameStatus::Loading { loaded, total } => LoadStatus { loaded, total, ready: false },
            FrameStatus::Ready { loaded, total } => LoadStatus { loaded, total, ready: true },
        }
    }
}

/// Progress for the loading page. A 401 tells the page to reload, and the
/// result page then ends the session.
pub async fn load_status(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path(video_id): Path<i64>,
) -> Result<Json<LoadStatus>, AppError> {
    let key = FrameKey::new(current.user.id.as_str(), video_id);
    match state.frames.status(&key).await {
        FrameStatus::Rejected => Err(AppError::Unauthorized(
            "The analysis backend rejected this session".into(),
        )),
        status => Ok(Json(status.into())),
    }
}

/// Overlay markup for one frame, for when the page could not embed them all.
pub async fn annotation(
    State(state): State<SharedState>,
    current: CurrentUser,
    Path((video_id, offset)): Path<(i64, usize)>,
) -> Result<impl IntoResponse, AppError> {
    let svg = state
        .backend
        .authorized(&current.token)
        .video_annotation(video_id, offset)
        .await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], svg))
}
