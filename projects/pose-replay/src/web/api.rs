use crate::error::PlaybackError;
use crate::overlay::{project_overlay, Overlay};
use crate::playback::{PlaybackSnapshot, ScrubEntry};
use crate::session::{Session, SessionSnapshot};
use axum::{
    extract::{Path as UrlPath, Query, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::{wrappers::IntervalStream, StreamExt};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "m4v", "avi", "mkv", "webm"];
const EVENT_INTERVAL: Duration = Duration::from_millis(250);

pub struct AppState {
    pub session: Session,
    pub video_root: PathBuf,
}

#[derive(Serialize)]
pub struct VideoEntry {
    pub name: String,
    pub path: String,
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub video_path: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub job_id: u64,
}

#[derive(Deserialize)]
pub struct SeekRequest {
    pub index: usize,
}

#[derive(Deserialize)]
pub struct ViewportQuery {
    pub width: f32,
    pub height: f32,
}

#[derive(Serialize)]
pub struct FrameOverlay {
    pub index: usize,
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub overlay: Overlay,
}

pub fn list_videos(video_root: &Path) -> Vec<PathBuf> {
    let mut videos: Vec<PathBuf> = WalkDir::new(video_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| VIDEO_EXTENSIONS.contains(&s.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    videos.sort();
    videos
}

/// Resolves a client-supplied path against the video root. Paths escaping
/// the root are rejected.
fn resolve_video_path(video_root: &Path, requested: &str) -> Result<PathBuf, StatusCode> {
    let candidate = Path::new(requested);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        video_root.join(candidate)
    };

    let resolved = joined.canonicalize().map_err(|_| StatusCode::NOT_FOUND)?;
    let root = video_root
        .canonicalize()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !resolved.starts_with(&root) || !resolved.is_file() {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(resolved)
}

fn playback_status(err: &PlaybackError) -> StatusCode {
    match err {
        PlaybackError::Empty => StatusCode::CONFLICT,
        PlaybackError::IndexOutOfRange { .. } => StatusCode::BAD_REQUEST,
    }
}

pub async fn get_videos(State(state): State<Arc<AppState>>) -> Json<Vec<VideoEntry>> {
    let entries = list_videos(&state.video_root)
        .into_iter()
        .map(|video_path| {
            let name = video_path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("unknown")
                .to_string();
            let path = video_path
                .strip_prefix(&state.video_root)
                .unwrap_or(&video_path)
                .to_string_lossy()
                .to_string();
            VideoEntry { name, path }
        })
        .collect();

    Json(entries)
}

pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), StatusCode> {
    let video_path = resolve_video_path(&state.video_root, &payload.video_path)?;
    tracing::info!("Upload requested: {}", video_path.display());
    let job_id = state.session.upload(video_path);
    Ok((StatusCode::ACCEPTED, Json(UploadResponse { job_id })))
}

pub async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state
        .session
        .progress()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Pushes a session snapshot whenever it changes.
pub async fn session_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.session.clone();
    let stream = async_stream::stream! {
        let mut ticks = IntervalStream::new(tokio::time::interval(EVENT_INTERVAL));
        let mut last: Option<String> = None;
        while ticks.next().await.is_some() {
            let payload = match serde_json::to_string(&session.snapshot()) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!("Failed to serialize session snapshot: {}", e);
                    continue;
                }
            };
            if last.as_deref() != Some(payload.as_str()) {
                yield Ok(Event::default().event("session").data(payload.clone()));
                last = Some(payload);
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn play_handler(State(state): State<Arc<AppState>>) -> Json<PlaybackSnapshot> {
    state.session.controller().play();
    Json(state.session.controller().snapshot())
}

pub async fn pause_handler(State(state): State<Arc<AppState>>) -> Json<PlaybackSnapshot> {
    state.session.controller().pause();
    Json(state.session.controller().snapshot())
}

pub async fn seek_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SeekRequest>,
) -> Result<Json<PlaybackSnapshot>, StatusCode> {
    state
        .session
        .scrub()
        .select(payload.index)
        .map_err(|e| playback_status(&e))?;
    Ok(Json(state.session.controller().snapshot()))
}

pub async fn get_overlay(
    State(state): State<Arc<AppState>>,
    Query(viewport): Query<ViewportQuery>,
) -> Result<Json<FrameOverlay>, StatusCode> {
    if !(viewport.width > 0.0 && viewport.height > 0.0) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let (index, record) = state
        .session
        .controller()
        .current_frame()
        .ok_or(StatusCode::CONFLICT)?;

    Ok(Json(FrameOverlay {
        index,
        timestamp_ms: record.timestamp_ms,
        overlay: project_overlay(&record.landmarks, viewport.width, viewport.height),
    }))
}

pub async fn get_scrub(State(state): State<Arc<AppState>>) -> Json<Vec<ScrubEntry>> {
    Json(state.session.scrub().entries())
}

pub async fn get_frame_image(
    State(state): State<Arc<AppState>>,
    UrlPath(index): UrlPath<usize>,
) -> Result<impl IntoResponse, StatusCode> {
    let records = state.session.controller().records();
    let image = records
        .get(index)
        .and_then(|record| record.frame_image.clone())
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image.jpeg.to_vec()))
}
