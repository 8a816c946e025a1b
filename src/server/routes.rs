use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::error::ApiError;
use super::AppState;
use crate::pipeline::{FetchOutcome, FetchRequest, MediaFile, OutputKind};
use crate::transcode::Container;

/// Query string shared by every media endpoint
#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    video_url: Option<String>,
    token: Option<String>,
}

/// `GET /`
pub async fn home() -> Json<Value> {
    Json(json!({ "msg": "API OK" }))
}

/// `GET /video` - streams the mp4
pub async fn download_video(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<MediaQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let outcome = run(&state, &headers, parse_query(query)?, OutputKind::Video).await?;
    let video = outcome
        .video
        .ok_or_else(|| ApiError::bad_request("Error during video download: no video produced"))?;
    file_response(&video, Container::Mp4, "video").await
}

/// `GET /audio` - streams the mp3
pub async fn download_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<MediaQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let outcome = run(&state, &headers, parse_query(query)?, OutputKind::Audio).await?;
    let audio = outcome
        .audio
        .ok_or_else(|| ApiError::bad_request("Error during audio download: no audio produced"))?;
    file_response(&audio, Container::Mp3, "audio").await
}

/// `POST /download-video` - keeps both files on disk and reports their paths
pub async fn download_video_and_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    query: Result<Query<MediaQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let outcome = run(&state, &headers, parse_query(query)?, OutputKind::VideoWithAudio).await?;

    Ok(Json(json!({
        "msg": "Video and audio downloaded successfully",
        "video_file": outcome.video.map(|f| f.path),
        "audio_file": outcome.audio.map(|f| f.path),
    })))
}

async fn run(
    state: &AppState,
    headers: &HeaderMap,
    query: MediaQuery,
    output: OutputKind,
) -> Result<FetchOutcome, ApiError> {
    let what = output.media_kind().as_str();
    let token = query.token.or_else(|| bearer_token(headers));

    // Token first so a bad token never learns whether the URL was valid
    if let Err(e) = state.pipeline.verify_token(token.as_deref()) {
        return Err(ApiError::from_fetch(e, what));
    }

    let url = query
        .video_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required query parameter: video_url"))?;

    state
        .pipeline
        .fetch(&FetchRequest::new(url, token, output))
        .await
        .map_err(|e| ApiError::from_fetch(e, what))
}

/// Malformed query strings get the same `{"detail": ...}` body as other 400s
fn parse_query(query: Result<Query<MediaQuery>, QueryRejection>) -> Result<MediaQuery, ApiError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

/// Stream a staged file back as an attachment
async fn file_response(media: &MediaFile, container: Container, what: &str) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(&media.path).await.map_err(|e| {
        tracing::error!("Could not open {}: {}", media.path.display(), e);
        ApiError::bad_request(format!("Error during {} download: {}", what, e))
    })?;
    let length = file.metadata().await.ok().map(|m| m.len());

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(container.mime_type()));
    response_headers.insert(header::CONTENT_DISPOSITION, content_disposition(&media.file_name()));
    if let Some(length) = length {
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok(response)
}

/// `attachment` header with an ASCII fallback name and the UTF-8 original
fn content_disposition(file_name: &str) -> HeaderValue {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    );

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
