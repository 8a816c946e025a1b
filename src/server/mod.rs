//! HTTP surface.
//!
//! [`build`] assembles the axum router; [`serve`] wires it to configuration,
//! starts the retention sweeper and runs until SIGINT/SIGTERM.

pub mod error;
pub mod routes;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::FetchPipeline;
use crate::Result;

/// State shared by all handlers
pub struct AppState {
    pub pipeline: FetchPipeline,
    pub cors_allowed_origins: Option<String>,
}

impl AppState {
    pub fn new(pipeline: FetchPipeline) -> Self {
        Self {
            pipeline,
            cors_allowed_origins: None,
        }
    }
}

/// Build the complete router
pub fn build(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.cors_allowed_origins.as_deref());

    Router::new()
        .route("/", get(routes::home))
        .route("/video", get(routes::download_video))
        .route("/audio", get(routes::download_audio))
        .route("/download-video", post(routes::download_video_and_audio))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Any origin unless a comma-separated allow-list is configured
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(allowed)
    }
}

/// Run the HTTP server until a shutdown signal arrives
pub async fn serve(config: Config) -> Result<()> {
    let pipeline = FetchPipeline::from_config(&config)?;

    if !pipeline.auth_enabled() {
        warn!("No auth token configured: media endpoints are open to anyone who can reach them");
    }
    info!(strategies = ?pipeline.strategy_names(), "Extraction chain ready");

    pipeline
        .staging()
        .ensure()
        .await
        .with_context(|| format!("Could not create {}", pipeline.staging().path().display()))?;

    if config.storage.retention_enabled {
        let staging = pipeline.staging().clone();
        let max_age = Duration::from_secs(config.storage.max_age_secs);
        let interval = Duration::from_secs(config.storage.sweep_interval_secs);
        info!(
            max_age_secs = config.storage.max_age_secs,
            "Retention sweeper watching {}",
            staging.path().display()
        );
        tokio::spawn(staging.run_sweeper(max_age, interval));
    }

    let state = Arc::new(AppState {
        pipeline,
        cors_allowed_origins: config.server.cors_allowed_origins.clone(),
    });
    let app = build(state);

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.server.bind_address))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {}", addr))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenGuard;
    use crate::extractors::{MockExtractionStrategy, StrategyChain};
    use crate::storage::StagingDir;
    use crate::transcode::{ConversionKind, MockTranscoder};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use std::path::Path;
    use tower::ServiceExt;

    const TOKEN: &str = "your_secure_token";

    fn media_uri(path: &str, token: &str) -> String {
        format!(
            "{}?video_url={}&token={}",
            path,
            urlencoding::encode("https://example.com/watch?v=abc123"),
            token
        )
    }

    fn writes(file: &'static str) -> MockExtractionStrategy {
        let mut mock = MockExtractionStrategy::new();
        mock.expect_name().return_const("primary");
        mock.expect_fetch().times(1).returning(move |_, _, dir| {
            let path = dir.join(file);
            std::fs::write(&path, b"media bytes")?;
            Ok(path)
        });
        mock
    }

    fn fails(name: &'static str, message: &'static str) -> MockExtractionStrategy {
        let mut mock = MockExtractionStrategy::new();
        mock.expect_name().return_const(name);
        mock.expect_fetch()
            .times(1)
            .returning(move |_, _, _| Err(anyhow::anyhow!(message)));
        mock
    }

    fn untouched() -> MockExtractionStrategy {
        let mut mock = MockExtractionStrategy::new();
        mock.expect_name().return_const("primary");
        mock.expect_fetch().never();
        mock
    }

    fn app(staging: &Path, strategies: Vec<MockExtractionStrategy>, transcoder: MockTranscoder) -> Router {
        let mut chain = StrategyChain::new();
        for strategy in strategies {
            chain.register(Box::new(strategy));
        }
        let pipeline = FetchPipeline::new(
            TokenGuard::new(Some(TOKEN.to_string())),
            StagingDir::new(staging),
            chain,
            Box::new(transcoder),
        );
        build(Arc::new(AppState::new(pipeline)))
    }

    fn idle_transcoder() -> MockTranscoder {
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_convert().never();
        transcoder
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), vec![], idle_transcoder());

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["msg"], "API OK");
    }

    #[tokio::test]
    async fn bad_token_is_401() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("downloads");

        for (method, path) in [(Method::GET, "/video"), (Method::GET, "/audio"), (Method::POST, "/download-video")] {
            let app = app(&staging, vec![untouched()], idle_transcoder());
            let response = app
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(media_uri(path, "wrong"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(response).await["detail"], "Invalid token");
        }
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn video_is_streamed_as_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), vec![writes("clip.mp4")], idle_transcoder());

        let response = app
            .oneshot(Request::builder().uri(media_uri("/video", TOKEN)).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("clip.mp4"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"media bytes");
    }

    #[tokio::test]
    async fn bearer_header_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), vec![writes("song.mp3")], idle_transcoder());

        let uri = format!(
            "/audio?video_url={}",
            urlencoding::encode("https://example.com/watch?v=abc123")
        );
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    }

    #[tokio::test]
    async fn failed_download_is_400_with_detail() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(
            dir.path(),
            vec![fails("primary", "extract failed"), fails("yt-dlp", "ERROR: Unsupported URL")],
            idle_transcoder(),
        );

        let response = app
            .oneshot(Request::builder().uri(media_uri("/audio", TOKEN)).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "Error during audio download: ERROR: Unsupported URL"
        );
    }

    #[tokio::test]
    async fn missing_url_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), vec![untouched()], idle_transcoder());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/video?token={}", TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("video_url"));
    }

    #[tokio::test]
    async fn malformed_query_is_400_with_detail() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), vec![untouched()], idle_transcoder());

        let uri = format!("{}&video_url=https%3A%2F%2Fexample.com%2Fother", media_uri("/video", TOKEN));
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert!(json_body(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("video_url"));
    }

    #[tokio::test]
    async fn combined_endpoint_reports_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_convert()
            .withf(|job| job.kind == ConversionKind::ExtractAudio)
            .times(1)
            .returning(|job| {
                std::fs::write(&job.target, b"mp3")?;
                Ok(())
            });
        let app = app(dir.path(), vec![writes("clip.mp4")], transcoder);

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(media_uri("/download-video", TOKEN))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["msg"], "Video and audio downloaded successfully");
        assert!(body["video_file"].as_str().unwrap().ends_with("clip.mp4"));
        assert!(body["audio_file"].as_str().unwrap().ends_with("clip.mp3"));
    }

    #[test]
    fn cors_accepts_origin_lists() {
        // Both shapes must build without panicking
        let _ = cors_layer(None);
        let _ = cors_layer(Some("https://a.example, https://b.example"));
    }
}
