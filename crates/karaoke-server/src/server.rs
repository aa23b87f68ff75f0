use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};

use karaoke_core::{
    sweep_stale_workspaces, validate_media_url, JobKind, KaraokeConfig, Pipeline, PitchShift, ProcessRunner,
};

use crate::artifact::{stream_artifact, Transfer};
use crate::error::ApiError;
use crate::upload::read_upload;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.pipeline.config().max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/pitch", post(pitch))
        .route("/split", post(split))
        .route("/karaokeify", post(karaokeify))
        .route("/download", post(download))
        .route("/convert", post(convert))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn run_server(cfg: KaraokeConfig) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .listen_addr
        .parse()
        .map_err(|e| format!("Invalid listen_addr: {e}"))?;

    match sweep_stale_workspaces(&cfg.work_root) {
        Ok(0) => {}
        Ok(n) => tracing::info!(removed = n, work_root = %cfg.work_root.display(), "stale workspaces removed"),
        Err(e) => tracing::warn!(error = %e, work_root = %cfg.work_root.display(), "stale workspace sweep failed"),
    }

    let cfg = Arc::new(cfg);
    let runner = Arc::new(ProcessRunner::from_config(&cfg));
    let app = build_router(AppState::new(Pipeline::new(cfg.clone(), runner)));

    tracing::info!(
        %addr,
        work_root = %cfg.work_root.display(),
        max_concurrent = cfg.max_concurrent_jobs,
        "Karaokeify HTTP server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| e.to_string())?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
    }
}

// ═══════════════════════════════════════════════════════════════
// GET / and GET /health
// ═══════════════════════════════════════════════════════════════

async fn index() -> &'static str {
    "Karaokeify server is running"
}

async fn health(State(st): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "ok": true,
        "version": karaoke_core::VERSION,
        "active_jobs": st.pipeline.active_jobs(),
        "max_concurrent": st.pipeline.max_concurrent(),
    });
    (StatusCode::OK, Json(body))
}

// ═══════════════════════════════════════════════════════════════
// POST /pitch
// ═══════════════════════════════════════════════════════════════

async fn pitch(State(st): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let p = &st.pipeline;
    let (mut job, ws) = p.open_job(JobKind::PitchShift).await?;

    let form = read_upload(multipart, &ws, "audio").await.inspect_err(|e| job.fail(&e.message))?;
    // Parsed before any tool runs; a bad value never reaches the transcoder
    let shift = job.record(PitchShift::from_field(
        form.field("semitones").unwrap_or_default(),
        &p.config().pitch,
    ))?;
    let input = form.require_file("audio").inspect_err(|e| job.fail(&e.message))?;

    let artifact = p.pitch_shift(&mut job, ws, input, shift).await?;
    stream_artifact(artifact, Transfer::Sized).await
}

// ═══════════════════════════════════════════════════════════════
// POST /split
// ═══════════════════════════════════════════════════════════════

async fn split(State(st): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let p = &st.pipeline;
    let (mut job, ws) = p.open_job(JobKind::SeparateUpload).await?;

    let form = read_upload(multipart, &ws, "audio").await.inspect_err(|e| job.fail(&e.message))?;
    let input = form.require_file("audio").inspect_err(|e| job.fail(&e.message))?;

    let artifact = p.separate_upload(&mut job, ws, input).await?;
    stream_artifact(artifact, Transfer::Sized).await
}

// ═══════════════════════════════════════════════════════════════
// POST /karaokeify
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct KaraokeifyRequest {
    url: Option<String>,
}

async fn karaokeify(
    State(st): State<AppState>,
    req: Result<Json<KaraokeifyRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = req?;
    // No workspace exists until the URL is acceptable
    let url = validate_media_url(req.url.as_deref().unwrap_or_default())?;

    let p = &st.pipeline;
    let (mut job, ws) = p.open_job(JobKind::SeparateUrl).await?;
    let artifact = p.separate_url(&mut job, ws, &url).await?;
    stream_artifact(artifact, Transfer::Sized).await
}

// ═══════════════════════════════════════════════════════════════
// POST /download
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: Option<String>,
}

async fn download(
    State(st): State<AppState>,
    req: Result<Form<DownloadRequest>, FormRejection>,
) -> Result<Response, ApiError> {
    let Form(req) = req?;
    let url = validate_media_url(req.url.as_deref().unwrap_or_default())?;

    let p = &st.pipeline;
    let (mut job, ws) = p.open_job(JobKind::DownloadVideo).await?;
    let artifact = p.download_video(&mut job, ws, &url).await?;
    stream_artifact(artifact, Transfer::Sized).await
}

// ═══════════════════════════════════════════════════════════════
// POST /convert
// ═══════════════════════════════════════════════════════════════

async fn convert(State(st): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let p = &st.pipeline;
    let (mut job, ws) = p.open_job(JobKind::ConvertVideo).await?;

    let form = read_upload(multipart, &ws, "video").await.inspect_err(|e| job.fail(&e.message))?;
    let input = form.require_file("video").inspect_err(|e| job.fail(&e.message))?;

    let artifact = p.convert_video(&mut job, ws, input).await?;
    stream_artifact(artifact, Transfer::Chunked).await
}
