//! Recognition service
//!
//! Hosts the same protocol the remote client speaks: multipart field `image`,
//! `201 {"result": "1234"}` on success, `{"message": ...}` otherwise. Only
//! local strategies run here, so the service never calls itself.

use crate::broker::BrokerKind;
use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::CaptchaError;
use crate::orchestrator::LocalRecognizer;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recognizer: Arc<LocalRecognizer>,
    pub config: Arc<Config>,
}

#[derive(Serialize)]
pub struct RecognizeResponse {
    pub result: String,
    pub processing_time_ms: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub engine: String,
    pub engine_description: String,
    pub thresholds: Vec<u8>,
    pub max_file_size_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;
    Router::new()
        .route("/yh_client", post(handle_recognize))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config, recognizer: LocalRecognizer) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        recognizer: Arc::new(recognizer),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Recognition service listening on http://{}/yh_client", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn handle_recognize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<RecognizeResponse>), CaptchaError> {
    let start = Instant::now();

    let mut image_data: Option<Bytes> = None;
    let mut content_type: Option<String> = None;
    let mut broker: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CaptchaError::ImageLoad(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" => {
                content_type = field.content_type().map(|s| s.to_string());
                image_data = Some(field.bytes().await.map_err(|e| {
                    CaptchaError::ImageLoad(format!("Failed to read image data: {}", e))
                })?);
            }
            "broker" => {
                broker = Some(field.text().await.map_err(|e| {
                    CaptchaError::UnknownBroker(format!("unreadable broker field: {}", e))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = image_data
        .ok_or_else(|| CaptchaError::ImageLoad("missing multipart field \"image\"".to_string()))?;
    let kind = BrokerKind::resolve(
        broker.as_deref().unwrap_or("default"),
        state.config.unknown_broker,
    )?;

    // The loader sniffs the format; the extension only helps a human reading /tmp
    let extension = match content_type.as_deref() {
        Some("image/png") => ".png",
        Some("image/jpeg") => ".jpg",
        Some("image/gif") => ".gif",
        Some("image/bmp") => ".bmp",
        Some("image/webp") => ".webp",
        Some("image/tiff") => ".tiff",
        _ => ".tmp",
    };

    let mut temp_file = tempfile::Builder::new()
        .prefix("captcha-")
        .suffix(extension)
        .tempfile()
        .map_err(|e| CaptchaError::Internal(format!("Failed to create temp file: {}", e)))?;
    temp_file
        .write_all(&data)
        .map_err(|e| CaptchaError::Internal(format!("Failed to write temp file: {}", e)))?;

    let recognizer = state.recognizer.clone();
    let result = tokio::task::spawn_blocking(move || {
        let result = recognizer.recognize_locally(temp_file.path(), kind);
        drop(temp_file);
        result
    })
    .await
    .map_err(|e| CaptchaError::Internal(format!("Recognition task failed: {}", e)))??;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Recognized {} ({} chain) in {}ms",
        result,
        kind.as_str(),
        processing_time_ms
    );

    Ok((
        StatusCode::CREATED,
        Json(RecognizeResponse {
            result,
            processing_time_ms,
        }),
    ))
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.recognizer.engine();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: engine.name().to_string(),
        engine_description: engine.description().to_string(),
        thresholds: state.config.thresholds.clone(),
        max_file_size_bytes: state.config.max_file_size,
    })
}
