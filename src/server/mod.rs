//! HTTP surface: one extraction endpoint plus a health probe.

pub mod error;
pub mod types;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::report::{ExtractionResult, FieldExtractor};
use crate::utils::fetch::{validate_url, DocumentFetcher};
use crate::utils::pdf::{self, PdfError};
use error::ApiError;
use types::{ExtractionRequest, HealthResponse};

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: DocumentFetcher,
    pub extractor: FieldExtractor,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/extract_and_summarize", post(extract_and_summarize))
        .route("/health", get(health))
        // Replaces axum's built-in 2 MiB cap; rejections surface in the handler.
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Parses the body as JSON whatever its `Content-Type`; it must be an object.
fn parse_request(body: &[u8]) -> Result<ExtractionRequest, ApiError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ApiError::InvalidJson(format!(
            "expected a JSON object, got {}",
            value
        )));
    }
    serde_json::from_value(value).map_err(|e| ApiError::InvalidJson(e.to_string()))
}

// POST /extract_and_summarize
async fn extract_and_summarize(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ExtractionResult>, ApiError> {
    let body = body?;
    let request = parse_request(&body)?;
    if request.is_missing_url() {
        return Err(ApiError::MissingUrl);
    }

    let raw_url = request.pdf_url.as_str().ok_or_else(|| {
        ApiError::InvalidUrl(format!("pdf_url is not a string: {}", request.pdf_url))
    })?;
    let url = validate_url(raw_url)?;

    let document = state.fetcher.fetch(&url).await?;

    let size = document.len();
    let started = std::time::Instant::now();
    let text = tokio::task::spawn_blocking(move || pdf::extract_text(&document))
        .await
        .map_err(|e| PdfError::Parse(format!("extraction worker failed: {}", e)))??;
    info!(
        target: "extract",
        url = %url,
        size = size,
        chars = text.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "PDF text extracted"
    );

    let extractor = state.extractor.clone();
    let result = tokio::task::spawn_blocking(move || extractor.extract_information(&text))
        .await
        .map_err(|e| ApiError::Internal(format!("field extraction worker failed: {}", e)))?;

    Ok(Json(result))
}

// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.extractor.model_id().to_string(),
    })
}
