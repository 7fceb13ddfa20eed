//! HTTP surface: `POST /scan-card/` and `GET /health`.
//!
//! Every scan response is HTTP 200. Success and failure are told apart by the
//! body only (`parsed_data` vs `error`), including for malformed uploads.

use crate::error::CardScanError;
use crate::scan::{CardScanner, ScanResponse};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Multipart field name clients are expected to use.
pub const FILE_FIELD: &str = "file";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub scanner: Arc<CardScanner>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create the router. Public so it can be embedded in a larger application.
pub fn create_router(scanner: Arc<CardScanner>) -> Router {
    let limit = scanner.config().max_upload_bytes;
    let state = ApiState { scanner };

    Router::new()
        .route("/scan-card/", post(scan_card_handler))
        .route("/scan-card", post(scan_card_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Scan endpoint handler.
///
/// POST /scan-card/
///
/// Accepts multipart form data with one image, in a field named `file` or in
/// any field that carries a filename. Extra fields are ignored.
pub async fn scan_card_handler(
    State(state): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ScanResponse> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            warn!("Rejected upload: {}", rejection);
            return Json(ScanResponse::failure(CardScanError::InvalidUpload(
                rejection.body_text(),
            )));
        }
    };

    match read_image(&mut multipart).await {
        Ok((filename, bytes)) => Json(state.scanner.scan_upload(filename.as_deref(), bytes).await),
        Err(e) => {
            warn!("Rejected upload: {}", e);
            Json(ScanResponse::failure(e))
        }
    }
}

/// Health check endpoint handler.
///
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Take the first file field out of the form.
async fn read_image(multipart: &mut Multipart) -> Result<(Option<String>, Bytes), CardScanError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CardScanError::InvalidUpload(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) && field.file_name().is_none() {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| CardScanError::InvalidUpload(e.body_text()))?;
        return Ok((filename, bytes));
    }
    Err(CardScanError::MissingFile)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, scanner: Arc<CardScanner>) -> Result<(), CardScanError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CardScanError::Internal(format!("failed to bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| CardScanError::Internal(e.to_string()))?;
    info!("Listening on http://{}/scan-card/", local);

    axum::serve(listener, create_router(scanner))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CardScanError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
