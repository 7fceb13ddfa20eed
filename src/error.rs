//! Error types for the cardscan library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`CardScanError`] — the request (or, at startup, the whole service)
//!   cannot proceed: the upload could not be written, the model API refused
//!   the call, a required binary or model file is missing. The HTTP layer
//!   renders it as `{ "error": "<message>" }`.
//!
//! * [`OcrError`] — one OCR engine failed on one image. It is returned as a
//!   value from [`crate::pipeline::ocr::OcrMerger::extract`] so the request
//!   handler can choose, per [`crate::config::OcrFailurePolicy`], to abort or
//!   to carry on with degraded text.

use std::path::PathBuf;
use thiserror::Error;

/// All request-level and startup errors returned by the cardscan library.
#[derive(Debug, Error)]
pub enum CardScanError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured model backend is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The Tesseract binary could not be executed.
    #[error(
        "Tesseract binary '{path}' could not be run: {detail}\n\
Install tesseract or point CARDSCAN_TESSERACT / --tesseract at the executable."
    )]
    TesseractNotFound { path: PathBuf, detail: String },

    /// A PaddleOCR model file is missing or unreadable.
    #[error("PaddleOCR model file not found: '{path}'")]
    ModelFilesMissing { path: PathBuf },

    // ── Upload errors ─────────────────────────────────────────────────────
    /// The uploaded image could not be persisted for OCR.
    #[error("Failed to store upload in '{dir}': {source}")]
    UploadFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The multipart request did not carry a file.
    #[error("No file provided in upload")]
    MissingFile,

    /// The request body could not be read as a multipart upload.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    // ── OCR errors ────────────────────────────────────────────────────────
    /// OCR failed and the failure policy is to abort.
    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The LLM API returned a non-retryable error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// LLM API returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// LLM API call timed out.
    #[error("API call timed out after {elapsed_ms}ms")]
    ApiTimeout { elapsed_ms: u64 },

    /// LLM API returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure of a single OCR engine on a single image.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum OcrError {
    /// The engine could not be started (binary missing, models not loaded).
    #[error("{engine} is unavailable: {detail}")]
    EngineUnavailable { engine: String, detail: String },

    /// The engine ran but reported an error.
    #[error("{engine} failed: {detail}")]
    EngineFailed { engine: String, detail: String },

    /// The image file could not be decoded.
    #[error("could not load image '{path}': {detail}")]
    ImageLoad { path: PathBuf, detail: String },

    /// The blocking OCR task panicked or was cancelled.
    #[error("{engine} task aborted: {detail}")]
    TaskPanicked { engine: String, detail: String },
}
