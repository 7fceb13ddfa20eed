//! # cardscan
//!
//! Extract structured contact records from photos of business cards.
//!
//! ## Why two OCR engines and an LLM?
//!
//! Business cards are hostile to OCR: logos, tiny print, coloured
//! backgrounds, text at odd angles. A neural engine (PaddleOCR) reads stylised
//! text well, Tesseract reads dense regular print well, and neither wins
//! every time, so both run and the longer output is kept. The text that comes
//! out is still unstructured and noisy, so a hosted LLM turns it into a JSON
//! record and fixes the usual OCR slips in emails and URLs on the way.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image upload
//!  │
//!  ├─ 1. Upload  write to a unique temp file (removed on drop)
//!  ├─ 2. OCR     PaddleOCR + Tesseract in spawn_blocking, keep the longer text
//!  ├─ 3. Clean   fixed literal replacements (WWIN → www, …)
//!  ├─ 4. Prompt  instructions + raw text + cleaned text
//!  ├─ 5. Model   OpenAI Responses API or any edgequake-llm provider
//!  └─ 6. Parse   JSON, or { "error", "raw" } when the reply is not JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardscan::{CardScanner, ScanConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let scanner = CardScanner::from_config(config)?;
//!     let output = scanner.scan_path("card.jpg".as_ref()).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.parsed)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `cardscan` binary (clap + anyhow + tracing-subscriber) |
//! | `paddle` | on      | PaddleOCR neural engine via `oar-ocr`; without it only Tesseract runs |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod scan;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrFailurePolicy, PaddleModels, ScanConfig, ScanConfigBuilder};
pub use error::{CardScanError, OcrError};
pub use pipeline::llm::{CardModel, ModelReply, ProviderModel, ResponsesClient};
pub use pipeline::ocr::{OcrEngine, OcrMerger, TesseractEngine};
#[cfg(feature = "paddle")]
pub use pipeline::ocr::PaddleEngine;
pub use pipeline::parse::{BusinessCard, ParsedCard};
pub use scan::{CardScanner, ScanOutput, ScanResponse, ScanStage};
pub use server::{create_router, serve};
