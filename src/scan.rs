//! Request pipeline: one uploaded card in, one JSON response out.
//!
//! ```text
//! Received ─▶ OcrDone ─▶ Cleaned ─▶ Prompted ─▶ ModelCalled ─▶ Parsed ─▶ Responded
//! ```
//!
//! Every stage runs once, in order. Any error short-circuits to
//! [`ScanResponse::Failure`]; the uploaded file is removed on every path
//! because [`TempUpload`] owns it.

use crate::config::{OcrFailurePolicy, ScanConfig};
use crate::error::CardScanError;
use crate::pipeline::clean::clean_text;
use crate::pipeline::llm::{resolve_model, CardModel};
use crate::pipeline::ocr::{build_merger, OcrMerger};
use crate::pipeline::parse::{parse_card, ParsedCard};
use crate::pipeline::upload::TempUpload;
use crate::prompts::build_prompt;
use axum::body::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Pipeline position, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Received,
    OcrDone,
    Cleaned,
    Prompted,
    ModelCalled,
    Parsed,
    Responded,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanStage::Received => "received",
            ScanStage::OcrDone => "ocr_done",
            ScanStage::Cleaned => "cleaned",
            ScanStage::Prompted => "prompted",
            ScanStage::ModelCalled => "model_called",
            ScanStage::Parsed => "parsed",
            ScanStage::Responded => "responded",
        };
        f.write_str(s)
    }
}

/// Everything the pipeline produced for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutput {
    /// Merged OCR text, before cleanup.
    pub raw_text: String,
    pub cleaned_text: String,
    pub parsed: ParsedCard,
}

/// Body returned by `POST /scan-card/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScanResponse {
    Success {
        raw_text: String,
        parsed_data: ParsedCard,
    },
    Failure {
        error: String,
    },
}

impl ScanResponse {
    pub fn failure(error: impl fmt::Display) -> Self {
        ScanResponse::Failure {
            error: error.to_string(),
        }
    }
}

impl From<ScanOutput> for ScanResponse {
    fn from(out: ScanOutput) -> Self {
        ScanResponse::Success {
            raw_text: out.raw_text,
            parsed_data: out.parsed,
        }
    }
}

/// Shared, read-only scanning service: engines and model are built once and
/// reused by every request.
pub struct CardScanner {
    ocr: OcrMerger,
    model: Arc<dyn CardModel>,
    config: ScanConfig,
}

impl fmt::Debug for CardScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardScanner")
            .field("ocr", &self.ocr)
            .field("model", &self.model.name())
            .field("config", &self.config)
            .finish()
    }
}

impl CardScanner {
    pub fn new(ocr: OcrMerger, model: Arc<dyn CardModel>, config: ScanConfig) -> Self {
        Self { ocr, model, config }
    }

    /// Build engines and model client from `config`.
    ///
    /// Loads OCR models and probes the Tesseract binary, so this is slow and
    /// fails fast on a broken installation.
    pub fn from_config(config: ScanConfig) -> Result<Self, CardScanError> {
        let ocr = build_merger(&config)?;
        let model = resolve_model(&config)?;
        info!("Scanner ready: model={}, ocr={:?}", model.name(), ocr);
        Ok(Self::new(ocr, model, config))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run OCR, cleanup, prompt and model call on an image already on disk.
    pub async fn scan_path(&self, image: &Path) -> Result<ScanOutput, CardScanError> {
        let start = Instant::now();
        debug!(stage = %ScanStage::Received, "Scanning {}", image.display());

        let raw_text = match self.ocr.extract(image).await {
            Ok(text) => text,
            Err(e) => match self.config.ocr_failure {
                OcrFailurePolicy::Abort => return Err(e.into()),
                OcrFailurePolicy::Continue => {
                    warn!("OCR failed, continuing with error text: {}", e);
                    format!("OCR Failed: {e}")
                }
            },
        };
        debug!(stage = %ScanStage::OcrDone, chars = raw_text.chars().count());

        let cleaned_text = clean_text(&raw_text);
        debug!(stage = %ScanStage::Cleaned, chars = cleaned_text.chars().count());

        let prompt = build_prompt(&raw_text, &cleaned_text);
        debug!(stage = %ScanStage::Prompted, chars = prompt.chars().count());

        let reply = self.model.generate(&prompt).await?;
        let reply_text = reply.text();
        debug!(stage = %ScanStage::ModelCalled, chars = reply_text.chars().count());

        let parsed = parse_card(&reply_text);
        debug!(
            stage = %ScanStage::Parsed,
            ok = !parsed.is_failed(),
            elapsed_ms = start.elapsed().as_millis() as u64
        );

        Ok(ScanOutput {
            raw_text,
            cleaned_text,
            parsed,
        })
    }

    /// Persist an upload, scan it, and always remove it again.
    ///
    /// Never fails: every error becomes [`ScanResponse::Failure`].
    pub async fn scan_upload(&self, filename: Option<&str>, bytes: Bytes) -> ScanResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("scan", request_id = %request_id);

        async move {
            info!(
                "Received {} ({} bytes)",
                filename.unwrap_or("<unnamed>"),
                bytes.len()
            );

            let upload = match TempUpload::persist(
                self.config.upload_dir(),
                filename.map(str::to_string),
                bytes,
            )
            .await
            {
                Ok(upload) => upload,
                Err(e) => {
                    warn!("{}", e);
                    return ScanResponse::failure(e);
                }
            };

            let result = self.scan_path(upload.path()).await;
            if let Err(e) = upload.remove().await {
                warn!("{}", e);
            }

            let response = match result {
                Ok(output) => ScanResponse::from(output),
                Err(e) => {
                    warn!("Scan failed: {}", e);
                    ScanResponse::failure(e)
                }
            };
            let ok = matches!(response, ScanResponse::Success { .. });
            info!(stage = %ScanStage::Responded, ok);
            response
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use crate::pipeline::llm::ModelReply;
    use crate::pipeline::ocr::OcrEngine;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Text(&'static str);

    impl OcrEngine for Text {
        fn name(&self) -> &str {
            "text"
        }

        fn recognize(&self, _image: &Path) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl OcrEngine for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn recognize(&self, _image: &Path) -> Result<String, OcrError> {
            Err(OcrError::EngineFailed {
                engine: "broken".into(),
                detail: "no text layer".into(),
            })
        }
    }

    /// Replies with a fixed text and records the prompts it saw.
    struct Echo {
        reply: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CardModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<ModelReply, CardScanError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(ModelReply::from_text(self.reply))
        }
    }

    struct Down;

    #[async_trait]
    impl CardModel for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn generate(&self, _prompt: &str) -> Result<ModelReply, CardScanError> {
            Err(CardScanError::LlmApiError {
                message: "HTTP 503: overloaded".into(),
            })
        }
    }

    fn config(dir: &Path, policy: OcrFailurePolicy) -> ScanConfig {
        ScanConfig::builder()
            .upload_dir(dir)
            .ocr_failure(policy)
            .build()
            .unwrap()
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn success_shape_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let model = Echo::new(r#"{"name":["A"]}"#);
        let scanner = CardScanner::new(
            OcrMerger::new(Arc::new(Text("A WWIN.a.comcom")), Arc::new(Text("A"))),
            model.clone(),
            config(dir.path(), OcrFailurePolicy::Abort),
        );

        let resp = scanner.scan_upload(Some("card.png"), Bytes::from_static(b"img")).await;
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"raw_text": "A WWIN.a.comcom", "parsed_data": {"name": ["A"]}})
        );
        assert!(dir_is_empty(dir.path()));

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("\"\"\"A WWIN.a.comcom\"\"\""));
        assert!(prompts[0].contains("\"\"\"A www.a.com\"\"\""));
    }

    #[tokio::test]
    async fn unparsable_reply_is_still_success() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = CardScanner::new(
            OcrMerger::classic_only(Arc::new(Text("x"))),
            Echo::new("not json"),
            config(dir.path(), OcrFailurePolicy::Abort),
        );
        let resp = scanner.scan_upload(None, Bytes::from_static(b"img")).await;
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({
                "raw_text": "x",
                "parsed_data": {"error": "Failed to parse JSON", "raw": "not json"}
            })
        );
    }

    #[tokio::test]
    async fn ocr_failure_aborts_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let model = Echo::new("{}");
        let scanner = CardScanner::new(
            OcrMerger::classic_only(Arc::new(Broken)),
            model.clone(),
            config(dir.path(), OcrFailurePolicy::Abort),
        );
        match scanner.scan_upload(Some("c.jpg"), Bytes::from_static(b"img")).await {
            ScanResponse::Failure { error } => {
                assert!(error.starts_with("OCR failed:"), "got: {error}")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(model.prompts.lock().unwrap().is_empty());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn ocr_failure_can_continue_with_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let model = Echo::new("{}");
        let scanner = CardScanner::new(
            OcrMerger::classic_only(Arc::new(Broken)),
            model.clone(),
            config(dir.path(), OcrFailurePolicy::Continue),
        );
        match scanner.scan_upload(Some("c.jpg"), Bytes::from_static(b"img")).await {
            ScanResponse::Success { raw_text, .. } => {
                assert!(raw_text.starts_with("OCR Failed: "), "got: {raw_text}")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(model.prompts.lock().unwrap()[0].contains("OCR Failed: "));
    }

    #[tokio::test]
    async fn model_error_becomes_failure_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = CardScanner::new(
            OcrMerger::classic_only(Arc::new(Text("x"))),
            Arc::new(Down),
            config(dir.path(), OcrFailurePolicy::Abort),
        );
        let resp = scanner.scan_upload(Some("c.jpg"), Bytes::from_static(b"img")).await;
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"error": "LLM API error: HTTP 503: overloaded"})
        );
        assert!(dir_is_empty(dir.path()));
    }

    /// Shared in-memory log sink.
    #[derive(Clone, Default)]
    struct LogBuf(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn request_logs_carry_request_id_and_stage() {
        let logs = LogBuf::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempfile::tempdir().unwrap();
        let scanner = CardScanner::new(
            OcrMerger::classic_only(Arc::new(Text("x"))),
            Echo::new("{}"),
            config(dir.path(), OcrFailurePolicy::Abort),
        );
        scanner
            .scan_upload(Some("card.png"), Bytes::from_static(b"img"))
            .await;

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("scan{request_id="), "got: {out}");
        assert!(out.contains("Received card.png (3 bytes)"), "got: {out}");
        assert!(out.contains("stage=responded ok=true"), "got: {out}");
    }

    #[test]
    fn stage_names() {
        assert_eq!(ScanStage::OcrDone.to_string(), "ocr_done");
        assert_eq!(ScanStage::ModelCalled.to_string(), "model_called");
    }
}
