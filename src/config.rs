//! Configuration types for business-card scanning.
//!
//! All scanning behaviour is controlled through [`ScanConfig`], built via its
//! [`ScanConfigBuilder`]. Everything is resolved once at startup: the binary
//! maps CLI flags and environment variables onto the builder, validates, and
//! then hands the finished config to [`crate::scan::CardScanner`].

use crate::error::CardScanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default hosted model for the Responses API backend.
pub const DEFAULT_MODEL: &str = "gpt-5-mini";

/// Default base URL of the Responses API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for the scanning pipeline.
///
/// # Example
/// ```rust
/// use cardscan::{OcrFailurePolicy, ScanConfig};
///
/// let config = ScanConfig::builder()
///     .model("gpt-5-mini")
///     .api_key("sk-test")
///     .tesseract_path("/usr/bin/tesseract")
///     .ocr_failure(OcrFailurePolicy::Continue)
///     .build()
///     .unwrap();
/// assert_eq!(config.tesseract_lang, "eng");
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// Model identifier sent with every request. Default: `gpt-5-mini`.
    pub model: String,

    /// Named `edgequake-llm` provider ("openai", "anthropic", "ollama", …).
    /// If None, the OpenAI Responses API is called directly.
    pub provider_name: Option<String>,

    /// Bearer credential for the Responses API. Read from `OPENAI_API_KEY`.
    pub api_key: Option<String>,

    /// Base URL of the Responses API. Default: `https://api.openai.com/v1`.
    ///
    /// Any server exposing a compatible `POST /responses` works.
    pub api_base: String,

    /// Timeout for one model call in seconds. Default: 120.
    ///
    /// Reasoning models routinely take 20–60 s on a dense card, so this is
    /// larger than a typical HTTP client timeout.
    pub api_timeout_secs: u64,

    /// Tesseract executable, either a bare name looked up on `PATH` or an
    /// absolute path. Default: `tesseract`.
    pub tesseract_path: PathBuf,

    /// Tesseract language code passed as `-l`. Default: `eng`.
    pub tesseract_lang: String,

    /// PaddleOCR model files for the neural engine. If None, only Tesseract runs.
    pub paddle_models: Option<PaddleModels>,

    /// Directory for transient uploads. If None, the system temp directory.
    pub upload_dir: Option<PathBuf>,

    /// Maximum accepted request body in bytes. Default: 10 MiB.
    pub max_upload_bytes: usize,

    /// What to do when OCR fails. Default: [`OcrFailurePolicy::Abort`].
    pub ocr_failure: OcrFailurePolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            api_timeout_secs: 120,
            tesseract_path: PathBuf::from("tesseract"),
            tesseract_lang: "eng".to_string(),
            paddle_models: None,
            upload_dir: None,
            max_upload_bytes: 10 * 1024 * 1024,
            ocr_failure: OcrFailurePolicy::default(),
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("tesseract_path", &self.tesseract_path)
            .field("tesseract_lang", &self.tesseract_lang)
            .field("paddle_models", &self.paddle_models)
            .field("upload_dir", &self.upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("ocr_failure", &self.ocr_failure)
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory uploads are written to.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn tesseract_lang(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_lang = lang.into();
        self
    }

    pub fn paddle_models(mut self, models: PaddleModels) -> Self {
        self.config.paddle_models = Some(models);
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn ocr_failure(mut self, policy: OcrFailurePolicy) -> Self {
        self.config.ocr_failure = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, CardScanError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(CardScanError::InvalidConfig("model must not be empty".into()));
        }
        if c.tesseract_lang.trim().is_empty() {
            return Err(CardScanError::InvalidConfig(
                "tesseract language must not be empty".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(CardScanError::InvalidConfig(
                "max upload size must be ≥ 1 byte".into(),
            ));
        }
        if !c.api_base.starts_with("http://") && !c.api_base.starts_with("https://") {
            return Err(CardScanError::InvalidConfig(format!(
                "API base must be an HTTP(S) URL, got '{}'",
                c.api_base
            )));
        }
        if let Some(ref dir) = c.upload_dir {
            if !dir.is_dir() {
                return Err(CardScanError::InvalidConfig(format!(
                    "upload directory '{}' does not exist",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

/// File locations of the PaddleOCR detection and recognition models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddleModels {
    /// Text-detection ONNX model.
    pub detection: PathBuf,
    /// Text-recognition ONNX model.
    pub recognition: PathBuf,
    /// Character dictionary matching the recognition model (one language).
    pub dictionary: PathBuf,
}

impl PaddleModels {
    pub fn new(
        detection: impl Into<PathBuf>,
        recognition: impl Into<PathBuf>,
        dictionary: impl Into<PathBuf>,
    ) -> Self {
        Self {
            detection: detection.into(),
            recognition: recognition.into(),
            dictionary: dictionary.into(),
        }
    }

    /// Fail with the first model file that does not exist.
    pub fn check(&self) -> Result<(), CardScanError> {
        for path in [&self.detection, &self.recognition, &self.dictionary] {
            if !Path::new(path).is_file() {
                return Err(CardScanError::ModelFilesMissing { path: path.clone() });
            }
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How the request handler reacts when OCR fails.
///
/// | Policy | Behaviour |
/// |--------|-----------|
/// | `Abort` | respond `{ "error": "OCR failed: …" }` without calling the model (default) |
/// | `Continue` | send `"OCR Failed: …"` to the model as if it were card text |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrFailurePolicy {
    #[default]
    Abort,
    Continue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ScanConfig::default();
        assert_eq!(c.model, "gpt-5-mini");
        assert_eq!(c.api_base, DEFAULT_API_BASE);
        assert_eq!(c.tesseract_path, PathBuf::from("tesseract"));
        assert_eq!(c.ocr_failure, OcrFailurePolicy::Abort);
        assert!(c.paddle_models.is_none());
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let c = ScanConfig::builder()
            .api_base("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(c.api_base, "http://localhost:8080/v1");
    }

    #[test]
    fn rejects_non_http_api_base() {
        let err = ScanConfig::builder().api_base("localhost:8080").build();
        assert!(matches!(err, Err(CardScanError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_missing_upload_dir() {
        let err = ScanConfig::builder()
            .upload_dir("/definitely/not/a/real/dir")
            .build();
        assert!(matches!(err, Err(CardScanError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ScanConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn paddle_models_check_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let det = dir.path().join("det.onnx");
        std::fs::write(&det, b"x").unwrap();
        let models = PaddleModels::new(&det, dir.path().join("rec.onnx"), &det);
        match models.check() {
            Err(CardScanError::ModelFilesMissing { path }) => {
                assert!(path.ends_with("rec.onnx"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn policy_serde_is_lowercase() {
        let s = serde_json::to_string(&OcrFailurePolicy::Continue).unwrap();
        assert_eq!(s, "\"continue\"");
    }
}
