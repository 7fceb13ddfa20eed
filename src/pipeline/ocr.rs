//! OCR: run a neural and a classic engine over the same card and keep the
//! more complete output.
//!
//! ## Engines
//!
//! * [`PaddleEngine`] (feature `paddle`) — PaddleOCR detection + recognition
//!   via `oar-ocr`. Good at stylised fonts and rotated text, returns one
//!   fragment per detected line.
//! * [`TesseractEngine`] — the `tesseract` binary. Good at dense, regular
//!   print, returns the whole page as text.
//!
//! Neither engine wins consistently on business cards, so both run and the
//! longer output is kept ([`select_longer`]). Both are blocking and run on
//! tokio's blocking pool.

use crate::error::{CardScanError, OcrError};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A synchronous OCR engine.
///
/// Implementations are shared across requests behind an `Arc`, so
/// `recognize` must be safe to call concurrently.
pub trait OcrEngine: Send + Sync {
    /// Short engine name used in logs and errors.
    fn name(&self) -> &str;

    /// Recognise all text in the image at `image`.
    fn recognize(&self, image: &Path) -> Result<String, OcrError>;
}

/// One line recognised by the neural engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f64,
}

/// Concatenate line fragments with single spaces.
pub fn join_lines(lines: &[OcrLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Mean recognition confidence, `None` for no lines.
pub fn mean_confidence(lines: &[OcrLine]) -> Option<f64> {
    if lines.is_empty() {
        return None;
    }
    Some(lines.iter().map(|l| l.confidence).sum::<f64>() / lines.len() as f64)
}

/// Keep the neural output only when it is strictly longer (in characters);
/// ties go to the classic engine.
pub fn select_longer(neural: String, classic: String) -> String {
    if neural.chars().count() > classic.chars().count() {
        neural
    } else {
        classic
    }
}

/// Runs both engines and merges their output.
#[derive(Clone)]
pub struct OcrMerger {
    neural: Option<Arc<dyn OcrEngine>>,
    classic: Arc<dyn OcrEngine>,
}

impl std::fmt::Debug for OcrMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrMerger")
            .field("neural", &self.neural.as_ref().map(|e| e.name().to_string()))
            .field("classic", &self.classic.name())
            .finish()
    }
}

impl OcrMerger {
    pub fn new(neural: Arc<dyn OcrEngine>, classic: Arc<dyn OcrEngine>) -> Self {
        Self {
            neural: Some(neural),
            classic,
        }
    }

    /// A merger with no neural engine; the classic output is always used.
    pub fn classic_only(classic: Arc<dyn OcrEngine>) -> Self {
        Self {
            neural: None,
            classic,
        }
    }

    /// Run both engines on `image` and return the longer text.
    ///
    /// Any engine failure fails the whole extraction; partial output from the
    /// other engine is discarded.
    pub async fn extract(&self, image: &Path) -> Result<String, OcrError> {
        let classic = run_blocking(Arc::clone(&self.classic), image.to_path_buf());
        let (neural_text, classic_text) = match &self.neural {
            Some(engine) => {
                let neural = run_blocking(Arc::clone(engine), image.to_path_buf());
                let (n, c) = tokio::join!(neural, classic);
                (n?, c?)
            }
            None => (String::new(), classic.await?),
        };

        debug!(
            "OCR lengths: neural={} classic={}",
            neural_text.chars().count(),
            classic_text.chars().count()
        );
        Ok(select_longer(neural_text, classic_text))
    }
}

async fn run_blocking(engine: Arc<dyn OcrEngine>, image: PathBuf) -> Result<String, OcrError> {
    let name = engine.name().to_string();
    let result = tokio::task::spawn_blocking(move || engine.recognize(&image))
        .await
        .map_err(|e| OcrError::TaskPanicked {
            engine: name.clone(),
            detail: e.to_string(),
        })?;
    if let Err(ref e) = result {
        warn!("{}", e);
    }
    result
}

// ── Tesseract ────────────────────────────────────────────────────────────

/// The classic engine: shells out to the `tesseract` CLI.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    lang: String,
}

impl TesseractEngine {
    /// Probe `binary --version` and fail fast if it cannot run.
    pub fn new(binary: impl Into<PathBuf>, lang: impl Into<String>) -> Result<Self, CardScanError> {
        let binary = binary.into();
        let output = Command::new(&binary)
            .arg("--version")
            .output()
            .map_err(|e| CardScanError::TesseractNotFound {
                path: binary.clone(),
                detail: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(CardScanError::TesseractNotFound {
                path: binary,
                detail: format!("--version exited with {}", output.status),
            });
        }
        // Older releases print the version banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        let version = String::from_utf8_lossy(&banner);
        info!(
            "Using {}",
            version.lines().next().unwrap_or("tesseract (unknown version)")
        );

        Ok(Self {
            binary,
            lang: lang.into(),
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .output()
            .map_err(|e| OcrError::EngineUnavailable {
                engine: self.name().to_string(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::EngineFailed {
                engine: self.name().to_string(),
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract: {} chars", text.chars().count());
        Ok(text)
    }
}

// ── PaddleOCR ────────────────────────────────────────────────────────────

/// The neural engine: PaddleOCR models loaded once and reused.
#[cfg(feature = "paddle")]
pub struct PaddleEngine {
    ocr: oar_ocr::oarocr::OAROCR,
}

#[cfg(feature = "paddle")]
impl PaddleEngine {
    /// Load the detection and recognition models. Slow; call once at startup.
    pub fn new(models: &crate::config::PaddleModels) -> Result<Self, CardScanError> {
        models.check()?;
        let det = models.detection.to_string_lossy().into_owned();
        let rec = models.recognition.to_string_lossy().into_owned();
        let dict = models.dictionary.to_string_lossy().into_owned();

        let ocr = oar_ocr::oarocr::OAROCRBuilder::new(det.as_str(), rec.as_str(), dict.as_str())
            .build()
            .map_err(|e| CardScanError::Internal(format!("failed to load PaddleOCR models: {e}")))?;
        info!("PaddleOCR models loaded from {}", models.detection.display());
        Ok(Self { ocr })
    }

    /// Recognise each detected line separately.
    pub fn recognize_lines(&self, image: &Path) -> Result<Vec<OcrLine>, OcrError> {
        let img = image::open(image)
            .map_err(|e| OcrError::ImageLoad {
                path: image.to_path_buf(),
                detail: e.to_string(),
            })?
            .to_rgb8();

        let results = self.ocr.predict(vec![img]).map_err(|e| OcrError::EngineFailed {
            engine: "paddleocr".to_string(),
            detail: e.to_string(),
        })?;

        let mut lines = Vec::new();
        for res in results {
            for region in &res.text_regions {
                if let Some((text, confidence)) = region.text_with_confidence() {
                    lines.push(OcrLine {
                        text: text.to_string(),
                        confidence: f64::from(confidence),
                    });
                }
            }
        }
        Ok(lines)
    }
}

#[cfg(feature = "paddle")]
impl OcrEngine for PaddleEngine {
    fn name(&self) -> &str {
        "paddleocr"
    }

    fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        let lines = self.recognize_lines(image)?;
        match mean_confidence(&lines) {
            Some(mean) => debug!("paddleocr: {} lines, mean confidence {:.3}", lines.len(), mean),
            None => debug!("paddleocr: no text detected"),
        }
        Ok(join_lines(&lines))
    }
}

/// Build the merger described by `config`: Tesseract always, PaddleOCR when
/// the feature is enabled and model paths are configured.
pub fn build_merger(config: &crate::config::ScanConfig) -> Result<OcrMerger, CardScanError> {
    let classic: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::new(
        &config.tesseract_path,
        config.tesseract_lang.clone(),
    )?);

    match config.paddle_models {
        #[cfg(feature = "paddle")]
        Some(ref models) => {
            let neural: Arc<dyn OcrEngine> = Arc::new(PaddleEngine::new(models)?);
            Ok(OcrMerger::new(neural, classic))
        }
        #[cfg(not(feature = "paddle"))]
        Some(_) => {
            warn!("PaddleOCR models configured but the `paddle` feature is disabled; using Tesseract only");
            Ok(OcrMerger::classic_only(classic))
        }
        None => {
            warn!("No PaddleOCR models configured; using Tesseract only");
            Ok(OcrMerger::classic_only(classic))
        }
    }
}
