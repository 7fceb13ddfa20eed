//! Upload persistence: write the received image to a per-request temp file.
//!
//! Both OCR engines want a path, so the bytes have to land on disk. The file
//! is created through [`tempfile`] with a random component in its name, so two
//! uploads called `card.jpg` arriving at the same time never share a path.
//! [`TempUpload`] owns the file; dropping it deletes the file, whichever way
//! the request ends.

use crate::error::CardScanError;
use axum::body::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const PREFIX: &str = "card_";
const MAX_STEM_LEN: usize = 48;

static RE_UNSAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").unwrap());

/// An uploaded image persisted for the lifetime of one request.
#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
    original_name: Option<String>,
}

impl TempUpload {
    /// Write `bytes` to a fresh file in `dir`.
    ///
    /// The file name keeps a sanitised form of `filename` for easier
    /// debugging, e.g. `card_Xk3p9a_john_doe.jpg`.
    pub fn write(
        dir: &Path,
        filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<Self, CardScanError> {
        let upload_failed = |source| CardScanError::UploadFailed {
            dir: dir.to_path_buf(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(&name_suffix(filename))
            .tempfile_in(dir)
            .map_err(upload_failed)?;
        file.write_all(bytes).map_err(upload_failed)?;
        file.flush().map_err(upload_failed)?;

        debug!("Stored {} byte upload at {}", bytes.len(), file.path().display());

        Ok(Self {
            file,
            original_name: filename.map(str::to_string),
        })
    }

    /// [`TempUpload::write`] on the blocking pool.
    pub async fn persist(
        dir: PathBuf,
        filename: Option<String>,
        bytes: Bytes,
    ) -> Result<Self, CardScanError> {
        tokio::task::spawn_blocking(move || Self::write(&dir, filename.as_deref(), &bytes))
            .await
            .map_err(|e| CardScanError::Internal(format!("upload task aborted: {e}")))?
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Filename as sent by the client, before sanitising.
    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// Delete the file now, reporting any I/O error.
    ///
    /// Dropping the guard also deletes the file but ignores errors.
    pub fn close(self) -> Result<(), CardScanError> {
        let path: PathBuf = self.file.path().to_path_buf();
        self.file
            .close()
            .map_err(|e| CardScanError::Internal(format!("failed to remove {}: {e}", path.display())))
    }

    /// [`TempUpload::close`] on the blocking pool.
    pub async fn remove(self) -> Result<(), CardScanError> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|e| CardScanError::Internal(format!("cleanup task aborted: {e}")))?
    }
}

/// `_<stem>.<ext>` from the client filename, restricted to safe characters.
fn name_suffix(filename: Option<&str>) -> String {
    let Some(name) = filename else {
        return String::new();
    };
    // Clients may send a full path; keep the last component only.
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let path = Path::new(base);

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let stem = RE_UNSAFE.replace_all(stem, "_");
    let stem: String = stem.trim_matches('_').chars().take(MAX_STEM_LEN).collect();

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| RE_UNSAFE.replace_all(e, "").to_lowercase())
        .filter(|e| !e.is_empty());

    let mut suffix = String::new();
    if !stem.is_empty() {
        suffix.push('_');
        suffix.push_str(&stem);
    }
    if let Some(ext) = ext {
        suffix.push('.');
        suffix.push_str(&ext);
    }
    suffix
}
