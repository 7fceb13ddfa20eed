//! Pipeline stages for business-card scanning.
//!
//! Each submodule implements exactly one transformation step and is
//! testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ ocr ──▶ clean ──▶ (prompt) ──▶ llm ──▶ parse
//! (temp file) (paddle+tesseract) (fixups)   (model reply) (JSON)
//! ```
//!
//! 1. [`upload`] — persist the uploaded bytes under a unique name; the guard
//!    deletes the file on drop
//! 2. [`ocr`]    — run both engines in `spawn_blocking` and keep the longer
//!    output
//! 3. [`clean`]  — fixed literal replacements for known OCR artefacts
//! 4. [`llm`]    — the only stage with network I/O
//! 5. [`parse`]  — best-effort JSON decoding of the model reply

pub mod clean;
pub mod llm;
pub mod ocr;
pub mod parse;
pub mod upload;
