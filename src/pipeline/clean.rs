//! Text cleanup: literal fixes for artefacts OCR engines produce on cards.

/// Replacement table, applied top to bottom.
///
/// Each entry is a literal substring substitution over the whole string.
/// Later entries see the output of earlier ones, but an entry never re-scans
/// its own output.
pub const REPLACEMENTS: [(&str, &str); 4] = [
    ("WWIN", "www"),
    ("comcom", "com"),
    ("•", ""),
    ("\n\n", "\n"),
];

/// Apply [`REPLACEMENTS`] to `text`.
pub fn clean_text(text: &str) -> String {
    REPLACEMENTS
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}
