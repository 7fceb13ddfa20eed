//! Reply parsing: decode the model's text as JSON, or keep it raw.
//!
//! The prompt asks for bare JSON, but chat models still wrap it in a
//! ```` ```json ```` fence now and then, so one outer fence is stripped before
//! decoding. Anything that still fails to decode is returned as a
//! [`ParsedCard::Failed`] record carrying the text exactly as received.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Error tag placed in [`ParsedCard::Failed`].
pub const PARSE_ERROR_TAG: &str = "Failed to parse JSON";

/// Result of decoding the model reply.
///
/// Serialises untagged: either the decoded JSON itself, or
/// `{ "error": "Failed to parse JSON", "raw": "<reply>" }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedCard {
    /// The reply decoded as JSON; normally an object shaped like [`BusinessCard`].
    Card(serde_json::Value),
    /// The reply was not valid JSON.
    Failed { error: String, raw: String },
}

impl ParsedCard {
    pub fn is_failed(&self) -> bool {
        matches!(self, ParsedCard::Failed { .. })
    }

    /// Typed view of a decoded card. None when decoding failed or the JSON
    /// does not fit the business-card schema.
    pub fn card(&self) -> Option<BusinessCard> {
        match self {
            ParsedCard::Card(value) => serde_json::from_value(value.clone()).ok(),
            ParsedCard::Failed { .. } => None,
        }
    }
}

/// The record the prompt asks for. Every field is a list, even for one value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessCard {
    pub name: Vec<String>,
    pub designation: Vec<String>,
    pub company_name: Vec<String>,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub address: Vec<String>,
    pub city: Vec<String>,
    pub country: Vec<String>,
    pub website: Vec<String>,
    pub slogan: Vec<String>,
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n```$").unwrap());

fn strip_json_fence(input: &str) -> &str {
    let trimmed = input.trim();
    RE_JSON_FENCE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map_or(input, |m| m.as_str())
}

/// Decode `text` as JSON; never fails.
pub fn parse_card(text: &str) -> ParsedCard {
    match serde_json::from_str::<serde_json::Value>(strip_json_fence(text)) {
        Ok(value) => ParsedCard::Card(value),
        Err(e) => {
            warn!("Model reply is not valid JSON ({}), returning raw text", e);
            ParsedCard::Failed {
                error: PARSE_ERROR_TAG.to_string(),
                raw: text.to_string(),
            }
        }
    }
}
