//! Output recovery for model responses that were supposed to be structured
//! JSON. Decoding degrades through progressively cheaper interpretations and
//! always produces displayable text; malformed output is never surfaced as
//! an error to the caller.

mod fences;
mod normalize;
mod render;
mod repair;

pub use fences::repair_code_fences;
pub use normalize::normalize_plain_text;
pub use render::render_structured;
pub use repair::repair_json;

use crate::models::{CodeBlock, StructuredResponse, TextBlock};
use serde_json::Value;
use tracing::{debug, info};

/// Which interpretation of the raw output produced the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryRoute {
    /// Plain `text` + `codeBlocks` payload, decoded directly.
    Structured,
    /// Full schema decode, including text blocks and auxiliary blocks.
    SchemaValidated,
    /// Parsed only after bounded JSON repair.
    RepairedJson,
    /// Schema decode failed; individually valid fields were salvaged.
    PartialSchema,
    /// Treated as prose and normalized.
    PlainText,
}

impl RecoveryRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryRoute::Structured => "structured",
            RecoveryRoute::SchemaValidated => "schema_validated",
            RecoveryRoute::RepairedJson => "repaired_json",
            RecoveryRoute::PartialSchema => "partial_schema",
            RecoveryRoute::PlainText => "plain_text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveredAnswer {
    pub text: String,
    pub route: RecoveryRoute,
}

/// Decodes raw model output into displayable text. Tries, in order: direct
/// structured decode, full schema decode, reparse after JSON repair, partial
/// field salvage, and finally plain-text normalization. Infallible.
pub fn recover(raw: &str) -> RecoveredAnswer {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(answer) = decode_value(&value) {
            return answer;
        }
        if let Some(answer) = salvage_fields(&value) {
            info!(route = answer.route.as_str(), "recovered response via partial salvage");
            return answer;
        }
    } else if let Some(candidate) = repair_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if let Some(mut answer) = decode_value(&value).or_else(|| salvage_fields(&value)) {
                answer.route = RecoveryRoute::RepairedJson;
                info!(route = answer.route.as_str(), "recovered response via json repair");
                return answer;
            }
        }
    }

    debug!("response fell through to plain text recovery");
    RecoveredAnswer {
        text: repair_code_fences(&normalize_plain_text(trimmed)),
        route: RecoveryRoute::PlainText,
    }
}

fn decode_value(value: &Value) -> Option<RecoveredAnswer> {
    let obj = value.as_object()?;
    if !obj.get("text").is_some_and(Value::is_string) {
        return None;
    }

    let simple_shape = obj
        .keys()
        .all(|k| matches!(k.as_str(), "text" | "codeBlocks" | "preserveParagraphs"));
    let route = if simple_shape {
        RecoveryRoute::Structured
    } else {
        RecoveryRoute::SchemaValidated
    };

    let response: StructuredResponse = serde_json::from_value(value.clone()).ok()?;
    Some(RecoveredAnswer {
        text: render_structured(&response),
        route,
    })
}

/// Keeps whichever top-level fields individually decode and defaults the
/// rest, so one malformed block does not discard an otherwise usable payload.
fn salvage_fields(value: &Value) -> Option<RecoveredAnswer> {
    let obj = value.as_object()?;
    let mut response = StructuredResponse::default();
    let mut salvaged = false;

    if let Some(text) = obj.get("text").and_then(Value::as_str) {
        response.text = text.to_string();
        salvaged = true;
    }
    if let Some(blocks) = obj.get("codeBlocks").and_then(Value::as_array) {
        response.code_blocks = blocks
            .iter()
            .filter_map(|b| serde_json::from_value::<CodeBlock>(b.clone()).ok())
            .collect();
        salvaged = salvaged || !response.code_blocks.is_empty();
    }
    if let Some(blocks) = obj.get("textBlocks").and_then(Value::as_array) {
        let decoded: Vec<TextBlock> = blocks
            .iter()
            .filter_map(|b| serde_json::from_value::<TextBlock>(b.clone()).ok())
            .collect();
        if !decoded.is_empty() {
            response.text_blocks = Some(decoded);
            salvaged = true;
        }
    }
    if let Some(preserve) = obj.get("preserveParagraphs").and_then(Value::as_bool) {
        response.preserve_paragraphs = preserve;
    }

    if !salvaged {
        return None;
    }
    Some(RecoveredAnswer {
        text: render_structured(&response),
        route: RecoveryRoute::PartialSchema,
    })
}
