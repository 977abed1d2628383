//! Strict validation of raw engine output against the wire contract.
//!
//! The generative engine is an unreliable collaborator: even when the
//! transport succeeds its output may carry extra prose, a fenced code block,
//! missing keys, or out-of-range values. Validation is all-or-nothing - a
//! raw blob either decodes into a fully-bounded [`Proposal`] /
//! [`VendorReply`] or fails with a field-level diagnosis. Nothing here
//! performs I/O.

use serde_json::Value;
use thiserror::Error;

use crate::domain::negotiation::{Proposal, Strategy, VendorReply};

pub const PROPOSAL_MIN_CHARS: usize = 10;
pub const PROPOSAL_MAX_CHARS: usize = 1200;
pub const RESPONSE_MIN_CHARS: usize = 5;
pub const RESPONSE_MAX_CHARS: usize = 1200;
pub const REASONING_MIN_CHARS: usize = 5;
pub const REASONING_MAX_CHARS: usize = 600;
pub const EXPECTED_OUTCOME_MIN_CHARS: usize = 3;
pub const EXPECTED_OUTCOME_MAX_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("output is not a JSON object: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("schema violation at `{field}`: {reason}")]
    Schema { field: &'static str, reason: String },
}

impl ValidationError {
    fn schema(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Schema { field, reason: reason.into() }
    }
}

/// Decode a raw proposal blob for `strategy`. The strategy is supplied by
/// the caller, not the engine: the wire contract carries only the three
/// text fields.
pub fn validate_proposal(strategy: Strategy, raw: &str) -> Result<Proposal, ValidationError> {
    let object = parse_object(raw)?;

    let content = bounded_str(&object, "proposal", PROPOSAL_MIN_CHARS, PROPOSAL_MAX_CHARS)?;
    let reasoning = bounded_str(&object, "reasoning", REASONING_MIN_CHARS, REASONING_MAX_CHARS)?;
    let expected_outcome = bounded_str(
        &object,
        "expected_outcome",
        EXPECTED_OUTCOME_MIN_CHARS,
        EXPECTED_OUTCOME_MAX_CHARS,
    )?;

    Ok(Proposal { strategy, content, reasoning, expected_outcome })
}

/// Decode a raw vendor-reply blob. `accepted_price` is a required key but
/// may be explicitly null; this function does not cross-check it against
/// `success` (that plausibility expectation stays advisory).
pub fn validate_vendor_reply(raw: &str) -> Result<VendorReply, ValidationError> {
    let object = parse_object(raw)?;

    let content = bounded_str(&object, "response", RESPONSE_MIN_CHARS, RESPONSE_MAX_CHARS)?;
    let reasoning = bounded_str(&object, "reasoning", REASONING_MIN_CHARS, REASONING_MAX_CHARS)?;

    let accepted_price = match object.get("accepted_price") {
        None => return Err(ValidationError::schema("accepted_price", "missing required field")),
        Some(Value::Null) => None,
        Some(value) => Some(value.as_f64().ok_or_else(|| {
            ValidationError::schema("accepted_price", format!("expected number or null, got {value}"))
        })?),
    };

    let success = match object.get("success") {
        Some(Value::Bool(flag)) => *flag,
        Some(value) => {
            return Err(ValidationError::schema(
                "success",
                format!("expected boolean, got {value}"),
            ));
        }
        None => return Err(ValidationError::schema("success", "missing required field")),
    };

    Ok(VendorReply { content, accepted_price, reasoning, success })
}

fn parse_object(raw: &str) -> Result<Value, ValidationError> {
    let stripped = strip_code_fence(raw);
    let value: Value = serde_json::from_str(stripped)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ValidationError::schema("$", format!("expected a JSON object, got {value}")))
    }
}

fn bounded_str(
    object: &Value,
    field: &'static str,
    min_chars: usize,
    max_chars: usize,
) -> Result<String, ValidationError> {
    let value = object
        .get(field)
        .ok_or_else(|| ValidationError::schema(field, "missing required field"))?;
    let text = value.as_str().ok_or_else(|| {
        ValidationError::schema(field, format!("expected string, got {value}"))
    })?;

    let length = text.chars().count();
    if length < min_chars {
        return Err(ValidationError::schema(
            field,
            format!("{length} chars is below the {min_chars}-char minimum"),
        ));
    }
    if length > max_chars {
        return Err(ValidationError::schema(
            field,
            format!("{length} chars exceeds the {max_chars}-char maximum"),
        ));
    }
    Ok(text.to_string())
}

/// The prompts demand bare JSON, but the few-shot examples show fenced
/// blocks and some models echo that framing back. Tolerate one surrounding
/// fence; anything else still has to parse as JSON.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.split_once('\n') {
        Some((_language_tag, body)) => body,
        None => rest,
    };
    body.trim().trim_end_matches("```").trim()
}
