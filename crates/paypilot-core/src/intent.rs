//! Structured intents and the tolerant parser that produces them from raw
//! model output.
//!
//! The model is asked for a single JSON object but regularly wraps it in
//! prose or markdown fences, truncates it, or ignores the schema outright.
//! [`parse_reply`] never fails: anything it cannot validate becomes a
//! [`StructuredIntent::Message`] carrying the raw reply verbatim.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{AssistantError, Result};
use crate::locale::{FixedReply, Language};

pub const DEFAULT_CURRENCY: &str = "AZN";
pub const DEFAULT_CATEGORY: &str = "General";

/// A proposed payment awaiting user confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub merchant: String,
    pub category: String,
    /// Always strictly positive.
    pub amount: Decimal,
    pub currency: String,
    pub card_hint: Option<String>,
    pub confirmation_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructuredIntent {
    Message { text: String },
    Payment(PaymentIntent),
}

impl StructuredIntent {
    pub fn message(text: impl Into<String>) -> Self {
        StructuredIntent::Message { text: text.into() }
    }

    pub fn fixed(reply: FixedReply, lang: Language) -> Self {
        StructuredIntent::message(reply.text(lang))
    }

    pub fn is_payment(&self) -> bool {
        matches!(self, StructuredIntent::Payment(_))
    }
}

/// Turn a raw model reply into an intent. Never fails.
pub fn parse_reply(raw: &str) -> StructuredIntent {
    let trimmed = raw.trim();

    let Some(candidate) = extract_json_object(trimmed) else {
        return StructuredIntent::message(raw);
    };

    let decoded = serde_json::from_str::<Value>(candidate)
        .map_err(|e| AssistantError::MalformedResponse(e.to_string()))
        .and_then(|value| decode_intent(&value));

    match decoded {
        Ok(intent) => intent,
        Err(e) => {
            log::debug!("falling back to plain message: {e}");
            StructuredIntent::message(raw)
        }
    }
}

/// Slice from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Validate a decoded JSON value against the intent shape.
pub fn decode_intent(value: &Value) -> Result<StructuredIntent> {
    let kind = string_field(value, "type")
        .ok_or_else(|| AssistantError::MalformedResponse("missing type".into()))?;

    match kind.as_str() {
        "message" => {
            let text = value
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| AssistantError::MalformedResponse("message without text".into()))?;
            Ok(StructuredIntent::message(text))
        }
        "payment_request" => decode_payment(value).map(StructuredIntent::Payment),
        other => Err(AssistantError::MalformedResponse(format!(
            "unknown type {other:?}"
        ))),
    }
}

fn decode_payment(value: &Value) -> Result<PaymentIntent> {
    let merchant = string_field(value, "merchant")
        .ok_or_else(|| AssistantError::MalformedResponse("payment without merchant".into()))?;
    let amount = value
        .get("amount")
        .ok_or_else(|| AssistantError::MalformedResponse("payment without amount".into()))
        .and_then(parse_amount)?;

    Ok(PaymentIntent {
        merchant,
        category: string_field(value, "category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        amount,
        currency: string_field(value, "currency").unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        card_hint: string_field(value, "card_hint"),
        confirmation_text: value
            .get("confirmation_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Accepts JSON numbers and numeric strings ("12.5", "12,5"). The result
/// must be finite and strictly positive.
pub fn parse_amount(value: &Value) -> Result<Decimal> {
    let amount = match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .and_then(Decimal::from_f64),
        Value::String(s) => Decimal::from_str(&s.trim().replace(',', ".")).ok(),
        _ => None,
    }
    .ok_or_else(|| AssistantError::MalformedResponse(format!("unusable amount {value}")))?;

    if amount <= Decimal::ZERO {
        return Err(AssistantError::MalformedResponse(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(amount.normalize())
}

/// Non-blank trimmed string field.
fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
