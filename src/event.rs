//! Budget alert parsing.
//!
//! Cloud Billing publishes budget notifications to Pub/Sub. Depending on how
//! the message reaches us, the payload is one of:
//!
//! ```text
//! {"budgetDisplayName": "...", "costAmount": 12.3, ...}            plain body
//! eyJidWRnZXREaXNwbGF5TmFtZSI6...                                  base64 body
//! {"data": "<base64 body>", "attributes": {"budgetId": "..."}}     pubsub message
//! {"message": {"data": "...", "attributes": {...}}, "subscription"} pubsub push
//! ```
//!
//! The budget identifier usually lives in the message attributes, not in the
//! body, so both are consulted.

use crate::error::MalformedEventError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

/// A validated budget alert, one per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub budget_id: String,
    pub billing_account_id: Option<String>,
    pub budget_display_name: String,
    pub cost_amount: Decimal,
    pub budget_amount: Decimal,
    pub currency_code: Option<String>,
    /// Spend ratio that triggered the alert; may exceed 1.
    pub threshold_fraction: Decimal,
    pub cost_interval_start: Option<DateTime<FixedOffset>>,
}

impl AlertEvent {
    pub fn is_over_budget(&self) -> bool {
        self.threshold_fraction >= Decimal::ONE
    }
}

/// Decode and validate a raw inbound payload.
pub fn parse_event(raw: &[u8]) -> Result<AlertEvent, MalformedEventError> {
    let root = decode_json(raw)?;
    let mut root = into_object(root)?;

    // Pub/Sub push wraps the message one level deeper.
    if let Some(Value::Object(message)) = root.remove("message") {
        root = message;
    }

    let data = match root.get("data") {
        Some(Value::String(data)) => Some(data.clone()),
        _ => None,
    };

    let (body, attributes) = match data {
        Some(data) => {
            let body = into_object(decode_json(data.as_bytes())?)?;
            let attributes = match root.remove("attributes") {
                Some(Value::Object(attrs)) => attrs,
                _ => Map::new(),
            };
            (body, attributes)
        }
        None => (root, Map::new()),
    };

    build_event(&body, &attributes)
}

/// Accept either a JSON document or a base64-encoded one.
fn decode_json(raw: &[u8]) -> Result<Value, MalformedEventError> {
    let trimmed = raw.trim_ascii();
    if trimmed.is_empty() {
        return Err(MalformedEventError::Decode("empty payload".to_string()));
    }

    if trimmed[0] == b'{' {
        return serde_json::from_slice(trimmed)
            .map_err(|e| MalformedEventError::Decode(format!("invalid JSON: {}", e)));
    }

    let decoded = STANDARD
        .decode(trimmed)
        .map_err(|e| MalformedEventError::Decode(format!("invalid base64: {}", e)))?;
    let text = std::str::from_utf8(&decoded)
        .map_err(|e| MalformedEventError::Decode(format!("invalid UTF-8: {}", e)))?;
    serde_json::from_str(text)
        .map_err(|e| MalformedEventError::Decode(format!("invalid JSON: {}", e)))
}

fn into_object(value: Value) -> Result<Map<String, Value>, MalformedEventError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(MalformedEventError::Decode(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn build_event(
    body: &Map<String, Value>,
    attributes: &Map<String, Value>,
) -> Result<AlertEvent, MalformedEventError> {
    let budget_id = non_empty_str(attributes, "budgetId")
        .or_else(|| non_empty_str(body, "budgetId"))
        .ok_or(MalformedEventError::MissingField("budgetId"))?
        .to_string();

    let billing_account_id = non_empty_str(attributes, "billingAccountId")
        .or_else(|| non_empty_str(body, "billingAccountId"))
        .map(str::to_string);

    let cost_amount = required_decimal(body, "costAmount")?;
    let budget_amount = required_decimal(body, "budgetAmount")?;

    if budget_amount <= Decimal::ZERO {
        return Err(MalformedEventError::InvalidAmount {
            field: "budgetAmount",
            reason: format!("must be greater than zero, got {}", budget_amount),
        });
    }
    if cost_amount < Decimal::ZERO {
        return Err(MalformedEventError::InvalidAmount {
            field: "costAmount",
            reason: format!("must not be negative, got {}", cost_amount),
        });
    }

    let reported = match optional_decimal(body, "alertThresholdExceeded")? {
        Some(t) => Some(t),
        None => optional_decimal(body, "thresholdFraction")?,
    };
    let threshold_fraction = match reported {
        Some(t) if t < Decimal::ZERO => {
            return Err(MalformedEventError::InvalidAmount {
                field: "alertThresholdExceeded",
                reason: format!("must not be negative, got {}", t),
            });
        }
        Some(t) => t,
        None => cost_amount
            .checked_div(budget_amount)
            .ok_or_else(|| MalformedEventError::InvalidAmount {
                field: "budgetAmount",
                reason: "cannot derive threshold from amounts".to_string(),
            })?,
    };

    let cost_interval_start = match non_empty_str(body, "costIntervalStart") {
        Some(s) => Some(DateTime::parse_from_rfc3339(s).map_err(|e| {
            MalformedEventError::Decode(format!("invalid costIntervalStart '{}': {}", s, e))
        })?),
        None => None,
    };

    let budget_display_name = non_empty_str(body, "budgetDisplayName")
        .unwrap_or(&budget_id)
        .to_string();

    Ok(AlertEvent {
        budget_id,
        billing_account_id,
        budget_display_name,
        cost_amount,
        budget_amount,
        currency_code: non_empty_str(body, "currencyCode").map(str::to_string),
        threshold_fraction,
        cost_interval_start,
    })
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required_decimal(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Decimal, MalformedEventError> {
    optional_decimal(map, field)?.ok_or(MalformedEventError::MissingField(field))
}

/// Read a decimal from a JSON number or a numeric string.
fn optional_decimal(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<Decimal>, MalformedEventError> {
    let text = match map.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            return Err(MalformedEventError::NonNumeric {
                field,
                value: other.to_string(),
            });
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| MalformedEventError::NonNumeric { field, value: text })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn body() -> Value {
        json!({
            "budgetDisplayName": "prod-project",
            "alertThresholdExceeded": 0.5,
            "costAmount": 523.17,
            "costIntervalStart": "2026-10-01T07:00:00Z",
            "budgetAmount": 1000.0,
            "budgetAmountType": "SPECIFIED_AMOUNT",
            "currencyCode": "USD",
            "budgetId": "budget-123"
        })
    }

    fn pubsub_message(body: &Value) -> Value {
        json!({
            "data": STANDARD.encode(body.to_string()),
            "attributes": {
                "billingAccountId": "01D4EE-079462-DFD6EC",
                "budgetId": "attr-budget",
                "schemaVersion": "1.0"
            }
        })
    }

    #[test]
    fn parses_plain_json_body() {
        let event = parse_event(body().to_string().as_bytes()).unwrap();

        assert_eq!(event.budget_id, "budget-123");
        assert_eq!(event.billing_account_id, None);
        assert_eq!(event.budget_display_name, "prod-project");
        assert_eq!(event.cost_amount, d("523.17"));
        assert_eq!(event.budget_amount, d("1000.0"));
        assert_eq!(event.currency_code.as_deref(), Some("USD"));
        assert_eq!(event.threshold_fraction, d("0.5"));
        assert_eq!(
            event.cost_interval_start.unwrap().to_rfc3339(),
            "2026-10-01T07:00:00+00:00"
        );
    }

    #[test]
    fn parses_base64_body() {
        let encoded = STANDARD.encode(body().to_string());
        let event = parse_event(encoded.as_bytes()).unwrap();
        assert_eq!(event.budget_id, "budget-123");
    }

    #[test]
    fn attributes_take_precedence_over_body() {
        let message = pubsub_message(&body());
        let event = parse_event(message.to_string().as_bytes()).unwrap();

        assert_eq!(event.budget_id, "attr-budget");
        assert_eq!(
            event.billing_account_id.as_deref(),
            Some("01D4EE-079462-DFD6EC")
        );
    }

    #[test]
    fn parses_push_envelope() {
        let push = json!({
            "message": pubsub_message(&body()),
            "subscription": "projects/p/subscriptions/billing"
        });
        let event = parse_event(push.to_string().as_bytes()).unwrap();
        assert_eq!(event.budget_id, "attr-budget");
        assert_eq!(event.threshold_fraction, d("0.5"));
    }

    #[test]
    fn derives_threshold_when_not_reported() {
        let mut b = body();
        b.as_object_mut().unwrap().remove("alertThresholdExceeded");
        let event = parse_event(b.to_string().as_bytes()).unwrap();
        assert_eq!(event.threshold_fraction, d("0.52317"));
    }

    #[test]
    fn accepts_threshold_fraction_alias_and_string_amounts() {
        let payload = json!({
            "budgetId": "b",
            "costAmount": "1200",
            "budgetAmount": "1000",
            "thresholdFraction": "1.2"
        });
        let event = parse_event(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.threshold_fraction, d("1.2"));
        assert!(event.is_over_budget());
        assert_eq!(event.budget_display_name, "b");
        assert_eq!(event.currency_code, None);
    }

    #[test]
    fn rejects_missing_budget_amount() {
        let mut b = body();
        b.as_object_mut().unwrap().remove("budgetAmount");
        let err = parse_event(b.to_string().as_bytes()).unwrap_err();
        assert_eq!(err, MalformedEventError::MissingField("budgetAmount"));
    }

    #[test]
    fn rejects_zero_budget_amount() {
        let mut b = body();
        b["budgetAmount"] = json!(0);
        let err = parse_event(b.to_string().as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            MalformedEventError::InvalidAmount {
                field: "budgetAmount",
                ..
            }
        ));
    }

    #[test]
    fn rejects_missing_budget_id() {
        let mut b = body();
        b.as_object_mut().unwrap().remove("budgetId");
        let err = parse_event(b.to_string().as_bytes()).unwrap_err();
        assert_eq!(err, MalformedEventError::MissingField("budgetId"));
    }

    #[test]
    fn rejects_non_numeric_amounts() {
        let mut b = body();
        b["costAmount"] = json!("a lot");
        let err = parse_event(b.to_string().as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            MalformedEventError::NonNumeric {
                field: "costAmount",
                ..
            }
        ));

        let mut b = body();
        b["costAmount"] = json!([1, 2]);
        assert!(parse_event(b.to_string().as_bytes()).is_err());
    }

    #[test]
    fn rejects_negative_cost() {
        let mut b = body();
        b["costAmount"] = json!(-1);
        assert!(parse_event(b.to_string().as_bytes()).is_err());
    }

    #[test]
    fn rejects_structural_garbage() {
        assert!(matches!(
            parse_event(b""),
            Err(MalformedEventError::Decode(_))
        ));
        assert!(matches!(
            parse_event(b"{not json"),
            Err(MalformedEventError::Decode(_))
        ));
        assert!(matches!(
            parse_event(b"!!!not base64!!!"),
            Err(MalformedEventError::Decode(_))
        ));
        assert!(matches!(
            parse_event(STANDARD.encode("[1,2,3]").as_bytes()),
            Err(MalformedEventError::Decode(_))
        ));
    }

    #[test]
    fn rejects_bad_interval_timestamp() {
        let mut b = body();
        b["costIntervalStart"] = json!("yesterday");
        assert!(matches!(
            parse_event(b.to_string().as_bytes()),
            Err(MalformedEventError::Decode(_))
        ));
    }
}
