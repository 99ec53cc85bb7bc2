use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::models::ExpenseInput;

/// Per-field validation messages, rendered as `{"field": ["message", ...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }
}

impl ExpenseInput {
    /// Check `description`, `date` and `amount` on a raw payload.
    ///
    /// Every field is checked so the caller sees all problems at once.
    pub fn from_payload(payload: &Value) -> Result<Self, FieldErrors> {
        let empty = Map::new();
        let fields = payload.as_object().unwrap_or(&empty);
        let mut errors = FieldErrors::default();

        let description = match present(fields, "description") {
            None => {
                errors.add("description", "Description is required");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.add("description", "The description must be a string.");
                None
            }
        };

        let date = match present(fields, "date") {
            None => {
                errors.add("date", "Date is required");
                None
            }
            Some(Value::String(s)) => {
                let parsed = parse_date(s);
                if parsed.is_none() {
                    errors.add("date", "The date is not a valid date.");
                }
                parsed
            }
            Some(_) => {
                errors.add("date", "The date is not a valid date.");
                None
            }
        };

        let amount = match present(fields, "amount") {
            None => {
                errors.add("amount", "amount is required");
                None
            }
            Some(value) => {
                let parsed = parse_amount(value);
                if parsed.is_none() {
                    errors.add("amount", "The amount must be a number.");
                }
                parsed
            }
        };

        match (description, date, amount) {
            (Some(description), Some(date), Some(amount)) if errors.is_empty() => Ok(Self {
                description,
                date,
                amount,
            }),
            _ => Err(errors),
        }
    }
}

/// A field counts as missing when absent, null, or a blank string
fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match fields.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some(value),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
