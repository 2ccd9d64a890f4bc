//! Declared value types for fields and template parameters, with the
//! coercion rules shared by the extractor, validator and executor.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Date formats accepted for `date` parameters, tried in order.
pub const ACCEPTED_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%B %d %Y",
    "%b %d %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

static ORDINAL_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d)(st|nd|rd|th)\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    #[serde(alias = "integer")]
    Int,
    #[serde(alias = "decimal", alias = "number")]
    Float,
    #[serde(alias = "datetime")]
    Date,
    #[serde(alias = "boolean")]
    Bool,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Date => "date",
            ValueType::Bool => "bool",
        }
    }

    /// Parse raw extracted text into this type. Returns `None` if the text
    /// cannot represent a value of this type.
    pub fn parse_text(&self, raw: &str) -> Option<Value> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }
        match self {
            ValueType::String => Some(Value::String(strip_matching_quotes(text).to_string())),
            ValueType::Int => {
                let clean = text.replace([',', '$'], "");
                clean.parse::<i64>().ok().map(|n| Value::Number(n.into()))
            }
            ValueType::Float => {
                let clean = text.replace([',', '$'], "");
                clean
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
            }
            ValueType::Date => {
                parse_date(text).map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            }
            ValueType::Bool => match text.to_lowercase().as_str() {
                "true" | "yes" | "1" | "active" | "enabled" => Some(Value::Bool(true)),
                "false" | "no" | "0" | "inactive" | "disabled" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }

    /// Coerce an already-typed JSON value to this type, without widening
    /// beyond the declared type.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => None,
            (ValueType::String, Value::String(s)) => Some(Value::String(s.clone())),
            (ValueType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ValueType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ValueType::Int, Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Number(i.into()))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| Value::Number((f as i64).into()))
                }
            }
            (ValueType::Float, Value::Number(n)) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            (ValueType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (_, Value::String(s)) => self.parse_text(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a date in any of the accepted formats (or RFC 3339).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    let cleaned = ORDINAL_SUFFIX.replace_all(text, "$1");
    let without_commas = cleaned.replace(',', "");
    for fmt in ACCEPTED_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, fmt) {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(&without_commas, fmt) {
            return Some(date);
        }
    }
    None
}

fn strip_matching_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && (bytes[0] == b'"' || bytes[0] == b'\'')
    {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_int_strips_separators() {
        assert_eq!(ValueType::Int.parse_text("1,250"), Some(json!(1250)));
        assert_eq!(ValueType::Int.parse_text("$40"), Some(json!(40)));
        assert_eq!(ValueType::Int.parse_text("12a"), None);
    }

    #[test]
    fn test_parse_string_keeps_digits() {
        assert_eq!(ValueType::String.parse_text("123456"), Some(json!("123456")));
        assert_eq!(ValueType::String.parse_text("'Jane Doe'"), Some(json!("Jane Doe")));
    }

    #[test]
    fn test_parse_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(parse_date("2024-03-05"), Some(expected));
        assert_eq!(parse_date("03/05/2024"), Some(expected));
        assert_eq!(parse_date("March 5th, 2024"), Some(expected));
        assert_eq!(parse_date("Mar 5 2024"), Some(expected));
        assert_eq!(parse_date("2024-03-05T10:00:00Z"), Some(expected));
        assert_eq!(parse_date("next tuesday"), None);
    }

    #[test]
    fn test_coerce_does_not_widen() {
        assert_eq!(ValueType::Int.coerce(&json!(3.5)), None);
        assert_eq!(ValueType::Int.coerce(&json!("42")), Some(json!(42)));
        assert_eq!(ValueType::Bool.coerce(&json!("maybe")), None);
        assert_eq!(ValueType::String.coerce(&json!("A123")), Some(json!("A123")));
    }
}
