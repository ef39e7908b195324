//! Type Coercion
//!
//! Form payloads arrive as loosely typed JSON: numbers typed into text
//! inputs come through as strings, checkboxes as "on"/"off". Coercion
//! accepts those spellings and produces the canonical JSON value.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::shape::FieldType;

const DATE_FORMAT: &str = "%Y-%m-%d";
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// A parsed calendar value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateValue {
    /// `2024-01-10`
    Date(NaiveDate),
    /// `2024-01-10T08:30`, no offset
    Local(NaiveDateTime),
    /// RFC 3339 with offset
    Zoned(DateTime<FixedOffset>),
}

impl DateValue {
    /// Instant used for ordering; dates sort at midnight, zoned values in UTC
    pub fn sort_key(&self) -> NaiveDateTime {
        match self {
            DateValue::Date(d) => d.and_time(chrono::NaiveTime::MIN),
            DateValue::Local(dt) => *dt,
            DateValue::Zoned(dt) => dt.naive_utc(),
        }
    }

    pub fn to_json(&self) -> Value {
        let text = match self {
            DateValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            DateValue::Local(dt) => dt.format(LOCAL_DATETIME_FORMATS[0]).to_string(),
            DateValue::Zoned(dt) => dt.to_rfc3339(),
        };
        Value::String(text)
    }
}

impl PartialOrd for DateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.sort_key().partial_cmp(&other.sort_key())
    }
}

/// Parse a date or date-time string
pub fn parse_date(text: &str) -> Option<DateValue> {
    let text = text.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Some(DateValue::Date(date));
    }
    if let Ok(zoned) = DateTime::parse_from_rfc3339(text) {
        return Some(DateValue::Zoned(zoned));
    }
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(DateValue::Local)
}

/// Read a number from a JSON number or a numeric string
pub fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Read a boolean from a JSON bool or a checkbox-style string
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// JSON number for an f64, integral values as integers
pub fn number_value(number: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Human form of a number bound: `0`, `0.5`, `100000000`
pub fn format_number(number: f64) -> String {
    match number_value(number) {
        Value::Null => number.to_string(),
        value => value.to_string(),
    }
}

/// Coerce a raw value to the declared type, `None` on mismatch
pub fn coerce(field_type: FieldType, value: &Value) -> Option<Value> {
    match field_type {
        FieldType::String => value.is_string().then(|| value.clone()),
        FieldType::Number => as_number(value).map(number_value),
        FieldType::Boolean => as_bool(value).map(Value::Bool),
        FieldType::Date => value.as_str().and_then(parse_date).map(|d| d.to_json()),
        FieldType::Object => value.is_object().then(|| value.clone()),
        FieldType::Array => value.is_array().then(|| value.clone()),
    }
}

/// Order two normalized values of the same scalar type
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => parse_date(a)?.partial_cmp(&parse_date(b)?),
        _ => None,
    }
}
