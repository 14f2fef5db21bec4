use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::qname::QName;

/// Properties keyed by their qualified names.
///
/// A key mapped to [`Value::Null`] is different to an absent key: it records that the property was seen without a value.
///
pub type PropertyMap = HashMap<QName, Value>;

/// Properties keyed by the names a document format uses for them.
///
pub type RawMetadata = HashMap<String, Value>;

/// A property value.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    Null,
    /// Whole numbers.
    Long(i64),
    /// Floating point numbers.
    Double(f64),
    /// Booleans.
    Boolean(bool),
    /// A point in time.
    Date(DateTime<Utc>),
    /// Text.
    Text(String),
    /// Multiple values.
    List(Vec<Value>),
}

impl Value {
    /// Whether this is [`Value::Null`].
    ///
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The text, if this is [`Value::Text`].
    ///
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Whether this is an empty [`Value::Text`].
    ///
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Value::Text(text) if text.is_empty())
    }

    /// Convert a JSON value. Objects are not property values and become their JSON text.
    ///
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(long) => Value::Long(long),
                None => n.as_f64().map(Value::Double).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(values) => Value::List(values.into_iter().map(Value::from_json).collect()),
            object @ serde_json::Value::Object(_) => Value::Text(object.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Long(long) => write!(f, "{}", long),
            Value::Double(double) => write!(f, "{}", double),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Date(date) => write!(f, "{}", date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Value::Text(text) => write!(f, "{}", text),
            Value::List(values) => {
                let values: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "[{}]", values.join(", "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i64> for Value {
    fn from(long: i64) -> Self {
        Value::Long(long)
    }
}

impl From<f64> for Value {
    fn from(double: f64) -> Self {
        Value::Double(double)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Add a raw value, normalising it on the way in.
///
/// Text is trimmed and stripped of NUL characters; empty text and empty lists are stored as [`Value::Null`].
/// The key is always inserted, so a property that was present without a value can still be cleared by a mapping.
///
/// # Arguments
///
/// * `key` - The raw property name.
/// * `value` - The value read from the document.
/// * `raw` - The raw metadata to add to.
///
pub fn put_raw_value(key: impl Into<String>, value: impl Into<Value>, raw: &mut RawMetadata) {
    raw.insert(key.into(), normalise(value.into()));
}

fn normalise(value: Value) -> Value {
    match value {
        Value::Text(text) => {
            let text = text.replace('\u{0}', "");
            let text = text.trim();
            if text.is_empty() {
                Value::Null
            } else {
                Value::Text(text.to_string())
            }
        }
        Value::List(values) if values.is_empty() => Value::Null,
        Value::List(values) => Value::List(
            values
                .into_iter()
                .map(normalise)
                .collect(),
        ),
        value => value,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_put_raw_value() {
        let mut raw = RawMetadata::new();

        put_raw_value("title", "  Espresso\u{0} Guide ", &mut raw);
        put_raw_value("subject", "   ", &mut raw);
        put_raw_value("keywords", Vec::<String>::new(), &mut raw);
        put_raw_value("pages", 3_i64, &mut raw);
        put_raw_value("missing", Option::<String>::None, &mut raw);

        assert_eq!(raw["title"], Value::from("Espresso Guide"));
        assert_eq!(raw["subject"], Value::Null);
        assert_eq!(raw["keywords"], Value::Null);
        assert_eq!(raw["pages"], Value::Long(3));
        assert_eq!(raw["missing"], Value::Null);
        assert_eq!(raw.len(), 5);
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});

        let value = Value::from_json(json["a"].clone());

        assert_eq!(
            value,
            Value::List(vec![
                Value::Long(1),
                Value::Double(2.5),
                Value::from("x"),
                Value::Null,
                Value::Boolean(true),
            ])
        );
        assert_eq!(Value::from_json(json.clone()), Value::Text(json.to_string()));
    }

    #[test]
    fn test_display() {
        let date = Utc.with_ymd_and_hms(2023, 10, 10, 16, 30, 0).unwrap();

        assert_eq!(Value::Date(date).to_string(), "2023-10-10T16:30:00.000Z");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "[a, b]");
        assert_eq!(Value::Null.to_string(), "");
    }
}
