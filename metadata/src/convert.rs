use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use log::warn;
use thiserror::Error;

use crate::dictionary::DataType;
use crate::value::Value;

/// `strftime` formats tried, in order, for dates that are not ISO 8601.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %z",
    "%a, %d %b %y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
    "%a %b %d %H:%M:%S %z %Y",
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%d %B %Y",
];

/// Errors converting a value to a data type.
///
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The value cannot be represented as the data type.
    #[error("cannot convert '{value}' to {data_type}")]
    Invalid {
        /// The value, as text.
        value: String,
        /// The target data type.
        data_type: DataType,
    },

    /// The value is not of the form `protocol://identifier/id`.
    #[error("malformed node reference: '{0}'")]
    MalformedNodeRef(String),
}

/// Convert a value to a data type.
///
/// [`Value::Null`] stays null and lists are converted element by element. Dates given as text are parsed with the
/// default date formats; use [`DateParser`] directly for other formats.
///
/// # Arguments
///
/// * `data_type` - The data type to convert to.
/// * `value` - The value to convert.
///
/// # Returns
///
/// The converted value, or the reason it could not be converted.
///
pub fn convert(data_type: DataType, value: Value) -> Result<Value, ConversionError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::List(values) => values
            .into_iter()
            .map(|value| convert(data_type, value))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        value => convert_single(data_type, value),
    }
}

fn convert_single(data_type: DataType, value: Value) -> Result<Value, ConversionError> {
    let invalid = |value: &Value| ConversionError::Invalid {
        value: value.to_string(),
        data_type,
    };

    match data_type {
        DataType::Any => Ok(value),
        DataType::Text | DataType::MlText => Ok(Value::Text(value.to_string())),
        DataType::Long => to_long(&value).map(Value::Long).ok_or_else(|| invalid(&value)),
        DataType::Int => to_long(&value)
            .filter(|long| i32::try_from(*long).is_ok())
            .map(Value::Long)
            .ok_or_else(|| invalid(&value)),
        DataType::Float | DataType::Double => to_double(&value).map(Value::Double).ok_or_else(|| invalid(&value)),
        DataType::Boolean => match &value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            Value::Text(text) => Ok(Value::Boolean(text.trim().eq_ignore_ascii_case("true"))),
            _ => Err(invalid(&value)),
        },
        DataType::Date | DataType::DateTime => DateParser::default().make_date(value),
        DataType::NodeRef => match value {
            Value::Text(text) if is_node_ref(&text) => Ok(Value::Text(text)),
            value => Err(ConversionError::MalformedNodeRef(value.to_string())),
        },
    }
}

fn to_long(value: &Value) -> Option<i64> {
    match value {
        Value::Long(long) => Some(*long),
        Value::Double(double) if double.is_finite() => Some(double.trunc() as i64),
        Value::Text(text) => text.trim().parse().ok(),
        Value::Date(date) => Some(date.timestamp_millis()),
        _ => None,
    }
}

fn to_double(value: &Value) -> Option<f64> {
    match value {
        Value::Long(long) => Some(*long as f64),
        Value::Double(double) => Some(*double),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Whether the text is a node reference, `protocol://identifier/id`.
///
pub fn is_node_ref(text: &str) -> bool {
    match text.split_once("://") {
        Some((protocol, rest)) => match rest.split_once('/') {
            Some((identifier, id)) => {
                !protocol.is_empty() && !identifier.is_empty() && !id.is_empty() && !id.contains('/')
            }
            None => false,
        },
        None => false,
    }
}

/// Parses dates from text, trying ISO 8601 first and then a list of `strftime` formats.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParser {
    formats: Vec<String>,
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMATS.iter().map(|format| format.to_string()).collect())
    }
}

impl DateParser {
    /// Create a parser trying `formats` after ISO 8601.
    ///
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }

    /// The formats tried after ISO 8601.
    ///
    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    /// Convert a value to a date.
    ///
    /// Dates are returned unchanged, empty text becomes [`Value::Null`], and lists convert element by element.
    /// Numbers and booleans cannot be dates; they are logged and become [`Value::Null`].
    ///
    pub fn make_date(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Date(date) => Ok(Value::Date(date)),
            Value::Text(text) if text.trim().is_empty() => Ok(Value::Null),
            Value::Text(text) => self.parse(&text).map(Value::Date).ok_or(ConversionError::Invalid {
                value: text,
                data_type: DataType::DateTime,
            }),
            Value::List(values) => values
                .into_iter()
                .map(|value| self.make_date(value))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            value => {
                warn!("Date conversion of {} is not supported, using null", value);
                Ok(Value::Null)
            }
        }
    }

    /// Parse a date, or [`None`] if no format matches.
    ///
    /// Text in parentheses such as the ` (PDT)` in `Tue, 10 Oct 2023 09:30:00 -0700 (PDT)` is ignored by the
    /// `strftime` formats. Dates before the year 100 are treated as misparsed.
    ///
    pub fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        let text = text.trim();
        if let Some(date) = parse_iso8601(text) {
            return Some(date);
        }

        let text = strip_parenthesised(text);
        self.formats
            .iter()
            .filter_map(|format| parse_with_format(&text, format))
            .find(|date| date.year() >= 100)
    }
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|date| date.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.and_utc())
        })
}

fn parse_with_format(text: &str, format: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text, format)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, format)
                .ok()
                .map(|date| date.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|date| date.and_utc())
        })
}

fn strip_parenthesised(text: &str) -> String {
    match (text.find(" ("), text.rfind(')')) {
        (Some(start), Some(end)) if end > start => format!("{}{}", &text[..start], &text[end + 1..]),
        _ => text.to_string(),
    }
}
