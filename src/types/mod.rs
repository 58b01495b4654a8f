//! Field transformers.
//!
//! A [`FieldType`] converts one column between its stored scalar ([`Value`]) and
//! its view representation ([`FieldValue`]). Both directions are pure functions of
//! `(value, options)` and map null to null; the ciphered type additionally
//! requires a cipher key in [`TransformOptions`] before it looks at the value.

pub mod cipher;

use crate::error::{QuarryError, Result};
use crate::value::{FieldValue, Value};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Stored format of [`FieldType::Date`] columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Stored format of [`FieldType::Timestamp`] columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Side inputs handed to every transformer call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub cipher_key: Option<String>,
}

impl TransformOptions {
    pub fn with_cipher_key(key: impl Into<String>) -> Self {
        Self {
            cipher_key: Some(key.into()),
        }
    }

    /// The configured key, rejecting absent and empty keys alike.
    pub(crate) fn require_cipher_key(&self) -> Result<&str> {
        match self.cipher_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(QuarryError::configuration("Empty cipher key")),
        }
    }
}

/// Transformer attached to a field in [`EntityMetadata`](crate::EntityMetadata).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Identity mapping for untyped columns (text, floats).
    Plain,
    Bool,
    Int,
    /// Day precision, stored as `YYYY-MM-DD`.
    Date,
    /// Second precision, stored as `YYYY-MM-DD HH:MM:SS`.
    Timestamp,
    Json,
    /// Comma-joined list of strings.
    Set,
    /// AES-128-CBC + HMAC-SHA-256, base64 wrapped. The view value is
    /// JSON encoded before encryption and decoded back to its scalar form.
    Ciphered,
}

impl FieldType {
    /// Stored scalar -> view value.
    pub fn to_view(self, stored: &Value, options: &TransformOptions) -> Result<FieldValue> {
        if self == FieldType::Ciphered {
            options.require_cipher_key()?;
        }
        if stored.is_null() {
            return Ok(FieldValue::Null);
        }

        match self {
            FieldType::Plain => Ok(match stored {
                Value::Null => FieldValue::Null,
                Value::Bool(b) => FieldValue::Bool(*b),
                Value::Int(i) => FieldValue::Int(*i),
                Value::Float(x) => FieldValue::Float(*x),
                Value::Text(s) => FieldValue::Text(s.clone()),
            }),
            FieldType::Bool => match stored {
                Value::Bool(b) => Ok(FieldValue::Bool(*b)),
                Value::Int(i) => Ok(FieldValue::Bool(*i != 0)),
                Value::Float(x) => Ok(FieldValue::Bool(*x != 0.0)),
                Value::Text(s) => Ok(FieldValue::Bool(!(s.is_empty() || s == "0"))),
                Value::Null => Ok(FieldValue::Null),
            },
            FieldType::Int => match stored {
                Value::Int(i) => Ok(FieldValue::Int(*i)),
                Value::Bool(b) => Ok(FieldValue::Int(i64::from(*b))),
                #[allow(clippy::cast_possible_truncation)]
                Value::Float(x) => Ok(FieldValue::Int(x.trunc() as i64)),
                Value::Text(s) => s
                    .trim()
                    .parse()
                    .map(FieldValue::Int)
                    .map_err(|_| QuarryError::conversion(format!("'{s}' is not an integer"))),
                Value::Null => Ok(FieldValue::Null),
            },
            FieldType::Date => {
                let text = stored_text(stored, "date")?;
                if text.is_empty() {
                    return Ok(FieldValue::Null);
                }
                parse_date(text).map(FieldValue::Date)
            }
            FieldType::Timestamp => {
                let text = stored_text(stored, "timestamp")?;
                if text.is_empty() {
                    return Ok(FieldValue::Null);
                }
                parse_timestamp(text).map(FieldValue::Timestamp)
            }
            FieldType::Json => {
                let text = stored_text(stored, "json")?;
                serde_json::from_str(text)
                    .map(FieldValue::Json)
                    .map_err(|e| QuarryError::conversion(format!("invalid JSON column: {e}")))
            }
            FieldType::Set => {
                let text = stored_text(stored, "set")?;
                if text.is_empty() {
                    return Ok(FieldValue::Set(Vec::new()));
                }
                Ok(FieldValue::Set(text.split(',').map(str::to_owned).collect()))
            }
            FieldType::Ciphered => {
                let key = options.require_cipher_key()?;
                let text = stored_text(stored, "ciphered")?;
                cipher::decrypt(text, key).map(FieldValue::from_json)
            }
        }
    }

    /// View value -> stored scalar.
    pub fn to_store(self, view: &FieldValue, options: &TransformOptions) -> Result<Value> {
        if self == FieldType::Ciphered {
            options.require_cipher_key()?;
        }
        if view.is_null() {
            return Ok(Value::Null);
        }

        match (self, view) {
            (FieldType::Plain, FieldValue::Bool(b)) => Ok(Value::Bool(*b)),
            (FieldType::Plain, FieldValue::Int(i)) => Ok(Value::Int(*i)),
            (FieldType::Plain, FieldValue::Float(x)) => Ok(Value::Float(*x)),
            (FieldType::Plain, FieldValue::Text(s)) => Ok(Value::Text(s.clone())),

            (FieldType::Bool, FieldValue::Bool(b)) => Ok(Value::Int(i64::from(*b))),
            (FieldType::Bool, FieldValue::Int(i)) => Ok(Value::Int(i64::from(*i != 0))),

            (FieldType::Int, FieldValue::Int(i)) => Ok(Value::Int(*i)),
            (FieldType::Int, FieldValue::Bool(b)) => Ok(Value::Int(i64::from(*b))),

            (FieldType::Date, FieldValue::Date(d)) => {
                Ok(Value::Text(d.format(DATE_FORMAT).to_string()))
            }
            (FieldType::Date, FieldValue::Timestamp(t)) => {
                Ok(Value::Text(t.date().format(DATE_FORMAT).to_string()))
            }
            (FieldType::Timestamp, FieldValue::Timestamp(t)) => {
                Ok(Value::Text(t.format(TIMESTAMP_FORMAT).to_string()))
            }

            (FieldType::Json, value) => serde_json::to_string(&value.to_json())
                .map(Value::Text)
                .map_err(|e| QuarryError::conversion(format!("cannot encode JSON: {e}"))),

            (FieldType::Set, FieldValue::Set(items)) => Ok(Value::Text(items.join(","))),

            (FieldType::Ciphered, value) => {
                let key = options.require_cipher_key()?;
                cipher::encrypt(&value.to_json(), key).map(Value::Text)
            }

            (ty, value) => Err(QuarryError::conversion(format!(
                "{ty:?} field cannot store a {} value",
                value.kind()
            ))),
        }
    }
}

fn stored_text<'a>(stored: &'a Value, ty: &str) -> Result<&'a str> {
    stored.as_str().ok_or_else(|| {
        QuarryError::conversion(format!("{ty} column must be stored as text, got {stored:?}"))
    })
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    // DATETIME values read through a date field keep only the day part.
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, DATE_FORMAT)
        .map_err(|e| QuarryError::conversion(format!("invalid date '{text}': {e}")))
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|ts| ts.with_nanosecond(0).unwrap_or(ts))
        .ok_or_else(|| QuarryError::conversion(format!("invalid timestamp '{text}'")))
}
