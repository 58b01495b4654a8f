//! Stored and view-level values.
//!
//! [`Value`] is what travels to and from the database client: a plain scalar.
//! [`FieldValue`] is what entities hold after a [`FieldType`](crate::FieldType)
//! has transformed the stored scalar.

use crate::error::{QuarryError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stored scalar, as bound into statements and read back from rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the text payload, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of the value where one exists without loss of meaning.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A view-level value held by an entity field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
    Set(Vec<String>),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Short name of the variant, used in conversion error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Text(_) => "text",
            FieldValue::Date(_) => "date",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Json(_) => "json",
            FieldValue::Set(_) => "set",
        }
    }

    /// JSON rendering used by the JSON-carrying transformers.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            FieldValue::Null => Json::Null,
            FieldValue::Bool(b) => Json::Bool(*b),
            FieldValue::Int(i) => Json::from(*i),
            FieldValue::Float(x) => serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number),
            FieldValue::Text(s) => Json::String(s.clone()),
            FieldValue::Date(d) => Json::String(d.format(crate::types::DATE_FORMAT).to_string()),
            FieldValue::Timestamp(t) => {
                Json::String(t.format(crate::types::TIMESTAMP_FORMAT).to_string())
            }
            FieldValue::Json(j) => j.clone(),
            FieldValue::Set(items) => Json::Array(items.iter().cloned().map(Json::String).collect()),
        }
    }

    /// Inverse of [`to_json`](Self::to_json) for values that lost their type
    /// on the way through JSON: scalars map to their scalar variant and a
    /// list of strings to `Set`. Anything else stays `Json`.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => FieldValue::Null,
            Json::Bool(b) => FieldValue::Bool(b),
            Json::String(s) => FieldValue::Text(s),
            Json::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => FieldValue::Int(i),
                (None, Some(x)) => FieldValue::Float(x),
                (None, None) => FieldValue::Json(Json::Number(n)),
            },
            Json::Array(items) if items.iter().all(Json::is_string) => FieldValue::Set(
                items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect(),
            ),
            other => FieldValue::Json(other),
        }
    }
}

/// Conversion from an entity field into a [`FieldValue`].
pub trait ToFieldValue {
    fn to_field_value(&self) -> FieldValue;
}

/// Conversion from a [`FieldValue`] into an entity field.
pub trait FromFieldValue: Sized {
    fn from_field_value(value: FieldValue) -> Result<Self>;
}

fn mismatch<T>(expected: &str, got: &FieldValue) -> Result<T> {
    Err(QuarryError::conversion(format!(
        "expected {expected} value, got {}",
        got.kind()
    )))
}

macro_rules! field_value_conversions {
    ($($ty:ty => $variant:ident, $expected:literal;)+) => {
        $(
            impl ToFieldValue for $ty {
                fn to_field_value(&self) -> FieldValue {
                    FieldValue::$variant(self.clone())
                }
            }

            impl FromFieldValue for $ty {
                fn from_field_value(value: FieldValue) -> Result<Self> {
                    match value {
                        FieldValue::$variant(v) => Ok(v),
                        other => mismatch($expected, &other),
                    }
                }
            }
        )+
    };
}

field_value_conversions! {
    bool => Bool, "bool";
    i64 => Int, "int";
    f64 => Float, "float";
    String => Text, "text";
    NaiveDate => Date, "date";
    NaiveDateTime => Timestamp, "timestamp";
    serde_json::Value => Json, "json";
    Vec<String> => Set, "set";
}

impl ToFieldValue for i32 {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Int(i64::from(*self))
    }
}

impl FromFieldValue for i32 {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Int(v) => i32::try_from(v)
                .map_err(|_| QuarryError::conversion(format!("{v} does not fit in i32"))),
            other => mismatch("int", &other),
        }
    }
}

impl<T: ToFieldValue> ToFieldValue for Option<T> {
    fn to_field_value(&self) -> FieldValue {
        self.as_ref().map_or(FieldValue::Null, ToFieldValue::to_field_value)
    }
}

impl<T: FromFieldValue> FromFieldValue for Option<T> {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}
