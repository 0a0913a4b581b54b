use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value as JsonValue};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::property::DataType;

/// A runtime value bound to a placeholder or read from a cursor cell.
///
/// `List` stands for any collection or array argument and is expanded one
/// slot per element when bound. `Bytes` is a binary blob and always occupies
/// a single slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit integer (INTEGER, SHORT, BYTE).
    Int(i32),
    /// 64-bit integer (LONG).
    Long(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// Arbitrary precision decimal kept in its textual form.
    Decimal(String),
    /// Text.
    String(String),
    /// UUID.
    Uuid(Uuid),
    /// Point in time, UTC.
    Timestamp(DateTime<Utc>),
    /// Calendar date.
    Date(NaiveDate),
    /// Binary blob.
    Bytes(Vec<u8>),
    /// Collection or array argument.
    List(Vec<Self>),
    /// Object argument whose properties are addressed by nested bindings.
    Object(BTreeMap<String, Self>),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Number of elements for collection values, `None` for everything else.
    #[must_use]
    pub const fn len(&self) -> Option<usize> {
        match self {
            Self::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Reads a (possibly dotted) property path off an object value.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Self> {
        path.split('.').try_fold(self, |current, segment| match current {
            Self::Object(fields) => fields.get(segment),
            _ => None,
        })
    }

    /// Converts an entity property, as serialized by serde, into a value of
    /// the declared data type.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the JSON value does not fit the type.
    pub fn from_json(json: &JsonValue, data_type: DataType) -> Result<Self> {
        if json.is_null() {
            return Ok(Self::Null);
        }

        let mismatch = || Error::conversion(format!("expected {data_type:?} value, found {json}"));

        let value = match data_type {
            DataType::String | DataType::Character => {
                Self::String(json.as_str().ok_or_else(mismatch)?.to_string())
            }
            DataType::Long => Self::Long(json.as_i64().ok_or_else(mismatch)?),
            DataType::Integer | DataType::Short | DataType::Byte => {
                let raw = json.as_i64().ok_or_else(mismatch)?;
                Self::Int(i32::try_from(raw).map_err(|_e| mismatch())?)
            }
            DataType::Boolean => Self::Boolean(json.as_bool().ok_or_else(mismatch)?),
            DataType::Uuid => {
                let raw = json.as_str().ok_or_else(mismatch)?;
                Self::Uuid(Uuid::parse_str(raw).map_err(|_e| mismatch())?)
            }
            DataType::Timestamp => {
                Self::Timestamp(parse_timestamp(json.as_str().ok_or_else(mismatch)?)?)
            }
            DataType::Date => {
                let raw = json.as_str().ok_or_else(mismatch)?;
                Self::Date(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_e| mismatch())?)
            }
            DataType::BigDecimal => match json {
                JsonValue::Number(n) => Self::Decimal(n.to_string()),
                JsonValue::String(s) => Self::Decimal(s.clone()),
                _ => return Err(mismatch()),
            },
            #[allow(clippy::cast_possible_truncation)]
            DataType::Float => Self::Float(json.as_f64().ok_or_else(mismatch)? as f32),
            DataType::Double => Self::Double(json.as_f64().ok_or_else(mismatch)?),
            DataType::ByteArray => {
                let items = json.as_array().ok_or_else(mismatch)?;
                let bytes = items
                    .iter()
                    .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(mismatch)?;
                Self::Bytes(bytes)
            }
            DataType::Json => Self::String(json.to_string()),
            DataType::Entity | DataType::Object => Self::from_untyped(json),
        };
        Ok(value)
    }

    /// Structural conversion used when no data type is known.
    #[must_use]
    pub fn from_untyped(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Boolean(*b),
            JsonValue::Number(n) => n.as_i64().map_or_else(
                || Self::Double(n.as_f64().unwrap_or_default()),
                Self::Long,
            ),
            JsonValue::String(s) => Self::String(s.clone()),
            JsonValue::Array(items) => Self::List(items.iter().map(Self::from_untyped).collect()),
            JsonValue::Object(fields) => Self::Object(
                fields.iter().map(|(k, v)| (k.clone(), Self::from_untyped(v))).collect(),
            ),
        }
    }

    /// Converts a cursor cell into JSON shaped for a property of the given
    /// data type, so that serde can populate the caller's result type.
    ///
    /// # Errors
    ///
    /// Returns a conversion error for floating point values that are not
    /// representable in JSON.
    pub fn to_json(&self, data_type: DataType) -> Result<JsonValue> {
        let json = match (data_type, self) {
            (DataType::Boolean, Self::Int(v)) => JsonValue::Bool(*v != 0),
            (DataType::Boolean, Self::Long(v)) => JsonValue::Bool(*v != 0),
            (_, other) => other.to_untyped_json()?,
        };
        Ok(json)
    }

    /// Structural conversion into JSON.
    ///
    /// # Errors
    ///
    /// Returns a conversion error for non-finite floating point values.
    pub fn to_untyped_json(&self) -> Result<JsonValue> {
        let json = match self {
            Self::Null => JsonValue::Null,
            Self::Boolean(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::from(*v),
            Self::Long(v) => JsonValue::from(*v),
            Self::Float(v) => float_json(f64::from(*v))?,
            Self::Double(v) => float_json(*v)?,
            Self::Decimal(v) | Self::String(v) => JsonValue::String(v.clone()),
            Self::Uuid(v) => JsonValue::String(v.hyphenated().to_string()),
            Self::Timestamp(v) => serde_json::to_value(v)?,
            Self::Date(v) => JsonValue::String(v.format("%Y-%m-%d").to_string()),
            Self::Bytes(v) => JsonValue::Array(v.iter().map(|b| JsonValue::from(*b)).collect()),
            Self::List(items) => {
                JsonValue::Array(items.iter().map(Self::to_untyped_json).collect::<Result<_>>()?)
            }
            Self::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_untyped_json()?)))
                    .collect::<Result<_>>()?,
            ),
        };
        Ok(json)
    }
}

fn float_json(value: f64) -> Result<JsonValue> {
    Number::from_f64(value)
        .map(JsonValue::Number)
        .ok_or_else(|| Error::conversion(format!("{value} cannot be represented as JSON")))
}

/// Parses RFC 3339 or `%Y-%m-%d %H:%M:%S%.f` (assumed UTC) timestamps.
///
/// # Errors
///
/// Returns a conversion error for any other format.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc));
    }

    Err(Error::conversion(format!(
        "unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format"
    )))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}
