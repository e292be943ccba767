//! Field values stored in documents.
//!
//! The persisted JSON form is tagged per kind (`{"integerValue": 5}`), which
//! keeps kinds distinct on disk and lets a JSONB backend compare values of the
//! same kind with plain operators. Timestamps are written with a fixed
//! microsecond width so lexicographic order is chronological order.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Field name → value map of one document.
pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    #[serde(rename = "nullValue")]
    Null,
    #[serde(rename = "booleanValue")]
    Boolean(bool),
    #[serde(rename = "integerValue")]
    Integer(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "timestampValue", with = "timestamp_format")]
    Timestamp(DateTime<Utc>),
    #[serde(rename = "arrayValue")]
    Array(Vec<FieldValue>),
    #[serde(rename = "mapValue")]
    Map(Fields),
}

/// Kind of a value, used to restrict ordering comparisons to like kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Timestamp,
    Array,
    Map,
}

impl ValueKind {
    /// Tag key(s) of the persisted JSON encoding for this kind.
    pub fn tags(self) -> &'static [&'static str] {
        match self {
            ValueKind::Null => &[],
            ValueKind::Boolean => &["booleanValue"],
            ValueKind::Number => &["integerValue", "doubleValue"],
            ValueKind::String => &["stringValue"],
            ValueKind::Timestamp => &["timestampValue"],
            ValueKind::Array => &["arrayValue"],
            ValueKind::Map => &["mapValue"],
        }
    }
}

impl FieldValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Null => ValueKind::Null,
            FieldValue::Boolean(_) => ValueKind::Boolean,
            FieldValue::Integer(_) | FieldValue::Double(_) => ValueKind::Number,
            FieldValue::String(_) => ValueKind::String,
            FieldValue::Timestamp(_) => ValueKind::Timestamp,
            FieldValue::Array(_) => ValueKind::Array,
            FieldValue::Map(_) => ValueKind::Map,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view; doubles with no fractional part are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Compare two values the way the store's filters do.
    ///
    /// Only values of the same kind are ordered (integers and doubles compare
    /// numerically with each other). Arrays and maps only support equality.
    /// Returns `None` when the values are not comparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Double(a), Double(b)) => a.partial_cmp(b),
            (Integer(a), Double(b)) => (*a as f64).partial_cmp(b),
            (Double(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Array(_), Array(_)) | (Map(_), Map(_)) if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        FieldValue::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<Fields> for FieldValue {
    fn from(value: Fields) -> Self {
        FieldValue::Map(value)
    }
}

mod timestamp_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ordering_is_limited_to_like_kinds() {
        let five = FieldValue::from(5i64);
        assert_eq!(five.compare(&FieldValue::from(7i64)), Some(Ordering::Less));
        assert_eq!(five.compare(&FieldValue::from(5.0)), Some(Ordering::Equal));
        assert_eq!(five.compare(&FieldValue::from("5")), None);
        assert_eq!(FieldValue::from(true).compare(&FieldValue::Null), None);
    }

    #[test]
    fn timestamps_encode_with_fixed_width() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let json = serde_json::to_value(FieldValue::from(t)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"timestampValue": "2024-03-01T12:00:00.000000Z"})
        );

        let back: FieldValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, FieldValue::Timestamp(t));
    }

    #[test]
    fn document_fields_round_trip_through_json() {
        let mut fields = Fields::new();
        fields.insert("penaltyPoints".into(), 5i64.into());
        fields.insert("assignedMembers".into(), vec!["m1", "m2"].into());
        fields.insert("penaltyApplied".into(), false.into());
        fields.insert("reviewerId".into(), FieldValue::Null);

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["penaltyPoints"], serde_json::json!({"integerValue": 5}));

        let back: Fields = serde_json::from_value(json).unwrap();
        assert_eq!(back, fields);
    }

    #[test]
    fn integral_doubles_read_as_integers() {
        assert_eq!(FieldValue::from(3.0).as_i64(), Some(3));
        assert_eq!(FieldValue::from(2.5).as_i64(), None);
    }
}
