//! # Typed user values
//!
//! Wire values are plain JSON, but a deserialized value is richer: a
//! `date-time` string becomes a real timestamp, a `byte` string becomes
//! decoded binary. [`TypedValue`] is the currency of the schema runtime:
//! plain scalars stay JSON, containers recurse, and format codecs produce
//! the typed variants.
//!
//! [`WrappedValue`] is the opaque wrapper for values produced by a
//! registered constructor of a user-defined data type format. The wrapper
//! carries the constructor name so that `formalize` can decide whether an
//! instance survives conversion to a plain tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};

use base64::Engine;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde_json::Value;

//////////////////////////////////////////// TypedValue ////////////////////////////////////////////

/// A user value as seen by the schema runtime.
///
/// `Plain` holds JSON scalars (`null`, booleans, numbers, strings);
/// containers use the `Array` and `Object` variants so that typed leaves
/// can appear at any depth. The typed variants are what format codecs
/// produce and consume.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Plain(Value),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Bytes(Vec<u8>),
    Array(Vec<TypedValue>),
    Object(BTreeMap<String, TypedValue>),
    Wrapped(WrappedValue),
}

/// A value produced by a known constructor.
///
/// The wrapper is opaque to the runtime except for the constructor name;
/// [`extract_value`](TypedValue::extract_value) unwraps it and
/// [`formalize`](TypedValue::formalize) consults the registered
/// constructor set to decide whether to preserve it.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedValue {
    pub constructor: String,
    pub value: Box<TypedValue>,
}

impl TypedValue {
    /// Builds a typed value from plain JSON, canonicalizing containers
    /// into the `Array`/`Object` variants.
    pub fn from_json(value: &Value) -> TypedValue {
        match value {
            Value::Array(items) => {
                TypedValue::Array(items.iter().map(TypedValue::from_json).collect())
            }
            Value::Object(map) => TypedValue::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), TypedValue::from_json(item)))
                    .collect(),
            ),
            scalar => TypedValue::Plain(scalar.clone()),
        }
    }

    /// Renders the value back into plain JSON.
    ///
    /// Typed leaves use their transport representation: dates as ISO-8601,
    /// timestamps as RFC 3339, bytes as base64. Wrappers render their
    /// payload.
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::Plain(value) => value.clone(),
            TypedValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            TypedValue::DateTime(at) => {
                Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            }
            TypedValue::Bytes(bytes) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            TypedValue::Array(items) => Value::Array(items.iter().map(TypedValue::to_json).collect()),
            TypedValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), item.to_json()))
                    .collect(),
            ),
            TypedValue::Wrapped(wrapped) => wrapped.value.to_json(),
        }
    }

    /// The type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            TypedValue::Plain(Value::Null) => "null",
            TypedValue::Plain(Value::Bool(_)) => "boolean",
            TypedValue::Plain(Value::Number(_)) => "number",
            TypedValue::Plain(Value::String(_)) => "string",
            TypedValue::Plain(Value::Array(_)) | TypedValue::Array(_) => "array",
            TypedValue::Plain(Value::Object(_)) | TypedValue::Object(_) => "object",
            TypedValue::Date(_) => "date",
            TypedValue::DateTime(_) => "date-time",
            TypedValue::Bytes(_) => "binary",
            TypedValue::Wrapped(wrapped) => &wrapped.constructor,
        }
    }

    /// True for JSON `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Plain(Value::Null))
    }

    /// Numeric view of the value, used by bound and multiple checks.
    ///
    /// Dates count days from the common era; timestamps count epoch
    /// milliseconds, so ordering comparisons work across the typed leaves.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            TypedValue::Plain(Value::Number(n)) => n.as_f64(),
            TypedValue::Date(date) => Some(f64::from(date.num_days_from_ce())),
            TypedValue::DateTime(at) => Some(at.timestamp_millis() as f64),
            TypedValue::Wrapped(wrapped) => wrapped.value.numeric(),
            _ => None,
        }
    }

    /// Recursively unwraps [`WrappedValue`] layers, keeping typed leaves.
    pub fn extract_value(self) -> TypedValue {
        match self {
            TypedValue::Wrapped(wrapped) => wrapped.value.extract_value(),
            TypedValue::Array(items) => {
                TypedValue::Array(items.into_iter().map(TypedValue::extract_value).collect())
            }
            TypedValue::Object(map) => TypedValue::Object(
                map.into_iter()
                    .map(|(key, item)| (key, item.extract_value()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Converts non-plain values into plain trees while preserving
    /// instances whose constructor appears in `constructors`.
    ///
    /// The built-in date, date-time, and binary leaves are always
    /// preserved. The conversion is idempotent on plain trees.
    pub fn formalize(&self, constructors: &BTreeSet<String>) -> TypedValue {
        match self {
            TypedValue::Wrapped(wrapped) => {
                if constructors.contains(&wrapped.constructor) {
                    TypedValue::Wrapped(WrappedValue {
                        constructor: wrapped.constructor.clone(),
                        value: Box::new(wrapped.value.formalize(constructors)),
                    })
                } else {
                    TypedValue::from_json(&wrapped.value.to_json())
                }
            }
            TypedValue::Array(items) => TypedValue::Array(
                items
                    .iter()
                    .map(|item| item.formalize(constructors))
                    .collect(),
            ),
            TypedValue::Object(map) => TypedValue::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), item.formalize(constructors)))
                    .collect(),
            ),
            TypedValue::Plain(value) => TypedValue::from_json(value),
            other => other.clone(),
        }
    }
}

impl Display for TypedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_json())
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        TypedValue::from_json(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constructors(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn from_json_canonicalizes_containers() {
        let value = TypedValue::from_json(&json!({"a": [1, "x"]}));
        match &value {
            TypedValue::Object(map) => assert!(matches!(map["a"], TypedValue::Array(_))),
            other => panic!("expected object, got {:?}", other),
        }
        assert_eq!(value.to_json(), json!({"a": [1, "x"]}));
    }

    #[test]
    fn date_renders_iso() {
        let date = TypedValue::Date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        assert_eq!(date.to_json(), json!("2000-01-01"));
        assert_eq!(date.type_name(), "date");
    }

    #[test]
    fn bytes_render_base64() {
        let bytes = TypedValue::Bytes(b"hello".to_vec());
        assert_eq!(bytes.to_json(), json!("aGVsbG8="));
    }

    #[test]
    fn numeric_orders_dates() {
        let early = TypedValue::Date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        let late = TypedValue::Date(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
        assert!(early.numeric().unwrap() < late.numeric().unwrap());
    }

    #[test]
    fn extract_value_unwraps_nested_wrappers() {
        let wrapped = TypedValue::Wrapped(WrappedValue {
            constructor: "Decimal".to_string(),
            value: Box::new(TypedValue::Wrapped(WrappedValue {
                constructor: "Inner".to_string(),
                value: Box::new(TypedValue::Plain(json!(1.5))),
            })),
        });
        assert_eq!(wrapped.extract_value(), TypedValue::Plain(json!(1.5)));
    }

    #[test]
    fn formalize_preserves_registered_constructors() {
        let wrapped = TypedValue::Wrapped(WrappedValue {
            constructor: "Decimal".to_string(),
            value: Box::new(TypedValue::Plain(json!("1.50"))),
        });
        let kept = wrapped.formalize(&constructors(&["Decimal"]));
        assert!(matches!(kept, TypedValue::Wrapped(_)));

        let dropped = wrapped.formalize(&constructors(&[]));
        assert_eq!(dropped, TypedValue::Plain(json!("1.50")));
    }

    #[test]
    fn formalize_is_idempotent_on_plain_trees() {
        let value = TypedValue::from_json(&json!({"a": [1, 2], "b": {"c": true}}));
        let set = constructors(&[]);
        let once = value.formalize(&set);
        let twice = once.formalize(&set);
        assert_eq!(once, twice);
        assert_eq!(once, value);
    }
}
