//! # Data type format registry
//!
//! Every root enforcer carries a mutable table mapping `(type, format)`
//! pairs to codecs: how to deserialize a wire scalar into a typed value,
//! how to serialize it back, how to validate it, and optionally how to
//! generate a random instance. The standard OpenAPI formats (`date`,
//! `date-time`, `byte`, `binary`, `password`, `int32`, `int64`) are
//! installed up front; callers register their own with
//! [`DataTypes::define`].
//!
//! Constructors named by registered definitions feed a process-wide set
//! consulted by `formalize` to decide which wrapped instances survive
//! conversion to plain trees.
//!
//! ## Usage Examples
//!
//! ```rust
//! use oas_enforcer::{DataTypes, TypedValue};
//! use serde_json::json;
//!
//! let registry = DataTypes::standard();
//! let codec = registry.get("string", "date").unwrap();
//! let value = (codec.deserialize)(&json!("2000-01-01")).unwrap();
//! assert!(matches!(value, TypedValue::Date(_)));
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::rc::Rc;
use std::sync::{Mutex, OnceLock};

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::warn;
use rand::Rng;
use rand::RngCore;
use serde_json::Value;

use crate::value::TypedValue;

/////////////////////////////////////////// PrimitiveType //////////////////////////////////////////

/// The primitive types a data type format can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveType {
    Boolean,
    Integer,
    Number,
    String,
}

impl PrimitiveType {
    fn parse(name: &str) -> Option<PrimitiveType> {
        match name {
            "boolean" => Some(PrimitiveType::Boolean),
            "integer" => Some(PrimitiveType::Integer),
            "number" => Some(PrimitiveType::Number),
            "string" => Some(PrimitiveType::String),
            _ => None,
        }
    }
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Number => "number",
            PrimitiveType::String => "string",
        };
        f.write_str(name)
    }
}

//////////////////////////////////////////// DataTypeError /////////////////////////////////////////

/// Errors from data type format registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTypeError {
    /// The primitive type is not one of boolean, integer, number, string.
    UnknownType(String),
    /// The format name is empty.
    InvalidFormat,
    /// A definition already exists for this `(type, format)` pair.
    AlreadyDefined { kind: String, format: String },
}

impl Display for DataTypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DataTypeError::UnknownType(name) => {
                write!(f, "Unknown primitive type: {}", name)
            }
            DataTypeError::InvalidFormat => {
                write!(f, "Format must be a non-empty string")
            }
            DataTypeError::AlreadyDefined { kind, format } => {
                write!(f, "Format already defined: {} {}", kind, format)
            }
        }
    }
}

impl std::error::Error for DataTypeError {}

///////////////////////////////////////// DataTypeDefinition ///////////////////////////////////////

/// The codec registered for one `(type, format)` pair.
///
/// `deserialize`, `serialize`, and `validate` are required; `random` falls
/// back to type-generic generation when absent. `constructors` names the
/// value constructors this format produces, feeding the process-wide set
/// that `formalize` preserves. `is_numeric` marks formats whose values
/// order numerically, which unlocks `maximum`/`minimum` on non-numeric
/// primitive types.
#[derive(Clone)]
pub struct DataTypeDefinition {
    pub deserialize: Rc<dyn Fn(&Value) -> Result<TypedValue, String>>,
    pub serialize: Rc<dyn Fn(&TypedValue) -> Result<Value, String>>,
    pub validate: Rc<dyn Fn(&TypedValue) -> Result<(), String>>,
    pub random: Option<Rc<dyn Fn(&mut dyn RngCore) -> TypedValue>>,
    pub constructors: Vec<String>,
    pub is_numeric: bool,
}

impl Debug for DataTypeDefinition {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DataTypeDefinition")
            .field("constructors", &self.constructors)
            .field("is_numeric", &self.is_numeric)
            .finish_non_exhaustive()
    }
}

/////////////////////////////////////// registered constructors ////////////////////////////////////

static CONSTRUCTORS: OnceLock<Mutex<BTreeSet<String>>> = OnceLock::new();

fn constructors_set() -> &'static Mutex<BTreeSet<String>> {
    CONSTRUCTORS.get_or_init(|| {
        let mut set = BTreeSet::new();
        set.insert("NaiveDate".to_string());
        set.insert("DateTime".to_string());
        set.insert("Bytes".to_string());
        Mutex::new(set)
    })
}

/// Snapshot of the process-wide constructor set.
///
/// The set is append-only: registrations add names, de-registrations do
/// not remove them, so values built before a format was replaced keep
/// formalizing the same way.
pub fn registered_constructors() -> BTreeSet<String> {
    constructors_set()
        .lock()
        .map(|set| set.clone())
        .unwrap_or_default()
}

////////////////////////////////////////////// DataTypes ///////////////////////////////////////////

/// Per-root registry of `(type, format)` codecs.
#[derive(Clone)]
pub struct DataTypes {
    formats: RefCell<BTreeMap<(PrimitiveType, String), Rc<DataTypeDefinition>>>,
    warned: RefCell<BTreeSet<(PrimitiveType, String)>>,
}

impl DataTypes {
    /// An empty registry.
    pub fn new() -> Self {
        DataTypes {
            formats: RefCell::new(BTreeMap::new()),
            warned: RefCell::new(BTreeSet::new()),
        }
    }

    /// A registry with the standard OpenAPI formats installed.
    pub fn standard() -> Self {
        let registry = DataTypes::new();
        for (kind, format, definition) in standard_definitions() {
            // Standard definitions are well-formed; ignore the impossible
            // duplicate error.
            let _ = registry.install(kind, &format, definition, false);
        }
        registry
    }

    /// Registers (or, with `None`, de-registers) a format codec.
    ///
    /// # Arguments
    /// * `kind` - One of `boolean`, `integer`, `number`, `string`
    /// * `format` - Non-empty format name, e.g. `decimal`
    /// * `definition` - The codec; `None` removes an existing one
    ///
    /// # Returns
    /// * `Ok(())` - The registry was updated
    /// * `Err(DataTypeError)` - The type is unknown, the format name is
    ///   empty, or the pair is already defined
    pub fn define(
        &self,
        kind: &str,
        format: &str,
        definition: Option<DataTypeDefinition>,
    ) -> Result<(), DataTypeError> {
        let primitive = PrimitiveType::parse(kind)
            .ok_or_else(|| DataTypeError::UnknownType(kind.to_string()))?;
        if format.is_empty() {
            return Err(DataTypeError::InvalidFormat);
        }
        match definition {
            Some(definition) => self.install(primitive, format, definition, true),
            None => {
                self.formats
                    .borrow_mut()
                    .remove(&(primitive, format.to_string()));
                Ok(())
            }
        }
    }

    fn install(
        &self,
        primitive: PrimitiveType,
        format: &str,
        definition: DataTypeDefinition,
        warn_missing_constructors: bool,
    ) -> Result<(), DataTypeError> {
        let key = (primitive, format.to_string());
        if self.formats.borrow().contains_key(&key) {
            return Err(DataTypeError::AlreadyDefined {
                kind: primitive.to_string(),
                format: format.to_string(),
            });
        }
        if definition.constructors.is_empty() {
            if warn_missing_constructors && self.warned.borrow_mut().insert(key.clone()) {
                warn!(
                    "data type format {} {} registered without constructors; \
                     formalize will not preserve its instances",
                    primitive, format
                );
            }
        } else if let Ok(mut set) = constructors_set().lock() {
            for constructor in &definition.constructors {
                set.insert(constructor.clone());
            }
        }
        self.formats.borrow_mut().insert(key, Rc::new(definition));
        Ok(())
    }

    /// Looks up the codec for `(kind, format)`.
    pub fn get(&self, kind: &str, format: &str) -> Option<Rc<DataTypeDefinition>> {
        let primitive = PrimitiveType::parse(kind)?;
        self.formats
            .borrow()
            .get(&(primitive, format.to_string()))
            .cloned()
    }

    /// True when the format exists and orders numerically.
    pub fn is_numeric(&self, kind: &str, format: &str) -> bool {
        self.get(kind, format)
            .map(|definition| definition.is_numeric)
            .unwrap_or(false)
    }
}

impl Default for DataTypes {
    fn default() -> Self {
        DataTypes::standard()
    }
}

impl Debug for DataTypes {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let formats = self.formats.borrow();
        f.debug_struct("DataTypes")
            .field("formats", &formats.keys().collect::<Vec<_>>())
            .finish()
    }
}

///////////////////////////////////////// standard formats /////////////////////////////////////////

fn expect_string(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("Expected a string, got {}", value))
}

fn standard_definitions() -> Vec<(PrimitiveType, String, DataTypeDefinition)> {
    vec![
        (PrimitiveType::String, "date".to_string(), date_format()),
        (
            PrimitiveType::String,
            "date-time".to_string(),
            date_time_format(),
        ),
        (PrimitiveType::String, "byte".to_string(), byte_format()),
        (PrimitiveType::String, "binary".to_string(), binary_format()),
        (
            PrimitiveType::String,
            "password".to_string(),
            password_format(),
        ),
        (
            PrimitiveType::Integer,
            "int32".to_string(),
            int_format(i32::MIN as i64, i32::MAX as i64, "int32"),
        ),
        (
            PrimitiveType::Integer,
            "int64".to_string(),
            int_format(i64::MIN, i64::MAX, "int64"),
        ),
        (PrimitiveType::Number, "float".to_string(), float_format()),
        (PrimitiveType::Number, "double".to_string(), float_format()),
    ]
}

fn float_format() -> DataTypeDefinition {
    // Passthrough; the format only narrows the storage width.
    DataTypeDefinition {
        deserialize: Rc::new(|value| match value {
            Value::Number(n) => Ok(TypedValue::Plain(Value::Number(n.clone()))),
            other => Err(format!("Expected a number, got {}", other)),
        }),
        serialize: Rc::new(|value| match value {
            TypedValue::Plain(Value::Number(n)) => Ok(Value::Number(n.clone())),
            other => Err(format!("Expected a number, got {}", other.type_name())),
        }),
        validate: Rc::new(|value| match value {
            TypedValue::Plain(Value::Number(_)) => Ok(()),
            other => Err(format!("Expected a number, got {}", other.type_name())),
        }),
        random: None,
        constructors: Vec::new(),
        is_numeric: true,
    }
}

fn date_format() -> DataTypeDefinition {
    DataTypeDefinition {
        deserialize: Rc::new(|value| {
            let text = expect_string(value)?;
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(TypedValue::Date)
                .map_err(|_| format!("Value is not a full-date string: {}", text))
        }),
        serialize: Rc::new(|value| match value {
            TypedValue::Date(date) => Ok(Value::String(date.format("%Y-%m-%d").to_string())),
            TypedValue::DateTime(at) => {
                Ok(Value::String(at.date_naive().format("%Y-%m-%d").to_string()))
            }
            TypedValue::Plain(Value::String(text)) => {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .map(|_| Value::String(text.clone()))
                    .map_err(|_| format!("Value is not a full-date string: {}", text))
            }
            other => Err(format!("Cannot serialize {} as a date", other.type_name())),
        }),
        validate: Rc::new(|value| match value {
            TypedValue::Date(_) | TypedValue::DateTime(_) => Ok(()),
            other => Err(format!("Expected a date, got {}", other.type_name())),
        }),
        random: Some(Rc::new(|rng: &mut dyn RngCore| {
            let days = rng.gen_range(0..36_525);
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
            TypedValue::Date(
                epoch
                    .checked_add_days(chrono::Days::new(days))
                    .unwrap_or(epoch),
            )
        })),
        constructors: vec!["NaiveDate".to_string()],
        is_numeric: true,
    }
}

fn date_time_format() -> DataTypeDefinition {
    DataTypeDefinition {
        deserialize: Rc::new(|value| {
            let text = expect_string(value)?;
            DateTime::parse_from_rfc3339(text)
                .map(|at| TypedValue::DateTime(at.with_timezone(&Utc)))
                .map_err(|_| format!("Value is not a date-time string: {}", text))
        }),
        serialize: Rc::new(|value| match value {
            TypedValue::DateTime(at) => Ok(Value::String(
                at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            )),
            TypedValue::Date(date) => {
                let at = date.and_time(NaiveTime::MIN).and_utc();
                Ok(Value::String(
                    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                ))
            }
            TypedValue::Plain(Value::String(text)) => DateTime::parse_from_rfc3339(text)
                .map(|_| Value::String(text.clone()))
                .map_err(|_| format!("Value is not a date-time string: {}", text)),
            other => Err(format!(
                "Cannot serialize {} as a date-time",
                other.type_name()
            )),
        }),
        validate: Rc::new(|value| match value {
            TypedValue::DateTime(_) => Ok(()),
            other => Err(format!("Expected a date-time, got {}", other.type_name())),
        }),
        random: Some(Rc::new(|rng: &mut dyn RngCore| {
            let seconds = rng.gen_range(0..2_000_000_000i64);
            TypedValue::DateTime(
                DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_default(),
            )
        })),
        constructors: vec!["DateTime".to_string()],
        is_numeric: true,
    }
}

fn byte_format() -> DataTypeDefinition {
    DataTypeDefinition {
        deserialize: Rc::new(|value| {
            let text = expect_string(value)?;
            base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(TypedValue::Bytes)
                .map_err(|_| format!("Value is not base64 encoded: {}", text))
        }),
        serialize: Rc::new(|value| match value {
            TypedValue::Bytes(bytes) => Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            )),
            TypedValue::Plain(Value::String(text)) => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(|_| Value::String(text.clone()))
                .map_err(|_| format!("Value is not base64 encoded: {}", text)),
            other => Err(format!("Cannot serialize {} as base64", other.type_name())),
        }),
        validate: Rc::new(|value| match value {
            TypedValue::Bytes(_) => Ok(()),
            other => Err(format!("Expected binary data, got {}", other.type_name())),
        }),
        random: Some(Rc::new(|rng: &mut dyn RngCore| {
            let length = rng.gen_range(1..16);
            let mut bytes = vec![0u8; length];
            rng.fill_bytes(&mut bytes);
            TypedValue::Bytes(bytes)
        })),
        constructors: vec!["Bytes".to_string()],
        is_numeric: false,
    }
}

fn binary_format() -> DataTypeDefinition {
    DataTypeDefinition {
        deserialize: Rc::new(|value| {
            let text = expect_string(value)?;
            if text.is_empty() || text.len() % 8 != 0 || !text.bytes().all(|b| b == b'0' || b == b'1')
            {
                return Err(format!("Value is not an octet string: {}", text));
            }
            let bytes = text
                .as_bytes()
                .chunks(8)
                .map(|chunk| {
                    chunk
                        .iter()
                        .fold(0u8, |acc, bit| (acc << 1) | u8::from(*bit == b'1'))
                })
                .collect();
            Ok(TypedValue::Bytes(bytes))
        }),
        serialize: Rc::new(|value| match value {
            TypedValue::Bytes(bytes) => Ok(Value::String(
                bytes.iter().map(|byte| format!("{:08b}", byte)).collect(),
            )),
            other => Err(format!(
                "Cannot serialize {} as an octet string",
                other.type_name()
            )),
        }),
        validate: Rc::new(|value| match value {
            TypedValue::Bytes(_) => Ok(()),
            other => Err(format!("Expected binary data, got {}", other.type_name())),
        }),
        random: Some(Rc::new(|rng: &mut dyn RngCore| {
            let length = rng.gen_range(1..8);
            let mut bytes = vec![0u8; length];
            rng.fill_bytes(&mut bytes);
            TypedValue::Bytes(bytes)
        })),
        constructors: vec!["Bytes".to_string()],
        is_numeric: false,
    }
}

fn password_format() -> DataTypeDefinition {
    // Passthrough; the format only marks the value as sensitive.
    DataTypeDefinition {
        deserialize: Rc::new(|value| {
            expect_string(value).map(|text| TypedValue::Plain(Value::String(text.to_string())))
        }),
        serialize: Rc::new(|value| match value {
            TypedValue::Plain(Value::String(text)) => Ok(Value::String(text.clone())),
            other => Err(format!("Expected a string, got {}", other.type_name())),
        }),
        validate: Rc::new(|value| match value {
            TypedValue::Plain(Value::String(_)) => Ok(()),
            other => Err(format!("Expected a string, got {}", other.type_name())),
        }),
        random: None,
        constructors: Vec::new(),
        is_numeric: false,
    }
}

fn int_format(minimum: i64, maximum: i64, name: &'static str) -> DataTypeDefinition {
    DataTypeDefinition {
        deserialize: Rc::new(move |value| match value.as_i64() {
            Some(n) if n >= minimum && n <= maximum => {
                Ok(TypedValue::Plain(Value::Number(n.into())))
            }
            Some(n) => Err(format!("Value {} is out of range for {}", n, name)),
            None => Err(format!("Expected an integer, got {}", value)),
        }),
        serialize: Rc::new(move |value| match value {
            TypedValue::Plain(Value::Number(n)) if n.is_i64() => Ok(Value::Number(n.clone())),
            other => Err(format!("Expected an integer, got {}", other.type_name())),
        }),
        validate: Rc::new(move |value| match value {
            TypedValue::Plain(Value::Number(n)) => match n.as_i64() {
                Some(n) if n >= minimum && n <= maximum => Ok(()),
                _ => Err(format!("Value {} is out of range for {}", n, name)),
            },
            other => Err(format!("Expected an integer, got {}", other.type_name())),
        }),
        random: None,
        constructors: Vec::new(),
        is_numeric: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn passthrough() -> DataTypeDefinition {
        DataTypeDefinition {
            deserialize: Rc::new(|value| Ok(TypedValue::from_json(value))),
            serialize: Rc::new(|value| Ok(value.to_json())),
            validate: Rc::new(|_| Ok(())),
            random: None,
            constructors: vec!["Decimal".to_string()],
            is_numeric: true,
        }
    }

    #[test]
    fn define_rejects_unknown_type() {
        let registry = DataTypes::new();
        let result = registry.define("object", "decimal", Some(passthrough()));
        assert!(matches!(result, Err(DataTypeError::UnknownType(_))));
    }

    #[test]
    fn define_rejects_empty_format() {
        let registry = DataTypes::new();
        let result = registry.define("string", "", Some(passthrough()));
        assert_eq!(result, Err(DataTypeError::InvalidFormat));
    }

    #[test]
    fn define_rejects_duplicates() {
        let registry = DataTypes::new();
        registry
            .define("string", "decimal", Some(passthrough()))
            .unwrap();
        let result = registry.define("string", "decimal", Some(passthrough()));
        assert!(matches!(result, Err(DataTypeError::AlreadyDefined { .. })));
    }

    #[test]
    fn null_definition_deregisters() {
        let registry = DataTypes::new();
        registry
            .define("string", "decimal", Some(passthrough()))
            .unwrap();
        registry.define("string", "decimal", None).unwrap();
        assert!(registry.get("string", "decimal").is_none());
        // The slot is free again.
        registry
            .define("string", "decimal", Some(passthrough()))
            .unwrap();
    }

    #[test]
    fn constructors_feed_the_process_wide_set() {
        let registry = DataTypes::new();
        registry
            .define("number", "fraction", Some(passthrough()))
            .unwrap();
        assert!(registered_constructors().contains("Decimal"));
    }

    #[test]
    fn standard_registry_has_openapi_formats() {
        let registry = DataTypes::standard();
        for format in ["date", "date-time", "byte", "binary", "password"] {
            assert!(registry.get("string", format).is_some(), "missing {}", format);
        }
        assert!(registry.get("integer", "int32").is_some());
        assert!(registry.get("integer", "int64").is_some());
        assert!(registry.get("string", "gibberish").is_none());
    }

    #[test]
    fn date_round_trip() {
        let registry = DataTypes::standard();
        let codec = registry.get("string", "date").unwrap();
        let typed = (codec.deserialize)(&json!("2000-01-01")).unwrap();
        assert_eq!(typed, TypedValue::Date(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()));
        assert_eq!((codec.serialize)(&typed).unwrap(), json!("2000-01-01"));
        assert!((codec.deserialize)(&json!("01/01/2000")).is_err());
    }

    #[test]
    fn date_time_round_trip() {
        let registry = DataTypes::standard();
        let codec = registry.get("string", "date-time").unwrap();
        let typed = (codec.deserialize)(&json!("2000-01-01T00:00:00.000Z")).unwrap();
        assert_eq!(
            (codec.serialize)(&typed).unwrap(),
            json!("2000-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn byte_round_trip() {
        let registry = DataTypes::standard();
        let codec = registry.get("string", "byte").unwrap();
        let typed = (codec.deserialize)(&json!("aGVsbG8=")).unwrap();
        assert_eq!(typed, TypedValue::Bytes(b"hello".to_vec()));
        assert_eq!((codec.serialize)(&typed).unwrap(), json!("aGVsbG8="));
        assert!((codec.deserialize)(&json!("not base64!!")).is_err());
    }

    #[test]
    fn binary_round_trip() {
        let registry = DataTypes::standard();
        let codec = registry.get("string", "binary").unwrap();
        let typed = (codec.deserialize)(&json!("0000101011111111")).unwrap();
        assert_eq!(typed, TypedValue::Bytes(vec![0b0000_1010, 0b1111_1111]));
        assert_eq!(
            (codec.serialize)(&typed).unwrap(),
            json!("0000101011111111")
        );
        assert!((codec.deserialize)(&json!("0101")).is_err());
        assert!((codec.deserialize)(&json!("0101010x")).is_err());
    }

    #[test]
    fn int32_rejects_overflow() {
        let registry = DataTypes::standard();
        let codec = registry.get("integer", "int32").unwrap();
        assert!((codec.deserialize)(&json!(2_147_483_647i64)).is_ok());
        assert!((codec.deserialize)(&json!(2_147_483_648i64)).is_err());
        assert!((codec.validate)(&TypedValue::Plain(json!(-2_147_483_649i64))).is_err());
    }

    #[test]
    fn random_dates_validate() {
        let registry = DataTypes::standard();
        let codec = registry.get("string", "date").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..16 {
            let random = codec.random.as_ref().unwrap();
            let value = random(&mut rng);
            assert!((codec.validate)(&value).is_ok());
        }
    }

    #[test]
    fn numeric_flags() {
        let registry = DataTypes::standard();
        assert!(registry.is_numeric("string", "date"));
        assert!(registry.is_numeric("string", "date-time"));
        assert!(!registry.is_numeric("string", "byte"));
        assert!(!registry.is_numeric("string", "gibberish"));
    }
}
