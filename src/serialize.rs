//! # Deserialization and serialization
//!
//! Top-down walkers that convert wire values into typed values and back,
//! consulting the data type registry for format codecs and resolving
//! composite schemas along the way. Branch selection for `oneOf`/`anyOf`
//! goes through the discriminator when one is declared, otherwise by
//! trial: the first branch that deserializes and validates cleanly wins.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::exception::ExceptionScope;
use crate::schema::{Additional, SchemaNode};
use crate::value::TypedValue;
use crate::walk::EnforcerId;

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//////////////////////////////////////////// deserialize ///////////////////////////////////////////

/// Deserializes `value` against `schema`, attaching violations to
/// `scope`. `seen` tracks the schemas already applied to this same value
/// position so that cyclic composites terminate.
pub(crate) fn deserialize_node(
    schema: &SchemaNode,
    value: &Value,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    if seen.contains(&schema.id) {
        return Some(TypedValue::from_json(value));
    }
    seen.push(schema.id);
    let result = deserialize_inner(schema, value, scope, seen);
    seen.pop();
    result
}

fn deserialize_inner(
    schema: &SchemaNode,
    value: &Value,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    if value.is_null() {
        if schema.nullable() || schema.type_name().is_none() {
            return Some(TypedValue::Plain(Value::Null));
        }
        scope.message("Value cannot be null");
        return None;
    }

    if let Some(branches) = schema.all_of() {
        return deserialize_all_of(&branches, value, scope, seen);
    }
    for (key, branches) in [("oneOf", schema.one_of()), ("anyOf", schema.any_of())] {
        let Some(branches) = branches else { continue };
        if let Some(target) = discriminated_target(schema, value) {
            return deserialize_node(&target, value, scope, seen);
        }
        for branch in &branches {
            let trial = ExceptionScope::new("trial");
            let mut trial_seen = seen.clone();
            if let Some(typed) = deserialize_node(branch, value, &trial, &mut trial_seen) {
                if !trial.has_exception() {
                    let check = ExceptionScope::new("trial");
                    crate::validate::validate_node(branch, &typed, &check, &mut Vec::new());
                    if !check.has_exception() {
                        return Some(typed);
                    }
                }
            }
        }
        scope.message(format!("Value does not match any {} schemas", key));
        return None;
    }

    if let Some(codec) = schema.codec() {
        return match (codec.deserialize)(value) {
            Ok(typed) => Some(typed),
            Err(message) => {
                scope.message(message);
                None
            }
        };
    }

    match schema.type_name().as_deref() {
        Some("boolean") => match value {
            Value::Bool(_) => Some(TypedValue::Plain(value.clone())),
            other => type_mismatch(scope, "boolean", other),
        },
        Some("integer") => match value {
            Value::Number(n) if n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false) => {
                Some(TypedValue::Plain(value.clone()))
            }
            other => type_mismatch(scope, "integer", other),
        },
        Some("number") => match value {
            Value::Number(_) => Some(TypedValue::Plain(value.clone())),
            other => type_mismatch(scope, "number", other),
        },
        Some("string") | Some("file") => match value {
            Value::String(_) => Some(TypedValue::Plain(value.clone())),
            other => type_mismatch(scope, "string", other),
        },
        Some("array") => match value {
            Value::Array(items) => {
                let item_schema = schema.items();
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let child_scope = scope.at(index.to_string());
                    let typed = match &item_schema {
                        Some(item_schema) => {
                            deserialize_node(item_schema, item, &child_scope, &mut Vec::new())
                        }
                        None => Some(TypedValue::from_json(item)),
                    };
                    out.push(typed.unwrap_or_else(|| TypedValue::from_json(item)));
                }
                Some(TypedValue::Array(out))
            }
            other => type_mismatch(scope, "array", other),
        },
        Some("object") => deserialize_object(schema, value, scope),
        _ => Some(TypedValue::from_json(value)),
    }
}

fn deserialize_object(
    schema: &SchemaNode,
    value: &Value,
    scope: &ExceptionScope,
) -> Option<TypedValue> {
    let Value::Object(entries) = value else {
        return type_mismatch(scope, "object", value);
    };
    let properties = schema.properties();
    let additional = schema.additional();
    let mut out = BTreeMap::new();
    for (key, item) in entries {
        let child_scope = scope.at(key.clone());
        if let Some(property) = properties.get(key) {
            if let Some(typed) = deserialize_node(property, item, &child_scope, &mut Vec::new()) {
                out.insert(key.clone(), typed);
            }
        } else {
            match &additional {
                Additional::Allowed(true) => {
                    out.insert(key.clone(), TypedValue::from_json(item));
                }
                Additional::Allowed(false) => {
                    // Extra keys are dropped when additional properties
                    // are forbidden; validation reports them.
                }
                Additional::Schema(extra) => {
                    if let Some(typed) = deserialize_node(extra, item, &child_scope, &mut Vec::new())
                    {
                        out.insert(key.clone(), typed);
                    }
                }
            }
        }
    }
    Some(TypedValue::Object(out))
}

fn deserialize_all_of(
    branches: &[SchemaNode],
    value: &Value,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    let mut merged: Option<TypedValue> = None;
    for branch in branches {
        let Some(typed) = deserialize_node(branch, value, scope, seen) else {
            continue;
        };
        merged = Some(match (merged, typed) {
            (Some(TypedValue::Object(mut base)), TypedValue::Object(update)) => {
                for (key, item) in update {
                    base.entry(key).or_insert(item);
                }
                TypedValue::Object(base)
            }
            (Some(existing), _) => existing,
            (None, typed) => typed,
        });
    }
    merged
}

///////////////////////////////////////////// serialize ////////////////////////////////////////////

/// Serializes a typed value back into its wire form against `schema`.
pub(crate) fn serialize_node(
    schema: &SchemaNode,
    value: &TypedValue,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) -> Option<Value> {
    if seen.contains(&schema.id) {
        return Some(value.to_json());
    }
    seen.push(schema.id);
    let result = serialize_inner(schema, value, scope, seen);
    seen.pop();
    result
}

fn serialize_inner(
    schema: &SchemaNode,
    value: &TypedValue,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) -> Option<Value> {
    if value.is_null() {
        if schema.nullable() || schema.type_name().is_none() {
            return Some(Value::Null);
        }
        scope.message("Value cannot be null");
        return None;
    }

    if let Some(branches) = schema.all_of() {
        let mut merged: Option<Value> = None;
        for branch in &branches {
            let Some(serialized) = serialize_node(branch, value, scope, seen) else {
                continue;
            };
            merged = Some(match (merged, serialized) {
                (Some(Value::Object(mut base)), Value::Object(update)) => {
                    for (key, item) in update {
                        base.entry(key).or_insert(item);
                    }
                    Value::Object(base)
                }
                (Some(existing), _) => existing,
                (None, serialized) => serialized,
            });
        }
        return merged;
    }
    for (key, branches) in [("oneOf", schema.one_of()), ("anyOf", schema.any_of())] {
        let Some(branches) = branches else { continue };
        if let Some(target) = discriminated_typed_target(schema, value) {
            return serialize_node(&target, value, scope, seen);
        }
        for branch in &branches {
            let check = ExceptionScope::new("trial");
            crate::validate::validate_node(branch, value, &check, &mut Vec::new());
            if !check.has_exception() {
                return serialize_node(branch, value, scope, &mut seen.clone());
            }
        }
        scope.message(format!("Value does not match any {} schemas", key));
        return None;
    }

    if let Some(codec) = schema.codec() {
        return match (codec.serialize)(value) {
            Ok(serialized) => Some(serialized),
            Err(message) => {
                scope.message(message);
                None
            }
        };
    }

    match schema.type_name().as_deref() {
        Some("array") => match value {
            TypedValue::Array(items) => {
                let item_schema = schema.items();
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let child_scope = scope.at(index.to_string());
                    let serialized = match &item_schema {
                        Some(item_schema) => {
                            serialize_node(item_schema, item, &child_scope, &mut Vec::new())
                        }
                        None => Some(item.to_json()),
                    };
                    out.push(serialized.unwrap_or(Value::Null));
                }
                Some(Value::Array(out))
            }
            other => {
                scope.message(format!(
                    "Type mismatch: expected array, got {}",
                    other.type_name()
                ));
                None
            }
        },
        Some("object") => match value {
            TypedValue::Object(entries) => {
                let properties = schema.properties();
                let additional = schema.additional();
                let mut out = serde_json::Map::new();
                for (key, item) in entries {
                    let child_scope = scope.at(key.clone());
                    let serialized = match properties.get(key) {
                        Some(property) => {
                            serialize_node(property, item, &child_scope, &mut Vec::new())
                        }
                        None => match &additional {
                            Additional::Allowed(true) => Some(item.to_json()),
                            Additional::Allowed(false) => None,
                            Additional::Schema(extra) => {
                                serialize_node(extra, item, &child_scope, &mut Vec::new())
                            }
                        },
                    };
                    if let Some(serialized) = serialized {
                        out.insert(key.clone(), serialized);
                    }
                }
                Some(Value::Object(out))
            }
            other => {
                scope.message(format!(
                    "Type mismatch: expected object, got {}",
                    other.type_name()
                ));
                None
            }
        },
        Some(kind @ ("boolean" | "integer" | "number" | "string")) => {
            let serialized = value.to_json();
            let actual = json_type_name(&serialized);
            let matches = match kind {
                "boolean" => actual == "boolean",
                "integer" | "number" => actual == "number",
                _ => actual == "string",
            };
            if matches {
                Some(serialized)
            } else {
                scope.message(format!("Type mismatch: expected {}, got {}", kind, actual));
                None
            }
        }
        _ => Some(value.to_json()),
    }
}

fn type_mismatch(scope: &ExceptionScope, expected: &str, value: &Value) -> Option<TypedValue> {
    scope.message(format!(
        "Type mismatch: expected {}, got {}",
        expected,
        json_type_name(value)
    ));
    None
}

/// Discriminator dispatch over a raw wire value.
fn discriminated_target(schema: &SchemaNode, value: &Value) -> Option<SchemaNode> {
    schema.discriminator_key()?;
    let typed = TypedValue::from_json(value);
    schema.discriminate(&typed).value.filter(|t| t.id != schema.id)
}

/// Discriminator dispatch over an already-typed value.
fn discriminated_typed_target(schema: &SchemaNode, value: &TypedValue) -> Option<SchemaNode> {
    schema.discriminator_key()?;
    schema.discriminate(value).value.filter(|t| t.id != schema.id)
}
