//! # Value validation
//!
//! Applies every constraint reachable from a schema node to a typed
//! value: type and enum membership, numeric bounds with exclusive flags
//! and `multipleOf`, string length and pattern, array length and
//! uniqueness, object property counts and required properties, composite
//! constraints, nullability, discriminator dispatch, and format-specific
//! validation from the data type registry.
//!
//! Violations accumulate in the exception scope at the path of the
//! offending value; validation never stops at the first problem.

use serde_json::Value;

use crate::exception::ExceptionScope;
use crate::schema::{Additional, SchemaNode};
use crate::value::TypedValue;
use crate::walk::EnforcerId;

/// Multiple-of checks tolerate float error at this scale.
const MULTIPLE_OF_EPSILON: f64 = 1e-9;

/// Validates `value` against `schema`. `seen` tracks the schemas already
/// applied at this value position so cyclic composites terminate.
pub(crate) fn validate_node(
    schema: &SchemaNode,
    value: &TypedValue,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) {
    if seen.contains(&schema.id) {
        return;
    }
    seen.push(schema.id);
    validate_inner(schema, value, scope, seen);
    seen.pop();
}

fn validate_inner(
    schema: &SchemaNode,
    value: &TypedValue,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) {
    if value.is_null() {
        if !schema.nullable() && schema.type_name().is_some() {
            scope.message("Value cannot be null");
        }
        return;
    }

    if let Some(branches) = schema.all_of() {
        for branch in &branches {
            validate_node(branch, value, scope, seen);
        }
    }
    if let Some(branches) = schema.any_of() {
        validate_any_of(schema, &branches, value, scope, seen);
    }
    if let Some(branches) = schema.one_of() {
        validate_one_of(schema, &branches, value, scope, seen);
    }
    if let Some(not_schema) = schema.not_schema() {
        let check = ExceptionScope::new("trial");
        validate_node(&not_schema, value, &check, &mut Vec::new());
        if !check.has_exception() {
            scope.message("Value should not validate against the not schema");
        }
    }

    // A discriminator outside a composite (the v2 polymorphism style)
    // dispatches validation onto the concrete schema.
    if schema.one_of().is_none() && schema.any_of().is_none() {
        if let Some(key) = schema.discriminator_key() {
            let outcome = schema.discriminate(value);
            match outcome.value {
                Some(target) => {
                    if target.id != schema.id {
                        validate_node(&target, value, scope, seen);
                    }
                }
                None => {
                    scope.message(format!(
                        "Missing or unresolvable discriminator property: {}",
                        key
                    ));
                }
            }
        }
    }

    if let Some(values) = schema.enum_values() {
        let rendered = value.to_json();
        if !values.contains(&rendered) {
            let options = values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            scope.message(format!(
                "Enum mismatch: {} is not one of: {}",
                rendered, options
            ));
        }
    }

    match schema.type_name().as_deref() {
        Some("boolean") => {
            if !matches!(value, TypedValue::Plain(Value::Bool(_))) {
                scope.message(format!(
                    "Type mismatch: expected boolean, got {}",
                    value.type_name()
                ));
            }
        }
        Some("integer") => match value {
            TypedValue::Plain(Value::Number(n))
                if n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false) =>
            {
                validate_format(schema, value, scope);
                validate_numeric(schema, value, scope);
            }
            other => scope.message(format!(
                "Type mismatch: expected integer, got {}",
                other.type_name()
            )),
        },
        Some("number") => match value {
            TypedValue::Plain(Value::Number(_)) => {
                validate_format(schema, value, scope);
                validate_numeric(schema, value, scope);
            }
            other => scope.message(format!(
                "Type mismatch: expected number, got {}",
                other.type_name()
            )),
        },
        Some("string") => validate_string(schema, value, scope),
        Some("array") => validate_array(schema, value, scope),
        Some("object") => validate_object(schema, value, scope),
        _ => {}
    }
}

fn validate_any_of(
    schema: &SchemaNode,
    branches: &[SchemaNode],
    value: &TypedValue,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) {
    if let Some(target) = discriminated(schema, value, branches, scope) {
        validate_node(&target, value, scope, seen);
        return;
    }
    let any_valid = branches.iter().any(|branch| {
        let check = ExceptionScope::new("trial");
        validate_node(branch, value, &check, &mut Vec::new());
        !check.has_exception()
    });
    if !any_valid {
        scope.message("Value does not validate against any anyOf schemas");
    }
}

fn validate_one_of(
    schema: &SchemaNode,
    branches: &[SchemaNode],
    value: &TypedValue,
    scope: &ExceptionScope,
    seen: &mut Vec<EnforcerId>,
) {
    if let Some(target) = discriminated(schema, value, branches, scope) {
        validate_node(&target, value, scope, seen);
        return;
    }
    let valid_count = branches
        .iter()
        .filter(|branch| {
            let check = ExceptionScope::new("trial");
            validate_node(branch, value, &check, &mut Vec::new());
            !check.has_exception()
        })
        .count();
    if valid_count == 0 {
        scope.message("Value does not validate against any oneOf schemas");
    } else if valid_count > 1 {
        scope.message(format!(
            "Value validates against {} oneOf schemas; exactly one is required",
            valid_count
        ));
    }
}

/// Resolves the discriminator target for a composite, flagging targets
/// outside the composite's branches.
fn discriminated(
    schema: &SchemaNode,
    value: &TypedValue,
    branches: &[SchemaNode],
    scope: &ExceptionScope,
) -> Option<SchemaNode> {
    schema.discriminator_key()?;
    let target = schema.discriminate(value).value?;
    if !branches.iter().any(|branch| branch.id == target.id) {
        scope.message(format!(
            "Discriminator target is not one of the composite schemas: {}",
            target
                .enforcer_data()
                .path
                .last()
                .cloned()
                .unwrap_or_default()
        ));
    }
    Some(target)
}

fn validate_format(schema: &SchemaNode, value: &TypedValue, scope: &ExceptionScope) {
    if let Some(codec) = schema.codec() {
        if let Err(message) = (codec.validate)(value) {
            scope.message(message);
        }
    }
}

fn validate_numeric(schema: &SchemaNode, value: &TypedValue, scope: &ExceptionScope) {
    let Some(n) = value.numeric() else { return };
    if let Some(maximum) = schema.numeric_bound("maximum") {
        if schema.bool_field("exclusiveMaximum") {
            if n >= maximum {
                scope.message(format!("Value must be less than {}", maximum));
            }
        } else if n > maximum {
            scope.message(format!("Value must be less than or equal to {}", maximum));
        }
    }
    if let Some(minimum) = schema.numeric_bound("minimum") {
        if schema.bool_field("exclusiveMinimum") {
            if n <= minimum {
                scope.message(format!("Value must be greater than {}", minimum));
            }
        } else if n < minimum {
            scope.message(format!("Value must be greater than or equal to {}", minimum));
        }
    }
    if let Some(multiple) = schema.number_field("multipleOf") {
        if multiple != 0.0 {
            let quotient = n / multiple;
            if (quotient - quotient.round()).abs() > MULTIPLE_OF_EPSILON {
                scope.message(format!("Value is not a multiple of {}", multiple));
            }
        }
    }
}

fn validate_string(schema: &SchemaNode, value: &TypedValue, scope: &ExceptionScope) {
    // Format-typed values (dates, binary) validate through the codec and
    // compare through their numeric view.
    if schema.codec().is_some() {
        validate_format(schema, value, scope);
        validate_numeric(schema, value, scope);
        return;
    }
    let TypedValue::Plain(Value::String(text)) = value else {
        scope.message(format!(
            "Type mismatch: expected string, got {}",
            value.type_name()
        ));
        return;
    };
    let length = text.chars().count();
    if let Some(max_length) = schema.usize_field("maxLength") {
        if length > max_length {
            scope.message(format!("String length must not exceed {}", max_length));
        }
    }
    if let Some(min_length) = schema.usize_field("minLength") {
        if length < min_length {
            scope.message(format!("String length must be at least {}", min_length));
        }
    }
    if let Some(pattern) = schema.pattern() {
        if !pattern.is_match(text) {
            scope.message(format!(
                "Value does not match the pattern: {}",
                pattern.as_str()
            ));
        }
    }
}

fn validate_array(schema: &SchemaNode, value: &TypedValue, scope: &ExceptionScope) {
    let TypedValue::Array(items) = value else {
        scope.message(format!(
            "Type mismatch: expected array, got {}",
            value.type_name()
        ));
        return;
    };
    if let Some(max_items) = schema.usize_field("maxItems") {
        if items.len() > max_items {
            scope.message(format!("Array must have at most {} items", max_items));
        }
    }
    if let Some(min_items) = schema.usize_field("minItems") {
        if items.len() < min_items {
            scope.message(format!("Array must have at least {} items", min_items));
        }
    }
    if schema.bool_field("uniqueItems") {
        for (index, item) in items.iter().enumerate() {
            if items[..index].contains(item) {
                scope
                    .at(index.to_string())
                    .message("Array items must be unique");
            }
        }
    }
    if let Some(item_schema) = schema.items() {
        for (index, item) in items.iter().enumerate() {
            validate_node(&item_schema, item, &scope.at(index.to_string()), &mut Vec::new());
        }
    }
}

fn validate_object(schema: &SchemaNode, value: &TypedValue, scope: &ExceptionScope) {
    let TypedValue::Object(entries) = value else {
        scope.message(format!(
            "Type mismatch: expected object, got {}",
            value.type_name()
        ));
        return;
    };
    if let Some(max_properties) = schema.usize_field("maxProperties") {
        if entries.len() > max_properties {
            scope.message(format!(
                "Object must have at most {} properties",
                max_properties
            ));
        }
    }
    if let Some(min_properties) = schema.usize_field("minProperties") {
        if entries.len() < min_properties {
            scope.message(format!(
                "Object must have at least {} properties",
                min_properties
            ));
        }
    }
    for name in schema.required() {
        if !entries.contains_key(&name) {
            scope.message(format!("Missing required property: {}", name));
        }
    }
    let properties = schema.properties();
    let additional = schema.additional();
    for (key, item) in entries {
        let child_scope = scope.at(key.clone());
        if let Some(property) = properties.get(key) {
            validate_node(property, item, &child_scope, &mut Vec::new());
        } else {
            match &additional {
                Additional::Allowed(true) => {}
                Additional::Allowed(false) => {
                    scope.message(format!("Property not allowed: {}", key));
                }
                Additional::Schema(extra) => {
                    validate_node(extra, item, &child_scope, &mut Vec::new());
                }
            }
        }
    }
}
