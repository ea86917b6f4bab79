//! # Random value generation
//!
//! Generates values conforming to a schema: enum members, defaults with a
//! configurable possibility, format-specific generators from the data
//! type registry, and type-generic generation bounded by the schema's
//! constraints. Possibility options are range-checked before any work
//! happens.

use std::collections::BTreeMap;

use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exception::ExceptionScope;
use crate::outcome::Outcome;
use crate::schema::{Additional, SchemaNode};
use crate::value::TypedValue;
use crate::walk::EnforcerId;

/////////////////////////////////////////// RandomOptions //////////////////////////////////////////

/// Options accepted by [`SchemaNode::random`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RandomOptions {
    /// Chance of adding extra properties where they are allowed.
    pub additional_properties_possibility: f64,
    /// Chance of using the declared default.
    pub default_possibility: f64,
    /// Chance of including each optional property.
    pub defined_property_possibility: f64,
    /// Additional elements beyond `minItems`.
    pub array_variation: usize,
    /// Range above `minimum` for unbounded numbers.
    pub number_variation: f64,
    /// Maximum container nesting.
    pub max_depth: usize,
    /// Attempts at regenerating a duplicate item under `uniqueItems`.
    pub unique_item_retry: usize,
    /// Operate on a clone of the supplied value.
    pub copy: bool,
}

impl Default for RandomOptions {
    fn default() -> Self {
        RandomOptions {
            additional_properties_possibility: 0.0,
            default_possibility: 0.25,
            defined_property_possibility: 0.80,
            array_variation: 4,
            number_variation: 1000.0,
            max_depth: 10,
            unique_item_retry: 5,
            copy: false,
        }
    }
}

impl RandomOptions {
    fn check(&self) -> Result<(), String> {
        for (name, value) in [
            (
                "additionalPropertiesPossibility",
                self.additional_properties_possibility,
            ),
            ("defaultPossibility", self.default_possibility),
            (
                "definedPropertyPossibility",
                self.defined_property_possibility,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!(
                    "Option {} must be between 0 and 1, received: {}",
                    name, value
                ));
            }
        }
        Ok(())
    }
}

/////////////////////////////////////////////// random /////////////////////////////////////////////

pub(crate) fn random(
    schema: &SchemaNode,
    value: Option<&TypedValue>,
    options: &RandomOptions,
    rng: &mut dyn RngCore,
) -> Outcome<TypedValue> {
    let exception = ExceptionScope::new("One or more errors exist in the value");
    let warn = ExceptionScope::new("One or more warnings exist in the value");
    if let Err(message) = options.check() {
        exception.message(message);
        return Outcome::from_scopes(None, exception, warn);
    }
    let result = random_node(
        schema,
        value.cloned(),
        options,
        rng,
        options.max_depth,
        &mut Vec::new(),
    );
    Outcome::from_scopes(result, exception, warn)
}

fn random_node(
    schema: &SchemaNode,
    value: Option<TypedValue>,
    options: &RandomOptions,
    rng: &mut dyn RngCore,
    depth: usize,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    if seen.contains(&schema.id) {
        return value;
    }
    seen.push(schema.id);
    let result = random_inner(schema, value, options, rng, depth, seen);
    seen.pop();
    result
}

fn random_inner(
    schema: &SchemaNode,
    value: Option<TypedValue>,
    options: &RandomOptions,
    rng: &mut dyn RngCore,
    depth: usize,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    // A supplied scalar is kept; a supplied object is completed below.
    if let Some(existing) = &value {
        if !matches!(existing, TypedValue::Object(_)) {
            return value;
        }
    }

    if value.is_none() {
        if let Some(values) = schema.enum_values() {
            if !values.is_empty() {
                let index = rng.gen_range(0..values.len());
                return Some(TypedValue::from_json(&values[index]));
            }
        }
        if let Some(default) = schema.default_value() {
            if rng.gen_bool(options.default_possibility) {
                return Some(TypedValue::from_json(&default));
            }
        }
        if let Some(branches) = schema.all_of() {
            return random_all_of(&branches, options, rng, depth, seen);
        }
        for branches in [schema.one_of(), schema.any_of()].into_iter().flatten() {
            if branches.is_empty() {
                continue;
            }
            let index = rng.gen_range(0..branches.len());
            return random_node(&branches[index], None, options, rng, depth, seen);
        }
        if let Some(codec) = schema.codec() {
            if let Some(generator) = &codec.random {
                return Some(generator(rng));
            }
        }
    }

    match schema.type_name().as_deref() {
        Some("boolean") => Some(TypedValue::Plain(Value::Bool(rng.gen_bool(0.5)))),
        Some("integer") => Some(random_integer(schema, options, rng)),
        Some("number") => Some(random_number(schema, options, rng)),
        Some("string") | Some("file") => Some(random_string(schema, rng)),
        Some("array") => random_array(schema, options, rng, depth, seen),
        Some("object") => random_object(schema, value, options, rng, depth, seen),
        _ => value.or(Some(TypedValue::Plain(Value::Null))),
    }
}

fn random_all_of(
    branches: &[SchemaNode],
    options: &RandomOptions,
    rng: &mut dyn RngCore,
    depth: usize,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    let mut merged: Option<TypedValue> = None;
    for branch in branches {
        let generated = random_node(branch, merged.clone(), options, rng, depth, seen)?;
        merged = Some(match (merged, generated) {
            (Some(TypedValue::Object(mut base)), TypedValue::Object(update)) => {
                for (key, item) in update {
                    base.entry(key).or_insert(item);
                }
                TypedValue::Object(base)
            }
            (_, generated) => generated,
        });
    }
    merged
}

fn integer_bound(schema: &SchemaNode, key: &str) -> Option<i64> {
    schema.numeric_bound(key).map(|n| n as i64)
}

fn random_integer(schema: &SchemaNode, options: &RandomOptions, rng: &mut dyn RngCore) -> TypedValue {
    let minimum = integer_bound(schema, "minimum");
    let maximum = integer_bound(schema, "maximum");
    let variation = options.number_variation as i64;
    let mut low =
        minimum.unwrap_or_else(|| maximum.map(|m| m.saturating_sub(variation)).unwrap_or(0));
    let mut high = maximum.unwrap_or_else(|| low.saturating_add(variation));
    if schema.bool_field("exclusiveMinimum") {
        low = low.saturating_add(1);
    }
    if schema.bool_field("exclusiveMaximum") {
        high = high.saturating_sub(1);
    }
    if let Some(multiple) = schema.number_field("multipleOf").filter(|m| *m > 0.0) {
        let multiple = multiple as i64;
        if multiple > 0 {
            let first = low.checked_div_euclid(multiple).unwrap_or(0)
                + if low.rem_euclid(multiple) == 0 { 0 } else { 1 };
            let last = high.checked_div_euclid(multiple).unwrap_or(0);
            if first <= last {
                let k = rng.gen_range(first..=last);
                return TypedValue::Plain(Value::Number((k * multiple).into()));
            }
        }
    }
    if low > high {
        high = low;
    }
    TypedValue::Plain(Value::Number(rng.gen_range(low..=high).into()))
}

fn random_number(schema: &SchemaNode, options: &RandomOptions, rng: &mut dyn RngCore) -> TypedValue {
    let minimum = schema.numeric_bound("minimum");
    let maximum = schema.numeric_bound("maximum");
    let mut low =
        minimum.unwrap_or_else(|| maximum.map(|m| m - options.number_variation).unwrap_or(0.0));
    let mut high = maximum.unwrap_or_else(|| low + options.number_variation);
    if schema.bool_field("exclusiveMinimum") {
        low += f64::EPSILON.max(low.abs() * 1e-12);
    }
    if schema.bool_field("exclusiveMaximum") {
        high -= f64::EPSILON.max(high.abs() * 1e-12);
    }
    if let Some(multiple) = schema.number_field("multipleOf").filter(|m| *m > 0.0) {
        let first = (low / multiple).ceil() as i64;
        let last = (high / multiple).floor() as i64;
        if first <= last {
            let k = rng.gen_range(first..=last);
            let value = k as f64 * multiple;
            return TypedValue::Plain(
                serde_json::Number::from_f64(value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
        }
    }
    if low > high {
        high = low;
    }
    let value = rng.gen_range(low..=high);
    TypedValue::Plain(
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    )
}

fn random_string(schema: &SchemaNode, rng: &mut dyn RngCore) -> TypedValue {
    let low = schema.usize_field("minLength").unwrap_or(1);
    let high = schema.usize_field("maxLength").unwrap_or(low + 12);
    let low = low.min(high);
    let length = rng.gen_range(low..=high);
    let text: String = std::iter::repeat_with(|| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect();
    TypedValue::Plain(Value::String(text))
}

fn random_array(
    schema: &SchemaNode,
    options: &RandomOptions,
    rng: &mut dyn RngCore,
    depth: usize,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    let min_items = schema.usize_field("minItems").unwrap_or(0);
    if depth == 0 {
        return Some(TypedValue::Array(Vec::new()));
    }
    let mut count = min_items + rng.gen_range(0..=options.array_variation);
    if let Some(max_items) = schema.usize_field("maxItems") {
        count = count.min(max_items);
    }
    let unique = schema.bool_field("uniqueItems");
    let item_schema = schema.items();
    let mut items: Vec<TypedValue> = Vec::with_capacity(count);
    for _ in 0..count {
        let mut generated = None;
        for _ in 0..=options.unique_item_retry {
            let candidate = match &item_schema {
                Some(item_schema) => {
                    random_node(item_schema, None, options, rng, depth - 1, seen)
                }
                None => Some(TypedValue::Plain(Value::Null)),
            };
            match candidate {
                Some(candidate) if unique && items.contains(&candidate) => continue,
                Some(candidate) => {
                    generated = Some(candidate);
                    break;
                }
                None => break,
            }
        }
        match generated {
            Some(generated) => items.push(generated),
            // Retries exhausted; a shorter array beats a duplicate.
            None => break,
        }
    }
    Some(TypedValue::Array(items))
}

fn random_object(
    schema: &SchemaNode,
    value: Option<TypedValue>,
    options: &RandomOptions,
    rng: &mut dyn RngCore,
    depth: usize,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    let mut entries = match value {
        Some(TypedValue::Object(entries)) => entries,
        _ => BTreeMap::new(),
    };
    let required = schema.required();
    let max_properties = schema.usize_field("maxProperties").unwrap_or(usize::MAX);
    if depth == 0 {
        return Some(TypedValue::Object(entries));
    }
    let properties = schema.properties();
    for (key, property) in &properties {
        if entries.contains_key(key) || entries.len() >= max_properties {
            continue;
        }
        let wanted = required.contains(key)
            || rng.gen_bool(options.defined_property_possibility);
        if !wanted {
            continue;
        }
        if let Some(generated) = random_node(property, None, options, rng, depth - 1, seen) {
            entries.insert(key.clone(), generated);
        }
    }
    // Top up to minProperties from the declared-but-skipped pool.
    if let Some(min_properties) = schema.usize_field("minProperties") {
        for (key, property) in &properties {
            if entries.len() >= min_properties {
                break;
            }
            if entries.contains_key(key) {
                continue;
            }
            if let Some(generated) = random_node(property, None, options, rng, depth - 1, seen) {
                entries.insert(key.clone(), generated);
            }
        }
    }
    if options.additional_properties_possibility > 0.0 {
        let extra_schema = match schema.additional() {
            Additional::Schema(extra) => Some(extra),
            Additional::Allowed(true) => None,
            Additional::Allowed(false) => {
                return Some(TypedValue::Object(entries));
            }
        };
        let mut index = 1;
        while entries.len() < max_properties
            && rng.gen_bool(options.additional_properties_possibility)
        {
            let key = format!("additionalProperty{}", index);
            index += 1;
            let generated = match &extra_schema {
                Some(extra) => random_node(extra, None, options, rng, depth - 1, seen),
                None => Some(random_string(schema, rng)),
            };
            if let Some(generated) = generated {
                entries.insert(key, generated);
            }
        }
    }
    Some(TypedValue::Object(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_contract() {
        let options = RandomOptions::default();
        assert_eq!(options.additional_properties_possibility, 0.0);
        assert_eq!(options.default_possibility, 0.25);
        assert_eq!(options.defined_property_possibility, 0.80);
        assert_eq!(options.array_variation, 4);
        assert_eq!(options.number_variation, 1000.0);
        assert_eq!(options.max_depth, 10);
        assert_eq!(options.unique_item_retry, 5);
        assert!(!options.copy);
    }

    #[test]
    fn possibilities_are_range_checked() {
        let mut options = RandomOptions::default();
        options.default_possibility = 1.5;
        assert!(options.check().is_err());
        options.default_possibility = -0.1;
        assert!(options.check().is_err());
        options.default_possibility = 1.0;
        assert!(options.check().is_ok());
    }
}
