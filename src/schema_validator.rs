//! # Schema meta-validator
//!
//! The validator descriptor used to normalize Schema definitions
//! themselves. Property weights encode evaluation order: `type` resolves
//! first, then `format`, then the numeric bounds, so that later rules can
//! read the partial result through the parent back-reference — whether
//! `maximum` is allowed, and what shape its value takes, depends on the
//! already-normalized `type` and `format`.
//!
//! The `Schema` component registered here also owns the post-walk work:
//! freezing `enum`/`default`/`example`, validating them against the built
//! tree, and resolving discriminator mapping strings to schema instances
//! once every instance exists.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::definition::{DefinitionType, DefNode};
use crate::descriptor::{Descriptor, EnforcerRef, Resolvable, Validator};
use crate::exception::ExceptionScope;
use crate::normalizer::run_child_validator;
use crate::schema::{definition_field, SchemaNode, COMPOSITE_KEYS};
use crate::walk::{Arena, ComponentSpec, EnforcerId, Materialized, Walk};

/// The component registry handed to the normalizer. The only component in
/// this crate's scope is `Schema`; surrounding layers extend the map.
pub(crate) fn components() -> BTreeMap<String, Rc<ComponentSpec>> {
    let mut components = BTreeMap::new();
    components.insert(
        "Schema".to_string(),
        Rc::new(ComponentSpec {
            name: "Schema",
            validator: Rc::new(|_walk: &Walk| Validator::plain(schema_descriptor())),
            init: Some(Rc::new(schema_init)),
        }),
    );
    components
}

fn schema_ref() -> Validator {
    Validator::Ref(EnforcerRef::new("Schema"))
}

fn parent_type(walk: &Walk) -> Option<String> {
    walk.parent_field("type").and_then(|m| m.as_text())
}

fn parent_format(walk: &Walk) -> Option<String> {
    walk.parent_field("format").and_then(|m| m.as_text())
}

/// Numeric-ish: natively numeric, or format-marked `isNumeric` in the
/// data type registry.
fn numeric_ish(walk: &Walk) -> bool {
    match parent_type(walk).as_deref() {
        Some("integer") | Some("number") => true,
        Some(kind) => parent_format(walk)
            .map(|format| walk.arena.data_types.is_numeric(kind, &format))
            .unwrap_or(false),
        None => false,
    }
}

fn universal_pattern() -> Rc<Regex> {
    thread_local! {
        static UNIVERSAL: OnceLock<Rc<Regex>> = OnceLock::new();
    }
    UNIVERSAL.with(|cell| {
        Rc::clone(cell.get_or_init(|| {
            Rc::new(Regex::new(r"[\s\S]*").expect("universal pattern is a valid expression"))
        }))
    })
}

///////////////////////////////////////// schema descriptor ////////////////////////////////////////

/// Builds the §-by-§ Schema descriptor.
fn schema_descriptor() -> Descriptor {
    let mut descriptor = Descriptor::of(DefinitionType::Object);
    descriptor.errors = Some(Rc::new(schema_errors));
    let properties = &mut descriptor.properties;

    properties.insert(
        "type".to_string(),
        Validator::plain(Descriptor {
            weight: -10,
            required: Some(Resolvable::from_fn(|walk: &Walk| {
                // `type` is required unless a composite carries the shape.
                let Some(parent) = walk.parent.as_deref() else {
                    return false;
                };
                let Some(def) = parent.definition else {
                    return false;
                };
                let graph = walk.arena.graph();
                !COMPOSITE_KEYS
                    .iter()
                    .any(|key| definition_field(&graph, def, key).is_some())
            })),
            enum_values: Some(Resolvable::from_fn(|walk: &Walk| {
                let mut kinds = vec!["array", "boolean", "integer", "number", "object", "string"];
                if walk.version().is_v2() {
                    kinds.push("file");
                }
                kinds.into_iter().map(|k| Value::String(k.to_string())).collect()
            })),
            ..Descriptor::of(DefinitionType::String)
        }),
    );

    properties.insert(
        "format".to_string(),
        Validator::plain(Descriptor {
            weight: -9,
            allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                matches!(
                    parent_type(walk).as_deref(),
                    Some("boolean") | Some("integer") | Some("number") | Some("string")
                )
            })),
            errors: Some(Rc::new(|walk: &Walk| {
                let format = walk.result.borrow().as_ref().and_then(|m| m.as_text());
                let (Some(kind), Some(format)) = (parent_type(walk), format) else {
                    return;
                };
                if walk.arena.data_types.get(&kind, &format).is_none() {
                    walk.warn
                        .message(format!("Non standard format used: {}", format));
                }
            })),
            ..Descriptor::of(DefinitionType::String)
        }),
    );

    for key in ["maximum", "minimum"] {
        properties.insert(key.to_string(), Validator::plain(bound_descriptor()));
    }
    for key in ["exclusiveMaximum", "exclusiveMinimum"] {
        properties.insert(
            key.to_string(),
            Validator::plain(Descriptor {
                weight: -8,
                allowed: Some(Resolvable::from_fn(numeric_ish)),
                ..Descriptor::of(DefinitionType::Boolean)
            }),
        );
    }
    properties.insert(
        "multipleOf".to_string(),
        Validator::plain(Descriptor {
            weight: -8,
            allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                matches!(parent_type(walk).as_deref(), Some("integer") | Some("number"))
            })),
            ..Descriptor::of(DefinitionType::Number)
        }),
    );

    properties.insert(
        "enum".to_string(),
        Validator::plain(Descriptor {
            weight: -7,
            items: Some(Box::new(Validator::plain(Descriptor {
                kind: Some(Resolvable::from_fn(enum_item_kinds)),
                free_form: true,
                ..Descriptor::new()
            }))),
            ..Descriptor::of(DefinitionType::Array)
        }),
    );

    properties.insert(
        "properties".to_string(),
        Validator::plain(Descriptor {
            weight: -5,
            additional_properties: Some(Box::new(schema_ref())),
            allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                parent_type(walk).map(|t| t == "object").unwrap_or(true)
            })),
            ..Descriptor::of(DefinitionType::Object)
        }),
    );

    properties.insert(
        "items".to_string(),
        Validator::Ref(EnforcerRef::with_config(
            "Schema",
            Descriptor {
                allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                    parent_type(walk).map(|t| t == "array").unwrap_or(true)
                })),
                required: Some(Resolvable::from_fn(|walk: &Walk| {
                    parent_type(walk).as_deref() == Some("array")
                })),
                ..Descriptor::new()
            },
        )),
    );

    properties.insert(
        "additionalProperties".to_string(),
        Validator::Ref(EnforcerRef::with_config(
            "Schema",
            Descriptor {
                allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                    parent_type(walk).as_deref() == Some("object")
                })),
                default: Some(Resolvable::Static(Value::Bool(true))),
                ..Descriptor::typed(&[DefinitionType::Boolean, DefinitionType::Object])
            },
        )),
    );

    properties.insert(
        "required".to_string(),
        Validator::plain(Descriptor {
            weight: 1,
            items: Some(Box::new(Validator::plain(Descriptor::of(
                DefinitionType::String,
            )))),
            errors: Some(Rc::new(required_errors)),
            ..Descriptor::of(DefinitionType::Array)
        }),
    );

    properties.insert(
        "allOf".to_string(),
        Validator::plain(Descriptor {
            items: Some(Box::new(schema_ref())),
            ..Descriptor::of(DefinitionType::Array)
        }),
    );
    for key in ["anyOf", "oneOf"] {
        properties.insert(
            key.to_string(),
            Validator::plain(Descriptor {
                items: Some(Box::new(schema_ref())),
                allowed: Some(Resolvable::from_fn(|walk: &Walk| walk.version().is_v3())),
                ..Descriptor::of(DefinitionType::Array)
            }),
        );
    }
    properties.insert(
        "not".to_string(),
        Validator::Ref(EnforcerRef::with_config(
            "Schema",
            Descriptor {
                allowed: Some(Resolvable::from_fn(|walk: &Walk| walk.version().is_v3())),
                ..Descriptor::new()
            },
        )),
    );

    properties.insert(
        "discriminator".to_string(),
        Validator::dynamic(|walk: &Walk| {
            if walk.version().is_v2() {
                Validator::plain(Descriptor::of(DefinitionType::String))
            } else {
                Validator::plain(discriminator_descriptor())
            }
        }),
    );

    properties.insert(
        "pattern".to_string(),
        Validator::plain(Descriptor {
            allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                parent_type(walk).map(|t| t == "string").unwrap_or(true)
            })),
            deserialize: Some(Rc::new(|walk: &Walk, value: Materialized| {
                compile_pattern(walk, value)
            })),
            ..Descriptor::of(DefinitionType::String)
        }),
    );

    for (key, gate) in [
        ("maxLength", "string"),
        ("minLength", "string"),
        ("maxItems", "array"),
        ("minItems", "array"),
        ("maxProperties", "object"),
        ("minProperties", "object"),
    ] {
        properties.insert(
            key.to_string(),
            Validator::plain(Descriptor {
                allowed: Some(Resolvable::from_fn(move |walk: &Walk| {
                    parent_type(walk).map(|t| t == gate).unwrap_or(true)
                })),
                errors: Some(Rc::new(non_negative_integer_errors)),
                ..Descriptor::of(DefinitionType::Number)
            }),
        );
    }

    properties.insert(
        "uniqueItems".to_string(),
        Validator::plain(Descriptor {
            allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                parent_type(walk).map(|t| t == "array").unwrap_or(true)
            })),
            ..Descriptor::of(DefinitionType::Boolean)
        }),
    );

    properties.insert(
        "nullable".to_string(),
        Validator::plain(Descriptor {
            allowed: Some(Resolvable::from_fn(|walk: &Walk| walk.version().is_v3())),
            ..Descriptor::of(DefinitionType::Boolean)
        }),
    );
    properties.insert(
        "readOnly".to_string(),
        Validator::plain(Descriptor {
            errors: Some(Rc::new(read_only_errors)),
            ..Descriptor::of(DefinitionType::Boolean)
        }),
    );
    properties.insert(
        "writeOnly".to_string(),
        Validator::plain(Descriptor {
            allowed: Some(Resolvable::from_fn(|walk: &Walk| walk.version().is_v3())),
            ..Descriptor::of(DefinitionType::Boolean)
        }),
    );
    properties.insert(
        "deprecated".to_string(),
        Validator::plain(Descriptor {
            allowed: Some(Resolvable::from_fn(|walk: &Walk| walk.version().is_v3())),
            ..Descriptor::of(DefinitionType::Boolean)
        }),
    );

    properties.insert(
        "title".to_string(),
        Validator::plain(Descriptor::of(DefinitionType::String)),
    );
    properties.insert(
        "description".to_string(),
        Validator::plain(Descriptor::of(DefinitionType::String)),
    );
    // Defaults and examples take whatever shape the schema describes;
    // they are checked against the built tree after the walk.
    properties.insert(
        "default".to_string(),
        Validator::plain(Descriptor {
            free_form: true,
            ..Descriptor::new()
        }),
    );
    properties.insert(
        "example".to_string(),
        Validator::plain(Descriptor {
            free_form: true,
            ..Descriptor::new()
        }),
    );

    descriptor
}

fn bound_descriptor() -> Descriptor {
    Descriptor {
        weight: -8,
        allowed: Some(Resolvable::from_fn(numeric_ish)),
        kind: Some(Resolvable::from_fn(|walk: &Walk| {
            // Format-typed bounds (dates and the like) arrive as strings.
            match parent_type(walk).as_deref() {
                Some("integer") | Some("number") | None => vec![DefinitionType::Number],
                Some(_) => vec![DefinitionType::String, DefinitionType::Number],
            }
        })),
        errors: Some(Rc::new(|walk: &Walk| {
            let text = match walk.result.borrow().as_ref() {
                Some(Materialized::Text(text)) => text.clone(),
                _ => return,
            };
            let (Some(kind), Some(format)) = (parent_type(walk), parent_format(walk)) else {
                return;
            };
            if let Some(codec) = walk.arena.data_types.get(&kind, &format) {
                if (codec.deserialize)(&Value::String(text.clone())).is_err() {
                    walk.exception
                        .message(format!("Value is not formatted as a {}: {}", format, text));
                }
            }
        })),
        ..Descriptor::new()
    }
}

fn discriminator_descriptor() -> Descriptor {
    let mut descriptor = Descriptor::of(DefinitionType::Object);
    descriptor.properties.insert(
        "propertyName".to_string(),
        Validator::plain(Descriptor {
            required: Some(Resolvable::Static(true)),
            errors: Some(Rc::new(property_name_errors)),
            ..Descriptor::of(DefinitionType::String)
        }),
    );
    descriptor.properties.insert(
        "mapping".to_string(),
        Validator::plain(Descriptor {
            additional_properties: Some(Box::new(Validator::plain(Descriptor {
                errors: Some(Rc::new(mapping_entry_errors)),
                ..Descriptor::of(DefinitionType::String)
            }))),
            ..Descriptor::of(DefinitionType::Object)
        }),
    );
    descriptor
}

fn enum_item_kinds(walk: &Walk) -> Vec<DefinitionType> {
    let schema_walk = walk.ancestor(2);
    let declared = schema_walk
        .and_then(|w| w.result_field("type"))
        .and_then(|m| m.as_text());
    let mut kinds = match declared.as_deref() {
        Some("string") | Some("file") => vec![DefinitionType::String],
        Some("integer") | Some("number") => vec![DefinitionType::Number],
        Some("boolean") => vec![DefinitionType::Boolean],
        Some("object") => vec![DefinitionType::Object],
        Some("array") => vec![DefinitionType::Array],
        _ => vec![
            DefinitionType::Array,
            DefinitionType::Boolean,
            DefinitionType::Number,
            DefinitionType::Object,
            DefinitionType::String,
            DefinitionType::Null,
        ],
    };
    // `null` joins the permitted item types when the schema is nullable.
    if let Some(def) = schema_walk.and_then(|w| w.definition) {
        let graph = walk.arena.graph();
        for key in ["nullable", "x-nullable"] {
            if let Some(id) = definition_field(&graph, def, key) {
                if matches!(graph.node(id), DefNode::Boolean(true))
                    && !kinds.contains(&DefinitionType::Null)
                {
                    kinds.push(DefinitionType::Null);
                }
            }
        }
    }
    kinds
}

fn compile_pattern(walk: &Walk, value: Materialized) -> Materialized {
    let text = value.as_text().unwrap_or_default();
    if text.is_empty() {
        // Dual signal: the error is recorded and the value still reads as
        // a match-everything expression.
        walk.exception.message("Pattern must not be an empty string");
        return Materialized::Pattern(universal_pattern());
    }
    match Regex::new(&text) {
        Ok(regex) => Materialized::Pattern(Rc::new(regex)),
        Err(_) => {
            walk.exception.message(format!(
                "Pattern is not a valid regular expression: {}",
                text
            ));
            Materialized::Pattern(universal_pattern())
        }
    }
}

fn non_negative_integer_errors(walk: &Walk) {
    if let Some(Materialized::Number(n)) = walk.result.borrow().as_ref() {
        if n.fract() != 0.0 || *n < 0.0 {
            walk.exception.message("Value must be a non-negative integer");
        }
    }
}

fn required_errors(walk: &Walk) {
    let names: Vec<String> = match walk.result.borrow().as_ref() {
        Some(Materialized::Array(items)) => {
            items.borrow().iter().filter_map(|m| m.as_text()).collect()
        }
        _ => return,
    };
    let properties = walk.parent_field("properties");
    let additional_forbidden = matches!(
        walk.parent_field("additionalProperties"),
        Some(Materialized::Bool(false))
    );
    if !additional_forbidden {
        return;
    }
    for name in names {
        let defined = properties
            .as_ref()
            .and_then(|m| m.field(&name))
            .is_some();
        if !defined {
            walk.exception.message(format!(
                "Required property is not defined in properties: {}",
                name
            ));
        }
    }
}

fn property_name_errors(walk: &Walk) {
    let name = match walk.result.borrow().as_ref() {
        Some(Materialized::Text(name)) => name.clone(),
        _ => return,
    };
    let Some(schema_walk) = walk.ancestor(2) else {
        return;
    };
    let Some(def) = schema_walk.definition else {
        return;
    };
    let graph = walk.arena.graph();
    let in_required = definition_field(&graph, def, "required")
        .map(|id| match graph.node(id) {
            DefNode::Array(items) => items
                .iter()
                .any(|item| matches!(graph.node(*item), DefNode::Text(t) if *t == name)),
            _ => false,
        })
        .unwrap_or(false);
    if !in_required {
        walk.exception.message(format!(
            "Discriminator property is not listed as required: {}",
            name
        ));
    }
    let in_properties = definition_field(&graph, def, "properties")
        .map(|id| matches!(graph.node(id), DefNode::Object(map) if map.contains_key(&name)))
        .unwrap_or(false);
    if !in_properties {
        walk.exception.message(format!(
            "Discriminator property is not defined in properties: {}",
            name
        ));
    }
}

/// Enqueues the deferred resolution of one discriminator mapping entry.
/// The swap to a schema instance must wait until every instance exists.
fn mapping_entry_errors(walk: &Walk) {
    let target = match walk.result.borrow().as_ref() {
        Some(Materialized::Text(target)) => target.clone(),
        _ => return,
    };
    let Some(key) = walk.key.clone() else {
        return;
    };
    let plugin_walk = walk.clone();
    walk.arena.plugin(Box::new(move || {
        resolve_mapping_entry(&plugin_walk, &key, &target);
    }));
}

fn resolve_mapping_entry(walk: &Walk, key: &str, target: &str) {
    let arena = &walk.arena;
    let pointer = if target.contains('/') {
        target.to_string()
    } else if arena.version.is_v2() {
        format!("#/definitions/{}", target)
    } else {
        format!("#/components/schemas/{}", target)
    };
    let resolved = arena
        .document_root()
        .and_then(|root| arena.graph().resolve_pointer(root, &pointer));
    let Some(def) = resolved else {
        walk.exception
            .message(format!("Reference cannot be resolved: {}", target));
        return;
    };

    let instance = match arena.instance_for_def(def) {
        Some(id) => Some(id),
        None => {
            // The mapping points at a schema outside the normalized
            // subtree; materialize it now so the mapping holds a real
            // instance.
            let mut side = walk.clone();
            side.definition = Some(def);
            side.definition_type = arena.graph().definition_type(Some(def));
            side.validator = Validator::Ref(EnforcerRef::new("Schema"));
            side.result = Rc::new(RefCell::new(None));
            match run_child_validator(&side) {
                Some(Materialized::Enforcer(id)) => Some(id),
                _ => None,
            }
        }
    };
    let Some(instance) = instance else {
        walk.exception
            .message(format!("Reference cannot be resolved: {}", target));
        return;
    };

    if let Some(parent) = walk.parent.as_deref() {
        if let Some(Materialized::Map(map)) = parent.result.borrow().as_ref() {
            map.borrow_mut()
                .insert(key.to_string(), Materialized::Enforcer(instance));
        }
    }
}

fn read_only_errors(walk: &Walk) {
    if !walk.version().is_v2() {
        return;
    }
    if walk.result.borrow().as_ref().and_then(|m| m.as_bool()) != Some(true) {
        return;
    }
    let Some(own_schema) = walk.ancestor(1) else {
        return;
    };
    let Some(property_key) = own_schema.key.clone() else {
        return;
    };
    if walk.ancestor(2).and_then(|w| w.key.clone()).as_deref() != Some("properties") {
        return;
    }
    let Some(parent_def) = walk.ancestor(3).and_then(|w| w.definition) else {
        return;
    };
    let graph = walk.arena.graph();
    let is_required = definition_field(&graph, parent_def, "required")
        .map(|id| match graph.node(id) {
            DefNode::Array(items) => items
                .iter()
                .any(|item| matches!(graph.node(*item), DefNode::Text(t) if *t == property_key)),
            _ => false,
        })
        .unwrap_or(false);
    if is_required {
        walk.warn
            .message("Property should not be marked as both readOnly and required");
    }
}

/////////////////////////////////////// schema cross-field errors //////////////////////////////////

fn schema_errors(walk: &Walk) {
    let result = match walk.result.borrow().as_ref() {
        Some(result) => result.clone(),
        None => return,
    };

    let composites: Vec<&str> = COMPOSITE_KEYS
        .iter()
        .copied()
        .filter(|key| result.field(key).is_some())
        .collect();
    if composites.len() > 1 {
        walk.exception.message(format!(
            "Cannot have multiple composites: {}",
            composites.join(", ")
        ));
    }

    let kind = result.field("type").and_then(|m| m.as_text());
    let format = result.field("format").and_then(|m| m.as_text());
    let bound = |key: &str| -> Option<f64> {
        match result.field(key)? {
            Materialized::Number(n) => Some(n),
            Materialized::Text(text) => {
                let codec = walk
                    .arena
                    .data_types
                    .get(kind.as_deref()?, format.as_deref()?)?;
                (codec.deserialize)(&Value::String(text)).ok()?.numeric()
            }
            _ => None,
        }
    };
    if let (Some(min), Some(max)) = (bound("minimum"), bound("maximum")) {
        let exclusive = result
            .field("exclusiveMinimum")
            .and_then(|m| m.as_bool())
            .unwrap_or(false)
            || result
                .field("exclusiveMaximum")
                .and_then(|m| m.as_bool())
                .unwrap_or(false);
        if min > max {
            walk.exception
                .message("Property minimum must be less than or equal to maximum");
        } else if min == max && exclusive {
            walk.exception
                .message("Property minimum must be less than maximum when an exclusive flag is set");
        }
    }
    for (low, high) in [
        ("minItems", "maxItems"),
        ("minLength", "maxLength"),
        ("minProperties", "maxProperties"),
    ] {
        let low_value = result.field(low).and_then(|m| m.as_number());
        let high_value = result.field(high).and_then(|m| m.as_number());
        if let (Some(low_value), Some(high_value)) = (low_value, high_value) {
            if low_value > high_value {
                walk.exception.message(format!(
                    "Property {} must be less than or equal to {}",
                    low, high
                ));
            }
        }
    }

    if let Some(max_properties) = result.field("maxProperties").and_then(|m| m.as_number()) {
        let required_count = match result.field("required") {
            Some(Materialized::Array(items)) => items.borrow().len(),
            _ => 0,
        };
        if required_count as f64 > max_properties {
            walk.exception
                .message("The number of required properties exceeds maxProperties");
        }
    }

    let read_only = result.field("readOnly").and_then(|m| m.as_bool()).unwrap_or(false);
    let write_only = result
        .field("writeOnly")
        .and_then(|m| m.as_bool())
        .unwrap_or(false);
    if read_only && write_only {
        walk.exception
            .message("Schema cannot be marked as both readOnly and writeOnly");
    }
}

//////////////////////////////////////////// schema init ///////////////////////////////////////////

/// Freezes `enum`/`default`/`example` and defers their deserialization
/// and validation until the whole tree exists.
fn schema_init(arena: &Rc<Arena>, id: EnforcerId, walk: &Walk) {
    let instance = arena.instance(id);
    let mut has_checked_values = false;
    for key in ["enum", "default", "example"] {
        let rendered = instance
            .fields
            .borrow()
            .get(key)
            .map(|value| value.to_json(arena));
        if let Some(value) = rendered {
            instance
                .fields
                .borrow_mut()
                .insert(key.to_string(), Materialized::Frozen(Rc::new(value)));
            has_checked_values = true;
        }
    }
    if !has_checked_values {
        return;
    }

    let captured = Rc::clone(arena);
    let exception = walk.exception.clone();
    let warn = walk.warn.clone();
    arena.plugin(Box::new(move || {
        let node = SchemaNode::new(Rc::clone(&captured), id);
        if let Some(default) = node.default_value() {
            check_frozen_value(&node, &default, &exception.at("default"));
        }
        if let Some(values) = node.enum_values() {
            let scope = exception.at("enum");
            for (index, value) in values.iter().enumerate() {
                check_frozen_value(&node, value, &scope.at(index.to_string()));
            }
        }
        if let Some(example) = node.example() {
            // Example mismatches are advisory.
            check_frozen_value(&node, &example, &warn.at("example"));
        }
    }));
}

fn check_frozen_value(node: &SchemaNode, raw: &Value, scope: &ExceptionScope) {
    let mut seen = Vec::new();
    if let Some(typed) = crate::serialize::deserialize_node(node, raw, scope, &mut seen) {
        crate::validate::validate_node(node, &typed, scope, &mut Vec::new());
    }
}
