//! # Validator-driven normalization
//!
//! The normalizer walks a raw definition under a validator descriptor and
//! produces the materialized enforcer tree. It is a best-effort engine:
//! every violation is attached to the exception tree at the offending
//! path and the walk continues, so a single pass surfaces as many issues
//! as the input contains. Nothing in this module returns early with an
//! `Err`; an unproducible node simply materializes to nothing.
//!
//! The object lifecycle evaluates properties in a deterministic order:
//! ascending by the property validator's weight, ties broken by key name.
//! Low-weight properties (`type`, `format`) land in the partial result
//! first, so later validators can read them through the parent
//! back-reference.
//!
//! Callbacks that panic are caught and recorded as "Unexpected error
//! encountered" at the current path, unless the arena's `debug_rethrow`
//! flag asks for propagation.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use log::debug;

use crate::definition::{DefGraph, DefId, DefinitionType};
use crate::descriptor::{Descriptor, EnforcerRef, Validator};
use crate::walk::{Materialized, ValidatorKey, Walk};

/// Runs a callback, converting a panic into an exception message at the
/// walk's current path.
pub(crate) fn guarded<T>(walk: &Walk, callback: impl FnOnce() -> T) -> Option<T> {
    if walk.arena.debug_rethrow {
        return Some(callback());
    }
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
                .unwrap_or_else(|| "panic".to_string());
            walk.exception
                .message(format!("Unexpected error encountered: {}", detail));
            None
        }
    }
}

/// Resolves a dynamic validator chain down to a concrete validator.
fn resolve_validator(walk: &Walk) -> Option<Validator> {
    let mut validator = walk.validator.clone();
    loop {
        match validator {
            Validator::Dynamic(callback) => {
                validator = guarded(walk, || callback(walk))?;
            }
            other => return Some(other),
        }
    }
}

/// Normalizes the root of a definition and drains the deferred-plugin
/// queue once the whole tree has materialized.
pub fn normalize_root(walk: &Walk) -> Option<Materialized> {
    debug!(
        "normalizing definition against {:?} for version {}",
        walk.validator,
        walk.version()
    );
    let result = run_child_validator(walk);
    walk.arena.drain_plugins();
    result
}

/// The dispatch rule between plain descriptors and component
/// instantiation.
pub(crate) fn run_child_validator(walk: &Walk) -> Option<Materialized> {
    let validator = resolve_validator(walk)?;
    match &validator {
        Validator::Ref(reference) => match walk.definition_type {
            DefinitionType::Boolean => {
                let inline = reference
                    .config
                    .clone()
                    .map(Validator::Plain)
                    .unwrap_or(Validator::Unchecked);
                normalize(&walk.with_validator(inline))
            }
            DefinitionType::Object => instantiate_component(walk, reference),
            DefinitionType::Undefined => None,
            _ => {
                walk.exception.message(format!(
                    "Value must be a plain object, got {}",
                    walk.definition_type
                ));
                None
            }
        },
        Validator::Unchecked => {
            let def = walk.definition?;
            let graph = walk.arena.graph();
            let mut seen = HashMap::new();
            Some(deep_copy(&graph, def, &mut seen))
        }
        _ => normalize(&walk.with_validator(validator)),
    }
}

/// Single entry point of the recursive walker; produces the node's
/// materialized result.
pub(crate) fn normalize(walk: &Walk) -> Option<Materialized> {
    let validator = resolve_validator(walk)?;
    if let Validator::Ref(_) = validator {
        return run_child_validator(&walk.with_validator(validator));
    }
    let attrs = validator.attributes();

    // Type check.
    if walk.definition.is_some() {
        if let Some(kind) = attrs.as_ref().and_then(|a| a.kind.clone()) {
            let kinds = guarded(walk, || kind.resolve(walk))?;
            if !kinds.contains(&walk.definition_type) {
                let expected = kinds
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(" or ");
                walk.exception.message(format!(
                    "Type mismatch: expected {}, got {}",
                    expected, walk.definition_type
                ));
                return None;
            }
        }
    }

    // Cycle guard: a container definition already materialized under this
    // validator resolves to the first-seen result.
    let cache_key = ValidatorKey::of(&validator);
    if matches!(
        walk.definition_type,
        DefinitionType::Object | DefinitionType::Array
    ) {
        if let (Some(def), Some(key)) = (walk.definition, cache_key.as_ref()) {
            if let Some(cached) = walk.arena.cache_get(def, key) {
                return Some(cached);
            }
        }
    }

    // Enum check.
    if let (Some(def), Some(enum_values)) = (
        walk.definition,
        attrs.as_ref().and_then(|a| a.enum_values.clone()),
    ) {
        let allowed = guarded(walk, || enum_values.resolve(walk))?;
        let matched = {
            let graph = walk.arena.graph();
            allowed.iter().any(|value| graph.matches_json(def, value))
        };
        if !matched {
            let received = walk
                .definition_json()
                .map(|v| v.to_string())
                .unwrap_or_default();
            let options = allowed
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            walk.exception.message(format!(
                "Enum mismatch: {} is not one of: {}",
                received, options
            ));
            return None;
        }
    }

    // Dispatch on the definition's shape.
    let result = match walk.definition_type {
        DefinitionType::Array => normalize_array(walk, &validator, cache_key),
        DefinitionType::Object => normalize_object(walk, &validator, cache_key),
        DefinitionType::Boolean | DefinitionType::Number | DefinitionType::String
        | DefinitionType::Null => walk.definition.map(|def| {
            let graph = walk.arena.graph();
            scalar_of(&graph, def)
        }),
        DefinitionType::Undefined => None,
    };

    *walk.result.borrow_mut() = result.clone();

    // Cross-field checks over the materialized result.
    if result.is_some() {
        if let Some(errors) = attrs.as_ref().and_then(|a| a.errors.clone()) {
            guarded(walk, || errors(walk));
        }
    }

    result
}

fn scalar_of(graph: &DefGraph, def: DefId) -> Materialized {
    match graph.node(def) {
        crate::definition::DefNode::Null => Materialized::Null,
        crate::definition::DefNode::Boolean(b) => Materialized::Bool(*b),
        crate::definition::DefNode::Number(n) => Materialized::Number(*n),
        crate::definition::DefNode::Text(s) => Materialized::Text(s.clone()),
        other => unreachable!("scalar_of on container node: {:?}", other),
    }
}

/// Deep-copies a definition subtree into a materialized tree, collapsing
/// shared references and cycles onto shared results.
fn deep_copy(graph: &DefGraph, def: DefId, seen: &mut HashMap<DefId, Materialized>) -> Materialized {
    if let Some(existing) = seen.get(&def) {
        return existing.clone();
    }
    match graph.node(def) {
        crate::definition::DefNode::Array(items) => {
            let result = Materialized::empty_array();
            seen.insert(def, result.clone());
            let ids = items.clone();
            if let Materialized::Array(target) = &result {
                for item in ids {
                    let copied = deep_copy(graph, item, seen);
                    target.borrow_mut().push(copied);
                }
            }
            result
        }
        crate::definition::DefNode::Object(map) => {
            let result = Materialized::empty_map();
            seen.insert(def, result.clone());
            let entries = map.clone();
            if let Materialized::Map(target) = &result {
                for (key, item) in entries {
                    let copied = deep_copy(graph, item, seen);
                    target.borrow_mut().insert(key, copied);
                }
            }
            result
        }
        _ => scalar_of(graph, def),
    }
}

fn normalize_array(
    walk: &Walk,
    validator: &Validator,
    cache_key: Option<ValidatorKey>,
) -> Option<Materialized> {
    let def = walk.definition?;
    let items_validator = match validator {
        Validator::Plain(descriptor) => descriptor
            .items
            .as_deref()
            .cloned()
            .unwrap_or(Validator::Unchecked),
        _ => Validator::Unchecked,
    };

    let result = Materialized::empty_array();
    if let Some(key) = cache_key {
        walk.arena.cache_put(def, key, result.clone());
    }
    *walk.result.borrow_mut() = Some(result.clone());

    let elements = match walk.arena.graph().node(def) {
        crate::definition::DefNode::Array(items) => items.clone(),
        _ => return Some(result),
    };
    for (index, element) in elements.iter().enumerate() {
        let child = walk.child(Some(*element), &index.to_string(), items_validator.clone());
        let value = run_child_validator(&child).unwrap_or(Materialized::Null);
        if let Materialized::Array(target) = &result {
            target.borrow_mut().push(value);
        }
    }
    Some(result)
}

fn normalize_object(
    walk: &Walk,
    validator: &Validator,
    cache_key: Option<ValidatorKey>,
) -> Option<Materialized> {
    let def = walk.definition?;
    match validator {
        Validator::FreeForm | Validator::Unchecked => {
            let graph = walk.arena.graph();
            let mut seen = HashMap::new();
            let result = deep_copy(&graph, def, &mut seen);
            drop(graph);
            if let Some(key) = cache_key {
                walk.arena.cache_put(def, key, result.clone());
            }
            Some(result)
        }
        Validator::Forbidden => {
            let keys: Vec<String> = match walk.arena.graph().node(def) {
                crate::definition::DefNode::Object(map) => map.keys().cloned().collect(),
                _ => Vec::new(),
            };
            for key in keys {
                walk.exception
                    .message(format!("Property not allowed: {}", key));
            }
            None
        }
        Validator::Plain(descriptor) if descriptor.free_form => {
            let graph = walk.arena.graph();
            let mut seen = HashMap::new();
            let result = deep_copy(&graph, def, &mut seen);
            drop(graph);
            if let Some(key) = cache_key {
                walk.arena.cache_put(def, key, result.clone());
            }
            Some(result)
        }
        Validator::Plain(descriptor) => {
            normalize_structured(walk, descriptor, def, cache_key)
        }
        Validator::Ref(_) | Validator::Dynamic(_) => run_child_validator(walk),
    }
}

/// The structured-object lifecycle: extension extraction, weighted
/// property ordering, allowed/default/ignored/required handling, and
/// unknown-key reporting.
fn normalize_structured(
    walk: &Walk,
    descriptor: &Descriptor,
    def: DefId,
    cache_key: Option<ValidatorKey>,
) -> Option<Materialized> {
    let entries: BTreeMap<String, DefId> = match walk.arena.graph().node(def) {
        crate::definition::DefNode::Object(map) => map.clone(),
        _ => return None,
    };

    let result = Materialized::empty_map();
    if let Some(key) = cache_key {
        walk.arena.cache_put(def, key, result.clone());
    }
    *walk.result.borrow_mut() = Some(result.clone());
    let target = match &result {
        Materialized::Map(map) => Rc::clone(map),
        _ => return None,
    };

    // Extension keys copy through verbatim.
    let mut unknown: Vec<String> = Vec::new();
    for (key, child_def) in &entries {
        if is_extension_key(key) {
            let graph = walk.arena.graph();
            let mut seen = HashMap::new();
            let copied = deep_copy(&graph, *child_def, &mut seen);
            drop(graph);
            target.borrow_mut().insert(key.clone(), copied);
        } else {
            unknown.push(key.clone());
        }
    }

    // Ordered property list: ascending weight, ties by key name.
    let mut ordered: Vec<(i32, String, Validator)> = descriptor
        .properties
        .iter()
        .map(|(key, property)| {
            let weight = property.attributes().map(|a| a.weight).unwrap_or(0);
            (weight, key.clone(), property.clone())
        })
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    for (_, key, _) in &ordered {
        unknown.retain(|k| k != key);
    }

    let mut not_allowed: Vec<String> = Vec::new();
    let mut missing_required: Vec<String> = Vec::new();

    for (_, key, property) in ordered {
        let child_def = entries.get(&key).copied();
        let child = walk.child(child_def, &key, property);
        let Some(resolved) = resolve_validator(&child) else {
            continue;
        };
        let child = child.with_validator(resolved.clone());
        let attrs = resolved.attributes();

        let allowed = match attrs.as_ref().and_then(|a| a.allowed.clone()) {
            Some(flag) => guarded(&child, || flag.resolve(&child)).unwrap_or(false),
            None => true,
        };

        if child_def.is_some() {
            if !allowed {
                not_allowed.push(key);
                continue;
            }
            let ignored = match attrs.as_ref().and_then(|a| a.ignored.clone()) {
                Some(flag) => guarded(&child, || flag.resolve(&child)).unwrap_or(false),
                None => false,
            };
            if ignored {
                continue;
            }
            if let Some(value) = child_result(&child, attrs.as_deref()) {
                target.borrow_mut().insert(key, value);
            }
        } else if allowed {
            if let Some(default) = attrs.as_ref().and_then(|a| a.default.clone()) {
                if let Some(value) = guarded(&child, || default.resolve(&child)) {
                    let default_def = walk.arena.graph_mut().load_json(&value);
                    let child = walk.child(Some(default_def), &key, resolved);
                    if let Some(materialized) = child_result(&child, attrs.as_deref()) {
                        target.borrow_mut().insert(key, materialized);
                    }
                }
            } else {
                let required = match attrs.as_ref().and_then(|a| a.required.clone()) {
                    Some(flag) => guarded(&child, || flag.resolve(&child)).unwrap_or(false),
                    None => false,
                };
                if required {
                    missing_required.push(key);
                }
            }
        }
    }

    // Unknown keys either flow through additionalProperties or are
    // violations.
    unknown.sort();
    if let Some(additional) = &descriptor.additional_properties {
        for key in unknown {
            let child_def = entries.get(&key).copied();
            let child = walk.child(child_def, &key, (**additional).clone());
            let Some(resolved) = resolve_validator(&child) else {
                continue;
            };
            let child = child.with_validator(resolved.clone());
            let attrs = resolved.attributes();
            let allowed = match attrs.as_ref().and_then(|a| a.allowed.clone()) {
                Some(flag) => guarded(&child, || flag.resolve(&child)).unwrap_or(false),
                None => true,
            };
            if !allowed {
                not_allowed.push(key);
                continue;
            }
            let ignored = match attrs.as_ref().and_then(|a| a.ignored.clone()) {
                Some(flag) => guarded(&child, || flag.resolve(&child)).unwrap_or(false),
                None => false,
            };
            if ignored {
                continue;
            }
            if let Some(value) = child_result(&child, attrs.as_deref()) {
                target.borrow_mut().insert(key, value);
            }
        }
    } else {
        not_allowed.extend(unknown);
    }

    if !not_allowed.is_empty() {
        not_allowed.sort();
        walk.exception.message(property_list_message(
            "Property not allowed",
            "Properties not allowed",
            &not_allowed,
        ));
    }
    if !missing_required.is_empty() {
        missing_required.sort();
        walk.exception.message(property_list_message(
            "Missing required property",
            "Missing required properties",
            &missing_required,
        ));
    }

    Some(result)
}

/// Runs the child validator, then the descriptor's `deserialize` rewrite.
fn child_result(child: &Walk, attrs: Option<&Descriptor>) -> Option<Materialized> {
    let value = run_child_validator(child)?;
    if let Some(deserialize) = attrs.and_then(|a| a.deserialize.clone()) {
        return guarded(child, || deserialize(child, value.clone())).or(Some(value));
    }
    Some(value)
}

fn instantiate_component(walk: &Walk, reference: &EnforcerRef) -> Option<Materialized> {
    let def = walk.definition?;
    let cache_key = ValidatorKey::Ref(reference.component.clone());
    if let Some(cached) = walk.arena.cache_get(def, &cache_key) {
        return Some(cached);
    }
    let Some(spec) = walk.arena.component(&reference.component) else {
        walk.exception
            .message(format!("Unknown component: {}", reference.component));
        return None;
    };

    // The instance exists, and is cached, before its children normalize:
    // a definition that reaches back to itself resolves to this same
    // instance.
    let id = walk
        .arena
        .alloc_instance(spec.name, def, walk.exception.path().to_vec());
    walk.arena
        .cache_put(def, cache_key, Materialized::Enforcer(id));

    let component_validator = guarded(walk, || (spec.validator)(walk))?;
    let component_walk = walk.with_validator(component_validator);
    let normalized = normalize(&component_walk);

    if let Some(Materialized::Map(map)) = &normalized {
        let instance = walk.arena.instance(id);
        let mut fields = instance.fields.borrow_mut();
        for (key, value) in map.borrow().iter() {
            fields.insert(key.clone(), value.clone());
        }
    }

    if let Some(init) = &spec.init {
        let arena = Rc::clone(&walk.arena);
        guarded(walk, || init(&arena, id, &component_walk));
    }

    Some(Materialized::Enforcer(id))
}

fn is_extension_key(key: &str) -> bool {
    key.len() > 2 && key.starts_with("x-")
}

fn property_list_message(singular: &str, plural: &str, keys: &[String]) -> String {
    if keys.len() == 1 {
        format!("{}: {}", singular, keys[0])
    } else {
        format!("{}: {}", plural, keys.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DefGraph;
    use crate::descriptor::Resolvable;
    use crate::exception::ExceptionScope;
    use crate::version::Version;
    use crate::walk::{Arena, ComponentSpec};
    use serde_json::{json, Value};

    fn widget_registry() -> BTreeMap<String, Rc<ComponentSpec>> {
        // A minimal component: objects with a required string `name`, an
        // optional self-reference, and a defaulted `kind`.
        let mut components = BTreeMap::new();
        components.insert(
            "Widget".to_string(),
            Rc::new(ComponentSpec {
                name: "Widget",
                validator: Rc::new(|_walk: &Walk| {
                    let mut descriptor = Descriptor::of(DefinitionType::Object);
                    descriptor.properties.insert(
                        "name".to_string(),
                        Validator::plain(Descriptor {
                            required: Some(Resolvable::Static(true)),
                            ..Descriptor::of(DefinitionType::String)
                        }),
                    );
                    descriptor.properties.insert(
                        "kind".to_string(),
                        Validator::plain(Descriptor {
                            default: Some(Resolvable::Static(json!("basic"))),
                            ..Descriptor::of(DefinitionType::String)
                        }),
                    );
                    descriptor.properties.insert(
                        "child".to_string(),
                        Validator::Ref(EnforcerRef::new("Widget")),
                    );
                    Validator::plain(descriptor)
                }),
                init: None,
            }),
        );
        components
    }

    fn run(doc: Value, validator: Validator) -> (Option<Materialized>, Walk) {
        let mut graph = DefGraph::new();
        let root = graph.load_json(&doc);
        let arena = Rc::new(Arena::new(graph, Version::V3_0_3, widget_registry()));
        let walk = Walk::root(
            arena,
            root,
            validator,
            ExceptionScope::new("errors"),
            ExceptionScope::new("warnings"),
        );
        let result = normalize_root(&walk);
        (result, walk)
    }

    #[test]
    fn scalar_passthrough() {
        let (result, walk) = run(json!("hello"), Validator::plain(Descriptor::new()));
        assert!(matches!(result, Some(Materialized::Text(ref s)) if s == "hello"));
        assert!(!walk.exception.has_exception());
    }

    #[test]
    fn type_mismatch_aborts_node() {
        let validator = Validator::plain(Descriptor::of(DefinitionType::Number));
        let (result, walk) = run(json!("hello"), validator);
        assert!(result.is_none());
        let tree = walk.exception.to_tree();
        assert!(tree.messages()[0].contains("Type mismatch: expected number, got string"));
    }

    #[test]
    fn enum_mismatch_reports_options() {
        let validator = Validator::plain(Descriptor {
            enum_values: Some(Resolvable::Static(vec![json!("a"), json!("b")])),
            ..Descriptor::of(DefinitionType::String)
        });
        let (result, walk) = run(json!("c"), validator);
        assert!(result.is_none());
        assert!(walk.exception.to_tree().messages()[0].contains("Enum mismatch"));
    }

    #[test]
    fn structured_object_reports_unknown_and_missing() {
        let (result, walk) = run(
            json!({"bogus": 1, "x-internal": true}),
            Validator::Ref(EnforcerRef::new("Widget")),
        );
        assert!(matches!(result, Some(Materialized::Enforcer(_))));
        let tree = walk.exception.to_tree();
        assert!(tree.messages().iter().any(|m| m == "Property not allowed: bogus"));
        assert!(tree
            .messages()
            .iter()
            .any(|m| m == "Missing required property: name"));
    }

    #[test]
    fn extension_keys_copy_verbatim() {
        let (result, walk) = run(
            json!({"name": "a", "x-meta": {"nested": [1, 2]}}),
            Validator::Ref(EnforcerRef::new("Widget")),
        );
        assert!(!walk.exception.has_exception());
        let Some(Materialized::Enforcer(id)) = result else {
            panic!("expected enforcer");
        };
        let meta = walk.arena.field(id, "x-meta").unwrap();
        assert_eq!(
            meta.to_json(&walk.arena),
            json!({"nested": [1, 2]})
        );
    }

    #[test]
    fn defaults_are_synthesized_and_normalized() {
        let (result, walk) = run(
            json!({"name": "a"}),
            Validator::Ref(EnforcerRef::new("Widget")),
        );
        assert!(!walk.exception.has_exception());
        let Some(Materialized::Enforcer(id)) = result else {
            panic!("expected enforcer");
        };
        let kind = walk.arena.field(id, "kind").and_then(|m| m.as_text());
        assert_eq!(kind.as_deref(), Some("basic"));
    }

    #[test]
    fn nested_components_materialize() {
        let (result, walk) = run(
            json!({"name": "parent", "child": {"name": "leaf"}}),
            Validator::Ref(EnforcerRef::new("Widget")),
        );
        assert!(!walk.exception.has_exception());
        let Some(Materialized::Enforcer(id)) = result else {
            panic!("expected enforcer");
        };
        let Some(Materialized::Enforcer(child)) = walk.arena.field(id, "child") else {
            panic!("expected child enforcer");
        };
        let name = walk.arena.field(child, "name").and_then(|m| m.as_text());
        assert_eq!(name.as_deref(), Some("leaf"));
    }

    #[test]
    fn cyclic_definition_collapses_to_shared_instance() {
        let mut graph = DefGraph::new();
        let root = graph.alloc_object();
        let name = graph.alloc_text("looper");
        graph.set_property(root, "name", name);
        graph.set_property(root, "child", root);

        let arena = Rc::new(Arena::new(graph, Version::V3_0_3, widget_registry()));
        let walk = Walk::root(
            Rc::clone(&arena),
            root,
            Validator::Ref(EnforcerRef::new("Widget")),
            ExceptionScope::new("errors"),
            ExceptionScope::new("warnings"),
        );
        let result = normalize_root(&walk);
        assert!(!walk.exception.has_exception());
        let Some(Materialized::Enforcer(id)) = result else {
            panic!("expected enforcer");
        };
        let Some(Materialized::Enforcer(child)) = arena.field(id, "child") else {
            panic!("expected child enforcer");
        };
        assert_eq!(id, child);
    }

    #[test]
    fn forbidden_validator_rejects_every_key() {
        let mut descriptor = Descriptor::of(DefinitionType::Object);
        descriptor
            .properties
            .insert("config".to_string(), Validator::Forbidden);
        let (_, walk) = run(json!({"config": {"a": 1, "b": 2}}), Validator::plain(descriptor));
        let tree = walk.exception.to_tree();
        let node = tree.nested(&["config"]).unwrap();
        assert_eq!(node.messages().len(), 2);
        assert!(node.messages()[0].contains("Property not allowed"));
    }

    #[test]
    fn free_form_objects_deep_copy() {
        let (result, walk) = run(json!({"anything": {"goes": [1, null]}}), Validator::FreeForm);
        assert!(!walk.exception.has_exception());
        let rendered = result.unwrap().to_json(&walk.arena);
        assert_eq!(rendered, json!({"anything": {"goes": [1, null]}}));
    }

    #[test]
    fn weight_ordering_lets_later_validators_see_earlier_results() {
        // `first` (weight -10) lands in the parent result before `second`
        // (weight 0) resolves its allowed flag from it.
        let mut descriptor = Descriptor::of(DefinitionType::Object);
        descriptor.properties.insert(
            "first".to_string(),
            Validator::plain(Descriptor {
                weight: -10,
                ..Descriptor::of(DefinitionType::String)
            }),
        );
        descriptor.properties.insert(
            "second".to_string(),
            Validator::plain(Descriptor {
                allowed: Some(Resolvable::from_fn(|walk: &Walk| {
                    walk.parent_field("first")
                        .and_then(|m| m.as_text())
                        .map(|s| s == "on")
                        .unwrap_or(false)
                })),
                ..Descriptor::of(DefinitionType::String)
            }),
        );

        let (_, walk) = run(
            json!({"first": "on", "second": "ok"}),
            Validator::plain(descriptor.clone()),
        );
        assert!(!walk.exception.has_exception());

        let (_, walk) = run(
            json!({"first": "off", "second": "ok"}),
            Validator::plain(descriptor),
        );
        let tree = walk.exception.to_tree();
        assert!(tree.messages()[0].contains("Property not allowed: second"));
    }

    #[test]
    fn dynamic_validator_panics_are_recorded() {
        let validator = Validator::dynamic(|_walk: &Walk| panic!("validator exploded"));
        let (result, walk) = run(json!({"a": 1}), validator);
        assert!(result.is_none());
        let tree = walk.exception.to_tree();
        assert!(tree.messages()[0].contains("Unexpected error encountered"));
        assert!(tree.messages()[0].contains("validator exploded"));
    }

    #[test]
    fn array_items_recurse_and_keep_alignment() {
        let validator = Validator::plain(Descriptor {
            items: Some(Box::new(Validator::plain(Descriptor::of(
                DefinitionType::Number,
            )))),
            ..Descriptor::of(DefinitionType::Array)
        });
        let (result, walk) = run(json!([1, "bad", 3]), validator);
        let Some(Materialized::Array(items)) = result else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 3);
        assert!(walk.exception.to_tree().nested(&["1"]).unwrap().has_exception());
    }
}
