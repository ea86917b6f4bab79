//! # Value population
//!
//! Recursively synthesizes a value against a schema from a parameter map.
//! Three extension keys drive population: `x-variable` substitutes a
//! parameter directly, `x-template` expands a template string, and
//! `x-condition` gates population on a parameter being truthy. Schema
//! defaults fill remaining holes, optionally expanding templates inside
//! defaults.
//!
//! Template expansion is handled by an injector selected through
//! [`Replacement`]: `:name`, `{name}`, or `{{name}}`. Injection is a
//! single left-to-right pass; substituted text is never rescanned, and
//! unresolved references stay verbatim.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exception::ExceptionScope;
use crate::outcome::Outcome;
use crate::schema::SchemaNode;
use crate::value::TypedValue;
use crate::walk::EnforcerId;

//////////////////////////////////////////// Replacement ///////////////////////////////////////////

/// The template-parameter syntax an injector recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Replacement {
    /// `{name}`
    #[default]
    Handlebar,
    /// `{{name}}`
    DoubleHandlebar,
    /// `:name`
    Colon,
}

impl Replacement {
    fn regex(&self) -> &'static Regex {
        static HANDLEBAR: OnceLock<Regex> = OnceLock::new();
        static DOUBLE: OnceLock<Regex> = OnceLock::new();
        static COLON: OnceLock<Regex> = OnceLock::new();
        match self {
            Replacement::Handlebar => HANDLEBAR.get_or_init(|| {
                Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("handlebar pattern is valid")
            }),
            Replacement::DoubleHandlebar => DOUBLE.get_or_init(|| {
                Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}")
                    .expect("double handlebar pattern is valid")
            }),
            Replacement::Colon => COLON.get_or_init(|| {
                Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("colon pattern is valid")
            }),
        }
    }
}

/// Replaces each parameter reference in `template` with its value from
/// `params`, leaving unresolved references verbatim.
///
/// # Examples
/// ```
/// use oas_enforcer::{inject, Replacement};
/// use serde_json::json;
/// use std::collections::BTreeMap;
///
/// let mut params = BTreeMap::new();
/// params.insert("name".to_string(), json!("Ada"));
/// assert_eq!(inject(":name and :other", &params, Replacement::Colon), "Ada and :other");
/// ```
pub fn inject(template: &str, params: &BTreeMap<String, Value>, replacement: Replacement) -> String {
    replacement
        .regex()
        .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
            Some(value) => param_to_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn param_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

////////////////////////////////////////// PopulateOptions /////////////////////////////////////////

/// Options accepted by [`SchemaNode::populate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PopulateOptions {
    /// Operate on a clone of the supplied value.
    pub copy: bool,
    /// Honor `x-condition` predicates.
    pub conditions: bool,
    /// Fill in schema defaults.
    pub defaults: bool,
    /// Allow templates inside defaults.
    pub template_defaults: bool,
    /// Expand templates in string values.
    pub templates: bool,
    /// Substitute parameter names via `x-variable`.
    pub variables: bool,
    /// Maximum recursion depth.
    pub depth: u32,
    /// The injector to use for templates.
    pub replacement: Replacement,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        PopulateOptions {
            copy: false,
            conditions: true,
            defaults: true,
            template_defaults: true,
            templates: true,
            variables: true,
            depth: 100,
            replacement: Replacement::Handlebar,
        }
    }
}

////////////////////////////////////////////// populate ////////////////////////////////////////////

pub(crate) fn populate(
    schema: &SchemaNode,
    params: &BTreeMap<String, Value>,
    value: Option<TypedValue>,
    options: &PopulateOptions,
) -> Outcome<TypedValue> {
    let exception = ExceptionScope::new("One or more errors exist in the value");
    let warn = ExceptionScope::new("One or more warnings exist in the value");
    let result = populate_node(schema, params, value, options, options.depth, &mut Vec::new());
    Outcome::from_scopes(result, exception, warn)
}

fn populate_node(
    schema: &SchemaNode,
    params: &BTreeMap<String, Value>,
    value: Option<TypedValue>,
    options: &PopulateOptions,
    depth: u32,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    if depth == 0 || seen.contains(&schema.id) {
        return value;
    }
    seen.push(schema.id);
    let result = populate_inner(schema, params, value, options, depth, seen);
    seen.pop();
    result
}

fn populate_inner(
    schema: &SchemaNode,
    params: &BTreeMap<String, Value>,
    value: Option<TypedValue>,
    options: &PopulateOptions,
    depth: u32,
    seen: &mut Vec<EnforcerId>,
) -> Option<TypedValue> {
    if options.conditions {
        if let Some(Value::String(condition)) = schema.extension("x-condition") {
            if !truthy(params.get(&condition)) {
                return value;
            }
        }
    }

    // Composites apply in place over the same value position.
    if let Some(branches) = schema.all_of() {
        let mut current = value;
        for branch in &branches {
            current = populate_node(branch, params, current, options, depth, seen);
        }
        return current;
    }
    if schema.one_of().is_some() || schema.any_of().is_some() {
        if let Some(current) = &value {
            if let Some(target) = schema.discriminate(current).value {
                if target.id != schema.id {
                    return populate_node(&target, params, value, options, depth, seen);
                }
            }
        }
        return value;
    }

    let mut value = value;
    if value.is_none() && options.variables {
        if let Some(Value::String(name)) = schema.extension("x-variable") {
            if let Some(param) = params.get(&name) {
                value = Some(TypedValue::from_json(param));
            }
        }
    }
    if value.is_none() && options.templates {
        if let Some(Value::String(template)) = schema.extension("x-template") {
            value = Some(TypedValue::Plain(Value::String(inject(
                &template,
                params,
                options.replacement,
            ))));
        }
    }
    if value.is_none() && options.defaults {
        if let Some(default) = schema.default_value() {
            let filled = match &default {
                Value::String(text) if options.template_defaults && options.templates => {
                    Value::String(inject(text, params, options.replacement))
                }
                other => other.clone(),
            };
            value = Some(TypedValue::from_json(&filled));
        }
    }

    match schema.type_name().as_deref() {
        Some("object") => {
            let mut entries = match value {
                Some(TypedValue::Object(entries)) => entries,
                Some(other) => return Some(other),
                None => BTreeMap::new(),
            };
            let had_input = !entries.is_empty();
            for (key, property) in schema.properties() {
                let existing = entries.get(&key).cloned();
                if let Some(populated) =
                    populate_node(&property, params, existing, options, depth - 1, seen)
                {
                    entries.insert(key, populated);
                }
            }
            if entries.is_empty() && !had_input {
                None
            } else {
                Some(TypedValue::Object(entries))
            }
        }
        Some("array") => match value {
            Some(TypedValue::Array(items)) => {
                let item_schema = schema.items();
                let populated = items
                    .into_iter()
                    .map(|item| match &item_schema {
                        Some(item_schema) => populate_node(
                            item_schema,
                            params,
                            Some(item.clone()),
                            options,
                            depth - 1,
                            seen,
                        )
                        .unwrap_or(item),
                        None => item,
                    })
                    .collect();
                Some(TypedValue::Array(populated))
            }
            other => other,
        },
        _ => value,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn colon_injector_replaces_defined_params() {
        let params = params(&[("name", json!("Ada")), ("age", json!(36))]);
        assert_eq!(inject(":name", &params, Replacement::Colon), "Ada");
        assert_eq!(
            inject(":name is :age years old", &params, Replacement::Colon),
            "Ada is 36 years old"
        );
    }

    #[test]
    fn unresolved_references_stay_verbatim() {
        let params = params(&[("name", json!("Ada"))]);
        assert_eq!(
            inject("{name} and {missing}", &params, Replacement::Handlebar),
            "Ada and {missing}"
        );
    }

    #[test]
    fn injection_is_single_pass() {
        // The substituted text contains a reference; it must not expand.
        let params = params(&[("a", json!("{b}")), ("b", json!("deep"))]);
        assert_eq!(inject("{a}", &params, Replacement::Handlebar), "{b}");
    }

    #[test]
    fn double_handlebar_requires_both_braces() {
        let params = params(&[("name", json!("Ada"))]);
        assert_eq!(
            inject("{{name}} {name}", &params, Replacement::DoubleHandlebar),
            "Ada {name}"
        );
    }

    #[test]
    fn default_options_match_contract() {
        let options = PopulateOptions::default();
        assert!(!options.copy);
        assert!(options.conditions);
        assert!(options.defaults);
        assert!(options.template_defaults);
        assert!(options.templates);
        assert!(options.variables);
        assert_eq!(options.depth, 100);
        assert_eq!(options.replacement, Replacement::Handlebar);
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: PopulateOptions =
            serde_json::from_value(json!({"templateDefaults": false, "replacement": "colon"}))
                .unwrap();
        assert!(!options.template_defaults);
        assert_eq!(options.replacement, Replacement::Colon);
    }
}
