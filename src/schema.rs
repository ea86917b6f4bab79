//! # Schema enforcer
//!
//! A [`SchemaNode`] is a handle onto one materialized Schema instance in
//! the enforcer arena. It exposes the behavioral surface of the schema
//! subsystem: deserialize, serialize, validate, populate, random,
//! discriminate, and formalize. All methods are side-effect-free on the
//! schema tree, which is read-only once normalization (including the
//! deferred-plugin phase) completes.
//!
//! [`Enforcer`] is the root surface: it owns the per-root data type
//! registry, normalizes definitions into schema trees, and exposes the
//! value-wrapper helpers.
//!
//! ## Usage Examples
//!
//! ```rust
//! use oas_enforcer::{Enforcer, Version};
//! use serde_json::json;
//!
//! let enforcer = Enforcer::new(Version::V3_0_3);
//! let schema = enforcer
//!     .schema(&json!({"type": "string", "format": "date"}))
//!     .into_result()
//!     .unwrap();
//! let value = schema.deserialize(&json!("2000-01-01")).into_result().unwrap();
//! assert_eq!(value.type_name(), "date");
//! ```

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

use rand::RngCore;
use regex::Regex;
use serde_json::Value;

use crate::data_types::{registered_constructors, DataTypeDefinition, DataTypeError, DataTypes};
use crate::definition::{DefGraph, DefId, DefNode};
use crate::descriptor::{EnforcerRef, Validator};
use crate::exception::ExceptionScope;
use crate::normalizer::normalize_root;
use crate::outcome::Outcome;
use crate::populate::PopulateOptions;
use crate::random::RandomOptions;
use crate::value::{TypedValue, WrappedValue};
use crate::version::Version;
use crate::walk::{Arena, EnforcerData, EnforcerId, Materialized, Walk};

/////////////////////////////////////////////// names //////////////////////////////////////////////

pub(crate) const COMPOSITE_KEYS: [&str; 4] = ["allOf", "anyOf", "not", "oneOf"];

/// How a schema treats properties beyond its declared ones.
#[derive(Debug, Clone)]
pub enum Additional {
    Allowed(bool),
    Schema(SchemaNode),
}

/// The detailed result of a discriminator dispatch.
#[derive(Debug, Clone)]
pub struct Discriminated {
    /// The discriminator property name.
    pub key: String,
    /// The value found at that property.
    pub name: String,
    /// The schema the value selects.
    pub schema: SchemaNode,
}

////////////////////////////////////////////// SchemaNode //////////////////////////////////////////

/// A materialized schema instance.
#[derive(Clone)]
pub struct SchemaNode {
    pub(crate) arena: Rc<Arena>,
    pub(crate) id: EnforcerId,
}

impl SchemaNode {
    pub(crate) fn new(arena: Rc<Arena>, id: EnforcerId) -> Self {
        SchemaNode { arena, id }
    }

    /// The frozen walk-state carrier.
    pub fn enforcer_data(&self) -> EnforcerData {
        self.arena.enforcer_data(self.id)
    }

    /// The def-to-instance lookup: the schema materialized from a raw
    /// definition node, if that node was walked.
    pub fn instance_for(&self, def: DefId) -> Option<SchemaNode> {
        self.arena
            .instance_for_def(def)
            .map(|id| SchemaNode::new(Rc::clone(&self.arena), id))
    }

    /// Renders the normalized schema back into plain JSON.
    pub fn to_json(&self) -> Value {
        Materialized::Enforcer(self.id).to_json(&self.arena)
    }

    //////////////////////////////////////// field accessors ///////////////////////////////////////

    pub(crate) fn field(&self, key: &str) -> Option<Materialized> {
        self.arena.field(self.id, key)
    }

    fn schema_of(&self, value: Materialized) -> Option<SchemaNode> {
        match value {
            Materialized::Enforcer(id) => Some(SchemaNode::new(Rc::clone(&self.arena), id)),
            _ => None,
        }
    }

    pub fn type_name(&self) -> Option<String> {
        self.field("type").and_then(|m| m.as_text())
    }

    pub fn format(&self) -> Option<String> {
        self.field("format").and_then(|m| m.as_text())
    }

    /// The registered codec for this schema's `(type, format)` pair.
    pub fn codec(&self) -> Option<Rc<DataTypeDefinition>> {
        let kind = self.type_name()?;
        let format = self.format()?;
        self.arena.data_types.get(&kind, &format)
    }

    pub fn items(&self) -> Option<SchemaNode> {
        self.field("items").and_then(|m| self.schema_of(m))
    }

    pub fn properties(&self) -> BTreeMap<String, SchemaNode> {
        let mut out = BTreeMap::new();
        if let Some(Materialized::Map(map)) = self.field("properties") {
            for (key, value) in map.borrow().iter() {
                if let Some(schema) = self.schema_of(value.clone()) {
                    out.insert(key.clone(), schema);
                }
            }
        }
        out
    }

    pub fn property(&self, key: &str) -> Option<SchemaNode> {
        if let Some(Materialized::Map(map)) = self.field("properties") {
            let value = map.borrow().get(key).cloned()?;
            return self.schema_of(value);
        }
        None
    }

    /// Extra-key policy; the default is to allow anything.
    pub fn additional(&self) -> Additional {
        match self.field("additionalProperties") {
            Some(Materialized::Bool(allowed)) => Additional::Allowed(allowed),
            Some(value) => self
                .schema_of(value)
                .map(Additional::Schema)
                .unwrap_or(Additional::Allowed(true)),
            None => Additional::Allowed(true),
        }
    }

    fn schema_list(&self, key: &str) -> Option<Vec<SchemaNode>> {
        match self.field(key)? {
            Materialized::Array(items) => Some(
                items
                    .borrow()
                    .iter()
                    .filter_map(|item| self.schema_of(item.clone()))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn all_of(&self) -> Option<Vec<SchemaNode>> {
        self.schema_list("allOf")
    }

    pub fn any_of(&self) -> Option<Vec<SchemaNode>> {
        self.schema_list("anyOf")
    }

    pub fn one_of(&self) -> Option<Vec<SchemaNode>> {
        self.schema_list("oneOf")
    }

    pub fn not_schema(&self) -> Option<SchemaNode> {
        self.field("not").and_then(|m| self.schema_of(m))
    }

    pub fn required(&self) -> Vec<String> {
        match self.field("required") {
            Some(Materialized::Array(items)) => items
                .borrow()
                .iter()
                .filter_map(|item| item.as_text())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The deep-frozen enum values, if declared.
    pub fn enum_values(&self) -> Option<Vec<Value>> {
        match self.field("enum")? {
            Materialized::Frozen(value) => value.as_array().cloned(),
            Materialized::Array(items) => Some(
                items
                    .borrow()
                    .iter()
                    .map(|item| item.to_json(&self.arena))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn default_value(&self) -> Option<Value> {
        self.field("default").map(|m| m.to_json(&self.arena))
    }

    pub fn example(&self) -> Option<Value> {
        self.field("example").map(|m| m.to_json(&self.arena))
    }

    pub fn nullable(&self) -> bool {
        self.bool_field("nullable") || self.bool_field("x-nullable")
    }

    pub fn pattern(&self) -> Option<Rc<Regex>> {
        match self.field("pattern")? {
            Materialized::Pattern(regex) => Some(regex),
            _ => None,
        }
    }

    pub(crate) fn bool_field(&self, key: &str) -> bool {
        self.field(key).and_then(|m| m.as_bool()).unwrap_or(false)
    }

    pub(crate) fn number_field(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(|m| m.as_number())
    }

    pub(crate) fn usize_field(&self, key: &str) -> Option<usize> {
        self.number_field(key)
            .filter(|n| *n >= 0.0)
            .map(|n| n as usize)
    }

    /// An extension (`x-`) value copied verbatim off the definition.
    pub fn extension(&self, key: &str) -> Option<Value> {
        self.field(key).map(|m| m.to_json(&self.arena))
    }

    /// The property name a discriminator dispatches on, for either
    /// version's discriminator shape.
    pub(crate) fn discriminator_key(&self) -> Option<String> {
        match self.field("discriminator")? {
            Materialized::Text(name) => Some(name),
            Materialized::Map(map) => map.borrow().get("propertyName").and_then(|m| m.as_text()),
            _ => None,
        }
    }

    /// A numeric view of `maximum`/`minimum`, converting format-typed
    /// bounds (date strings and the like) through the registered codec.
    pub(crate) fn numeric_bound(&self, key: &str) -> Option<f64> {
        match self.field(key)? {
            Materialized::Number(n) => Some(n),
            Materialized::Text(text) => {
                let codec = self.codec()?;
                (codec.deserialize)(&Value::String(text))
                    .ok()
                    .and_then(|typed| typed.numeric())
            }
            _ => None,
        }
    }

    ////////////////////////////////////////// operations //////////////////////////////////////////

    /// Deserializes a wire value into its typed form against this schema.
    pub fn deserialize(&self, value: &Value) -> Outcome<TypedValue> {
        let exception = ExceptionScope::new("One or more errors exist in the value");
        let warn = ExceptionScope::new("One or more warnings exist in the value");
        let result = crate::serialize::deserialize_node(self, value, &exception, &mut Vec::new());
        Outcome::from_scopes(result, exception, warn)
    }

    /// Serializes a typed value back into its wire form.
    pub fn serialize(&self, value: &TypedValue) -> Outcome<Value> {
        let exception = ExceptionScope::new("One or more errors exist in the value");
        let warn = ExceptionScope::new("One or more warnings exist in the value");
        let result = crate::serialize::serialize_node(self, value, &exception, &mut Vec::new());
        Outcome::from_scopes(result, exception, warn)
    }

    /// Applies every constraint reachable from this schema to the value.
    pub fn validate(&self, value: &TypedValue) -> Outcome<()> {
        let exception = ExceptionScope::new("One or more errors exist in the value");
        let warn = ExceptionScope::new("One or more warnings exist in the value");
        crate::validate::validate_node(self, value, &exception, &mut Vec::new());
        Outcome::from_scopes(Some(()), exception, warn)
    }

    /// Synthesizes a value against the schema from a parameter map.
    pub fn populate(
        &self,
        params: &BTreeMap<String, Value>,
        value: Option<TypedValue>,
        options: &PopulateOptions,
    ) -> Outcome<TypedValue> {
        crate::populate::populate(self, params, value, options)
    }

    /// Generates a random value conforming to this schema.
    pub fn random(&self, value: Option<&TypedValue>, options: &RandomOptions) -> Outcome<TypedValue> {
        let mut rng = rand::thread_rng();
        self.random_with_rng(value, options, &mut rng)
    }

    /// Random generation with a caller-supplied RNG, for deterministic
    /// runs.
    pub fn random_with_rng(
        &self,
        value: Option<&TypedValue>,
        options: &RandomOptions,
        rng: &mut dyn RngCore,
    ) -> Outcome<TypedValue> {
        crate::random::random(self, value, options, rng)
    }

    /// Converts non-plain values into plain trees, preserving instances
    /// whose constructors are registered in the data type registry.
    pub fn formalize(&self, value: &TypedValue) -> TypedValue {
        value.formalize(&registered_constructors())
    }

    /// Selects the concrete schema a discriminated value maps to.
    pub fn discriminate(&self, value: &TypedValue) -> Outcome<SchemaNode> {
        let details = self.discriminate_details(value);
        Outcome {
            value: details.value.map(|d| d.schema),
            error: details.error,
            warning: details.warning,
        }
    }

    /// Discriminator dispatch with the property name and selected value
    /// included.
    pub fn discriminate_details(&self, value: &TypedValue) -> Outcome<Discriminated> {
        let exception = ExceptionScope::new("Unable to discriminate");
        let warn = ExceptionScope::new("One or more warnings exist");
        let result = self.discriminate_inner(value, &exception);
        Outcome::from_scopes(result, exception, warn)
    }

    fn discriminate_inner(
        &self,
        value: &TypedValue,
        exception: &ExceptionScope,
    ) -> Option<Discriminated> {
        let discriminator = self.field("discriminator")?;
        let (key, mapping) = match &discriminator {
            Materialized::Text(name) => (name.clone(), None),
            Materialized::Map(map) => {
                let key = map
                    .borrow()
                    .get("propertyName")
                    .and_then(|m| m.as_text())?;
                (key, map.borrow().get("mapping").cloned())
            }
            _ => return None,
        };

        let name = match value {
            TypedValue::Object(map) => map.get(&key).and_then(|v| match v {
                TypedValue::Plain(Value::String(s)) => Some(s.clone()),
                _ => None,
            }),
            TypedValue::Plain(Value::Object(map)) => {
                map.get(&key).and_then(|v| v.as_str().map(str::to_string))
            }
            _ => None,
        };
        let Some(name) = name else {
            exception.message(format!("Missing required discriminator property: {}", key));
            return None;
        };

        // v3 mapping wins when it names the value.
        if let Some(Materialized::Map(map)) = mapping {
            if let Some(Materialized::Enforcer(id)) = map.borrow().get(&name) {
                return Some(Discriminated {
                    key,
                    name,
                    schema: SchemaNode::new(Rc::clone(&self.arena), *id),
                });
            }
        }

        let pointer = if self.arena.version.is_v2() {
            format!("#/definitions/{}", name)
        } else {
            format!("#/components/schemas/{}", name)
        };
        let root = self.arena.document_root();
        let target = root.and_then(|root| self.arena.graph().resolve_pointer(root, &pointer));
        let schema = target
            .and_then(|def| self.arena.instance_for_def(def))
            .map(|id| SchemaNode::new(Rc::clone(&self.arena), id));
        match schema {
            Some(schema) => Some(Discriminated { key, name, schema }),
            None => {
                exception.message(format!(
                    "Discriminator value does not map to a schema: {}",
                    name
                ));
                None
            }
        }
    }
}

impl PartialEq for SchemaNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.arena, &other.arena)
    }
}

impl Debug for SchemaNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("SchemaNode")
            .field("id", &self.id)
            .field("type", &self.type_name())
            .field("format", &self.format())
            .finish_non_exhaustive()
    }
}

/////////////////////////////////////////////// Enforcer ///////////////////////////////////////////

/// The root enforcement surface.
///
/// An `Enforcer` is configured once — version, data type formats, debug
/// behavior — then turns raw definitions into schema trees. The data type
/// registry is mutable only here, before normalization; every schema tree
/// built afterwards carries its own copy.
pub struct Enforcer {
    version: Version,
    data_types: DataTypes,
    debug_rethrow: bool,
}

impl Enforcer {
    /// Creates an enforcer for the given OpenAPI version with the
    /// standard data type formats installed.
    pub fn new(version: Version) -> Self {
        Enforcer {
            version,
            data_types: DataTypes::standard(),
            debug_rethrow: false,
        }
    }

    /// Makes callback panics during normalization propagate instead of
    /// being recorded as "Unexpected error encountered".
    pub fn debug_rethrow(mut self, enabled: bool) -> Self {
        self.debug_rethrow = enabled;
        self
    }

    /// Registers (or de-registers, with `None`) a data type format.
    ///
    /// # Examples
    /// ```
    /// # use oas_enforcer::{Enforcer, Version};
    /// let enforcer = Enforcer::new(Version::V3_0_3);
    /// let result = enforcer.define_data_type_format("object", "weird", None);
    /// assert!(result.is_err());
    /// ```
    pub fn define_data_type_format(
        &self,
        kind: &str,
        format: &str,
        definition: Option<DataTypeDefinition>,
    ) -> Result<(), DataTypeError> {
        self.data_types.define(kind, format, definition)
    }

    /// Normalizes a schema definition into an enforcer tree.
    pub fn schema(&self, definition: &Value) -> Outcome<SchemaNode> {
        let mut graph = DefGraph::new();
        let root = graph.load_json(definition);
        self.schema_graph(graph, root, root)
    }

    /// Normalizes the schema at `pointer` within a larger document; local
    /// references (discriminator mappings) resolve against the document
    /// root.
    pub fn schema_in(&self, document: &Value, pointer: &str) -> Outcome<SchemaNode> {
        let mut graph = DefGraph::new();
        let document_root = graph.load_json(document);
        match graph.resolve_pointer(document_root, pointer) {
            Some(root) => self.schema_graph(graph, document_root, root),
            None => {
                let exception = ExceptionScope::new("One or more errors exist in the definition");
                exception.message(format!("Reference cannot be resolved: {}", pointer));
                Outcome::from_scopes(
                    None,
                    exception,
                    ExceptionScope::new("One or more warnings exist in the definition"),
                )
            }
        }
    }

    /// Normalizes a schema over an already-built definition graph, which
    /// is how cyclic definitions enter the system.
    pub fn schema_graph(&self, graph: DefGraph, document_root: DefId, root: DefId) -> Outcome<SchemaNode> {
        let mut arena = Arena::new(graph, self.version, crate::schema_validator::components());
        arena.data_types = self.data_types.clone();
        arena.debug_rethrow = self.debug_rethrow;
        let arena = Rc::new(arena);
        arena.set_document_root(document_root);

        let exception = ExceptionScope::new("One or more errors exist in the definition");
        let warn = ExceptionScope::new("One or more warnings exist in the definition");
        let walk = Walk::root(
            Rc::clone(&arena),
            root,
            Validator::Ref(EnforcerRef::new("Schema")),
            exception.clone(),
            warn.clone(),
        );
        let result = normalize_root(&walk);
        let node = match result {
            Some(Materialized::Enforcer(id)) => Some(SchemaNode::new(arena, id)),
            _ => None,
        };
        Outcome::from_scopes(node, exception, warn)
    }

    /// Wraps a value as produced by a known constructor.
    pub fn value(&self, constructor: impl Into<String>, value: TypedValue) -> TypedValue {
        TypedValue::Wrapped(WrappedValue {
            constructor: constructor.into(),
            value: Box::new(value),
        })
    }

    /// Unwraps any value wrappers, recursively.
    pub fn extract_value(&self, value: TypedValue) -> TypedValue {
        value.extract_value()
    }

    /// Converts non-plain values into plain trees while preserving
    /// registered constructor instances.
    pub fn formalize(&self, value: &TypedValue) -> TypedValue {
        value.formalize(&registered_constructors())
    }
}

impl Debug for Enforcer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Enforcer")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Schema-graph helper: the raw definition object entry for `key`, used
/// by validator callbacks that need fields not yet materialized.
pub(crate) fn definition_field(graph: &DefGraph, def: DefId, key: &str) -> Option<DefId> {
    match graph.node(def) {
        DefNode::Object(map) => map.get(key).copied(),
        _ => None,
    }
}
