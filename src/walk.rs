//! # Walk context and enforcer arena
//!
//! Normalization flows a per-node [`Walk`] record down the definition
//! tree. Each walk carries the node under examination, the validator in
//! force, scoped exception collectors, and back-references up the walk.
//! Shared state — the definition graph, the materialization cache, the
//! component registry, the deferred-plugin queue, and the data type
//! registry — lives in the [`Arena`], which doubles as the arena of
//! materialized enforcer instances.
//!
//! Enforcer instances reference one another (a schema's `properties.self`
//! may point back at the schema), so instances are addressed by
//! [`EnforcerId`] indices instead of owning pointers; the arena's
//! `def_to_instance` map is the lookup from raw definition identity to the
//! materialized instance.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

use regex::Regex;
use serde_json::Value;

use crate::data_types::DataTypes;
use crate::definition::{DefGraph, DefId, DefinitionType};
use crate::descriptor::Validator;
use crate::exception::ExceptionScope;
use crate::version::Version;

//////////////////////////////////////////// Materialized //////////////////////////////////////////

/// A node of the materialized result tree.
///
/// Containers are shared so that a definition appearing at several
/// positions (or cyclically) materializes to one result referenced from
/// each position. `Frozen` holds deep-frozen values (`enum`, `default`,
/// `example`) that downstream consumers cannot mutate; `Pattern` holds a
/// compiled regular expression.
#[derive(Clone)]
pub enum Materialized {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Array(Rc<RefCell<Vec<Materialized>>>),
    Map(Rc<RefCell<BTreeMap<String, Materialized>>>),
    Enforcer(EnforcerId),
    Pattern(Rc<Regex>),
    Frozen(Rc<Value>),
}

impl Materialized {
    /// An empty shared map.
    pub fn empty_map() -> Materialized {
        Materialized::Map(Rc::new(RefCell::new(BTreeMap::new())))
    }

    /// An empty shared array.
    pub fn empty_array() -> Materialized {
        Materialized::Array(Rc::new(RefCell::new(Vec::new())))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Materialized::Bool(b) => Some(*b),
            Materialized::Frozen(value) => value.as_bool(),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Materialized::Number(n) => Some(*n),
            Materialized::Frozen(value) => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Materialized::Text(s) => Some(s.clone()),
            Materialized::Frozen(value) => value.as_str().map(str::to_string),
            _ => None,
        }
    }

    /// Reads `key` out of a map node.
    pub fn field(&self, key: &str) -> Option<Materialized> {
        match self {
            Materialized::Map(map) => map.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Renders the node into plain JSON.
    ///
    /// Enforcer nodes render their fields; revisited nodes along a path
    /// (cycles) render as `null`.
    pub fn to_json(&self, arena: &Arena) -> Value {
        self.to_json_guarded(arena, &mut Vec::new())
    }

    fn to_json_guarded(&self, arena: &Arena, on_path: &mut Vec<usize>) -> Value {
        match self {
            Materialized::Null => Value::Null,
            Materialized::Bool(b) => Value::Bool(*b),
            Materialized::Number(n) => crate::definition::number_to_json(*n),
            Materialized::Text(s) => Value::String(s.clone()),
            Materialized::Pattern(regex) => Value::String(regex.as_str().to_string()),
            Materialized::Frozen(value) => (**value).clone(),
            Materialized::Array(items) => {
                let identity = Rc::as_ptr(items) as usize;
                if on_path.contains(&identity) {
                    return Value::Null;
                }
                on_path.push(identity);
                let rendered = Value::Array(
                    items
                        .borrow()
                        .iter()
                        .map(|item| item.to_json_guarded(arena, on_path))
                        .collect(),
                );
                on_path.pop();
                rendered
            }
            Materialized::Map(map) => {
                let identity = Rc::as_ptr(map) as usize;
                if on_path.contains(&identity) {
                    return Value::Null;
                }
                on_path.push(identity);
                let rendered = Value::Object(
                    map.borrow()
                        .iter()
                        .map(|(key, item)| (key.clone(), item.to_json_guarded(arena, on_path)))
                        .collect(),
                );
                on_path.pop();
                rendered
            }
            Materialized::Enforcer(id) => {
                let instance = arena.instance(*id);
                let identity = Rc::as_ptr(&instance) as usize;
                if on_path.contains(&identity) {
                    return Value::Null;
                }
                on_path.push(identity);
                let fields = instance.fields.borrow();
                let rendered = Value::Object(
                    fields
                        .iter()
                        .map(|(key, item)| (key.clone(), item.to_json_guarded(arena, on_path)))
                        .collect(),
                );
                on_path.pop();
                rendered
            }
        }
    }
}

impl Debug for Materialized {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Materialized::Null => write!(f, "Null"),
            Materialized::Bool(b) => write!(f, "Bool({})", b),
            Materialized::Number(n) => write!(f, "Number({})", n),
            Materialized::Text(s) => write!(f, "Text({:?})", s),
            Materialized::Array(items) => write!(f, "Array(len={})", items.borrow().len()),
            Materialized::Map(map) => {
                write!(f, "Map({:?})", map.borrow().keys().collect::<Vec<_>>())
            }
            Materialized::Enforcer(id) => write!(f, "Enforcer({})", id.0),
            Materialized::Pattern(regex) => write!(f, "Pattern({:?})", regex.as_str()),
            Materialized::Frozen(value) => write!(f, "Frozen({})", value),
        }
    }
}

///////////////////////////////////////////// Instances ////////////////////////////////////////////

/// Index of an enforcer instance within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnforcerId(pub(crate) usize);

/// A materialized component instance.
///
/// Fields hold the normalized result map's properties; `def` and `path`
/// record where in the raw definition the instance came from.
#[derive(Debug)]
pub struct Instance {
    pub component: String,
    pub def: DefId,
    pub path: Vec<String>,
    pub fields: RefCell<BTreeMap<String, Materialized>>,
}

/// The walk-state carrier a component exposes after construction.
#[derive(Debug, Clone)]
pub struct EnforcerData {
    pub component: String,
    pub version: Version,
    pub def: DefId,
    pub path: Vec<String>,
    pub root: Option<EnforcerId>,
}

//////////////////////////////////////////// ComponentSpec /////////////////////////////////////////

/// An entry of the component constructor registry.
///
/// `validator` builds the component's meta-validator for the current walk;
/// `init` runs on the freshly populated instance. The normalizer knows
/// only this table, never the concrete component set.
#[derive(Clone)]
pub struct ComponentSpec {
    pub name: &'static str,
    pub validator: Rc<dyn Fn(&Walk) -> Validator>,
    pub init: Option<Rc<dyn Fn(&Rc<Arena>, EnforcerId, &Walk)>>,
}

impl Debug for ComponentSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "ComponentSpec({})", self.name)
    }
}

//////////////////////////////////////////// ValidatorKey //////////////////////////////////////////

/// Cache identity of a resolved validator.
///
/// The materialization cache is keyed by `(definition, validator)`: the
/// same definition node may legitimately normalize under different
/// validators, but revisiting it under the same validator must yield the
/// first-seen result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidatorKey {
    FreeForm,
    Forbidden,
    Unchecked,
    Ref(String),
    Plain(usize),
}

impl ValidatorKey {
    /// Identity of a resolved (non-dynamic) validator.
    pub fn of(validator: &Validator) -> Option<ValidatorKey> {
        match validator {
            Validator::FreeForm => Some(ValidatorKey::FreeForm),
            Validator::Forbidden => Some(ValidatorKey::Forbidden),
            Validator::Unchecked => Some(ValidatorKey::Unchecked),
            Validator::Ref(reference) => Some(ValidatorKey::Ref(reference.component.clone())),
            Validator::Plain(descriptor) => {
                Some(ValidatorKey::Plain(Rc::as_ptr(descriptor) as usize))
            }
            Validator::Dynamic(_) => None,
        }
    }
}

/////////////////////////////////////////////// Arena //////////////////////////////////////////////

/// Shared normalization state and the enforcer instance arena.
pub struct Arena {
    graph: RefCell<DefGraph>,
    pub version: Version,
    pub data_types: DataTypes,
    components: BTreeMap<String, Rc<ComponentSpec>>,
    instances: RefCell<Vec<Rc<Instance>>>,
    cache: RefCell<HashMap<(DefId, ValidatorKey), Materialized>>,
    def_to_instance: RefCell<HashMap<DefId, EnforcerId>>,
    plugins: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    root_instance: Cell<Option<EnforcerId>>,
    document_root: Cell<Option<DefId>>,
    /// When set, callback panics propagate instead of being recorded as
    /// "Unexpected error encountered".
    pub debug_rethrow: bool,
}

impl Arena {
    /// Creates an arena over a loaded definition graph.
    pub fn new(
        graph: DefGraph,
        version: Version,
        components: BTreeMap<String, Rc<ComponentSpec>>,
    ) -> Self {
        Arena {
            graph: RefCell::new(graph),
            version,
            data_types: DataTypes::standard(),
            components,
            instances: RefCell::new(Vec::new()),
            cache: RefCell::new(HashMap::new()),
            def_to_instance: RefCell::new(HashMap::new()),
            plugins: RefCell::new(VecDeque::new()),
            root_instance: Cell::new(None),
            document_root: Cell::new(None),
            debug_rethrow: false,
        }
    }

    /// Marks the definition node local references resolve from. Defaults
    /// to the normalized root when unset.
    pub fn set_document_root(&self, def: DefId) {
        self.document_root.set(Some(def));
    }

    /// The reference-resolution root.
    pub fn document_root(&self) -> Option<DefId> {
        self.document_root.get()
    }

    pub fn graph(&self) -> Ref<'_, DefGraph> {
        self.graph.borrow()
    }

    pub fn graph_mut(&self) -> RefMut<'_, DefGraph> {
        self.graph.borrow_mut()
    }

    /// Looks up a registered component constructor.
    pub fn component(&self, name: &str) -> Option<Rc<ComponentSpec>> {
        self.components.get(name).cloned()
    }

    /// Allocates an enforcer instance and records the definition-identity
    /// mapping.
    pub fn alloc_instance(&self, component: &str, def: DefId, path: Vec<String>) -> EnforcerId {
        let mut instances = self.instances.borrow_mut();
        let id = EnforcerId(instances.len());
        instances.push(Rc::new(Instance {
            component: component.to_string(),
            def,
            path,
            fields: RefCell::new(BTreeMap::new()),
        }));
        self.def_to_instance.borrow_mut().insert(def, id);
        if self.root_instance.get().is_none() {
            self.root_instance.set(Some(id));
        }
        id
    }

    pub fn instance(&self, id: EnforcerId) -> Rc<Instance> {
        Rc::clone(&self.instances.borrow()[id.0])
    }

    /// Reads one normalized field off an instance.
    pub fn field(&self, id: EnforcerId, key: &str) -> Option<Materialized> {
        self.instance(id).fields.borrow().get(key).cloned()
    }

    /// The instance materialized from `def`, if any.
    pub fn instance_for_def(&self, def: DefId) -> Option<EnforcerId> {
        self.def_to_instance.borrow().get(&def).copied()
    }

    /// The first instance allocated during the walk.
    pub fn root_instance(&self) -> Option<EnforcerId> {
        self.root_instance.get()
    }

    /// The frozen walk-state carrier for an instance.
    pub fn enforcer_data(&self, id: EnforcerId) -> EnforcerData {
        let instance = self.instance(id);
        EnforcerData {
            component: instance.component.clone(),
            version: self.version,
            def: instance.def,
            path: instance.path.clone(),
            root: self.root_instance(),
        }
    }

    pub fn cache_get(&self, def: DefId, key: &ValidatorKey) -> Option<Materialized> {
        self.cache.borrow().get(&(def, key.clone())).cloned()
    }

    pub fn cache_put(&self, def: DefId, key: ValidatorKey, value: Materialized) {
        self.cache.borrow_mut().insert((def, key), value);
    }

    /// Enqueues a deferred callback to run after the whole tree has been
    /// materialized.
    pub fn plugin(&self, callback: Box<dyn FnOnce()>) {
        self.plugins.borrow_mut().push_back(callback);
    }

    /// Drains the deferred-plugin queue, including plugins enqueued by
    /// other plugins.
    pub fn drain_plugins(&self) {
        loop {
            let next = self.plugins.borrow_mut().pop_front();
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }
}

impl Debug for Arena {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Arena")
            .field("version", &self.version)
            .field("instances", &self.instances.borrow().len())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/////////////////////////////////////////////// Walk ///////////////////////////////////////////////

/// The per-node record flowing through normalization.
///
/// Walks are immutable; a node never mutates an ancestor's context, only
/// its own `result` while materializing. Child walks share the arena and
/// derive scoped exception collectors from their parent.
#[derive(Clone)]
pub struct Walk {
    pub arena: Rc<Arena>,
    pub definition: Option<DefId>,
    pub definition_type: DefinitionType,
    pub result: Rc<RefCell<Option<Materialized>>>,
    pub key: Option<String>,
    pub parent: Option<Rc<Walk>>,
    pub exception: ExceptionScope,
    pub warn: ExceptionScope,
    pub validator: Validator,
}

impl Walk {
    /// The root walk over a definition.
    pub fn root(
        arena: Rc<Arena>,
        definition: DefId,
        validator: Validator,
        exception: ExceptionScope,
        warn: ExceptionScope,
    ) -> Self {
        let definition_type = arena.graph().definition_type(Some(definition));
        Walk {
            arena,
            definition: Some(definition),
            definition_type,
            result: Rc::new(RefCell::new(None)),
            key: None,
            parent: None,
            exception,
            warn,
            validator,
        }
    }

    /// Builds the child walk for `key` leading to `definition`.
    pub fn child(&self, definition: Option<DefId>, key: &str, validator: Validator) -> Walk {
        let definition_type = self.arena.graph().definition_type(definition);
        Walk {
            arena: Rc::clone(&self.arena),
            definition,
            definition_type,
            result: Rc::new(RefCell::new(None)),
            key: Some(key.to_string()),
            parent: Some(Rc::new(self.clone())),
            exception: self.exception.at(key),
            warn: self.warn.at(key),
            validator,
        }
    }

    /// Same position, different validator. Used when a component takes
    /// over normalization of the node it was referenced at.
    pub fn with_validator(&self, validator: Validator) -> Walk {
        let mut walk = self.clone();
        walk.validator = validator;
        walk.result = Rc::new(RefCell::new(None));
        walk
    }

    pub fn version(&self) -> Version {
        self.arena.version
    }

    /// The raw definition under examination, rendered to JSON.
    pub fn definition_json(&self) -> Option<Value> {
        self.definition.map(|def| self.arena.graph().to_json(def))
    }

    /// Reads an already-normalized field off this node's partial result.
    pub fn result_field(&self, key: &str) -> Option<Materialized> {
        self.result
            .borrow()
            .as_ref()
            .and_then(|result| result.field(key))
    }

    /// Reads an already-normalized sibling off the parent's partial
    /// result. This is what weight ordering exists for: low-weight
    /// properties land in the parent result before later callbacks run.
    pub fn parent_field(&self, key: &str) -> Option<Materialized> {
        self.parent.as_ref().and_then(|parent| parent.result_field(key))
    }

    /// Walks `levels` ancestors up.
    pub fn ancestor(&self, levels: usize) -> Option<&Walk> {
        let mut walk = self;
        for _ in 0..levels {
            walk = walk.parent.as_deref()?;
        }
        Some(walk)
    }
}

impl Debug for Walk {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Walk")
            .field("key", &self.key)
            .field("definition_type", &self.definition_type)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_arena(doc: Value) -> (Rc<Arena>, DefId) {
        let mut graph = DefGraph::new();
        let root = graph.load_json(&doc);
        let arena = Rc::new(Arena::new(graph, Version::V3_0_3, BTreeMap::new()));
        (arena, root)
    }

    #[test]
    fn child_walk_tracks_path_and_type() {
        let (arena, root) = test_arena(json!({"properties": {"name": {"type": "string"}}}));
        let exception = ExceptionScope::new("errors");
        let warn = ExceptionScope::new("warnings");
        let walk = Walk::root(arena, root, Validator::Unchecked, exception, warn);
        let child = walk.child(None, "missing", Validator::Unchecked);
        assert_eq!(child.definition_type, DefinitionType::Undefined);
        assert_eq!(child.exception.path(), &["missing".to_string()]);
        assert!(child.parent.is_some());
    }

    #[test]
    fn parent_field_reads_partial_result() {
        let (arena, root) = test_arena(json!({}));
        let exception = ExceptionScope::new("errors");
        let warn = ExceptionScope::new("warnings");
        let walk = Walk::root(arena, root, Validator::Unchecked, exception, warn);
        let map = Materialized::empty_map();
        if let Materialized::Map(entries) = &map {
            entries
                .borrow_mut()
                .insert("type".to_string(), Materialized::Text("integer".to_string()));
        }
        *walk.result.borrow_mut() = Some(map);
        let child = walk.child(None, "maximum", Validator::Unchecked);
        let seen = child.parent_field("type").and_then(|m| m.as_text());
        assert_eq!(seen.as_deref(), Some("integer"));
    }

    #[test]
    fn instance_allocation_registers_identity() {
        let (arena, root) = test_arena(json!({"type": "object"}));
        let id = arena.alloc_instance("Schema", root, vec![]);
        assert_eq!(arena.instance_for_def(root), Some(id));
        assert_eq!(arena.root_instance(), Some(id));
        let data = arena.enforcer_data(id);
        assert_eq!(data.component, "Schema");
        assert_eq!(data.version, Version::V3_0_3);
    }

    #[test]
    fn plugins_drain_in_order_including_nested() {
        let (arena, _) = test_arena(json!({}));
        let order = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::clone(&order);
        let nested_order = Rc::clone(&order);
        let nested_arena = Rc::clone(&arena);
        arena.plugin(Box::new(move || {
            first.borrow_mut().push(1);
            let inner = Rc::clone(&nested_order);
            nested_arena.plugin(Box::new(move || inner.borrow_mut().push(3)));
        }));
        let second = Rc::clone(&order);
        arena.plugin(Box::new(move || second.borrow_mut().push(2)));
        arena.drain_plugins();
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn cache_round_trip() {
        let (arena, root) = test_arena(json!({"a": 1}));
        let key = ValidatorKey::Ref("Schema".to_string());
        assert!(arena.cache_get(root, &key).is_none());
        arena.cache_put(root, key.clone(), Materialized::Bool(true));
        assert!(matches!(
            arena.cache_get(root, &key),
            Some(Materialized::Bool(true))
        ));
    }

    #[test]
    fn enforcer_to_json_handles_cycles() {
        let (arena, root) = test_arena(json!({}));
        let id = arena.alloc_instance("Schema", root, vec![]);
        let instance = arena.instance(id);
        instance
            .fields
            .borrow_mut()
            .insert("self".to_string(), Materialized::Enforcer(id));
        let rendered = Materialized::Enforcer(id).to_json(&arena);
        assert_eq!(rendered["self"], Value::Null);
    }
}
