//! # Raw definition graph
//!
//! The normalizer walks a raw OpenAPI definition: a tree of string-keyed
//! maps, ordered lists, and scalars that may contain shared references and
//! cycles. Plain owned JSON values cannot express sharing, so definitions
//! are held in an arena: every node lives in a [`DefGraph`] and is
//! addressed by a [`DefId`]. Two parents pointing at the same `DefId` are
//! the shared-reference case; a node reachable from itself is the cyclic
//! case. Node identity for cycle detection is the id itself.
//!
//! Loading from `serde_json::Value` always produces an acyclic graph;
//! cyclic graphs are built programmatically through the allocation and
//! wiring methods.
//!
//! ## Usage Examples
//!
//! ```rust
//! use oas_enforcer::{DefGraph, DefNode};
//! use serde_json::json;
//!
//! let mut graph = DefGraph::new();
//! let root = graph.load_json(&json!({"type": "string"}));
//! assert!(matches!(graph.node(root), DefNode::Object(_)));
//! ```

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde_json::Value;

///////////////////////////////////////////// DefId ////////////////////////////////////////////////

/// Index of a node within a [`DefGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefId(usize);

//////////////////////////////////////////// DefNode ///////////////////////////////////////////////

/// A single node of a raw definition.
#[derive(Debug, Clone, PartialEq)]
pub enum DefNode {
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
    Array(Vec<DefId>),
    Object(BTreeMap<String, DefId>),
}

///////////////////////////////////////// DefinitionType ///////////////////////////////////////////

/// The shape category of a definition node, as seen by validators.
///
/// `Undefined` stands for an absent value, distinct from an explicit
/// `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionType {
    Array,
    Object,
    Boolean,
    Number,
    String,
    Null,
    Undefined,
}

impl Display for DefinitionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            DefinitionType::Array => "array",
            DefinitionType::Object => "object",
            DefinitionType::Boolean => "boolean",
            DefinitionType::Number => "number",
            DefinitionType::String => "string",
            DefinitionType::Null => "null",
            DefinitionType::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

//////////////////////////////////////////// DefGraph //////////////////////////////////////////////

/// Arena of definition nodes.
///
/// The graph is append-only: nodes are allocated and wired while a
/// definition is being assembled, then treated as read-only for the whole
/// normalization walk.
#[derive(Debug, Clone, Default)]
pub struct DefGraph {
    nodes: Vec<DefNode>,
}

impl DefGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        DefGraph::default()
    }

    /// Allocates a node and returns its id.
    pub fn alloc(&mut self, node: DefNode) -> DefId {
        let id = DefId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Allocates an empty object node.
    pub fn alloc_object(&mut self) -> DefId {
        self.alloc(DefNode::Object(BTreeMap::new()))
    }

    /// Allocates an empty array node.
    pub fn alloc_array(&mut self) -> DefId {
        self.alloc(DefNode::Array(Vec::new()))
    }

    /// Allocates a string node.
    pub fn alloc_text(&mut self, text: impl Into<String>) -> DefId {
        self.alloc(DefNode::Text(text.into()))
    }

    /// Sets `key` on an object node to point at `target`.
    ///
    /// Pointing a property back at an ancestor (or at the object itself) is
    /// how cyclic definitions are expressed.
    ///
    /// # Panics
    /// Panics if `object` does not address an object node; graph assembly
    /// is a programming-error domain, not a validation domain.
    pub fn set_property(&mut self, object: DefId, key: impl Into<String>, target: DefId) {
        match &mut self.nodes[object.0] {
            DefNode::Object(map) => {
                map.insert(key.into(), target);
            }
            other => panic!("set_property on non-object node: {:?}", other),
        }
    }

    /// Appends `target` to an array node.
    ///
    /// # Panics
    /// Panics if `array` does not address an array node.
    pub fn push_element(&mut self, array: DefId, target: DefId) {
        match &mut self.nodes[array.0] {
            DefNode::Array(items) => items.push(target),
            other => panic!("push_element on non-array node: {:?}", other),
        }
    }

    /// Loads a JSON value into the graph, returning the id of its root.
    pub fn load_json(&mut self, value: &Value) -> DefId {
        let node = match value {
            Value::Null => DefNode::Null,
            Value::Bool(b) => DefNode::Boolean(*b),
            Value::Number(n) => DefNode::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => DefNode::Text(s.clone()),
            Value::Array(items) => {
                let ids = items.iter().map(|item| self.load_json(item)).collect();
                DefNode::Array(ids)
            }
            Value::Object(map) => {
                let mut entries = BTreeMap::new();
                for (key, item) in map {
                    entries.insert(key.clone(), self.load_json(item));
                }
                DefNode::Object(entries)
            }
        };
        self.alloc(node)
    }

    /// Borrows the node at `id`.
    pub fn node(&self, id: DefId) -> &DefNode {
        &self.nodes[id.0]
    }

    /// The shape category of an optional node; `None` is `Undefined`.
    pub fn definition_type(&self, id: Option<DefId>) -> DefinitionType {
        match id {
            None => DefinitionType::Undefined,
            Some(id) => match self.node(id) {
                DefNode::Null => DefinitionType::Null,
                DefNode::Boolean(_) => DefinitionType::Boolean,
                DefNode::Number(_) => DefinitionType::Number,
                DefNode::Text(_) => DefinitionType::String,
                DefNode::Array(_) => DefinitionType::Array,
                DefNode::Object(_) => DefinitionType::Object,
            },
        }
    }

    /// Renders the subtree at `id` back into a JSON value.
    ///
    /// Nodes revisited along a single path (cycles) render as `null`; the
    /// callers that deep-copy definitions only do so for value-like
    /// subtrees where cycles do not occur.
    pub fn to_json(&self, id: DefId) -> Value {
        let mut on_path = HashSet::new();
        self.to_json_guarded(id, &mut on_path)
    }

    fn to_json_guarded(&self, id: DefId, on_path: &mut HashSet<DefId>) -> Value {
        if !on_path.insert(id) {
            return Value::Null;
        }
        let value = match self.node(id) {
            DefNode::Null => Value::Null,
            DefNode::Boolean(b) => Value::Bool(*b),
            DefNode::Number(n) => number_to_json(*n),
            DefNode::Text(s) => Value::String(s.clone()),
            DefNode::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.to_json_guarded(*item, on_path))
                    .collect(),
            ),
            DefNode::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.to_json_guarded(*item, on_path));
                }
                Value::Object(out)
            }
        };
        on_path.remove(&id);
        value
    }

    /// Resolves a local JSON pointer (`#/components/schemas/Dog`) from
    /// `root`, honoring the `~0`/`~1` escapes.
    pub fn resolve_pointer(&self, root: DefId, pointer: &str) -> Option<DefId> {
        let path = pointer.strip_prefix('#').unwrap_or(pointer);
        let mut current = root;
        for token in path.split('/').filter(|t| !t.is_empty()) {
            let token = token.replace("~1", "/").replace("~0", "~");
            current = match self.node(current) {
                DefNode::Object(map) => *map.get(&token)?,
                DefNode::Array(items) => {
                    let index: usize = token.parse().ok()?;
                    *items.get(index)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    /// Member-wise equality between a definition subtree and a JSON value.
    ///
    /// Numbers compare numerically, so a definition `5` equals `5.0`.
    /// Recursion is bounded by the JSON value, which is always finite.
    pub fn matches_json(&self, id: DefId, value: &Value) -> bool {
        match (self.node(id), value) {
            (DefNode::Null, Value::Null) => true,
            (DefNode::Boolean(a), Value::Bool(b)) => a == b,
            (DefNode::Number(a), Value::Number(b)) => b.as_f64().map(|b| *a == b).unwrap_or(false),
            (DefNode::Text(a), Value::String(b)) => a == b,
            (DefNode::Array(items), Value::Array(values)) => {
                items.len() == values.len()
                    && items
                        .iter()
                        .zip(values)
                        .all(|(item, value)| self.matches_json(*item, value))
            }
            (DefNode::Object(map), Value::Object(values)) => {
                map.len() == values.len()
                    && map.iter().all(|(key, item)| {
                        values
                            .get(key)
                            .map(|value| self.matches_json(*item, value))
                            .unwrap_or(false)
                    })
            }
            _ => false,
        }
    }
}

/// Renders an f64 as JSON, keeping integral values integral.
pub(crate) fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_and_render_round_trip() {
        let doc = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"],
            "maxProperties": 3
        });
        let mut graph = DefGraph::new();
        let root = graph.load_json(&doc);
        assert_eq!(graph.to_json(root), doc);
    }

    #[test]
    fn definition_types() {
        let mut graph = DefGraph::new();
        let null = graph.load_json(&json!(null));
        let num = graph.load_json(&json!(1.5));
        let text = graph.load_json(&json!("x"));
        let arr = graph.load_json(&json!([]));
        let obj = graph.load_json(&json!({}));
        assert_eq!(graph.definition_type(Some(null)), DefinitionType::Null);
        assert_eq!(graph.definition_type(Some(num)), DefinitionType::Number);
        assert_eq!(graph.definition_type(Some(text)), DefinitionType::String);
        assert_eq!(graph.definition_type(Some(arr)), DefinitionType::Array);
        assert_eq!(graph.definition_type(Some(obj)), DefinitionType::Object);
        assert_eq!(graph.definition_type(None), DefinitionType::Undefined);
    }

    #[test]
    fn cyclic_graph_renders_without_overflow() {
        let mut graph = DefGraph::new();
        let root = graph.alloc_object();
        let kind = graph.alloc_text("object");
        let properties = graph.alloc_object();
        graph.set_property(root, "type", kind);
        graph.set_property(root, "properties", properties);
        graph.set_property(properties, "self", root);

        let rendered = graph.to_json(root);
        assert_eq!(rendered["type"], json!("object"));
        assert_eq!(rendered["properties"]["self"], Value::Null);
    }

    #[test]
    fn matches_json_compares_numbers_numerically() {
        let mut graph = DefGraph::new();
        let id = graph.load_json(&json!(5.0));
        assert!(graph.matches_json(id, &json!(5)));
        assert!(!graph.matches_json(id, &json!(6)));
    }

    #[test]
    fn matches_json_deep() {
        let mut graph = DefGraph::new();
        let id = graph.load_json(&json!({"a": [1, 2], "b": "x"}));
        assert!(graph.matches_json(id, &json!({"a": [1, 2], "b": "x"})));
        assert!(!graph.matches_json(id, &json!({"a": [1, 2]})));
        assert!(!graph.matches_json(id, &json!({"a": [1, 2, 3], "b": "x"})));
    }

    #[test]
    fn shared_node_appears_in_both_parents() {
        let mut graph = DefGraph::new();
        let shared = graph.load_json(&json!({"type": "string"}));
        let root = graph.alloc_object();
        graph.set_property(root, "first", shared);
        graph.set_property(root, "second", shared);
        let rendered = graph.to_json(root);
        assert_eq!(rendered["first"], rendered["second"]);
    }
}
