//! # Hierarchical exception collection
//!
//! Validation of an OpenAPI definition should surface every problem in a
//! single pass, not fail on the first one. This module provides the
//! hierarchical collector that the normalizer and the schema runtime attach
//! violations to: a tree of messages indexed by the path of keys leading to
//! the offending node.
//!
//! Two pieces cooperate:
//!
//! - [`ExceptionTree`] is the materialized tree. Each node holds messages
//!   recorded at that level plus named children.
//! - [`ExceptionScope`] is a lazy cursor into a shared tree. Walking into a
//!   child scope allocates nothing; tree nodes are created only when a
//!   message is actually recorded. A deep walk over a clean definition
//!   leaves the tree untouched.
//!
//! Warnings use the same shapes and are collected into a separate tree.
//!
//! ## Usage Examples
//!
//! ```rust
//! use oas_enforcer::ExceptionTree;
//!
//! let mut tree = ExceptionTree::new("One or more errors exist");
//! tree.at("paths").at("/users").message("Missing required property: get");
//! assert!(tree.has_exception());
//!
//! let report = tree.to_string();
//! assert!(report.contains("at: /users"));
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::rc::Rc;

//////////////////////////////////////////// ExceptionTree /////////////////////////////////////////

/// A tree of validation messages indexed by definition path.
///
/// Nodes are created through [`ExceptionTree::at`] and messages appended
/// with [`ExceptionTree::message`]. A tree with no messages anywhere
/// reports `has_exception() == false` regardless of how many empty child
/// nodes exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionTree {
    header: String,
    messages: Vec<String>,
    children: BTreeMap<String, ExceptionTree>,
}

impl ExceptionTree {
    /// Creates an empty tree with the given report header.
    ///
    /// The header is printed above the first message when the tree is
    /// displayed and is ignored while the tree stays empty.
    pub fn new(header: impl Into<String>) -> Self {
        ExceptionTree {
            header: header.into(),
            messages: Vec::new(),
            children: BTreeMap::new(),
        }
    }

    /// Returns the child collector scoped under `key`, creating it if
    /// needed.
    ///
    /// # Examples
    /// ```
    /// # use oas_enforcer::ExceptionTree;
    /// let mut tree = ExceptionTree::new("errors");
    /// tree.at("properties").at("name").message("wrong type");
    /// assert!(tree.at("properties").has_exception());
    /// ```
    pub fn at(&mut self, key: impl Into<String>) -> &mut ExceptionTree {
        self.children.entry(key.into()).or_default()
    }

    /// Appends a message at this level.
    pub fn message(&mut self, text: impl Into<String>) {
        self.messages.push(text.into());
    }

    /// Attaches an already-built subtree under `key`.
    ///
    /// Messages and children of `child` merge with any existing node at
    /// that key.
    pub fn push(&mut self, key: impl Into<String>, child: ExceptionTree) {
        let node = self.at(key);
        node.messages.extend(child.messages);
        for (name, sub) in child.children {
            node.push(name, sub);
        }
    }

    /// True iff this node or any descendant carries a message.
    pub fn has_exception(&self) -> bool {
        !self.messages.is_empty() || self.children.values().any(ExceptionTree::has_exception)
    }

    /// The messages recorded directly at this node.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Looks up the descendant at the given path of keys, if any messages
    /// were ever recorded under it.
    pub fn nested(&self, path: &[&str]) -> Option<&ExceptionTree> {
        let mut node = self;
        for key in path {
            node = node.children.get(*key)?;
        }
        Some(node)
    }

    /// Total number of messages in the tree.
    pub fn count(&self) -> usize {
        self.messages.len()
            + self
                .children
                .values()
                .map(ExceptionTree::count)
                .sum::<usize>()
    }

    fn render(&self, f: &mut Formatter<'_>, indent: usize) -> FmtResult {
        let pad = "  ".repeat(indent);
        for message in &self.messages {
            writeln!(f, "{}{}", pad, message)?;
        }
        for (key, child) in &self.children {
            if child.has_exception() {
                writeln!(f, "{}at: {}", pad, key)?;
                child.render(f, indent + 1)?;
            }
        }
        Ok(())
    }
}

impl Display for ExceptionTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if !self.has_exception() {
            return Ok(());
        }
        writeln!(f, "{}", self.header)?;
        self.render(f, 1)
    }
}

//////////////////////////////////////////// ExceptionScope ////////////////////////////////////////

/// A lazy cursor into a shared [`ExceptionTree`].
///
/// Scopes are cheap to clone and to derive child scopes from; the backing
/// tree is only touched when [`ExceptionScope::message`] runs. The path is
/// reconstructed from the chain of `at` calls at write time.
#[derive(Debug, Clone)]
pub struct ExceptionScope {
    root: Rc<RefCell<ExceptionTree>>,
    path: Vec<String>,
}

impl ExceptionScope {
    /// Creates a scope over a fresh tree with the given header.
    pub fn new(header: impl Into<String>) -> Self {
        ExceptionScope {
            root: Rc::new(RefCell::new(ExceptionTree::new(header))),
            path: Vec::new(),
        }
    }

    /// Returns a child scope under `key` without touching the tree.
    pub fn at(&self, key: impl Into<String>) -> ExceptionScope {
        let mut path = self.path.clone();
        path.push(key.into());
        ExceptionScope {
            root: Rc::clone(&self.root),
            path,
        }
    }

    /// Records a message at this scope's path, materializing tree nodes as
    /// needed.
    pub fn message(&self, text: impl Into<String>) {
        let mut tree = self.root.borrow_mut();
        let mut node = &mut *tree;
        for key in &self.path {
            node = node.at(key.clone());
        }
        node.message(text);
    }

    /// True iff any message exists at or below this scope's path.
    pub fn has_exception(&self) -> bool {
        let tree = self.root.borrow();
        let mut node = &*tree;
        for key in &self.path {
            match node.nested(&[key.as_str()]) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.has_exception()
    }

    /// The path of keys from the root to this scope.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Clones the materialized tree out of the scope.
    pub fn to_tree(&self) -> ExceptionTree {
        self.root.borrow().clone()
    }

    /// Extracts the tree if any message was recorded anywhere under the
    /// root.
    pub fn into_option(self) -> Option<ExceptionTree> {
        let tree = self.root.borrow();
        if tree.has_exception() {
            Some(tree.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_has_no_exception() {
        let tree = ExceptionTree::new("errors");
        assert!(!tree.has_exception());
        assert_eq!(tree.to_string(), "");
    }

    #[test]
    fn at_without_message_stays_clean() {
        let mut tree = ExceptionTree::new("errors");
        tree.at("paths").at("/users").at("get");
        assert!(!tree.has_exception());
        assert_eq!(tree.count(), 0);
    }

    #[test]
    fn message_marks_whole_chain() {
        let mut tree = ExceptionTree::new("errors");
        tree.at("paths").at("/users").message("boom");
        assert!(tree.has_exception());
        assert!(tree.at("paths").has_exception());
        assert_eq!(tree.count(), 1);
    }

    #[test]
    fn nested_lookup_follows_path() {
        let mut tree = ExceptionTree::new("errors");
        tree.at("a").at("b").message("first");
        tree.at("a").at("b").message("second");
        let node = tree.nested(&["a", "b"]).unwrap();
        assert_eq!(node.messages(), &["first", "second"]);
        assert!(tree.nested(&["a", "c"]).is_none());
    }

    #[test]
    fn push_merges_subtrees() {
        let mut sub = ExceptionTree::new("");
        sub.message("top level");
        sub.at("inner").message("deep");

        let mut tree = ExceptionTree::new("errors");
        tree.at("outer").message("existing");
        tree.push("outer", sub);

        let outer = tree.nested(&["outer"]).unwrap();
        assert_eq!(outer.messages(), &["existing", "top level"]);
        assert_eq!(tree.nested(&["outer", "inner"]).unwrap().messages(), &["deep"]);
    }

    #[test]
    fn display_renders_paths() {
        let mut tree = ExceptionTree::new("One or more errors exist");
        tree.at("paths")
            .at("/users")
            .at("get")
            .message("Missing required property: responses");
        let report = tree.to_string();
        assert!(report.starts_with("One or more errors exist"));
        assert!(report.contains("at: paths"));
        assert!(report.contains("at: /users"));
        assert!(report.contains("Missing required property: responses"));
    }

    #[test]
    fn display_skips_empty_branches() {
        let mut tree = ExceptionTree::new("errors");
        tree.at("clean");
        tree.at("dirty").message("problem");
        let report = tree.to_string();
        assert!(!report.contains("clean"));
        assert!(report.contains("dirty"));
    }

    #[test]
    fn scope_is_lazy() {
        let scope = ExceptionScope::new("errors");
        let deep = scope.at("a").at("b").at("c");
        assert!(!deep.has_exception());
        assert!(scope.into_option().is_none());
    }

    #[test]
    fn scope_writes_at_path() {
        let scope = ExceptionScope::new("errors");
        scope.at("properties").at("name").message("wrong type");
        assert!(scope.has_exception());
        let tree = scope.to_tree();
        assert_eq!(
            tree.nested(&["properties", "name"]).unwrap().messages(),
            &["wrong type"]
        );
    }

    #[test]
    fn sibling_scopes_share_the_tree() {
        let scope = ExceptionScope::new("errors");
        let left = scope.at("left");
        let right = scope.at("right");
        left.message("one");
        right.message("two");
        let tree = scope.to_tree();
        assert_eq!(tree.count(), 2);
    }
}
