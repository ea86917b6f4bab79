//! # Validator descriptors
//!
//! The meta-schema that drives normalization is itself a tree: each node
//! describes the expected shape of one position in a raw definition. A
//! node is either a capability set ([`Descriptor`]), one of the literal
//! shorthands (free-form, forbidden, unchecked), or an [`EnforcerRef`]
//! marker asking the normalizer to instantiate a named component at that
//! position.
//!
//! Many descriptor fields are context-dependent: whether `format` is
//! allowed depends on the already-normalized `type` of the surrounding
//! schema. Such fields are modeled as [`Resolvable`] values, a tagged
//! choice between a static value and a callback over the walk context.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::rc::Rc;

use serde_json::Value;

use crate::definition::DefinitionType;
use crate::walk::{Materialized, Walk};

//////////////////////////////////////////// Resolvable ////////////////////////////////////////////

/// A descriptor field that is either a literal value or a callback
/// receiving the walk context.
#[derive(Clone)]
pub enum Resolvable<T> {
    Static(T),
    Dynamic(Rc<dyn Fn(&Walk) -> T>),
}

impl<T: Clone> Resolvable<T> {
    /// Resolves the field against the current walk context.
    pub fn resolve(&self, walk: &Walk) -> T {
        match self {
            Resolvable::Static(value) => value.clone(),
            Resolvable::Dynamic(callback) => callback(walk),
        }
    }
}

impl<T> Resolvable<T> {
    /// Wraps a callback.
    pub fn from_fn(callback: impl Fn(&Walk) -> T + 'static) -> Self {
        Resolvable::Dynamic(Rc::new(callback))
    }
}

impl<T: Debug> Debug for Resolvable<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Resolvable::Static(value) => write!(f, "Static({:?})", value),
            Resolvable::Dynamic(_) => write!(f, "Dynamic(<callback>)"),
        }
    }
}

//////////////////////////////////////////// EnforcerRef ///////////////////////////////////////////

/// A late-bound marker: "at this point, instantiate component `component`
/// as a child enforcer".
///
/// `config` optionally overrides descriptor attributes (weight, allowed,
/// required, default) for the position the reference occupies, and serves
/// as the inline descriptor when the raw value is a boolean instead of an
/// object.
#[derive(Clone)]
pub struct EnforcerRef {
    pub component: String,
    pub config: Option<Rc<Descriptor>>,
}

impl EnforcerRef {
    /// A bare reference to a named component.
    pub fn new(component: impl Into<String>) -> Self {
        EnforcerRef {
            component: component.into(),
            config: None,
        }
    }

    /// A reference with an inline descriptor override.
    pub fn with_config(component: impl Into<String>, config: Descriptor) -> Self {
        EnforcerRef {
            component: component.into(),
            config: Some(Rc::new(config)),
        }
    }
}

impl Debug for EnforcerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "EnforcerRef({})", self.component)
    }
}

///////////////////////////////////////////// Validator ////////////////////////////////////////////

/// A validator descriptor node.
#[derive(Clone)]
pub enum Validator {
    /// Literal `true`: deep-copy the definition, accept anything.
    FreeForm,
    /// Literal `false`: every key is a violation.
    Forbidden,
    /// Absent validator: the raw definition passes through untouched.
    Unchecked,
    /// Instantiate a component at this position.
    Ref(EnforcerRef),
    /// A capability set.
    Plain(Rc<Descriptor>),
    /// Resolved against the walk context before use.
    Dynamic(Rc<dyn Fn(&Walk) -> Validator>),
}

impl Validator {
    /// Wraps a descriptor.
    pub fn plain(descriptor: Descriptor) -> Validator {
        Validator::Plain(Rc::new(descriptor))
    }

    /// Wraps a callback that picks the validator at traversal time.
    pub fn dynamic(callback: impl Fn(&Walk) -> Validator + 'static) -> Validator {
        Validator::Dynamic(Rc::new(callback))
    }

    /// The descriptor carrying this validator's property attributes
    /// (weight, allowed, required, default, ignored), if any.
    ///
    /// For an [`EnforcerRef`] the attributes come from its inline config.
    pub fn attributes(&self) -> Option<Rc<Descriptor>> {
        match self {
            Validator::Plain(descriptor) => Some(Rc::clone(descriptor)),
            Validator::Ref(reference) => reference.config.clone(),
            _ => None,
        }
    }
}

impl Debug for Validator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Validator::FreeForm => write!(f, "FreeForm"),
            Validator::Forbidden => write!(f, "Forbidden"),
            Validator::Unchecked => write!(f, "Unchecked"),
            Validator::Ref(reference) => write!(f, "{:?}", reference),
            Validator::Plain(_) => write!(f, "Plain(<descriptor>)"),
            Validator::Dynamic(_) => write!(f, "Dynamic(<callback>)"),
        }
    }
}

///////////////////////////////////////////// Descriptor ///////////////////////////////////////////

/// A capability-set validator node.
///
/// All fields are optional; an empty descriptor accepts any value of any
/// type. Fields mirror the capability set of the meta-schema:
///
/// - `kind` — permitted definition types (the meta-schema's `type`)
/// - `properties` / `items` / `additional_properties` — child validators
/// - `enum_values` — permitted literal values
/// - `allowed` / `required` / `ignored` — property lifecycle flags
/// - `default` — synthesized value when the property is absent
/// - `deserialize` — rewrites the materialized result (e.g. compiling a
///   pattern string into a regex)
/// - `errors` — cross-field checks run after the node materializes
/// - `weight` — evaluation-order weight; lower runs earlier
/// - `free_form` — accept and deep-copy arbitrary object content
#[derive(Clone, Default)]
pub struct Descriptor {
    pub kind: Option<Resolvable<Vec<DefinitionType>>>,
    pub properties: BTreeMap<String, Validator>,
    pub items: Option<Box<Validator>>,
    pub additional_properties: Option<Box<Validator>>,
    pub enum_values: Option<Resolvable<Vec<Value>>>,
    pub allowed: Option<Resolvable<bool>>,
    pub required: Option<Resolvable<bool>>,
    pub ignored: Option<Resolvable<bool>>,
    pub default: Option<Resolvable<Value>>,
    pub deserialize: Option<Rc<dyn Fn(&Walk, Materialized) -> Materialized>>,
    pub errors: Option<Rc<dyn Fn(&Walk)>>,
    pub weight: i32,
    pub free_form: bool,
}

impl Descriptor {
    /// An empty descriptor.
    pub fn new() -> Self {
        Descriptor::default()
    }

    /// A descriptor permitting the given definition types.
    pub fn typed(kinds: &[DefinitionType]) -> Self {
        Descriptor {
            kind: Some(Resolvable::Static(kinds.to_vec())),
            ..Descriptor::default()
        }
    }

    /// Shorthand for a single-type descriptor.
    pub fn of(kind: DefinitionType) -> Self {
        Descriptor::typed(&[kind])
    }
}

impl Debug for Descriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Descriptor")
            .field("kind", &self.kind)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .field("weight", &self.weight)
            .field("free_form", &self.free_form)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_come_from_plain_descriptor() {
        let validator = Validator::plain(Descriptor {
            weight: -10,
            ..Descriptor::default()
        });
        assert_eq!(validator.attributes().unwrap().weight, -10);
    }

    #[test]
    fn attributes_come_from_ref_config() {
        let validator = Validator::Ref(EnforcerRef::with_config(
            "Schema",
            Descriptor {
                weight: 5,
                ..Descriptor::default()
            },
        ));
        assert_eq!(validator.attributes().unwrap().weight, 5);
        assert!(Validator::Ref(EnforcerRef::new("Schema"))
            .attributes()
            .is_none());
    }

    #[test]
    fn shorthand_validators_have_no_attributes() {
        assert!(Validator::FreeForm.attributes().is_none());
        assert!(Validator::Forbidden.attributes().is_none());
        assert!(Validator::Unchecked.attributes().is_none());
    }

    #[test]
    fn typed_descriptor_lists_kinds() {
        let descriptor = Descriptor::typed(&[DefinitionType::Object, DefinitionType::Boolean]);
        match descriptor.kind {
            Some(Resolvable::Static(kinds)) => {
                assert_eq!(kinds, vec![DefinitionType::Object, DefinitionType::Boolean]);
            }
            other => panic!("expected static kinds, got {:?}", other),
        }
    }
}
