//! # oas-enforcer
//!
//! The core of an OpenAPI document enforcement engine: a recursive,
//! validator-driven normalizer that checks a raw OpenAPI 2/3 definition
//! against a declarative meta-schema and materializes it into a tree of
//! schema enforcers, plus the schema runtime that deserializes,
//! serializes, validates, populates, and randomizes user values against
//! any node of that tree.
//!
//! ## Key Features
//!
//! - **Best-effort validation**: every violation is collected into a
//!   path-indexed exception tree; a single pass surfaces everything
//! - **Cycle-safe**: cyclic definitions collapse onto shared enforcer
//!   instances instead of overflowing
//! - **Deterministic ordering**: weighted property evaluation lets
//!   context-dependent rules read already-normalized siblings
//! - **Extensible codecs**: a `(type, format)` registry drives
//!   format-aware deserialization, serialization, validation, and random
//!   generation
//!
//! ## Usage Examples
//!
//! ```rust
//! use oas_enforcer::{Enforcer, Version};
//! use serde_json::json;
//!
//! let enforcer = Enforcer::new(Version::V3_0_3);
//! let schema = enforcer
//!     .schema(&json!({
//!         "type": "object",
//!         "properties": {"name": {"type": "string"}},
//!         "required": ["name"]
//!     }))
//!     .into_result()
//!     .unwrap();
//!
//! let value = schema
//!     .deserialize(&json!({"name": "Ada"}))
//!     .into_result()
//!     .unwrap();
//! assert!(schema.validate(&value).is_ok());
//! ```

mod data_types;
mod definition;
mod descriptor;
mod exception;
mod normalizer;
mod outcome;
mod populate;
mod random;
mod schema;
mod schema_validator;
mod serialize;
mod validate;
mod value;
mod version;
mod walk;

pub use data_types::{
    registered_constructors, DataTypeDefinition, DataTypeError, DataTypes, PrimitiveType,
};
pub use definition::{DefGraph, DefId, DefNode, DefinitionType};
pub use descriptor::{Descriptor, EnforcerRef, Resolvable, Validator};
pub use exception::{ExceptionScope, ExceptionTree};
pub use normalizer::normalize_root;
pub use outcome::Outcome;
pub use populate::{inject, PopulateOptions, Replacement};
pub use random::RandomOptions;
pub use schema::{Additional, Discriminated, Enforcer, SchemaNode};
pub use value::{TypedValue, WrappedValue};
pub use version::{Version, VersionParseError};
pub use walk::{Arena, ComponentSpec, EnforcerData, EnforcerId, Materialized, Walk};
