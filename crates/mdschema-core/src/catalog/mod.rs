//! Entity catalog types.
//!
//! Declarative descriptions of entities, their fields and their relationships.

mod entity;
mod field;
mod relation;
mod types;

pub use entity::{registry_key, Element, EntityDef};
pub use field::{DefaultValue, FieldDef};
pub use relation::{Cardinality, RelationDef};
pub use types::FieldType;
