//! Relationship definitions between entities.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::fmt;

/// Cardinality of a relationship.
///
/// Fixed once committed: changing it is a remove followed by an add.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Exactly one related record.
    OneToOne,
    /// Ordered collection of related records owned by this side.
    OneToMany,
    /// Ordered collection of related records shared across owners.
    ManyToMany,
}

impl Cardinality {
    /// Whether the owning side holds a collection.
    pub fn is_collection(self) -> bool {
        !matches!(self, Cardinality::OneToOne)
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cardinality::OneToOne => "one-to-one",
            Cardinality::OneToMany => "one-to-many",
            Cardinality::ManyToMany => "many-to-many",
        })
    }
}

/// A relationship from the owning entity to another (or the same) entity.
#[derive(
    Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
pub struct RelationDef {
    /// Attribute name exposed on the owning record.
    pub name: String,
    /// Entity that declares the relationship.
    pub owner_entity: String,
    /// Target entity. May not be registered yet.
    pub related_entity: String,
    /// Relationship cardinality.
    pub cardinality: Cardinality,
    /// Removing an owner removes its related records.
    #[serde(default)]
    pub cascade_delete: bool,
    /// The related entity exposes a back-reference.
    #[serde(default)]
    pub bidirectional: bool,
    /// Added by an operator after deployment rather than declared by the module.
    #[serde(default)]
    pub user_added: bool,
}

impl RelationDef {
    fn with_cardinality(
        name: impl Into<String>,
        owner_entity: impl Into<String>,
        related_entity: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            owner_entity: owner_entity.into(),
            related_entity: related_entity.into(),
            cardinality,
            cascade_delete: false,
            bidirectional: false,
            user_added: false,
        }
    }

    /// Create a one-to-one relationship.
    pub fn one_to_one(
        name: impl Into<String>,
        owner_entity: impl Into<String>,
        related_entity: impl Into<String>,
    ) -> Self {
        Self::with_cardinality(name, owner_entity, related_entity, Cardinality::OneToOne)
    }

    /// Create a one-to-many relationship.
    pub fn one_to_many(
        name: impl Into<String>,
        owner_entity: impl Into<String>,
        related_entity: impl Into<String>,
    ) -> Self {
        Self::with_cardinality(name, owner_entity, related_entity, Cardinality::OneToMany)
    }

    /// Create a many-to-many relationship.
    pub fn many_to_many(
        name: impl Into<String>,
        owner_entity: impl Into<String>,
        related_entity: impl Into<String>,
    ) -> Self {
        Self::with_cardinality(name, owner_entity, related_entity, Cardinality::ManyToMany)
    }

    /// Cascade deletes from the owner.
    pub fn with_cascade_delete(mut self) -> Self {
        self.cascade_delete = true;
        self
    }

    /// Expose a back-reference on the related entity.
    pub fn bidirectional(mut self) -> Self {
        self.bidirectional = true;
        self
    }

    /// Mark as added by an operator.
    pub fn user_added(mut self) -> Self {
        self.user_added = true;
        self
    }

    /// Whether the relationship points back at its owner.
    pub fn is_self_referencing(&self) -> bool {
        self.owner_entity.eq_ignore_ascii_case(&self.related_entity)
    }

    /// Case-insensitive name match.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Case-insensitive target match.
    pub fn targets(&self, entity: &str) -> bool {
        self.related_entity.eq_ignore_ascii_case(entity)
    }
}
