//! Entity definitions.

use super::field::FieldDef;
use super::relation::RelationDef;
use super::types::FieldType;
use crate::error::{Error, ValidationError};
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::collections::HashSet;

/// An entity definition (record type schema).
#[derive(
    Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize,
)]
pub struct EntityDef {
    /// Entity name, unique across the registry (case-insensitive).
    pub name: String,
    /// Dotted namespace used for the canonical name.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Module that declares the entity.
    pub owning_module: String,
    /// Committed version; assigned by the registry.
    #[serde(default)]
    pub schema_version: u64,
    /// Field definitions, in record layout order.
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Relationship definitions, in record layout order.
    #[serde(default)]
    pub relationships: Vec<RelationDef>,
}

/// A field or relationship, addressed by name.
#[derive(Debug, Clone, PartialEq, SerdeSerialize, SerdeDeserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum Element {
    /// A scalar attribute.
    Field(FieldDef),
    /// A reference to another entity.
    Relationship(RelationDef),
}

impl Element {
    /// Element name.
    pub fn name(&self) -> &str {
        match self {
            Element::Field(f) => &f.name,
            Element::Relationship(r) => &r.name,
        }
    }

    /// Whether an operator added this element.
    pub fn is_user_added(&self) -> bool {
        match self {
            Element::Field(f) => f.user_added,
            Element::Relationship(r) => r.user_added,
        }
    }
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>, owning_module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            owning_module: owning_module.into(),
            schema_version: 0,
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Place the entity in a namespace.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Add a relationship to the entity.
    pub fn with_relationship(mut self, relationship: RelationDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Registry key: the lowercased name.
    pub fn key(&self) -> String {
        registry_key(&self.name)
    }

    /// Get a field by name (case-insensitive).
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.is_named(name))
    }

    /// Get a relationship by name (case-insensitive).
    pub fn get_relationship(&self, name: &str) -> Option<&RelationDef> {
        self.relationships.iter().find(|r| r.is_named(name))
    }

    /// Check whether a field or relationship with this name exists.
    pub fn has_element(&self, name: &str) -> bool {
        self.get_field(name).is_some() || self.get_relationship(name).is_some()
    }

    /// Fields and relationships added by an operator.
    pub fn user_added_elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.fields
            .iter()
            .filter(|f| f.user_added)
            .cloned()
            .map(Element::Field)
            .chain(
                self.relationships
                    .iter()
                    .filter(|r| r.user_added)
                    .cloned()
                    .map(Element::Relationship),
            )
    }

    /// Canonical dotted name, e.g. `org.acme.clinic.Patient`.
    pub fn canonical_name(&self, default_namespace: &str) -> String {
        let namespace = self.namespace.as_deref().unwrap_or(default_namespace);
        if namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", namespace, self.name)
        }
    }

    /// Binary name used inside signatures, e.g. `org/acme/clinic/Patient`.
    pub fn binary_name(&self, default_namespace: &str) -> String {
        self.canonical_name(default_namespace).replace('.', "/")
    }

    /// Same declaration, ignoring the registry-assigned version.
    pub fn same_declaration(&self, other: &EntityDef) -> bool {
        self.name == other.name
            && self.namespace == other.namespace
            && self.owning_module == other.owning_module
            && self.fields == other.fields
            && self.relationships == other.relationships
    }

    /// Validate the declaration.
    ///
    /// Runs before any registry mutation; nothing is partially applied.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyEntityName);
        }
        check_identifier(&self.name)?;
        if self.owning_module.trim().is_empty() {
            return Err(ValidationError::EmptyOwningModule {
                entity: self.name.clone(),
            });
        }
        if let Some(ns) = &self.namespace {
            let valid = !ns.is_empty()
                && ns.split('.').all(|seg| check_identifier(seg).is_ok() && !seg.is_empty());
            if !valid {
                return Err(ValidationError::InvalidNamespace {
                    entity: self.name.clone(),
                    namespace: ns.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        let names = self
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.relationships.iter().map(|r| r.name.as_str()));
        for name in names {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyElementName {
                    entity: self.name.clone(),
                });
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ValidationError::DuplicateElement {
                    entity: self.name.clone(),
                    name: name.to_string(),
                });
            }
        }

        for field in &self.fields {
            self.validate_field(field)?;
        }
        for relationship in &self.relationships {
            self.validate_relationship(relationship)?;
        }
        Ok(())
    }

    fn validate_field(&self, field: &FieldDef) -> Result<(), ValidationError> {
        if let FieldType::Enum { variants } = &field.field_type {
            let distinct: HashSet<_> = variants.iter().collect();
            let malformed = variants
                .iter()
                .any(|v| v.is_empty() || check_identifier(v).is_err());
            if variants.is_empty() || malformed || distinct.len() != variants.len() {
                return Err(ValidationError::InvalidEnum {
                    entity: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        if let Some(default) = &field.default {
            default
                .check(&field.field_type)
                .map_err(|reason| ValidationError::InvalidDefault {
                    entity: self.name.clone(),
                    field: field.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }

    fn validate_relationship(&self, rel: &RelationDef) -> Result<(), ValidationError> {
        if !rel.owner_entity.eq_ignore_ascii_case(&self.name) {
            return Err(ValidationError::OwnerMismatch {
                entity: self.name.clone(),
                relationship: rel.name.clone(),
                owner: rel.owner_entity.clone(),
            });
        }
        if rel.related_entity.trim().is_empty() {
            return Err(ValidationError::EmptyRelatedEntity {
                entity: self.name.clone(),
                relationship: rel.name.clone(),
            });
        }
        check_identifier(&rel.related_entity)
    }

    /// Serialize the definition to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Invariant(format!("serialize '{}': {}", self.name, e)))
    }

    /// Deserialize a definition from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Invariant(format!("deserialize entity: {}", e)))
    }
}

/// Lowercased name used for case-insensitive identity.
pub fn registry_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Names end up inside signatures, so the grammar's delimiters are banned.
/// Dots only separate namespace segments.
fn check_identifier(name: &str) -> Result<(), ValidationError> {
    let forbidden =
        |c: char| c.is_whitespace() || matches!(c, ';' | '<' | '>' | ',' | '/' | '[' | '.');
    if name.chars().any(forbidden) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}
