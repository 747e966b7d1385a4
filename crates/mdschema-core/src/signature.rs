//! Canonical type signatures for fields and relationships.
//!
//! The downstream record generator caches generated types by signature, so
//! equal shapes must render to byte-identical strings. Grammar:
//!
//! ```text
//! signature    := field-sig | relation-sig
//! field-sig    := 'Z' | 'I' | 'J' | 'D' | 'N' | 'S' | 'A' | 'T' | '[B' | enum-sig
//! enum-sig     := 'E' '<' variant (',' variant)* '>'
//! relation-sig := single | collection
//! single       := 'L' binary-name ';'
//! collection   := '[' tag single
//! tag          := 'm' | 'n'
//! ```
//!
//! Enum variants are rendered sorted; `m` tags one-to-many and `n`
//! many-to-many collections.

use crate::catalog::{Cardinality, EntityDef, FieldDef, FieldType, RelationDef};
use crate::error::{Error, Result};
use std::fmt;
use thiserror::Error as ThisError;

/// A parsed signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Signature {
    /// A scalar or enum field.
    Field(FieldType),
    /// A relationship to the entity with the given binary name.
    Relation {
        /// Relationship cardinality.
        cardinality: Cardinality,
        /// Slash-separated canonical name of the related entity.
        binary_name: String,
    },
}

/// Input that does not follow the signature grammar.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("malformed signature '{input}': {reason}")]
pub struct SignatureParseError {
    /// Rejected input.
    pub input: String,
    /// What went wrong.
    pub reason: &'static str,
}

impl Signature {
    /// Parse a signature string.
    pub fn parse(input: &str) -> std::result::Result<Self, SignatureParseError> {
        let fail = |reason| SignatureParseError {
            input: input.to_string(),
            reason,
        };

        let scalar = match input {
            "Z" => Some(FieldType::Bool),
            "I" => Some(FieldType::Int),
            "J" => Some(FieldType::Long),
            "D" => Some(FieldType::Double),
            "N" => Some(FieldType::Decimal),
            "S" => Some(FieldType::String),
            "A" => Some(FieldType::Date),
            "T" => Some(FieldType::DateTime),
            "[B" => Some(FieldType::Blob),
            _ => None,
        };
        if let Some(field_type) = scalar {
            return Ok(Signature::Field(field_type));
        }

        if let Some(body) = input.strip_prefix("E<") {
            let body = body.strip_suffix('>').ok_or_else(|| fail("unterminated enum"))?;
            let variants: Vec<String> = body.split(',').map(str::to_string).collect();
            if variants.iter().any(|v| v.is_empty() || v.contains(['<', '>'])) {
                return Err(fail("empty or nested enum variant"));
            }
            return Ok(Signature::Field(FieldType::Enum { variants }));
        }

        let (cardinality, single) = if let Some(rest) = input.strip_prefix("[m") {
            (Cardinality::OneToMany, rest)
        } else if let Some(rest) = input.strip_prefix("[n") {
            (Cardinality::ManyToMany, rest)
        } else {
            (Cardinality::OneToOne, input)
        };

        let binary_name = single
            .strip_prefix('L')
            .and_then(|s| s.strip_suffix(';'))
            .ok_or_else(|| fail("expected 'L<name>;'"))?;
        if binary_name.is_empty() || binary_name.contains([';', '[', '<', '>']) {
            return Err(fail("invalid binary name"));
        }

        Ok(Signature::Relation {
            cardinality,
            binary_name: binary_name.to_string(),
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Field(field_type) => match field_type {
                FieldType::Bool => f.write_str("Z"),
                FieldType::Int => f.write_str("I"),
                FieldType::Long => f.write_str("J"),
                FieldType::Double => f.write_str("D"),
                FieldType::Decimal => f.write_str("N"),
                FieldType::String => f.write_str("S"),
                FieldType::Date => f.write_str("A"),
                FieldType::DateTime => f.write_str("T"),
                FieldType::Blob => f.write_str("[B"),
                FieldType::Enum { variants } => {
                    let mut sorted: Vec<&str> = variants.iter().map(String::as_str).collect();
                    sorted.sort_unstable();
                    sorted.dedup();
                    write!(f, "E<{}>", sorted.join(","))
                }
            },
            Signature::Relation {
                cardinality,
                binary_name,
            } => match cardinality {
                Cardinality::OneToOne => write!(f, "L{};", binary_name),
                Cardinality::OneToMany => write!(f, "[mL{};", binary_name),
                Cardinality::ManyToMany => write!(f, "[nL{};", binary_name),
            },
        }
    }
}

/// Renders signatures for fields and relationships.
#[derive(Debug, Clone)]
pub struct SignatureGenerator {
    default_namespace: String,
}

impl SignatureGenerator {
    /// Create a generator that places unqualified entities in `default_namespace`.
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
        }
    }

    /// Signature of a field. Depends only on the declared type.
    pub fn field(&self, field: &FieldDef) -> String {
        Signature::Field(field.field_type.clone()).to_string()
    }

    /// Signature of a relationship.
    ///
    /// `related` is the registered definition of the relationship's target,
    /// or `None` when it has not been registered yet.
    pub fn relationship(&self, relationship: &RelationDef, related: Option<&EntityDef>) -> Result<String> {
        let related = related.ok_or_else(|| Error::UnresolvedEntity {
            entity: relationship.owner_entity.clone(),
            related: relationship.related_entity.clone(),
        })?;
        if !relationship.targets(&related.name) {
            return Err(Error::Invariant(format!(
                "relationship '{}' targets '{}' but was resolved against '{}'",
                relationship.name, relationship.related_entity, related.name
            )));
        }

        Ok(Signature::Relation {
            cardinality: relationship.cardinality,
            binary_name: related.binary_name(&self.default_namespace),
        }
        .to_string())
    }
}
