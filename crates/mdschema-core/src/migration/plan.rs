//! Migration plans produced by merging a redeclared entity.
//!
//! A plan is the contract with the storage collaborator: `RemovedElement`
//! and `BreakingChange` entries tell it which persisted columns to drop or
//! convert. Everything else is informational.

use crate::catalog::{Cardinality, DefaultValue, Element, FieldType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of merging an incoming declaration into the registered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Entity the plan applies to.
    pub entity: String,
    /// Module that submitted the declaration.
    pub owning_module: String,
    /// Version the plan starts from.
    pub from_version: u64,
    /// Version the entity will have once committed.
    pub to_version: u64,
    /// Ordered changes.
    pub entries: Vec<PlanEntry>,
    /// Operator-added elements kept although the module no longer declares them.
    #[serde(default)]
    pub retained: Vec<String>,
}

/// A single change in a migration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum PlanEntry {
    /// Element declared for the first time.
    Added {
        /// The new element.
        element: Element,
    },
    /// Module-declared element no longer declared; its data must be dropped.
    RemovedElement {
        /// The element as it was registered.
        element: Element,
    },
    /// Declared type changed along a safe coercion.
    Retyped {
        /// Field name.
        name: String,
        /// Registered type.
        from: FieldType,
        /// Incoming type.
        to: FieldType,
    },
    /// Non-shape attributes changed.
    Updated {
        /// Element name (or the entity name for entity-level changes).
        name: String,
        /// Individual attribute changes.
        changes: Vec<AttributeChange>,
    },
    /// Element order changed.
    Reordered {
        /// Element names in their new order.
        order: Vec<String>,
    },
    /// Ownership moved to another module.
    OwnerChanged {
        /// Registered owner.
        from: String,
        /// New owner.
        to: String,
    },
    /// A change that may not preserve existing data.
    BreakingChange(BreakingChange),
}

/// A non-shape attribute change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AttributeChange {
    /// Required flag.
    Required {
        /// Registered value.
        from: bool,
        /// New value.
        to: bool,
    },
    /// Default value.
    Default {
        /// Registered value.
        from: Option<DefaultValue>,
        /// New value.
        to: Option<DefaultValue>,
    },
    /// Whether the default is owned by an operator rather than the module.
    OperatorDefault {
        /// Registered value.
        from: bool,
        /// New value.
        to: bool,
    },
    /// Cascade-delete flag.
    CascadeDelete {
        /// Registered value.
        from: bool,
        /// New value.
        to: bool,
    },
    /// Back-reference flag.
    Bidirectional {
        /// Registered value.
        from: bool,
        /// New value.
        to: bool,
    },
    /// A name that differs only in letter case.
    Spelling {
        /// Which name changed.
        attribute: String,
        /// Registered spelling.
        from: String,
        /// New spelling.
        to: String,
    },
}

/// A change that may not preserve existing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChange {
    /// Element name, or the entity name for entity-level changes.
    pub element: String,
    /// What changed.
    pub kind: BreakingKind,
}

/// Kinds of breaking change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakingKind {
    /// Declared type changed with no safe coercion.
    IncompatibleType {
        /// Registered type.
        from: FieldType,
        /// Incoming type.
        to: FieldType,
    },
    /// Relationship cardinality changed (handled as remove + add).
    VariantChanged {
        /// Registered cardinality.
        from: Cardinality,
        /// Incoming cardinality.
        to: Cardinality,
    },
    /// Relationship now targets another entity.
    TargetChanged {
        /// Registered target.
        from: String,
        /// Incoming target.
        to: String,
    },
    /// A field became a relationship or vice versa.
    ElementKindChanged {
        /// Registered element kind.
        from: String,
        /// Incoming element kind.
        to: String,
    },
    /// Entity namespace changed, altering every signature that refers to it.
    NamespaceChanged {
        /// Registered namespace.
        from: Option<String>,
        /// Incoming namespace.
        to: Option<String>,
    },
}

impl MigrationPlan {
    /// Create an empty plan.
    pub fn new(entity: impl Into<String>, owning_module: impl Into<String>, from_version: u64) -> Self {
        Self {
            entity: entity.into(),
            owning_module: owning_module.into(),
            from_version,
            to_version: from_version,
            entries: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// Plan for an entity registered for the first time.
    pub fn initial(entity: impl Into<String>, owning_module: impl Into<String>, elements: Vec<Element>) -> Self {
        let mut plan = Self::new(entity, owning_module, 0);
        plan.entries = elements
            .into_iter()
            .map(|element| PlanEntry::Added { element })
            .collect();
        plan.to_version = 1;
        plan
    }

    /// Check if the plan changes nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if any entry is a breaking change.
    pub fn has_breaking_changes(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, PlanEntry::BreakingChange(_)))
    }

    /// All breaking changes.
    pub fn breaking_changes(&self) -> Vec<&BreakingChange> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                PlanEntry::BreakingChange(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    /// All elements the storage collaborator must drop.
    pub fn removed_elements(&self) -> Vec<&Element> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                PlanEntry::RemovedElement { element } => Some(element),
                _ => None,
            })
            .collect()
    }

    /// Names of added elements.
    pub fn added_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                PlanEntry::Added { element } => Some(element.name()),
                _ => None,
            })
            .collect()
    }

    /// Render as JSON for audit collaborators.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for MigrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): v{} -> v{}",
            self.entity, self.owning_module, self.from_version, self.to_version
        )?;
        for entry in &self.entries {
            write!(f, "\n  {}", entry)?;
        }
        if !self.retained.is_empty() {
            write!(f, "\n  retained: {}", self.retained.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Display for BreakingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BreakingKind::IncompatibleType { from, to } => {
                write!(f, "{}: type {} -> {}", self.element, from, to)
            }
            BreakingKind::VariantChanged { from, to } => {
                write!(f, "{}: cardinality {} -> {}", self.element, from, to)
            }
            BreakingKind::TargetChanged { from, to } => {
                write!(f, "{}: target {} -> {}", self.element, from, to)
            }
            BreakingKind::ElementKindChanged { from, to } => {
                write!(f, "{}: {} -> {}", self.element, from, to)
            }
            BreakingKind::NamespaceChanged { from, to } => write!(
                f,
                "{}: namespace {} -> {}",
                self.element,
                from.as_deref().unwrap_or("<default>"),
                to.as_deref().unwrap_or("<default>")
            ),
        }
    }
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanEntry::Added { element } => write!(f, "+ {}", element.name()),
            PlanEntry::RemovedElement { element } => write!(f, "- {}", element.name()),
            PlanEntry::Retyped { name, from, to } => write!(f, "~ {}: {} -> {}", name, from, to),
            PlanEntry::Updated { name, changes } => {
                write!(f, "~ {} ({} attribute change(s))", name, changes.len())
            }
            PlanEntry::Reordered { order } => write!(f, "~ order [{}]", order.join(", ")),
            PlanEntry::OwnerChanged { from, to } => write!(f, "~ owner {} -> {}", from, to),
            PlanEntry::BreakingChange(b) => write!(f, "! {}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;

    #[test]
    fn test_initial_plan() {
        let plan = MigrationPlan::initial(
            "Patient",
            "clinic",
            vec![Element::Field(FieldDef::new("name", FieldType::String))],
        );

        assert_eq!(plan.from_version, 0);
        assert_eq!(plan.to_version, 1);
        assert_eq!(plan.added_names(), vec!["name"]);
        assert!(!plan.has_breaking_changes());
    }

    #[test]
    fn test_accessors() {
        let mut plan = MigrationPlan::new("Patient", "clinic", 3);
        assert!(plan.is_empty());

        plan.entries.push(PlanEntry::RemovedElement {
            element: Element::Field(FieldDef::new("legacy", FieldType::Int)),
        });
        plan.entries.push(PlanEntry::BreakingChange(BreakingChange {
            element: "age".into(),
            kind: BreakingKind::IncompatibleType {
                from: FieldType::Int,
                to: FieldType::String,
            },
        }));

        assert_eq!(plan.len(), 2);
        assert!(plan.has_breaking_changes());
        assert_eq!(plan.breaking_changes()[0].element, "age");
        assert_eq!(plan.removed_elements()[0].name(), "legacy");
        assert_eq!(
            plan.to_string(),
            "Patient (clinic): v3 -> v3\n  - legacy\n  ! age: type int -> string"
        );
    }

    #[test]
    fn test_display() {
        let entry = PlanEntry::BreakingChange(BreakingChange {
            element: "visits".into(),
            kind: BreakingKind::VariantChanged {
                from: Cardinality::OneToOne,
                to: Cardinality::OneToMany,
            },
        });
        assert_eq!(entry.to_string(), "! visits: cardinality one-to-one -> one-to-many");
    }

    #[test]
    fn test_json_export() {
        let mut plan = MigrationPlan::new("Patient", "clinic", 1);
        plan.entries.push(PlanEntry::Retyped {
            name: "age".into(),
            from: FieldType::Int,
            to: FieldType::Long,
        });

        let json = plan.to_json().unwrap();
        assert!(json.contains(r#""change": "retyped""#));

        let parsed: MigrationPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, plan);
    }

    #[test]
    fn test_json_round_trip_with_spelling_change() {
        let mut plan = MigrationPlan::new("Patient", "clinic", 2);
        plan.to_version = 3;
        plan.entries.push(PlanEntry::Updated {
            name: "Patient".into(),
            changes: vec![
                AttributeChange::Spelling {
                    attribute: "entity".into(),
                    from: "patient".into(),
                    to: "Patient".into(),
                },
                AttributeChange::OperatorDefault { from: false, to: true },
            ],
        });
        plan.retained.push("nickname".into());

        let json = plan.to_json().unwrap();
        assert!(json.contains("\"change\": \"spelling\""));
        assert!(json.contains("\"attribute\": \"entity\""));

        let decoded: MigrationPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, plan);
    }
}
