//! Merging a redeclared entity with its registered definition.
//!
//! Elements are matched by case-insensitive name only; there is no rename
//! detection. The merged definition takes its shape and element order from
//! the incoming declaration, keeps operator state (user-added flags and
//! operator-set defaults) from the registered one, and appends user-added
//! elements the module no longer declares.

use super::coercion::{classify, TypeChange};
use super::error::MigrationConflictError;
use super::plan::{AttributeChange, BreakingChange, BreakingKind, MigrationPlan, PlanEntry};
use crate::catalog::{registry_key, Element, EntityDef, FieldDef, RelationDef};
use std::collections::HashSet;
use tracing::debug;

/// What to do when a merge contains breaking changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakingChangePolicy {
    /// Commit the merge; the plan carries `BreakingChange` entries.
    #[default]
    Surface,
    /// Refuse the merge with [`MigrationConflictError::BreakingChanges`].
    Reject,
}

/// Merge policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergePolicy {
    /// Handling of breaking changes.
    pub breaking_changes: BreakingChangePolicy,
    /// Allow a different module to take over an entity.
    pub allow_owner_change: bool,
}

/// Computes merged definitions and migration plans.
#[derive(Debug, Clone, Default)]
pub struct MigrationCoordinator {
    policy: MergePolicy,
}

impl MigrationCoordinator {
    /// Create a coordinator with the given policy.
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Merge `incoming` into `previous`.
    ///
    /// The merged definition keeps `previous.schema_version`; the plan's
    /// `to_version` is the version it must be committed under.
    pub fn merge(
        &self,
        previous: &EntityDef,
        incoming: &EntityDef,
    ) -> Result<(EntityDef, MigrationPlan), MigrationConflictError> {
        if registry_key(&previous.name) != registry_key(&incoming.name) {
            return Err(MigrationConflictError::EntityMismatch {
                previous: previous.name.clone(),
                incoming: incoming.name.clone(),
            });
        }

        let mut plan = MigrationPlan::new(
            incoming.name.clone(),
            incoming.owning_module.clone(),
            previous.schema_version,
        );

        self.merge_entity_attributes(previous, incoming, &mut plan)?;

        let mut merged = EntityDef {
            name: incoming.name.clone(),
            namespace: incoming.namespace.clone(),
            owning_module: incoming.owning_module.clone(),
            schema_version: previous.schema_version,
            fields: Vec::with_capacity(incoming.fields.len()),
            relationships: Vec::with_capacity(incoming.relationships.len()),
        };

        for field in &incoming.fields {
            let merged_field = merge_field(previous, field, &mut plan);
            merged.fields.push(merged_field);
        }
        for relationship in &incoming.relationships {
            let merged_rel = merge_relationship(previous, relationship, &mut plan);
            merged.relationships.push(merged_rel);
        }

        carry_over_previous_only(previous, incoming, &mut merged, &mut plan);

        let previous_order = element_order(previous);
        let merged_order = element_order(&merged);
        if previous_order != merged_order && same_names(&previous_order, &merged_order) {
            plan.entries.push(PlanEntry::Reordered {
                order: merged_order,
            });
        }

        if !plan.is_empty() {
            plan.to_version = previous.schema_version + 1;
        }

        debug!(
            entity = %incoming.name,
            from_version = plan.from_version,
            entries = plan.len(),
            breaking = plan.has_breaking_changes(),
            "merged entity declaration"
        );

        if plan.has_breaking_changes() && self.policy.breaking_changes == BreakingChangePolicy::Reject {
            return Err(MigrationConflictError::BreakingChanges {
                entity: incoming.name.clone(),
                module: incoming.owning_module.clone(),
                changes: plan.breaking_changes().into_iter().cloned().collect(),
            });
        }

        Ok((merged, plan))
    }

    fn merge_entity_attributes(
        &self,
        previous: &EntityDef,
        incoming: &EntityDef,
        plan: &mut MigrationPlan,
    ) -> Result<(), MigrationConflictError> {
        if previous.owning_module != incoming.owning_module {
            if !self.policy.allow_owner_change {
                return Err(MigrationConflictError::OwnerMismatch {
                    entity: previous.name.clone(),
                    registered_module: previous.owning_module.clone(),
                    incoming_module: incoming.owning_module.clone(),
                });
            }
            plan.entries.push(PlanEntry::OwnerChanged {
                from: previous.owning_module.clone(),
                to: incoming.owning_module.clone(),
            });
        }

        if previous.name != incoming.name {
            plan.entries.push(PlanEntry::Updated {
                name: incoming.name.clone(),
                changes: vec![AttributeChange::Spelling {
                    attribute: "entity".into(),
                    from: previous.name.clone(),
                    to: incoming.name.clone(),
                }],
            });
        }

        if previous.namespace != incoming.namespace {
            plan.entries.push(PlanEntry::BreakingChange(BreakingChange {
                element: incoming.name.clone(),
                kind: BreakingKind::NamespaceChanged {
                    from: previous.namespace.clone(),
                    to: incoming.namespace.clone(),
                },
            }));
        }

        Ok(())
    }
}

fn merge_field(previous: &EntityDef, incoming: &FieldDef, plan: &mut MigrationPlan) -> FieldDef {
    let Some(prev) = previous.get_field(&incoming.name) else {
        if let Some(prev_rel) = previous.get_relationship(&incoming.name) {
            element_kind_changed(
                plan,
                Element::Relationship(prev_rel.clone()),
                "relationship",
                "field",
            );
        }
        let mut added = incoming.clone();
        added.user_added = false;
        added.operator_default = false;
        plan.entries.push(PlanEntry::Added {
            element: Element::Field(added.clone()),
        });
        return added;
    };

    let mut merged = incoming.clone();
    merged.user_added = prev.user_added;
    merged.operator_default = false;

    match classify(&prev.field_type, &incoming.field_type) {
        TypeChange::Identical => {}
        TypeChange::Safe => plan.entries.push(PlanEntry::Retyped {
            name: incoming.name.clone(),
            from: prev.field_type.clone(),
            to: incoming.field_type.clone(),
        }),
        TypeChange::Breaking => plan.entries.push(PlanEntry::BreakingChange(BreakingChange {
            element: incoming.name.clone(),
            kind: BreakingKind::IncompatibleType {
                from: prev.field_type.clone(),
                to: incoming.field_type.clone(),
            },
        })),
    }

    // An operator default survives unless the new type no longer accepts it.
    if prev.operator_default {
        let still_valid = prev
            .default
            .as_ref()
            .map_or(true, |d| d.check(&merged.field_type).is_ok());
        if still_valid {
            merged.default = prev.default.clone();
            merged.operator_default = true;
        }
    }

    let mut changes = Vec::new();
    if prev.name != merged.name {
        changes.push(AttributeChange::Spelling {
            attribute: "name".into(),
            from: prev.name.clone(),
            to: merged.name.clone(),
        });
    }
    if prev.required != merged.required {
        changes.push(AttributeChange::Required {
            from: prev.required,
            to: merged.required,
        });
    }
    if prev.default != merged.default {
        changes.push(AttributeChange::Default {
            from: prev.default.clone(),
            to: merged.default.clone(),
        });
    }
    if prev.operator_default != merged.operator_default {
        changes.push(AttributeChange::OperatorDefault {
            from: prev.operator_default,
            to: merged.operator_default,
        });
    }
    if !changes.is_empty() {
        plan.entries.push(PlanEntry::Updated {
            name: merged.name.clone(),
            changes,
        });
    }

    merged
}

fn merge_relationship(
    previous: &EntityDef,
    incoming: &RelationDef,
    plan: &mut MigrationPlan,
) -> RelationDef {
    let Some(prev) = previous.get_relationship(&incoming.name) else {
        if let Some(prev_field) = previous.get_field(&incoming.name) {
            element_kind_changed(plan, Element::Field(prev_field.clone()), "field", "relationship");
        }
        let mut added = incoming.clone();
        added.user_added = false;
        plan.entries.push(PlanEntry::Added {
            element: Element::Relationship(added.clone()),
        });
        return added;
    };

    // Cardinality is immutable: the old relationship goes, a new one arrives.
    if prev.cardinality != incoming.cardinality {
        let mut replacement = incoming.clone();
        replacement.user_added = false;
        plan.entries.push(PlanEntry::BreakingChange(BreakingChange {
            element: incoming.name.clone(),
            kind: BreakingKind::VariantChanged {
                from: prev.cardinality,
                to: incoming.cardinality,
            },
        }));
        plan.entries.push(PlanEntry::RemovedElement {
            element: Element::Relationship(prev.clone()),
        });
        plan.entries.push(PlanEntry::Added {
            element: Element::Relationship(replacement.clone()),
        });
        return replacement;
    }

    let mut merged = incoming.clone();
    merged.user_added = prev.user_added;

    if !prev.targets(&incoming.related_entity) {
        plan.entries.push(PlanEntry::BreakingChange(BreakingChange {
            element: incoming.name.clone(),
            kind: BreakingKind::TargetChanged {
                from: prev.related_entity.clone(),
                to: incoming.related_entity.clone(),
            },
        }));
    }

    let mut changes = Vec::new();
    for (attribute, from, to) in [
        ("name", &prev.name, &merged.name),
        ("owner", &prev.owner_entity, &merged.owner_entity),
        ("target", &prev.related_entity, &merged.related_entity),
    ] {
        if from != to && from.eq_ignore_ascii_case(to) {
            changes.push(AttributeChange::Spelling {
                attribute: attribute.into(),
                from: from.clone(),
                to: to.clone(),
            });
        }
    }
    if prev.cascade_delete != merged.cascade_delete {
        changes.push(AttributeChange::CascadeDelete {
            from: prev.cascade_delete,
            to: merged.cascade_delete,
        });
    }
    if prev.bidirectional != merged.bidirectional {
        changes.push(AttributeChange::Bidirectional {
            from: prev.bidirectional,
            to: merged.bidirectional,
        });
    }
    if !changes.is_empty() {
        plan.entries.push(PlanEntry::Updated {
            name: merged.name.clone(),
            changes,
        });
    }

    merged
}

fn element_kind_changed(plan: &mut MigrationPlan, previous: Element, from: &str, to: &str) {
    plan.entries.push(PlanEntry::BreakingChange(BreakingChange {
        element: previous.name().to_string(),
        kind: BreakingKind::ElementKindChanged {
            from: from.into(),
            to: to.into(),
        },
    }));
    plan.entries.push(PlanEntry::RemovedElement { element: previous });
}

/// Handle elements present only in `previous`.
fn carry_over_previous_only(
    previous: &EntityDef,
    incoming: &EntityDef,
    merged: &mut EntityDef,
    plan: &mut MigrationPlan,
) {
    for field in &previous.fields {
        if incoming.has_element(&field.name) {
            continue;
        }
        if field.user_added {
            plan.retained.push(field.name.clone());
            merged.fields.push(field.clone());
        } else {
            plan.entries.push(PlanEntry::RemovedElement {
                element: Element::Field(field.clone()),
            });
        }
    }

    for relationship in &previous.relationships {
        if incoming.has_element(&relationship.name) {
            continue;
        }
        if relationship.user_added {
            plan.retained.push(relationship.name.clone());
            merged.relationships.push(relationship.clone());
        } else {
            plan.entries.push(PlanEntry::RemovedElement {
                element: Element::Relationship(relationship.clone()),
            });
        }
    }
}

fn element_order(entity: &EntityDef) -> Vec<String> {
    entity
        .fields
        .iter()
        .map(|f| f.name.to_ascii_lowercase())
        .chain(entity.relationships.iter().map(|r| r.name.to_ascii_lowercase()))
        .collect()
}

fn same_names(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
}
