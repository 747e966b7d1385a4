//! Merge conflict errors.

use super::plan::BreakingChange;
use thiserror::Error;

/// A redeploy that cannot be merged automatically.
///
/// Returned before any registry state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationConflictError {
    /// The declaration contains breaking changes and the policy rejects them.
    #[error("{module} redeclared '{entity}' with {} breaking change(s): {}", .changes.len(), summarize(.changes))]
    BreakingChanges {
        /// Entity being merged.
        entity: String,
        /// Module that submitted the declaration.
        module: String,
        /// Every breaking change found.
        changes: Vec<BreakingChange>,
    },

    /// A module other than the registered owner declared the entity.
    #[error("'{entity}' is owned by {registered_module}, not {incoming_module}")]
    OwnerMismatch {
        /// Entity being merged.
        entity: String,
        /// Module recorded in the registry.
        registered_module: String,
        /// Module that submitted the declaration.
        incoming_module: String,
    },

    /// The two definitions describe different entities.
    #[error("cannot merge '{incoming}' into '{previous}'")]
    EntityMismatch {
        /// Registered entity name.
        previous: String,
        /// Incoming entity name.
        incoming: String,
    },
}

fn summarize(changes: &[BreakingChange]) -> String {
    changes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldType;
    use crate::migration::BreakingKind;

    #[test]
    fn test_error_display() {
        let err = MigrationConflictError::BreakingChanges {
            entity: "Patient".into(),
            module: "clinic".into(),
            changes: vec![BreakingChange {
                element: "age".into(),
                kind: BreakingKind::IncompatibleType {
                    from: FieldType::Int,
                    to: FieldType::String,
                },
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("clinic redeclared 'Patient' with 1 breaking change(s)"));
        assert!(msg.contains("age"));

        let err = MigrationConflictError::OwnerMismatch {
            entity: "Patient".into(),
            registered_module: "clinic".into(),
            incoming_module: "billing".into(),
        };
        assert_eq!(err.to_string(), "'Patient' is owned by clinic, not billing");
    }
}
