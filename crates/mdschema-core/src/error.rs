//! Core error types.

use crate::migration::MigrationConflictError;
use crate::registry::StoreError;
use thiserror::Error;

/// Result alias for registry and signature operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers of the registry and the signature generator.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed declaration, rejected before any registry mutation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A relationship targets an entity that is not registered yet.
    #[error("entity '{entity}' references unregistered entity '{related}'")]
    UnresolvedEntity {
        /// Entity owning the relationship.
        entity: String,
        /// Missing target entity.
        related: String,
    },

    /// The merge could not be applied automatically.
    #[error(transparent)]
    MigrationConflict(#[from] MigrationConflictError),

    /// Operator action against an unknown entity.
    #[error("entity '{entity}' is not registered")]
    NotFound {
        /// Requested entity name.
        entity: String,
    },

    /// Operator action against an unknown field or relationship.
    #[error("entity '{entity}' has no element named '{element}'")]
    ElementNotFound {
        /// Owning entity.
        entity: String,
        /// Requested element name.
        element: String,
    },

    /// Operator tried to remove an element the owning module declares.
    #[error("'{element}' on entity '{entity}' is declared by its module and cannot be removed here")]
    ModuleDeclared {
        /// Owning entity.
        entity: String,
        /// Element name.
        element: String,
    },

    /// Persistence collaborator failure; the commit was rolled back.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal invariant violated; the commit was aborted.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// A malformed entity, field or relationship declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The entity has no name.
    #[error("entity name must not be empty")]
    EmptyEntityName,

    /// The entity has no owning module.
    #[error("entity '{entity}' has no owning module")]
    EmptyOwningModule {
        /// Entity name.
        entity: String,
    },

    /// A field or relationship has no name.
    #[error("entity '{entity}' declares an element with an empty name")]
    EmptyElementName {
        /// Entity name.
        entity: String,
    },

    /// Two elements share a name (case-insensitive).
    #[error("entity '{entity}' declares '{name}' more than once")]
    DuplicateElement {
        /// Entity name.
        entity: String,
        /// Offending element name.
        name: String,
    },

    /// A default value does not satisfy the field's declared type.
    #[error("field '{entity}.{field}': {reason}")]
    InvalidDefault {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An enum field declares no values or repeats one.
    #[error("field '{entity}.{field}' has an invalid enum value list")]
    InvalidEnum {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// A relationship has no target.
    #[error("relationship '{entity}.{relationship}' has no related entity")]
    EmptyRelatedEntity {
        /// Entity name.
        entity: String,
        /// Relationship name.
        relationship: String,
    },

    /// A relationship is declared on an entity other than its owner.
    #[error("relationship '{relationship}' is owned by '{owner}', not '{entity}'")]
    OwnerMismatch {
        /// Declaring entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Owner recorded on the relationship.
        owner: String,
    },

    /// A namespace is not a dotted identifier path.
    #[error("entity '{entity}' has invalid namespace '{namespace}'")]
    InvalidNamespace {
        /// Entity name.
        entity: String,
        /// Offending namespace.
        namespace: String,
    },

    /// A name contains characters that cannot appear in a signature.
    #[error("'{name}' contains characters not allowed in entity names")]
    InvalidName {
        /// Offending name.
        name: String,
    },
}
