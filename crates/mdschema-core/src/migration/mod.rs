//! Redeploy reconciliation.
//!
//! When a module redeclares an entity, the [`MigrationCoordinator`] merges
//! the declaration with the registered definition and produces a
//! [`MigrationPlan`] describing what changed:
//!
//! | Registered | Incoming | Result |
//! |------------|----------|--------|
//! | present | present, same type | kept; operator state preserved |
//! | present | present, safe coercion | `Retyped` |
//! | present | present, incompatible | `BreakingChange` |
//! | absent | present | `Added` (module-declared) |
//! | user-added | absent | retained |
//! | module-declared | absent | `RemovedElement` |
//!
//! # Example
//!
//! ```
//! use mdschema_core::catalog::{EntityDef, FieldDef, FieldType};
//! use mdschema_core::migration::MigrationCoordinator;
//!
//! let previous = EntityDef::new("Job", "scheduler")
//!     .with_field(FieldDef::new("attempts", FieldType::Int));
//! let incoming = EntityDef::new("Job", "scheduler")
//!     .with_field(FieldDef::new("attempts", FieldType::Long));
//!
//! let (merged, plan) = MigrationCoordinator::default()
//!     .merge(&previous, &incoming)
//!     .unwrap();
//! assert_eq!(merged.fields[0].field_type, FieldType::Long);
//! assert!(!plan.has_breaking_changes());
//! ```

pub mod coercion;
pub mod error;
pub mod merge;
pub mod plan;

pub use coercion::{classify, TypeChange};
pub use error::MigrationConflictError;
pub use merge::{BreakingChangePolicy, MergePolicy, MigrationCoordinator};
pub use plan::{AttributeChange, BreakingChange, BreakingKind, MigrationPlan, PlanEntry};
