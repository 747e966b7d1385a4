//! mdschema core - metadata-driven entity schemas.
//!
//! Modules declare entities as [`EntityDef`] values. The [`SchemaRegistry`]
//! commits them, merging redeclarations through the [`MigrationCoordinator`]
//! so that operator customizations survive redeploys, and renders compact
//! type signatures for fields and relationships.
//!
//! ```
//! use mdschema_core::{EntityDef, FieldDef, FieldType, RelationDef, SchemaRegistry};
//!
//! let registry = SchemaRegistry::default();
//! registry
//!     .register(EntityDef::new("Customer", "crm").with_field(FieldDef::required("name", FieldType::String)))
//!     .unwrap();
//! registry
//!     .register(
//!         EntityDef::new("Order", "crm")
//!             .with_relationship(RelationDef::one_to_many("customer", "Order", "Customer")),
//!     )
//!     .unwrap();
//!
//! assert_eq!(registry.field_signature("Customer", "name").unwrap(), "S");
//! assert_eq!(
//!     registry.relationship_signature("Order", "customer").unwrap(),
//!     "[mLmdschema/entities/Customer;"
//! );
//! ```

pub mod catalog;
pub mod error;
pub mod migration;
pub mod registry;
pub mod signature;

pub use catalog::{Cardinality, DefaultValue, Element, EntityDef, FieldDef, FieldType, RelationDef};
pub use error::{Error, Result, ValidationError};
pub use migration::{
    BreakingChange, BreakingChangePolicy, MigrationConflictError, MigrationCoordinator,
    MigrationPlan, PlanEntry,
};
pub use registry::{
    CommitOutcome, CommitResult, DefinitionStore, MemoryPlanSink, MemoryStore, PlanSink,
    RegistryConfig, SchemaRegistry, SledStore, StoreConfig, StoreError, TracingPlanSink,
};
pub use signature::{Signature, SignatureGenerator};
