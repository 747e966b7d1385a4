//! Schema registry: the authoritative set of committed entity definitions.
//!
//! Registration, merging and persistence for one entity name are
//! serialized; readers get consistent snapshots of whole commits.

mod config;
#[allow(clippy::module_inception)]
mod registry;
mod sink;
mod store;

pub use config::{RegistryConfig, DEFAULT_NAMESPACE};
pub use registry::{CommitOutcome, CommitResult, SchemaRegistry};
pub use sink::{MemoryPlanSink, PlanSink, TracingPlanSink};
pub use store::{DefinitionStore, MemoryStore, SledStore, StoreConfig, StoreError};
