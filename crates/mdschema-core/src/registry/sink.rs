//! Hand-off of committed migration plans to operator tooling.

use crate::catalog::EntityDef;
use crate::migration::{MigrationPlan, PlanEntry};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Receives every committed plan. Fire-and-forget: sinks cannot fail a commit.
pub trait PlanSink: Send + Sync {
    /// Called after `entity` became visible under `plan.to_version`.
    fn plan_committed(&self, entity: &EntityDef, plan: &MigrationPlan);
}

/// Renders plans as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPlanSink;

impl PlanSink for TracingPlanSink {
    fn plan_committed(&self, entity: &EntityDef, plan: &MigrationPlan) {
        info!(
            entity = %entity.name,
            module = %plan.owning_module,
            from_version = plan.from_version,
            to_version = plan.to_version,
            entries = plan.len(),
            retained = plan.retained.len(),
            "schema change committed"
        );
        for entry in &plan.entries {
            match entry {
                PlanEntry::BreakingChange(change) => {
                    warn!(entity = %entity.name, change = %change, "breaking schema change")
                }
                PlanEntry::RemovedElement { element } => {
                    warn!(entity = %entity.name, element = element.name(), "element removed")
                }
                other => info!(entity = %entity.name, change = %other, "schema change"),
            }
        }
    }
}

/// Collects plans in memory, for tests and embedding tools.
#[derive(Debug, Default, Clone)]
pub struct MemoryPlanSink {
    plans: Arc<Mutex<Vec<MigrationPlan>>>,
}

impl MemoryPlanSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All received plans, oldest first.
    pub fn plans(&self) -> Vec<MigrationPlan> {
        self.plans.lock().clone()
    }

    /// Number of received plans.
    pub fn len(&self) -> usize {
        self.plans.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.plans.lock().is_empty()
    }
}

impl PlanSink for MemoryPlanSink {
    fn plan_committed(&self, _entity: &EntityDef, plan: &MigrationPlan) {
        self.plans.lock().push(plan.clone());
    }
}
