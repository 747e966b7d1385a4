//! Registry configuration.

use crate::migration::{BreakingChangePolicy, MergePolicy};

/// Namespace for entities declared without one.
pub const DEFAULT_NAMESPACE: &str = "mdschema.entities";

/// Configuration for a [`SchemaRegistry`](super::SchemaRegistry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Handling of breaking changes found while merging a redeploy.
    pub breaking_changes: BreakingChangePolicy,

    /// Let a module other than the registered owner redeclare an entity.
    pub allow_owner_change: bool,

    /// Namespace used for canonical names of unqualified entities.
    pub default_namespace: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            breaking_changes: BreakingChangePolicy::Surface,
            allow_owner_change: false,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Refuse merges that contain breaking changes.
    pub fn reject_breaking_changes(mut self) -> Self {
        self.breaking_changes = BreakingChangePolicy::Reject;
        self
    }

    /// Set the breaking change policy.
    pub fn with_breaking_changes(mut self, policy: BreakingChangePolicy) -> Self {
        self.breaking_changes = policy;
        self
    }

    /// Allow ownership to move between modules.
    pub fn allow_owner_change(mut self, allow: bool) -> Self {
        self.allow_owner_change = allow;
        self
    }

    /// Set the default namespace.
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Merge policy derived from this configuration.
    pub fn merge_policy(&self) -> MergePolicy {
        MergePolicy {
            breaking_changes: self.breaking_changes,
            allow_owner_change: self.allow_owner_change,
        }
    }
}
