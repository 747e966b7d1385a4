//! The authoritative entity registry.

use super::config::RegistryConfig;
use super::sink::{PlanSink, TracingPlanSink};
use super::store::{DefinitionStore, MemoryStore};
use crate::catalog::{registry_key, DefaultValue, Element, EntityDef, FieldDef, RelationDef};
use crate::error::{Error, Result, ValidationError};
use crate::migration::{AttributeChange, MigrationCoordinator, MigrationPlan, PlanEntry};
use crate::signature::SignatureGenerator;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// First registration.
    Created,
    /// A new version was committed.
    Updated,
    /// Nothing changed; the version was not bumped.
    Unchanged,
}

/// Result of a committed (or no-op) registration.
#[derive(Debug, Clone)]
pub struct CommitResult {
    /// Snapshot of the definition now registered.
    pub entity: EntityDef,
    /// Changes applied by the commit.
    pub plan: MigrationPlan,
    /// What happened.
    pub outcome: CommitOutcome,
}

impl CommitResult {
    /// Registered schema version.
    pub fn version(&self) -> u64 {
        self.entity.schema_version
    }
}

/// Committed definitions keyed by lowercased name.
#[derive(Debug, Default)]
struct RegistryState {
    entities: HashMap<String, EntityDef>,
    /// Keys in registration order.
    order: Vec<String>,
}

impl RegistryState {
    fn publish(&mut self, entity: EntityDef) {
        let key = entity.key();
        if self.entities.insert(key.clone(), entity).is_none() {
            self.order.push(key);
        }
    }

    fn unpublish(&mut self, key: &str) -> Option<EntityDef> {
        let removed = self.entities.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }
}

/// Process-wide registry of entity definitions.
///
/// All writes for one entity name are serialized through a per-name lock;
/// different names commit in parallel. Readers always see whole commits.
pub struct SchemaRegistry {
    config: RegistryConfig,
    coordinator: MigrationCoordinator,
    signatures: SignatureGenerator,
    state: RwLock<RegistryState>,
    name_locks: DashMap<String, Arc<Mutex<()>>>,
    store: Arc<dyn DefinitionStore>,
    sink: Arc<dyn PlanSink>,
}

impl SchemaRegistry {
    /// Create an empty in-memory registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_collaborators(config, Arc::new(MemoryStore::new()), Arc::new(TracingPlanSink))
    }

    fn with_collaborators(
        config: RegistryConfig,
        store: Arc<dyn DefinitionStore>,
        sink: Arc<dyn PlanSink>,
    ) -> Self {
        Self {
            coordinator: MigrationCoordinator::new(config.merge_policy()),
            signatures: SignatureGenerator::new(config.default_namespace.clone()),
            config,
            state: RwLock::new(RegistryState::default()),
            name_locks: DashMap::new(),
            store,
            sink,
        }
    }

    /// Open a registry backed by `store`, loading its committed definitions.
    pub fn open(
        config: RegistryConfig,
        store: Arc<dyn DefinitionStore>,
        sink: Arc<dyn PlanSink>,
    ) -> Result<Self> {
        let loaded = store.load_all()?;
        let registry = Self::with_collaborators(config, store, sink);

        {
            let mut state = registry.state.write();
            for entity in loaded {
                entity.validate().map_err(|e| {
                    Error::Invariant(format!("stored definition '{}' is invalid: {}", entity.name, e))
                })?;
                if entity.schema_version == 0 {
                    return Err(Error::Invariant(format!(
                        "stored definition '{}' has no committed version",
                        entity.name
                    )));
                }
                if state.entities.contains_key(&entity.key()) {
                    return Err(Error::Invariant(format!(
                        "stored definitions contain '{}' twice",
                        entity.name
                    )));
                }
                state.publish(entity);
            }
            info!(entities = state.order.len(), "schema registry loaded");
        }

        Ok(registry)
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Signature generator bound to this registry's default namespace.
    pub fn signature_generator(&self) -> &SignatureGenerator {
        &self.signatures
    }

    /// Register a module's declaration of an entity.
    ///
    /// A first declaration commits as version 1. A redeclaration is merged
    /// with the registered definition; if the merge changes nothing the
    /// version stays put and the plan is empty.
    #[instrument(skip(self, incoming), fields(entity = %incoming.name, module = %incoming.owning_module))]
    pub fn register(&self, incoming: EntityDef) -> Result<CommitResult> {
        incoming.validate()?;

        let key = incoming.key();
        let lock = self.name_lock(&key);
        let _guard = lock.lock();

        let previous = self.state.read().entities.get(&key).cloned();
        let Some(previous) = previous else {
            let entity = initial_definition(incoming);
            let elements = entity
                .fields
                .iter()
                .cloned()
                .map(Element::Field)
                .chain(entity.relationships.iter().cloned().map(Element::Relationship))
                .collect();
            let plan = MigrationPlan::initial(&entity.name, &entity.owning_module, elements);
            return self.commit(None, entity, plan, CommitOutcome::Created);
        };

        let (mut merged, plan) = self.coordinator.merge(&previous, &incoming)?;

        if plan.is_empty() {
            if !merged.same_declaration(&previous) {
                return Err(Error::Invariant(format!(
                    "merge of '{}' changed the definition without recording it",
                    previous.name
                )));
            }
            debug!(version = previous.schema_version, "declaration unchanged");
            return Ok(CommitResult {
                entity: previous,
                plan,
                outcome: CommitOutcome::Unchanged,
            });
        }

        merged.schema_version = plan.to_version;
        self.commit(Some(&previous), merged, plan, CommitOutcome::Updated)
    }

    /// Compute the plan `register` would apply, without committing.
    pub fn preview(&self, incoming: &EntityDef) -> Result<MigrationPlan> {
        incoming.validate()?;
        match self.get(&incoming.name) {
            None => {
                let entity = initial_definition(incoming.clone());
                let elements = entity
                    .fields
                    .into_iter()
                    .map(Element::Field)
                    .chain(entity.relationships.into_iter().map(Element::Relationship))
                    .collect();
                Ok(MigrationPlan::initial(entity.name, entity.owning_module, elements))
            }
            Some(previous) => Ok(self.coordinator.merge(&previous, incoming)?.1),
        }
    }

    /// Get a snapshot of an entity definition.
    pub fn get(&self, name: &str) -> Option<EntityDef> {
        self.state.read().entities.get(&registry_key(name)).cloned()
    }

    /// Check whether an entity is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.state.read().entities.contains_key(&registry_key(name))
    }

    /// Snapshots of all entities, in registration order.
    pub fn all(&self) -> Vec<EntityDef> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|key| state.entities.get(key).cloned())
            .collect()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.state.read().entities.len()
    }

    /// Check if no entity is registered.
    pub fn is_empty(&self) -> bool {
        self.state.read().entities.is_empty()
    }

    /// Relationships on other entities (or the entity itself) that target `name`.
    ///
    /// Returns `(owner entity, relationship)` pairs in registration order.
    pub fn relationships_to(&self, name: &str) -> Vec<(String, RelationDef)> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|key| state.entities.get(key))
            .flat_map(|entity| {
                entity
                    .relationships
                    .iter()
                    .filter(|r| r.targets(name))
                    .map(|r| (entity.name.clone(), r.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Signature of a registered field.
    pub fn field_signature(&self, entity: &str, field: &str) -> Result<String> {
        let definition = self.require(entity)?;
        let field = definition
            .get_field(field)
            .ok_or_else(|| Error::ElementNotFound {
                entity: definition.name.clone(),
                element: field.to_string(),
            })?;
        Ok(self.signatures.field(field))
    }

    /// Signature of a registered relationship.
    ///
    /// Fails with [`Error::UnresolvedEntity`] until the target is registered.
    pub fn relationship_signature(&self, entity: &str, relationship: &str) -> Result<String> {
        let definition = self.require(entity)?;
        let relationship = definition
            .get_relationship(relationship)
            .ok_or_else(|| Error::ElementNotFound {
                entity: definition.name.clone(),
                element: relationship.to_string(),
            })?;
        self.signature_for_relationship(relationship)
    }

    /// Signature of any relationship descriptor, resolved against this registry.
    pub fn signature_for_relationship(&self, relationship: &RelationDef) -> Result<String> {
        let related = self.get(&relationship.related_entity);
        self.signatures.relationship(relationship, related.as_ref())
    }

    /// Signatures of every element of an entity, in layout order.
    ///
    /// Relationships whose target is not registered carry their error.
    pub fn signatures(&self, entity: &str) -> Result<Vec<(String, Result<String>)>> {
        let definition = self.require(entity)?;
        let fields = definition
            .fields
            .iter()
            .map(|f| (f.name.clone(), Ok(self.signatures.field(f))));
        let relationships = definition
            .relationships
            .iter()
            .map(|r| (r.name.clone(), self.signature_for_relationship(r)));
        Ok(fields.chain(relationships).collect())
    }

    /// Operator path: add a field to a registered entity.
    ///
    /// The field is flagged user-added and survives redeploys that do not
    /// declare it.
    pub fn add_user_field(&self, entity: &str, field: FieldDef) -> Result<CommitResult> {
        self.operator_commit(entity, |draft| {
            let mut field = field;
            field.user_added = true;
            field.operator_default = true;
            reject_duplicate(draft, &field.name)?;
            draft.fields.push(field.clone());
            Ok(vec![PlanEntry::Added {
                element: Element::Field(field),
            }])
        })
    }

    /// Operator path: add a relationship to a registered entity.
    pub fn add_user_relationship(&self, entity: &str, relationship: RelationDef) -> Result<CommitResult> {
        self.operator_commit(entity, |draft| {
            let mut relationship = relationship;
            relationship.user_added = true;
            reject_duplicate(draft, &relationship.name)?;
            draft.relationships.push(relationship.clone());
            Ok(vec![PlanEntry::Added {
                element: Element::Relationship(relationship),
            }])
        })
    }

    /// Operator path: set or clear a field's default value.
    ///
    /// The operator then owns the default: the value (or its absence) is
    /// kept across module redeploys, even when it equals the module's.
    pub fn set_field_default(
        &self,
        entity: &str,
        field: &str,
        default: Option<DefaultValue>,
    ) -> Result<CommitResult> {
        self.operator_commit(entity, |draft| {
            let entity_name = draft.name.clone();
            let target = draft
                .fields
                .iter_mut()
                .find(|f| f.is_named(field))
                .ok_or_else(|| Error::ElementNotFound {
                    entity: entity_name,
                    element: field.to_string(),
                })?;
            let mut changes = Vec::new();
            if target.default != default {
                changes.push(AttributeChange::Default {
                    from: target.default.clone(),
                    to: default.clone(),
                });
            }
            if !target.operator_default {
                changes.push(AttributeChange::OperatorDefault { from: false, to: true });
            }
            if changes.is_empty() {
                return Ok(Vec::new());
            }
            target.operator_default = true;
            target.default = default;
            Ok(vec![PlanEntry::Updated {
                name: target.name.clone(),
                changes,
            }])
        })
    }

    /// Operator path: remove a user-added field or relationship.
    ///
    /// Module-declared elements can only be removed by redeploying the module
    /// without them.
    pub fn remove_user_element(&self, entity: &str, name: &str) -> Result<CommitResult> {
        self.operator_commit(entity, |draft| {
            let removed = if let Some(pos) = draft.fields.iter().position(|f| f.is_named(name)) {
                Element::Field(draft.fields[pos].clone())
            } else if let Some(pos) = draft.relationships.iter().position(|r| r.is_named(name)) {
                Element::Relationship(draft.relationships[pos].clone())
            } else {
                return Err(Error::ElementNotFound {
                    entity: draft.name.clone(),
                    element: name.to_string(),
                });
            };

            if !removed.is_user_added() {
                return Err(Error::ModuleDeclared {
                    entity: draft.name.clone(),
                    element: removed.name().to_string(),
                });
            }

            draft.fields.retain(|f| !f.is_named(name));
            draft.relationships.retain(|r| !r.is_named(name));
            Ok(vec![PlanEntry::RemovedElement { element: removed }])
        })
    }

    /// Operator path: remove an entity entirely.
    ///
    /// The only way an entity leaves the registry. Relationships on other
    /// entities that target it become unresolved.
    pub fn remove_entity(&self, name: &str) -> Result<EntityDef> {
        let key = registry_key(name);
        let lock = self.name_lock(&key);
        let _guard = lock.lock();

        if !self.contains(name) {
            return Err(Error::NotFound {
                entity: name.to_string(),
            });
        }

        self.store.remove(name)?;
        let removed = self
            .state
            .write()
            .unpublish(&key)
            .ok_or_else(|| Error::Invariant(format!("'{}' vanished while locked", name)))?;

        let dangling = self.relationships_to(&removed.name);
        if !dangling.is_empty() {
            warn!(
                entity = %removed.name,
                references = dangling.len(),
                "removed entity is still referenced"
            );
        }
        info!(entity = %removed.name, version = removed.schema_version, "entity removed");
        Ok(removed)
    }

    fn operator_commit<F>(&self, name: &str, edit: F) -> Result<CommitResult>
    where
        F: FnOnce(&mut EntityDef) -> Result<Vec<PlanEntry>>,
    {
        let key = registry_key(name);
        let lock = self.name_lock(&key);
        let _guard = lock.lock();

        let previous = self.require(name)?;
        let mut draft = previous.clone();
        let entries = edit(&mut draft)?;
        draft.validate()?;

        let mut plan = MigrationPlan::new(&draft.name, &draft.owning_module, previous.schema_version);
        if entries.is_empty() {
            return Ok(CommitResult {
                entity: previous,
                plan,
                outcome: CommitOutcome::Unchanged,
            });
        }
        plan.entries = entries;
        plan.to_version = previous.schema_version + 1;
        draft.schema_version = plan.to_version;

        self.commit(Some(&previous), draft, plan, CommitOutcome::Updated)
    }

    /// Persist and publish. Called with the entity's name lock held.
    fn commit(
        &self,
        previous: Option<&EntityDef>,
        entity: EntityDef,
        plan: MigrationPlan,
        outcome: CommitOutcome,
    ) -> Result<CommitResult> {
        let expected = previous.map_or(1, |p| p.schema_version + 1);
        if entity.schema_version != expected || plan.to_version != expected {
            return Err(Error::Invariant(format!(
                "'{}' would commit as version {} (plan {}), expected {}",
                entity.name, entity.schema_version, plan.to_version, expected
            )));
        }
        entity
            .validate()
            .map_err(|e| Error::Invariant(format!("merged '{}' is invalid: {}", entity.name, e)))?;

        // Not yet visible: a store failure leaves the previous version in place.
        if let Err(e) = self.store.persist(&entity) {
            warn!(entity = %entity.name, error = %e, "persisting definition failed; commit rolled back");
            return Err(e.into());
        }

        self.state.write().publish(entity.clone());
        self.sink.plan_committed(&entity, &plan);

        info!(
            entity = %entity.name,
            version = entity.schema_version,
            changes = plan.len(),
            breaking = plan.has_breaking_changes(),
            "entity committed"
        );

        Ok(CommitResult {
            entity,
            plan,
            outcome,
        })
    }

    fn require(&self, name: &str) -> Result<EntityDef> {
        self.get(name).ok_or_else(|| Error::NotFound {
            entity: name.to_string(),
        })
    }

    // Entries are never pruned: a caller may already hold a clone of the
    // lock, and replacing it would let two writers in for one name.
    fn name_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.name_locks.entry(key.to_string()).or_default().clone()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// First declarations carry no operator state.
fn initial_definition(mut entity: EntityDef) -> EntityDef {
    entity.schema_version = 1;
    for field in &mut entity.fields {
        field.user_added = false;
        field.operator_default = false;
    }
    for relationship in &mut entity.relationships {
        relationship.user_added = false;
    }
    entity
}

fn reject_duplicate(entity: &EntityDef, name: &str) -> Result<()> {
    if entity.has_element(name) {
        return Err(ValidationError::DuplicateElement {
            entity: entity.name.clone(),
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}
