//! Integration tests for the schema registry.

use mdschema_core::catalog::{DefaultValue, EntityDef, FieldDef, FieldType, RelationDef};
use mdschema_core::migration::{BreakingKind, MigrationConflictError, PlanEntry};
use mdschema_core::registry::{
    CommitOutcome, MemoryPlanSink, RegistryConfig, SchemaRegistry, SledStore, StoreConfig,
};
use mdschema_core::Error;
use std::sync::{Arc, Barrier};

fn patient() -> EntityDef {
    EntityDef::new("Patient", "clinic")
        .in_namespace("org.acme.clinic")
        .with_field(FieldDef::required("name", FieldType::String))
        .with_field(FieldDef::new("age", FieldType::Int))
}

fn visit() -> EntityDef {
    EntityDef::new("Visit", "clinic")
        .in_namespace("org.acme.clinic")
        .with_field(FieldDef::required("when", FieldType::DateTime))
        .with_relationship(RelationDef::one_to_one("patient", "Visit", "Patient"))
}

#[test]
fn test_redeploy_of_identical_declaration_is_idempotent() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();

    for _ in 0..3 {
        let result = registry.register(patient()).unwrap();
        assert_eq!(result.outcome, CommitOutcome::Unchanged);
        assert!(result.plan.is_empty());
    }
    assert_eq!(registry.get("Patient").unwrap().schema_version, 1);
}

#[test]
fn test_cardinality_changes_the_signature() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();
    registry.register(visit()).unwrap();

    let one = registry.relationship_signature("Visit", "patient").unwrap();
    assert_eq!(one, "Lorg/acme/clinic/Patient;");

    let many = RelationDef::one_to_many("patient", "Visit", "Patient");
    let many = registry.signature_for_relationship(&many).unwrap();
    assert_eq!(many, "[mLorg/acme/clinic/Patient;");
    assert_ne!(one, many);

    let both = RelationDef::many_to_many("patient", "Visit", "Patient");
    assert_eq!(
        registry.signature_for_relationship(&both).unwrap(),
        "[nLorg/acme/clinic/Patient;"
    );
}

#[test]
fn test_operator_field_survives_redeploy() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();
    registry
        .add_user_field(
            "Patient",
            FieldDef::new("nickname", FieldType::String).with_default(DefaultValue::Text("-".into())),
        )
        .unwrap();

    // The module redeploys with a new field and without the operator's one.
    let redeploy = patient().with_field(FieldDef::new("blood_type", FieldType::String));
    let result = registry.register(redeploy).unwrap();

    assert_eq!(result.outcome, CommitOutcome::Updated);
    assert_eq!(result.version(), 3);
    assert_eq!(result.plan.retained, vec!["nickname"]);
    assert!(result.plan.removed_elements().is_empty());

    let names: Vec<_> = result.entity.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["name", "age", "blood_type", "nickname"]);
    assert!(result.entity.get_field("nickname").unwrap().user_added);
}

#[test]
fn test_dropped_module_field_is_reported_removed() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();

    let redeploy = EntityDef::new("Patient", "clinic")
        .in_namespace("org.acme.clinic")
        .with_field(FieldDef::required("name", FieldType::String));
    let result = registry.register(redeploy).unwrap();

    let removed: Vec<_> = result.plan.removed_elements().iter().map(|e| e.name()).collect();
    assert_eq!(removed, vec!["age"]);
    assert!(registry.get("Patient").unwrap().get_field("age").is_none());
}

#[test]
fn test_incompatible_type_change_is_breaking() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();

    let redeploy = EntityDef::new("Patient", "clinic")
        .in_namespace("org.acme.clinic")
        .with_field(FieldDef::required("name", FieldType::String))
        .with_field(FieldDef::new("age", FieldType::String));
    let result = registry.register(redeploy).unwrap();

    assert!(result.plan.has_breaking_changes());
    let breaking = result.plan.breaking_changes();
    assert_eq!(breaking.len(), 1);
    assert_eq!(breaking[0].element, "age");
    assert!(matches!(breaking[0].kind, BreakingKind::IncompatibleType { .. }));
    assert_eq!(
        registry.get("Patient").unwrap().get_field("age").unwrap().field_type,
        FieldType::String
    );
}

#[test]
fn test_safe_widening_is_not_breaking() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();

    let redeploy = EntityDef::new("Patient", "clinic")
        .in_namespace("org.acme.clinic")
        .with_field(FieldDef::required("name", FieldType::String))
        .with_field(FieldDef::new("age", FieldType::Long));
    let result = registry.register(redeploy).unwrap();

    assert!(!result.plan.has_breaking_changes());
    assert!(result
        .plan
        .entries
        .iter()
        .any(|e| matches!(e, PlanEntry::Retyped { name, .. } if name == "age")));
}

#[test]
fn test_reject_policy_leaves_registry_untouched() {
    let registry = SchemaRegistry::new(RegistryConfig::default().reject_breaking_changes());
    registry.register(patient()).unwrap();

    let redeploy = EntityDef::new("Patient", "clinic")
        .in_namespace("org.acme.clinic")
        .with_field(FieldDef::required("name", FieldType::String))
        .with_field(FieldDef::new("age", FieldType::String));
    let err = registry.register(redeploy).unwrap_err();

    match err {
        Error::MigrationConflict(MigrationConflictError::BreakingChanges { entity, changes, .. }) => {
            assert_eq!(entity, "Patient");
            assert_eq!(changes.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    let current = registry.get("Patient").unwrap();
    assert_eq!(current.schema_version, 1);
    assert_eq!(current.get_field("age").unwrap().field_type, FieldType::Int);
}

#[test]
fn test_foreign_module_cannot_take_over() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();

    let mut hijack = patient();
    hijack.owning_module = "billing".into();

    assert!(matches!(
        registry.register(hijack),
        Err(Error::MigrationConflict(MigrationConflictError::OwnerMismatch { .. }))
    ));
}

#[test]
fn test_forward_reference_resolves_after_registration() {
    let registry = SchemaRegistry::default();
    registry.register(visit()).unwrap();

    assert!(matches!(
        registry.relationship_signature("Visit", "patient"),
        Err(Error::UnresolvedEntity { ref related, .. }) if related == "Patient"
    ));

    registry.register(patient()).unwrap();
    let first = registry.relationship_signature("Visit", "patient").unwrap();
    let second = registry.relationship_signature("Visit", "patient").unwrap();
    assert_eq!(first, second);
    assert_eq!(first, "Lorg/acme/clinic/Patient;");
}

#[test]
fn test_signatures_lists_every_element() {
    let registry = SchemaRegistry::default();
    registry.register(visit()).unwrap();

    let signatures = registry.signatures("Visit").unwrap();
    assert_eq!(signatures.len(), 2);
    assert_eq!(signatures[0].0, "when");
    assert_eq!(signatures[0].1.as_deref().unwrap(), "T");
    assert!(signatures[1].1.is_err());
}

#[test]
fn test_concurrent_registrations_of_one_name_are_serialized() {
    const THREADS: usize = 8;

    let registry = SchemaRegistry::default();
    let barrier = Barrier::new(THREADS);

    let mut results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let registry = &registry;
                let barrier = &barrier;
                scope.spawn(move || {
                    let declaration = EntityDef::new("Counter", "metrics")
                        .with_field(FieldDef::new(format!("slot_{i}"), FieldType::Long));
                    barrier.wait();
                    registry.register(declaration).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    results.sort_by_key(|r| r.version());
    let versions: Vec<_> = results.iter().map(|r| r.version()).collect();
    assert_eq!(versions, (1..=THREADS as u64).collect::<Vec<_>>());

    assert_eq!(results[0].outcome, CommitOutcome::Created);
    for pair in results.windows(2) {
        let (winner, loser) = (&pair[0], &pair[1]);
        // Each later commit merged against the one committed before it.
        assert_eq!(loser.plan.from_version, winner.version());
        let removed: Vec<_> = loser.plan.removed_elements().iter().map(|e| e.name()).collect();
        assert_eq!(removed, vec![winner.entity.fields[0].name.as_str()]);
    }

    let last = results.last().unwrap();
    assert_eq!(registry.get("Counter").unwrap(), last.entity);
}

#[test]
fn test_distinct_names_register_in_parallel() {
    let registry = Arc::new(SchemaRegistry::default());

    std::thread::scope(|scope| {
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                registry
                    .register(
                        EntityDef::new(format!("Entity{i}"), "bulk")
                            .with_field(FieldDef::new("value", FieldType::Int)),
                    )
                    .unwrap();
            });
        }
    });

    assert_eq!(registry.len(), 16);
    assert!(registry.all().iter().all(|e| e.schema_version == 1));
}

#[test]
fn test_all_preserves_registration_order() {
    let registry = SchemaRegistry::default();
    for name in ["Zeta", "Alpha", "Mid"] {
        registry.register(EntityDef::new(name, "m")).unwrap();
    }
    registry
        .register(EntityDef::new("Alpha", "m").with_field(FieldDef::new("x", FieldType::Int)))
        .unwrap();

    let names: Vec<_> = registry.all().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
}

#[test]
fn test_relationships_to() {
    let registry = SchemaRegistry::default();
    registry.register(patient()).unwrap();
    registry.register(visit()).unwrap();

    let incoming = registry.relationships_to("patient");
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].0, "Visit");
    assert_eq!(incoming[0].1.name, "patient");
}

#[test]
fn test_sled_registry_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path());

    {
        let store = Arc::new(SledStore::open(&config).unwrap());
        let registry =
            SchemaRegistry::open(RegistryConfig::default(), store, Arc::new(MemoryPlanSink::new()))
                .unwrap();
        registry.register(patient()).unwrap();
        registry.register(visit()).unwrap();
        registry
            .add_user_field("Patient", FieldDef::new("nickname", FieldType::String))
            .unwrap();
    }

    let store = Arc::new(SledStore::open(&config).unwrap());
    let registry =
        SchemaRegistry::open(RegistryConfig::default(), store, Arc::new(MemoryPlanSink::new()))
            .unwrap();

    let names: Vec<_> = registry.all().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Patient", "Visit"]);

    let patient_def = registry.get("Patient").unwrap();
    assert_eq!(patient_def.schema_version, 2);
    assert!(patient_def.get_field("nickname").unwrap().user_added);

    // The operator's field still survives a redeploy after reopening.
    let result = registry.register(patient()).unwrap();
    assert_eq!(result.outcome, CommitOutcome::Unchanged);
}
