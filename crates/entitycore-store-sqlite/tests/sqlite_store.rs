// crates/entitycore-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store End-to-End Tests
// Description: Guards, history, facets, search, and lineage on a live store.
// Purpose: Exercise the synthesized schema through the public store API.
// ============================================================================

//! ## Overview
//! Every test runs against an in-memory store with the full schema applied:
//! - Guard triggers reject cross-project private references
//! - Version rows record each committed write and resist tampering
//! - Facets and counts only see rows visible to the caller
//! - Lineage trees and descendants respect the access filter

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use common::Fixture;
use common::fixture;
use common::private;
use common::project;
use common::public;
use entitycore_core::AccessScope;
use entitycore_core::AgentId;
use entitycore_core::EntityId;
use entitycore_core::KindRegistry;
use entitycore_core::StoreAuditKind;
use entitycore_core::StoreError;
use entitycore_query::BoundQuery;
use entitycore_query::FacetBucket;
use entitycore_query::Params;
use entitycore_query::SqlExecutor;
use entitycore_query::SqlValue;
use entitycore_store_sqlite::SqliteEntityStore;
use entitycore_store_sqlite::SqliteStoreConfig;
use entitycore_synth::OperationType;
use entitycore_synth::SynthOptions;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn forbidden(table: &str, field: &str) -> StoreError {
    StoreError::Forbidden {
        table: table.to_string(),
        field: field.to_string(),
    }
}

fn bucket_counts(buckets: &[FacetBucket]) -> Vec<(i64, u64)> {
    buckets.iter().map(|bucket| (bucket.id, bucket.count)).collect()
}

fn raw(fixture: &Fixture, sql: &str, value: i64) -> Result<u64, StoreError> {
    let mut params = Params::new();
    let placeholder = params.push(value);
    let query = params.bind(sql.replace("{}", &placeholder));
    fixture.store.read(|session| session.execute(&query))
}

fn link(
    fixture: &Fixture,
    parent: EntityId,
    child: EntityId,
    derivation_type: &str,
) -> Result<i64, StoreError> {
    fixture.store.write(Some(fixture.agent), |tx| {
        tx.insert_row(
            "derivation",
            &[
                ("used_id", parent.into()),
                ("generated_id", child.into()),
                ("derivation_type", derivation_type.into()),
            ],
        )
    })
}

// ============================================================================
// SECTION: Schema
// ============================================================================

#[test]
fn schema_application_is_idempotent_and_audited() {
    let fixture = fixture();
    let first = fixture.store.bundle().unwrap();
    let second = fixture.store.apply_schema().unwrap();
    assert_eq!(first.digest(), second.digest());
    let applied = fixture
        .audit
        .kinds()
        .into_iter()
        .filter(|kind| *kind == StoreAuditKind::SchemaApplied)
        .count();
    assert_eq!(applied, 2);
    let event = fixture
        .audit
        .events()
        .into_iter()
        .find(|event| event.event == StoreAuditKind::SchemaApplied)
        .unwrap();
    assert_eq!(event.backend, "sqlite");
    assert_eq!(event.detail["digest"], first.digest());
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let config = SqliteStoreConfig::new(dir.path().join("nested").join("entities.db"));
    let registry = Arc::new(KindRegistry::standard().unwrap());
    let audit = Arc::new(common::RecordingSink::default());
    let options = SynthOptions::default();
    let store =
        SqliteEntityStore::open(&config, Arc::clone(&registry), options, audit.clone()).unwrap();
    store.apply_schema().unwrap();
    let fixture = common::seed(store, Arc::clone(&audit));
    let id = fixture.emodel(private("p1"), "persisted", fixture.region, None).unwrap();
    drop(fixture);

    let reopened =
        SqliteEntityStore::open(&config, registry, SynthOptions::default(), audit).unwrap();
    reopened.apply_schema().unwrap();
    let row = reopened.get(&project("p1"), "emodel", id.get()).unwrap();
    assert_eq!(row.text("name"), Some("persisted"));
    assert!(matches!(
        reopened.get(&AccessScope::Anonymous, "emodel", id.get()),
        Err(StoreError::NotFound(_))
    ));
}

// ============================================================================
// SECTION: Guards
// ============================================================================

#[test]
fn guards_reject_references_to_other_projects() {
    let fixture = fixture();
    let morphology = fixture.morphology(private("p1"), "pyramidal").unwrap();
    let before = fixture.transactions();

    let err =
        fixture.emodel(private("p2"), "rejected", fixture.region, Some(morphology)).unwrap_err();
    assert_eq!(err, forbidden("emodel", "exemplar_morphology_id"));
    assert_eq!(fixture.transactions(), before, "rejected write must roll back its log row");
    assert!(fixture.audit.kinds().contains(&StoreAuditKind::AuthorizationDenied));

    let err = fixture.emodel(public(), "rejected", fixture.region, Some(morphology)).unwrap_err();
    assert_eq!(err, forbidden("emodel", "exemplar_morphology_id"));

    fixture.emodel(private("p1"), "same project", fixture.region, Some(morphology)).unwrap();
    let shared = fixture.morphology(public(), "shared").unwrap();
    fixture.emodel(private("p2"), "public target", fixture.region, Some(shared)).unwrap();
    fixture.emodel(public(), "public to public", fixture.region, Some(shared)).unwrap();
}

#[test]
fn guards_check_every_registered_reference() {
    let fixture = fixture();
    let emodel = fixture.emodel(private("p1"), "private emodel", fixture.region, None).unwrap();
    let morphology = fixture.morphology(public(), "public morphology").unwrap();
    let memodel = |authorization| {
        fixture.store.create_entity(
            "memodel",
            &fixture.intent(authorization),
            &[
                ("name", "combined".into()),
                ("description", "me model".into()),
                ("brain_region_id", fixture.region.into()),
                ("emodel_id", emodel.into()),
                ("morphology_id", morphology.into()),
            ],
        )
    };
    assert_eq!(memodel(public()).unwrap_err(), forbidden("memodel", "emodel_id"));
    assert_eq!(memodel(private("p2")).unwrap_err(), forbidden("memodel", "emodel_id"));
    memodel(private("p1")).unwrap();
}

#[test]
fn guards_apply_to_updates() {
    let fixture = fixture();
    let morphology = fixture.morphology(private("p1"), "pyramidal").unwrap();
    let emodel = fixture.emodel(private("p2"), "target", fixture.region, None).unwrap();
    let err = fixture
        .store
        .write(Some(fixture.agent), |tx| {
            tx.update_entity("emodel", emodel, &[("exemplar_morphology_id", morphology.into())])
        })
        .unwrap_err();
    assert_eq!(err, forbidden("emodel", "exemplar_morphology_id"));
    let row = fixture.store.get(&project("p2"), "emodel", emodel.get()).unwrap();
    assert_eq!(row.get("exemplar_morphology_id"), Some(&SqlValue::Null));
}

#[test]
fn guards_use_the_owner_row_of_associations() {
    let fixture = fixture();
    let execution = fixture
        .store
        .create_entity(
            "simulation_execution",
            &fixture.intent(private("p1")),
            &[("status", "done".into())],
        )
        .unwrap();
    let foreign = fixture.emodel(private("p2"), "foreign input", fixture.region, None).unwrap();
    let own = fixture.emodel(private("p1"), "own input", fixture.region, None).unwrap();
    let usage = |entity: EntityId| {
        fixture.store.write(Some(fixture.agent), |tx| {
            tx.insert_row(
                "usage",
                &[("usage_entity_id", entity.into()), ("usage_activity_id", execution.into())],
            )
        })
    };
    assert_eq!(usage(foreign).unwrap_err(), forbidden("usage", "usage_entity_id"));
    usage(own).unwrap();
}

#[test]
fn failed_operations_roll_back_the_whole_write() {
    let fixture = fixture();
    let before = fixture.transactions();
    let err = fixture
        .store
        .write(Some(fixture.agent), |tx| {
            tx.insert_entity(
                "emodel",
                &public(),
                &[
                    ("name", "discarded".into()),
                    ("description", "never committed".into()),
                    ("brain_region_id", fixture.region.into()),
                ],
            )?;
            Err::<(), _>(StoreError::Invalid("caller aborted".to_string()))
        })
        .unwrap_err();
    assert_eq!(err, StoreError::Invalid("caller aborted".to_string()));
    assert_eq!(fixture.transactions(), before);
    let select = fixture.store.select("emodel").unwrap().authorize(AccessScope::Anonymous);
    assert_eq!(fixture.store.count(&select).unwrap(), 0);
}

// ============================================================================
// SECTION: History
// ============================================================================

#[test]
fn every_committed_write_adds_one_version() {
    let fixture = fixture();
    let id = fixture.emodel(private("p1"), "v0", fixture.region, None).unwrap();
    for name in ["v1", "v2", "v3"] {
        fixture
            .store
            .write(Some(fixture.agent), |tx| {
                tx.update_entity("emodel", id, &[("name", name.into())])
            })
            .unwrap();
    }
    let history = fixture.store.versions(&project("p1"), "emodel", id.get()).unwrap();
    assert_eq!(history.len(), 4);
    let operations: Vec<OperationType> = history.iter().map(|record| record.operation).collect();
    assert_eq!(
        operations,
        vec![
            OperationType::Insert,
            OperationType::Update,
            OperationType::Update,
            OperationType::Update,
        ]
    );
    let names: Vec<&str> = history.iter().filter_map(|record| record.values.text("name")).collect();
    assert_eq!(names, vec!["v0", "v1", "v2", "v3"]);
    assert!(history.windows(2).all(|pair| pair[0].transaction_id < pair[1].transaction_id));
    assert!(history.iter().all(|record| record.actor == Some(fixture.agent)));

    assert!(
        fixture.store.versions(&AccessScope::Anonymous, "emodel", id.get()).unwrap().is_empty()
    );
    assert!(fixture.store.versions(&project("p2"), "emodel", id.get()).unwrap().is_empty());
}

#[test]
fn deleted_rows_keep_their_history() {
    let fixture = fixture();
    let id = fixture.emodel(private("p1"), "short lived", fixture.region, None).unwrap();
    fixture.store.write(Some(fixture.agent), |tx| tx.delete_entity("emodel", id)).unwrap();
    assert!(matches!(
        fixture.store.get(&project("p1"), "emodel", id.get()),
        Err(StoreError::NotFound(_))
    ));

    let history = fixture.store.versions(&project("p1"), "emodel", id.get()).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].operation, OperationType::Delete);
    assert_eq!(history[1].values.text("name"), Some("short lived"));
    let root = fixture.store.versions(&project("p1"), "entity", id.get()).unwrap();
    assert_eq!(root.last().map(|record| record.operation), Some(OperationType::Delete));
}

#[test]
fn writes_in_one_transaction_coalesce() {
    let fixture = fixture();
    let id = fixture
        .store
        .write(Some(fixture.agent), |tx| {
            let id = tx.insert_entity(
                "emodel",
                &public(),
                &[
                    ("name", "draft".into()),
                    ("description", "draft".into()),
                    ("brain_region_id", fixture.region.into()),
                ],
            )?;
            tx.update_entity("emodel", id, &[("name", "final".into())])?;
            Ok(id)
        })
        .unwrap();
    let history = fixture.store.versions(&AccessScope::Anonymous, "emodel", id.get()).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, OperationType::Insert);
    assert_eq!(history[0].values.text("name"), Some("final"));
}

#[test]
fn audit_tables_are_append_only() {
    let fixture = fixture();
    let id = fixture.emodel(public(), "audited", fixture.region, None).unwrap();
    fixture
        .store
        .write(Some(fixture.agent), |tx| {
            tx.update_entity("emodel", id, &[("name", "changed".into())])
        })
        .unwrap();
    let history = fixture.store.versions(&AccessScope::Anonymous, "emodel", id.get()).unwrap();
    let first = history[0].transaction_id;

    let err = raw(
        &fixture,
        "UPDATE \"emodel_version\" SET \"name\" = 'forged' WHERE \"transaction_id\" = {}",
        first.get(),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "{err}");
    let err =
        raw(&fixture, "DELETE FROM \"emodel_version\" WHERE \"id\" = {}", id.get()).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "{err}");
    let err = raw(
        &fixture,
        "UPDATE \"transaction\" SET \"actor_id\" = NULL WHERE \"id\" = {}",
        first.get(),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "{err}");
    let err =
        raw(&fixture, "DELETE FROM \"transaction\" WHERE \"id\" = {}", first.get()).unwrap_err();
    assert!(matches!(err, StoreError::Constraint(_)), "{err}");

    let history = fixture.store.versions(&AccessScope::Anonymous, "emodel", id.get()).unwrap();
    assert_eq!(history[0].values.text("name"), Some("audited"));
}

#[test]
fn commits_are_audited_with_their_transaction() {
    let fixture = fixture();
    fixture.emodel(public(), "logged", fixture.region, None).unwrap();
    let committed: Vec<_> = fixture
        .audit
        .events()
        .into_iter()
        .filter(|event| event.event == StoreAuditKind::WriteCommitted)
        .collect();
    assert_eq!(committed.len(), 2);
    assert_eq!(committed[1].detail["actor_id"], fixture.agent.get());
    let transaction = |index: usize| committed[index].detail["transaction_id"].as_i64().unwrap();
    assert!(transaction(1) > transaction(0));
}

// ============================================================================
// SECTION: Reads
// ============================================================================

#[test]
fn facets_count_only_visible_rows() {
    let fixture = fixture();
    fixture.emodel(private("p1"), "a", fixture.region, None).unwrap();
    fixture.emodel(private("p1"), "b", fixture.region, None).unwrap();
    fixture.emodel(public(), "c", fixture.other_region, None).unwrap();
    fixture.emodel(private("p2"), "d", fixture.region, None).unwrap();

    let select = fixture.store.select("emodel").unwrap().authorize(project("p1"));
    assert_eq!(fixture.store.count(&select).unwrap(), 3);
    let facets = fixture.store.facets(&select).unwrap();
    assert_eq!(
        bucket_counts(&facets["brain_region"]),
        vec![(fixture.region, 2), (fixture.other_region, 1)]
    );
    assert_eq!(facets["brain_region"][0].label, "Isocortex");
    assert_eq!(bucket_counts(&facets["created_by"]), vec![(fixture.agent.get(), 3)]);
    assert_eq!(facets["created_by"][0].discriminator.as_deref(), Some("person"));
    assert!(facets["species"].is_empty());
    let total: u64 = facets["brain_region"].iter().map(|bucket| bucket.count).sum();
    assert_eq!(total, 3);

    let select = fixture.store.select("emodel").unwrap().authorize(AccessScope::Anonymous);
    assert_eq!(fixture.store.count(&select).unwrap(), 1);
    let facets = fixture.store.facets(&select).unwrap();
    assert_eq!(bucket_counts(&facets["brain_region"]), vec![(fixture.other_region, 1)]);

    let mut select = fixture.store.select("emodel").unwrap();
    select.filter_eq("brain_region_id", fixture.region).unwrap();
    let select = select.authorize(project("p1"));
    assert_eq!(fixture.store.count(&select).unwrap(), 2);
    let facets = fixture.store.facets(&select).unwrap();
    assert_eq!(bucket_counts(&facets["brain_region"]), vec![(fixture.region, 2)]);
    assert_eq!(bucket_counts(&facets["created_by"]), vec![(fixture.agent.get(), 2)]);
}

#[test]
fn related_rows_do_not_inflate_counts() {
    let fixture = fixture();
    let id = fixture.emodel(public(), "with assets", fixture.region, None).unwrap();
    fixture.emodel(public(), "bare", fixture.region, None).unwrap();
    let second_agent = fixture
        .store
        .write(None, |tx| {
            let agent = tx.insert_row(
                "agent",
                &[("type", "organization".into()), ("pref_label", "EPFL".into())],
            )?;
            for path in ["a.json", "b.json", "c.json"] {
                tx.insert_row(
                    "asset",
                    &[
                        ("entity_id", id.into()),
                        ("path", path.into()),
                        ("content_type", "application/json".into()),
                    ],
                )?;
            }
            for role in ["author", "curator"] {
                tx.insert_row(
                    "contribution",
                    &[
                        ("agent_id", fixture.agent.into()),
                        ("entity_id", id.into()),
                        ("role", role.into()),
                    ],
                )?;
            }
            tx.insert_row(
                "contribution",
                &[("agent_id", agent.into()), ("entity_id", id.into()), ("role", "host".into())],
            )?;
            Ok(agent)
        })
        .unwrap();

    let mut select = fixture.store.select("emodel").unwrap();
    let asset = select.join_related("asset", "entity_id").unwrap();
    select.filter_alias_eq(&asset, "content_type", "application/json").unwrap();
    let select = select.authorize(AccessScope::Anonymous);
    assert_eq!(fixture.store.count(&select).unwrap(), 1);
    assert_eq!(fixture.store.fetch(&select).unwrap().len(), 1);

    let select = fixture.store.select("emodel").unwrap().authorize(AccessScope::Anonymous);
    let facets = fixture.store.facets(&select).unwrap();
    let mut contributions = bucket_counts(&facets["contribution"]);
    contributions.sort_unstable();
    assert_eq!(contributions, vec![(fixture.agent.get(), 1), (second_agent, 1)]);
}

#[test]
fn mtype_facet_follows_classifications() {
    let fixture = fixture();
    let classified = fixture.emodel(public(), "classified", fixture.region, None).unwrap();
    let hidden = fixture.emodel(private("p2"), "hidden", fixture.region, None).unwrap();
    let class = fixture
        .store
        .write(None, |tx| {
            let class = tx.insert_row("mtype_class", &[("pref_label", "L5_TPC".into())])?;
            for entity in [classified, hidden] {
                tx.insert_row(
                    "mtype_classification",
                    &[("entity_id", entity.into()), ("mtype_class_id", class.into())],
                )?;
            }
            Ok(class)
        })
        .unwrap();
    let select = fixture.store.select("emodel").unwrap().authorize(project("p1"));
    let facets = fixture.store.facets(&select).unwrap();
    assert_eq!(bucket_counts(&facets["mtype"]), vec![(class, 1)]);
    assert_eq!(facets["mtype"][0].label, "L5_TPC");

    let mut select = fixture.store.select("emodel").unwrap();
    select.filter_facet(&entitycore_query::facet::MTYPE_FACET, class).unwrap();
    let select = select.authorize(project("p2"));
    assert_eq!(fixture.store.count(&select).unwrap(), 2);
}

#[test]
fn mtype_filter_keeps_only_the_selected_bucket() {
    let fixture = fixture();
    let both = fixture.emodel(public(), "both", fixture.region, None).unwrap();
    let single = fixture.emodel(public(), "single", fixture.region, None).unwrap();
    let (first, second) = fixture
        .store
        .write(None, |tx| {
            let first = tx.insert_row("mtype_class", &[("pref_label", "L5_TPC".into())])?;
            let second = tx.insert_row("mtype_class", &[("pref_label", "L23_BP".into())])?;
            for (entity, class) in [(both, first), (both, second), (single, first)] {
                tx.insert_row(
                    "mtype_classification",
                    &[("entity_id", entity.into()), ("mtype_class_id", class.into())],
                )?;
            }
            Ok((first, second))
        })
        .unwrap();

    let select = fixture.store.select("emodel").unwrap().authorize(AccessScope::Anonymous);
    let mut unfiltered = bucket_counts(&fixture.store.facets(&select).unwrap()["mtype"]);
    unfiltered.sort_unstable();
    assert_eq!(unfiltered, vec![(first, 2), (second, 1)]);

    let mut select = fixture.store.select("emodel").unwrap();
    select.filter_facet(&entitycore_query::facet::MTYPE_FACET, first).unwrap();
    let select = select.authorize(AccessScope::Anonymous);
    assert_eq!(fixture.store.count(&select).unwrap(), 2);
    let facets = fixture.store.facets(&select).unwrap();
    assert_eq!(bucket_counts(&facets["mtype"]), vec![(first, 2)]);
    assert_eq!(bucket_counts(&facets["brain_region"]), vec![(fixture.region, 2)]);
}

#[test]
fn creator_and_updater_filter_independently() {
    let fixture = fixture();
    let edited = fixture.emodel(public(), "edited", fixture.region, None).unwrap();
    fixture.emodel(public(), "untouched", fixture.region, None).unwrap();
    let editor = fixture
        .store
        .write(None, |tx| {
            tx.insert_row("agent", &[("type", "person".into()), ("pref_label", "Bob".into())])
        })
        .unwrap();
    let editor = AgentId::new(editor);
    fixture
        .store
        .write(Some(editor), |tx| tx.update_entity("emodel", edited, &[("name", "revised".into())]))
        .unwrap();

    let mut select = fixture.store.select("emodel").unwrap();
    let creator = select.join_reference("created_by_id").unwrap();
    let updater = select.join_reference("updated_by_id").unwrap();
    select.filter_alias_eq(&updater, "pref_label", "Bob").unwrap();
    select.include(&creator, "pref_label", "created_by_label").unwrap();
    select.include(&updater, "pref_label", "updated_by_label").unwrap();
    let select = select.authorize(AccessScope::Anonymous);

    let rows = fixture.store.fetch(&select).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("name"), Some("revised"));
    assert_eq!(rows[0].text("created_by_label"), Some("Ada Lovelace"));
    assert_eq!(rows[0].text("updated_by_label"), Some("Bob"));

    let facets = fixture.store.facets(&select).unwrap();
    assert_eq!(bucket_counts(&facets["created_by"]), vec![(fixture.agent.get(), 1)]);
    assert_eq!(bucket_counts(&facets["updated_by"]), vec![(editor.get(), 1)]);
}

#[test]
fn search_matches_normalized_documents() {
    let fixture = fixture();
    let id = fixture
        .store
        .create_entity(
            "emodel",
            &fixture.intent(public()),
            &[
                ("name", "Layer 5 Pyramidal".into()),
                ("description", "Thick tufted cell".into()),
                ("brain_region_id", fixture.region.into()),
            ],
        )
        .unwrap();
    let hits = |text: &str| {
        let mut select = fixture.store.select("emodel").unwrap();
        select.search(text).unwrap();
        fixture.store.count(&select.authorize(AccessScope::Anonymous)).unwrap()
    };
    assert_eq!(hits("pyramidal"), 1);
    assert_eq!(hits("  THICK TUFTED "), 1);
    assert_eq!(hits("basket"), 0);

    fixture
        .store
        .write(Some(fixture.agent), |tx| {
            tx.update_entity("emodel", id, &[("name", "Basket".into())])
        })
        .unwrap();
    assert_eq!(hits("basket"), 1);
    assert_eq!(hits("pyramidal"), 0);
}

#[test]
fn lineage_respects_the_access_filter() {
    let fixture = fixture();
    let root = fixture.circuit(public(), "root").unwrap();
    let left = fixture.circuit(private("p1"), "left").unwrap();
    let right = fixture.circuit(private("p1"), "right").unwrap();
    let leaf = fixture.circuit(private("p1"), "leaf").unwrap();
    let foreign = fixture.circuit(private("p2"), "foreign").unwrap();
    for (parent, child) in [(root, left), (root, right), (left, leaf), (root, foreign)] {
        link(&fixture, parent, child, "circuit_extraction").unwrap();
    }
    link(&fixture, root, leaf, "simulation").unwrap();
    assert_eq!(
        link(&fixture, left, foreign, "circuit_extraction").unwrap_err(),
        forbidden("derivation", "used_id")
    );

    let tree = fixture.store.lineage(&project("p1"), "circuit", "circuit_extraction").unwrap();
    assert_eq!(tree.len(), 4);
    assert_eq!(tree.roots.len(), 1);
    let top = &tree.roots[0];
    assert_eq!(top.id, root);
    let children: Vec<EntityId> = top.children.iter().map(|node| node.id).collect();
    assert_eq!(children, vec![left, right]);
    assert_eq!(top.children[0].children[0].id, leaf);

    let descendants = |scope: &AccessScope, depth: u32| {
        fixture.store.descendants(scope, "circuit", "circuit_extraction", root, depth).unwrap()
    };
    let found: Vec<(EntityId, u32)> =
        descendants(&project("p1"), 10).iter().map(|node| (node.id, node.depth)).collect();
    assert_eq!(found, vec![(left, 1), (right, 1), (leaf, 2)]);
    assert_eq!(descendants(&project("p1"), 1).len(), 2);

    let other = descendants(&project("p2"), 10);
    assert_eq!(other.iter().map(|node| node.id).collect::<Vec<_>>(), vec![foreign]);
    assert!(descendants(&AccessScope::Anonymous, 10).is_empty());
    let public_tree =
        fixture.store.lineage(&AccessScope::Anonymous, "circuit", "circuit_extraction").unwrap();
    assert_eq!(public_tree.len(), 1);
}

#[test]
fn unversioned_kinds_have_no_history() {
    let fixture = fixture();
    let err = fixture.store.versions(&AccessScope::Anonymous, "asset", 1).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
    let id = fixture
        .store
        .write(None, |tx| {
            tx.insert_row("agent", &[("type", "person".into()), ("pref_label", "Grace".into())])
        })
        .unwrap();
    let history = fixture.store.versions(&AccessScope::Anonymous, "agent", id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor, None);
}

#[test]
fn unbound_statements_run_through_the_session() {
    let fixture = fixture();
    let query = BoundQuery::unbound("SELECT COUNT(*) AS \"count\" FROM \"brain_region\"");
    let rows = fixture.store.read(|session| session.query(&query)).unwrap();
    assert_eq!(rows[0].int("count"), Some(2));
}
