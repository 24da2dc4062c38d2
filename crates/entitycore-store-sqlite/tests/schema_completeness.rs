// crates/entitycore-store-sqlite/tests/schema_completeness.rs
// ============================================================================
// Module: Schema Completeness Tests
// Description: Diffs the live SQLite schema against the kind registry.
// Purpose: Catch foreign keys without guards and kinds without history.
// ============================================================================

//! ## Overview
//! Reads foreign keys, tables, and triggers back from a freshly migrated
//! store and compares them with what the registry declares.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::collections::BTreeSet;

use common::fixture;
use entitycore_query::BoundQuery;
use entitycore_query::Row;
use entitycore_query::SqlExecutor;
use entitycore_store_sqlite::SqliteEntityStore;
use entitycore_synth::ObjectFamily;

fn rows(store: &SqliteEntityStore, sql: String) -> Vec<Row> {
    store.read(|session| session.query(&BoundQuery::unbound(sql))).unwrap()
}

fn names(store: &SqliteEntityStore, sql: &str) -> BTreeSet<String> {
    rows(store, sql.to_string())
        .iter()
        .map(|row| row.text("name").unwrap().to_string())
        .collect()
}

#[test]
fn guarded_foreign_keys_match_declared_relationships() {
    let fixture = fixture();
    let registry = fixture.store.registry();
    let mut live = BTreeSet::new();
    for kind in registry.kinds() {
        let Some(source) = registry.authorization_source(kind.name) else {
            continue;
        };
        let keys = rows(
            &fixture.store,
            format!("SELECT \"table\", \"from\" FROM pragma_foreign_key_list('{}')", kind.name),
        );
        for key in keys {
            let target = key.text("table").unwrap();
            let column = key.text("from").unwrap();
            if column == "id" || column == source.column {
                continue;
            }
            if registry.protected_root(target).is_some() {
                live.insert((kind.name.to_string(), column.to_string()));
            }
        }
    }
    assert_eq!(live, registry.declared_relationships(), "unguarded or stale relationship entries");
    assert_eq!(live, registry.protected_foreign_keys());
}

#[test]
fn version_tables_match_versioned_kinds() {
    let fixture = fixture();
    let registry = fixture.store.registry();
    let live = names(
        &fixture.store,
        "SELECT \"name\" FROM \"sqlite_master\" WHERE \"type\" = 'table' \
         AND \"name\" LIKE '%\\_version' ESCAPE '\\'",
    );
    let bundle = fixture.store.bundle().unwrap();
    let declared: BTreeSet<String> =
        bundle.version_tables().iter().map(|(_, table)| table.clone()).collect();
    assert_eq!(live, declared);
    let versioned: BTreeSet<&str> =
        registry.versioned_kinds().iter().map(|kind| kind.name).collect();
    let covered: BTreeSet<&str> = bundle.version_tables().iter().map(|(kind, _)| *kind).collect();
    assert_eq!(versioned, covered);
    assert!(!versioned.contains("validation_result"));
    assert!(!versioned.contains("asset"));
}

#[test]
fn every_synthesized_trigger_is_installed() {
    let fixture = fixture();
    let live =
        names(&fixture.store, "SELECT \"name\" FROM \"sqlite_master\" WHERE \"type\" = 'trigger'");
    let bundle = fixture.store.bundle().unwrap();
    let declared: BTreeSet<String> =
        bundle.objects().iter().map(|object| object.name.clone()).collect();
    assert_eq!(live, declared);
    let guards = bundle.objects_of(ObjectFamily::Guard).count();
    assert_eq!(guards, fixture.store.registry().relationships().len() * 2);
}
