// crates/entitycore-query/tests/query_shapes.rs
// ============================================================================
// Module: Query Shape Tests
// Description: Cross-module checks on rendered selects and facet queries.
// Purpose: Confirm aliases, placeholders, and access predicates compose.
// ============================================================================

//! Rendered-SQL tests spanning selects, facets, and the access filter.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use entitycore_core::AccessScope;
use entitycore_core::KindRegistry;
use entitycore_core::KindRole;
use entitycore_core::ProjectId;
use entitycore_query::FacetEngine;
use entitycore_query::Select;
use entitycore_query::SqlValue;
use entitycore_query::facet::CREATED_BY_FACET;
use entitycore_synth::Dialect;
use proptest::prelude::*;

/// Returns the highest `$N` placeholder in `sql`.
fn highest_placeholder(sql: &str) -> usize {
    sql.match_indices('$')
        .filter_map(|(index, _)| {
            let digits: String =
                sql[index + 1..].chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<usize>().ok()
        })
        .max()
        .unwrap_or(0)
}

#[test]
fn creator_and_updater_filters_bind_to_their_own_alias() {
    let registry = KindRegistry::standard().unwrap();
    let mut select = Select::new(&registry, Dialect::Postgres, "emodel").unwrap();
    let creator = select.join_reference("created_by_id").unwrap();
    let updater = select.join_reference("updated_by_id").unwrap();
    select.filter_alias_eq(&creator, "pref_label", "Ada").unwrap();
    select.filter_alias_eq(&updater, "pref_label", "Grace").unwrap();
    select.include(&creator, "pref_label", "created_by_label").unwrap();
    select.include(&updater, "pref_label", "updated_by_label").unwrap();
    let query = select.authorize(AccessScope::Anonymous).rows_query();
    assert!(query.sql.contains("\"agent_1\".\"pref_label\" = $1"));
    assert!(query.sql.contains("\"agent_2\".\"pref_label\" = $2"));
    assert!(query.sql.contains("\"agent_1\".\"pref_label\" AS \"created_by_label\""));
    assert!(query.sql.contains("\"agent_2\".\"pref_label\" AS \"updated_by_label\""));
    assert_eq!(query.params, vec![SqlValue::from("Ada"), SqlValue::from("Grace")]);
}

#[test]
fn facet_queries_reuse_select_filters() {
    let registry = KindRegistry::standard().unwrap();
    let engine = FacetEngine::standard(&registry, "emodel").unwrap();
    let mut select = Select::new(&registry, Dialect::Sqlite, "emodel").unwrap();
    select.filter_facet(&CREATED_BY_FACET, 3).unwrap();
    let select = select.authorize(AccessScope::Project(ProjectId::new("p1")));
    for (name, query) in engine.queries(&select).unwrap() {
        assert!(
            query.sql.contains(
                "(\"entity_1\".\"authorized_public\" OR \
                 \"entity_1\".\"authorized_project_id\" = $1)"
            ),
            "{name} lost the access predicate"
        );
        assert!(query.sql.contains("COUNT(DISTINCT \"emodel_1\".\"id\") AS \"count\""), "{name}");
        assert!(query.sql.contains("\"agent_1\".\"id\" = $2"), "{name} lost the facet filter");
        assert_eq!(highest_placeholder(&query.sql), query.params.len(), "{name}");
    }
}

#[test]
fn every_protected_kind_is_access_filtered() {
    let registry = KindRegistry::standard().unwrap();
    for kind in registry.kinds() {
        let Some(source) = registry.authorization_source(kind.name) else {
            continue;
        };
        let select = Select::new(&registry, Dialect::Sqlite, kind.name).unwrap();
        let query = select.authorize(AccessScope::Anonymous).count_query();
        assert!(
            query.sql.contains(&format!("WHERE (\"{}_1\".\"authorized_public\")", source.root)),
            "{} is not filtered: {}",
            kind.name,
            query.sql
        );
        if kind.role == KindRole::Association {
            assert!(query.sql.contains(&format!("\"{}_1\".\"{}\"", kind.name, source.column)));
        }
    }
}

fn scope_strategy() -> impl Strategy<Value = AccessScope> {
    prop_oneof![
        Just(AccessScope::Anonymous),
        prop_oneof![Just("p1"), Just("p2")]
            .prop_map(|project| AccessScope::Project(ProjectId::new(project))),
    ]
}

fn filter_strategy() -> impl Strategy<Value = Vec<(&'static str, Option<i64>)>> {
    proptest::collection::vec(
        (
            prop_oneof![
                Just("brain_region_id"),
                Just("species_id"),
                Just("exemplar_morphology_id")
            ],
            proptest::option::of(1_i64 .. 100),
        ),
        0 .. 6,
    )
}

proptest! {
    #[test]
    fn placeholders_match_bound_values(
        scope in scope_strategy(),
        filters in filter_strategy(),
        facet in proptest::option::of(1_i64 .. 10),
        page in proptest::option::of((1_u64 .. 50, 0_u64 .. 500)),
    ) {
        let registry = KindRegistry::standard().unwrap();
        let mut select = Select::new(&registry, Dialect::Postgres, "emodel").unwrap();
        for (column, value) in &filters {
            select.filter_eq(column, *value).unwrap();
        }
        if let Some(id) = facet {
            select.filter_facet(&CREATED_BY_FACET, id).unwrap();
        }
        select.join_reference("exemplar_morphology_id").unwrap();
        if let Some((limit, offset)) = page {
            select.page(limit, offset);
        }
        let select = select.authorize(scope.clone());
        for query in [select.rows_query(), select.count_query()] {
            prop_assert_eq!(highest_placeholder(&query.sql), query.params.len());
            prop_assert!(query.sql.contains("WHERE (\"entity_1\".\"authorized_public\""));
            let projects = [SqlValue::from("p1"), SqlValue::from("p2")];
            let scoped = query.params.iter().filter(|value| projects.contains(value)).count();
            let expected = match scope {
                AccessScope::Anonymous => 0,
                AccessScope::Project(_) => 2,
            };
            prop_assert_eq!(scoped, expected);
        }
    }
}
