// crates/entitycore-query/src/facet.rs
// ============================================================================
// Module: Faceted Aggregation
// Description: Per-dimension distinct counts over an access-filtered select.
// Purpose: Drive refine-search UIs without leaking counts across projects.
// Dependencies: entitycore-core, entitycore-synth, serde
// ============================================================================

//! ## Overview
//! A facet is a join path from the selected kind to a dimension table plus
//! the dimension's id, label, and optional type columns. Each facet becomes
//! one grouped query built on the select's own `FROM`/`WHERE`, so facet
//! filters already on the select narrow every other facet's counts.
//!
//! Invariants:
//! - Every table occurrence uses an alias fresh to the statement; the same
//!   dimension kind may appear any number of times.
//! - Counts are `COUNT(DISTINCT <base id>)`, so one-to-many joins (assets,
//!   several contributions) never inflate a bucket.
//! - Tables on the path that carry their own authorization are restricted
//!   to rows visible in the caller's scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use entitycore_core::AccessScope;
use entitycore_core::ColumnDef;
use entitycore_core::KindRegistry;
use entitycore_core::StoreError;
use entitycore_synth::quote_ident;
use serde::Serialize;

use crate::access::visible_ids;
use crate::alias::AliasAllocator;
use crate::error::QueryError;
use crate::error::facet_error;
use crate::executor::SqlExecutor;
use crate::select::AuthorizedSelect;
use crate::select::Occurrence;
use crate::value::BoundQuery;
use crate::value::Params;
use crate::value::Row;

// ============================================================================
// SECTION: Facet Definitions
// ============================================================================

/// One join step: `<previous>.from = <table>.to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hop {
    /// Column on the previous table (the selected kind for the first hop).
    pub from: &'static str,
    /// Table joined by this hop.
    pub table: &'static str,
    /// Column on `table`.
    pub to: &'static str,
}

impl Hop {
    /// Declares a hop.
    #[must_use]
    pub const fn new(from: &'static str, table: &'static str, to: &'static str) -> Self {
        Self {
            from,
            table,
            to,
        }
    }
}

/// Facet dimension definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FacetSpec {
    /// Facet name in results.
    pub name: &'static str,
    /// Join path from the selected kind to the dimension table.
    pub path: &'static [Hop],
    /// Dimension id column.
    pub id_column: &'static str,
    /// Dimension label column.
    pub label_column: &'static str,
    /// Optional dimension type discriminator column.
    pub type_column: Option<&'static str>,
}

/// Facet by brain region.
pub const BRAIN_REGION_FACET: FacetSpec = FacetSpec {
    name: "brain_region",
    path: &[Hop::new("brain_region_id", "brain_region", "id")],
    id_column: "id",
    label_column: "name",
    type_column: None,
};

/// Facet by species.
pub const SPECIES_FACET: FacetSpec = FacetSpec {
    name: "species",
    path: &[Hop::new("species_id", "species", "id")],
    id_column: "id",
    label_column: "name",
    type_column: None,
};

/// Facet by creating agent.
pub const CREATED_BY_FACET: FacetSpec = FacetSpec {
    name: "created_by",
    path: &[Hop::new("created_by_id", "agent", "id")],
    id_column: "id",
    label_column: "pref_label",
    type_column: Some("type"),
};

/// Facet by last updating agent.
pub const UPDATED_BY_FACET: FacetSpec = FacetSpec {
    name: "updated_by",
    path: &[Hop::new("updated_by_id", "agent", "id")],
    id_column: "id",
    label_column: "pref_label",
    type_column: Some("type"),
};

/// Facet by contributing agent (many per entity).
pub const CONTRIBUTION_FACET: FacetSpec = FacetSpec {
    name: "contribution",
    path: &[Hop::new("id", "contribution", "entity_id"), Hop::new("agent_id", "agent", "id")],
    id_column: "id",
    label_column: "pref_label",
    type_column: Some("type"),
};

/// Facet by morphological type classification.
pub const MTYPE_FACET: FacetSpec = FacetSpec {
    name: "mtype",
    path: &[
        Hop::new("id", "mtype_classification", "entity_id"),
        Hop::new("mtype_class_id", "mtype_class", "id"),
    ],
    id_column: "id",
    label_column: "pref_label",
    type_column: None,
};

/// Facets offered for every kind they resolve against.
pub const STANDARD_FACETS: &[FacetSpec] = &[
    BRAIN_REGION_FACET,
    SPECIES_FACET,
    CREATED_BY_FACET,
    UPDATED_BY_FACET,
    CONTRIBUTION_FACET,
    MTYPE_FACET,
];

// ============================================================================
// SECTION: Results
// ============================================================================

/// Count of filtered rows linked to one dimension value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetBucket {
    /// Dimension value id.
    pub id: i64,
    /// Dimension value label.
    pub label: String,
    /// Dimension value type, when the facet declares one.
    #[serde(rename = "type")]
    pub discriminator: Option<String>,
    /// Distinct filtered rows linked to the value.
    pub count: u64,
}

/// Buckets per facet name.
pub type FacetResults = BTreeMap<&'static str, Vec<FacetBucket>>;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates `spec` from `kind` and returns the table holding the first
/// hop's `from` column.
///
/// # Errors
///
/// Returns [`QueryError::Facet`] when the path is empty, a table or column
/// is unknown, or adjacent hops are not linked by a foreign key.
pub fn resolve_facet(
    registry: &KindRegistry,
    kind: &str,
    spec: &FacetSpec,
) -> Result<&'static str, QueryError> {
    let first = spec.path.first().ok_or_else(|| facet_error(spec.name, "empty path"))?;
    let (anchor, anchor_column) = registry
        .column(kind, first.from)
        .map_err(|err| facet_error(spec.name, err.to_string()))?;
    let mut previous: (&'static str, &'static ColumnDef) = (anchor.name, anchor_column);
    for (index, hop) in spec.path.iter().enumerate() {
        let table =
            registry.kind(hop.table).map_err(|err| facet_error(spec.name, err.to_string()))?;
        if index > 0 {
            let from_table =
                registry.kind(previous.0).map_err(|err| facet_error(spec.name, err.to_string()))?;
            let column = from_table.column(hop.from).ok_or_else(|| {
                facet_error(spec.name, format!("unknown column {}.{}", from_table.name, hop.from))
            })?;
            previous = (from_table.name, column);
        }
        let to = table.column(hop.to).ok_or_else(|| {
            facet_error(spec.name, format!("unknown column {}.{}", table.name, hop.to))
        })?;
        if !linked(registry, previous, (table.name, to)) {
            return Err(facet_error(
                spec.name,
                format!("{}.{} does not join {}.{}", previous.0, hop.from, table.name, hop.to),
            ));
        }
        previous = (table.name, to);
    }
    let last =
        registry.kind(previous.0).map_err(|err| facet_error(spec.name, err.to_string()))?;
    let columns = [Some(spec.id_column), Some(spec.label_column), spec.type_column];
    for column in columns.into_iter().flatten() {
        if !last.has_column(column) {
            return Err(facet_error(spec.name, format!("unknown column {}.{column}", last.name)));
        }
    }
    Ok(anchor.name)
}

/// Returns true when one side is a foreign key into the other side's id.
fn linked(
    registry: &KindRegistry,
    from: (&'static str, &'static ColumnDef),
    to: (&'static str, &'static ColumnDef),
) -> bool {
    let in_chain = |table: &str, target: Option<&'static str>| {
        target.is_some_and(|target| {
            registry.chain(table).is_ok_and(|chain| chain.iter().any(|kind| kind.name == target))
        })
    };
    let forward = to.1.name == "id" && in_chain(to.0, from.1.reference());
    let reverse = from.1.name == "id" && in_chain(from.0, to.1.reference());
    forward || reverse
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Path tables with their join conditions and access guards.
struct RenderedPath {
    /// Hop occurrences with `ON` conditions, in path order.
    hops: Vec<(Occurrence, String)>,
    /// Access guards on protected hop tables.
    guards: Vec<String>,
}

impl RenderedPath {
    /// Returns the dimension table occurrence.
    fn last(&self) -> Option<&Occurrence> {
        self.hops.last().map(|(occurrence, _)| occurrence)
    }
}

/// Renders the hops of `spec` starting at the qualified `anchor` column.
fn render_path(
    registry: &KindRegistry,
    spec: &FacetSpec,
    anchor: &str,
    scope: &AccessScope,
    aliases: &mut AliasAllocator,
    params: &mut Params,
) -> RenderedPath {
    let mut hops: Vec<(Occurrence, String)> = Vec::with_capacity(spec.path.len());
    let mut guards = Vec::new();
    for hop in spec.path {
        let occurrence = Occurrence {
            table: hop.table,
            alias: aliases.next(hop.table),
        };
        let from = hops
            .last()
            .map_or_else(|| anchor.to_string(), |(previous, _)| previous.column(hop.from));
        let on = format!("{} = {from}", occurrence.column(hop.to));
        if let Some(source) = registry.authorization_source(hop.table) {
            let column = occurrence.column(source.column);
            guards.push(visible_ids(&column, source.root, scope, aliases, params));
        }
        hops.push((occurrence, on));
    }
    RenderedPath {
        hops,
        guards,
    }
}

/// Renders `EXISTS (...)` linking the anchor to facet value `id`.
pub(crate) fn render_facet_exists(
    registry: &KindRegistry,
    spec: &FacetSpec,
    anchor: &str,
    id: i64,
    scope: &AccessScope,
    aliases: &mut AliasAllocator,
    params: &mut Params,
) -> String {
    let path = render_path(registry, spec, anchor, scope, aliases, params);
    let mut from = String::new();
    let mut conditions = Vec::new();
    for (index, (occurrence, on)) in path.hops.iter().enumerate() {
        let table =
            format!("{} AS {}", quote_ident(occurrence.table), quote_ident(&occurrence.alias));
        if index == 0 {
            from = table;
            conditions.push(on.clone());
        } else {
            from.push_str(&format!(" JOIN {table} ON {on}"));
        }
    }
    conditions.extend(path.guards.iter().cloned());
    if let Some(last) = path.last() {
        conditions.push(format!("{} = {}", last.column(spec.id_column), params.push(id)));
    }
    format!("EXISTS (SELECT 1 FROM {from} WHERE {})", conditions.join(" AND "))
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Validated facets for one kind.
#[derive(Debug, Clone)]
pub struct FacetEngine<'r> {
    /// Registry the facets were validated against.
    registry: &'r KindRegistry,
    /// Selected kind.
    kind: &'static str,
    /// Facets with the table holding their anchor column.
    facets: Vec<(FacetSpec, &'static str)>,
}

impl<'r> FacetEngine<'r> {
    /// Validates `specs` for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the kind is unknown, a facet does not
    /// resolve, or two facets share a name.
    pub fn new(
        registry: &'r KindRegistry,
        kind: &str,
        specs: &[FacetSpec],
    ) -> Result<Self, QueryError> {
        let kind = registry.kind(kind)?.name;
        let mut names = BTreeSet::new();
        let mut facets = Vec::with_capacity(specs.len());
        for spec in specs {
            if !names.insert(spec.name) {
                return Err(facet_error(spec.name, "duplicate facet name"));
            }
            facets.push((*spec, resolve_facet(registry, kind, spec)?));
        }
        Ok(Self {
            registry,
            kind,
            facets,
        })
    }

    /// Builds an engine with every standard facet that resolves for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Registry`] when the kind is unknown.
    pub fn standard(registry: &'r KindRegistry, kind: &str) -> Result<Self, QueryError> {
        let kind = registry.kind(kind)?.name;
        let facets = STANDARD_FACETS
            .iter()
            .filter_map(|spec| {
                resolve_facet(registry, kind, spec).ok().map(|anchor| (*spec, anchor))
            })
            .collect();
        Ok(Self {
            registry,
            kind,
            facets,
        })
    }

    /// Returns the facets in declaration order.
    pub fn facets(&self) -> impl Iterator<Item = &FacetSpec> {
        self.facets.iter().map(|(spec, _)| spec)
    }

    /// Returns the facet named `name`.
    #[must_use]
    pub fn facet(&self, name: &str) -> Option<&FacetSpec> {
        self.facets().find(|spec| spec.name == name)
    }

    /// Renders the grouped count query for facet `name`.
    ///
    /// When the select filters on the same facet, only the filtered values
    /// are counted.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Facet`] when the facet is unknown or the select
    /// is over another kind.
    pub fn query(
        &self,
        name: &str,
        select: &AuthorizedSelect<'_>,
    ) -> Result<BoundQuery, QueryError> {
        let (spec, anchor_table) = self
            .facets
            .iter()
            .find(|(spec, _)| spec.name == name)
            .ok_or_else(|| facet_error(name, "unknown facet"))?;
        let inner = select.select();
        if inner.kind() != self.kind {
            let message = format!("select is over {}, not {}", inner.kind(), self.kind);
            return Err(facet_error(name, message));
        }
        let first = spec.path.first().ok_or_else(|| facet_error(name, "empty path"))?;
        let anchor = inner
            .chain_occurrence(anchor_table)
            .ok_or_else(|| facet_error(name, "anchor table not in chain"))?
            .column(first.from);
        let base = inner.base()?.column("id");

        let mut aliases = select.aliases();
        let mut params = Params::new();
        let mut source = select.render_source(&mut aliases, &mut params);
        let path =
            render_path(self.registry, spec, &anchor, select.scope(), &mut aliases, &mut params);
        for (occurrence, on) in &path.hops {
            source.from.push_str(&format!(
                " JOIN {} AS {} ON {on}",
                quote_ident(occurrence.table),
                quote_ident(&occurrence.alias)
            ));
        }
        source.conditions.extend(path.guards.iter().cloned());
        let last = path.last().ok_or_else(|| facet_error(name, "empty path"))?;
        for id in inner.facet_filters(spec.name) {
            let value = params.push(id);
            source.conditions.push(format!("{} = {value}", last.column(spec.id_column)));
        }
        let mut columns = vec![
            format!("{} AS \"id\"", last.column(spec.id_column)),
            format!("{} AS \"label\"", last.column(spec.label_column)),
        ];
        let mut group = vec![last.column(spec.id_column), last.column(spec.label_column)];
        if let Some(type_column) = spec.type_column {
            columns.push(format!("{} AS \"type\"", last.column(type_column)));
            group.push(last.column(type_column));
        }
        columns.push(format!("COUNT(DISTINCT {base}) AS \"count\""));
        Ok(params.bind(format!(
            "SELECT {} {}{} GROUP BY {} ORDER BY \"count\" DESC, \"label\", \"id\"",
            columns.join(", "),
            source.from,
            source.where_clause(),
            group.join(", ")
        )))
    }

    /// Renders every facet query in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when any facet query cannot be rendered.
    pub fn queries(
        &self,
        select: &AuthorizedSelect<'_>,
    ) -> Result<Vec<(&'static str, BoundQuery)>, QueryError> {
        self.facets
            .iter()
            .map(|(spec, _)| -> Result<_, QueryError> {
                Ok((spec.name, self.query(spec.name, select)?))
            })
            .collect()
    }

    /// Runs every facet query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when rendering, execution, or decoding fails.
    pub fn compute<E: SqlExecutor + ?Sized>(
        &self,
        executor: &mut E,
        select: &AuthorizedSelect<'_>,
    ) -> Result<FacetResults, StoreError> {
        let mut results = FacetResults::new();
        for (name, query) in self.queries(select)? {
            let rows = executor.query(&query)?;
            results.insert(name, Self::decode(&rows)?);
        }
        Ok(results)
    }

    /// Decodes facet rows into buckets.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] when a row lacks id, label, or count.
    pub fn decode(rows: &[Row]) -> Result<Vec<FacetBucket>, QueryError> {
        rows.iter()
            .map(|row| -> Result<FacetBucket, QueryError> {
                let count = row.require_int("count")?;
                Ok(FacetBucket {
                    id: row.require_int("id")?,
                    label: row.require_text("label")?.to_string(),
                    discriminator: row.text("type").map(str::to_string),
                    count: u64::try_from(count)
                        .map_err(|_| QueryError::Decode("negative facet count".to_string()))?,
                })
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
