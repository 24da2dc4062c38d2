// crates/entitycore-query/src/select.rs
// ============================================================================
// Module: Select Builder
// Description: Typed, access-filtered SELECT over one kind.
// Purpose: Build reads only from registry-declared tables and columns.
// Dependencies: entitycore-core, entitycore-synth
// ============================================================================

//! ## Overview
//! A [`Select`] starts from one kind, joins its inheritance chain (and, for
//! association kinds, the root row that owns them) and accumulates joins and
//! predicates. Table and column names only ever come from the
//! [`KindRegistry`]; caller strings are used as lookup keys and values are
//! bound as parameters.
//!
//! A [`Select`] cannot be rendered. [`Select::authorize`] attaches the
//! caller's [`AccessScope`] and returns an [`AuthorizedSelect`], whose SQL
//! always carries the access predicate on the owning root row and on every
//! protected table reached through a join.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::AccessScope;
use entitycore_core::ColumnDef;
use entitycore_core::ColumnType;
use entitycore_core::KindRegistry;
use entitycore_core::StoreError;
use entitycore_synth::Dialect;
use entitycore_synth::TEXT_SEARCH_CATALOG;
use entitycore_synth::dialect::quote_literal;
use entitycore_synth::quote_ident;

use crate::access::access_predicate;
use crate::access::visible_ids;
use crate::alias::AliasAllocator;
use crate::error::QueryError;
use crate::error::column_error;
use crate::executor::SqlExecutor;
use crate::facet::FacetSpec;
use crate::facet::render_facet_exists;
use crate::facet::resolve_facet;
use crate::value::BoundQuery;
use crate::value::Params;
use crate::value::Row;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Parts
// ============================================================================

/// One table occurrence in the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Occurrence {
    /// Table name.
    pub(crate) table: &'static str,
    /// Alias unique within the statement.
    pub(crate) alias: String,
}

impl Occurrence {
    /// Returns `"alias"."column"`.
    pub(crate) fn column(&self, column: &str) -> String {
        qualified(&self.alias, column)
    }
}

/// Protected table reached through a join.
#[derive(Debug, Clone, PartialEq, Eq)]
struct JoinGuard {
    /// Qualified column holding the owning root id.
    column: String,
    /// Root table carrying the authorization columns.
    root: &'static str,
}

/// Join rendered after the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Join {
    /// `LEFT JOIN` when true, inner join otherwise.
    left: bool,
    /// Joined table.
    target: Occurrence,
    /// Equality condition between the joined table and an earlier one.
    on: String,
    /// Access guard appended to the join condition.
    guard: Option<JoinGuard>,
}

/// Selected output column.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Projection {
    /// SQL expression.
    expr: String,
    /// Output column name.
    label: String,
}

/// Predicate held until the scope is known.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    /// `column = value`, or `column IS NULL` for NULL.
    Equals {
        /// Qualified column.
        column: String,
        /// Compared value.
        value: SqlValue,
    },
    /// Free-text match against a search document column.
    Search {
        /// Qualified search document column.
        column: String,
        /// Caller text.
        text: String,
    },
    /// Row is linked to facet value `id`.
    Facet {
        /// Facet definition.
        spec: FacetSpec,
        /// Qualified column the first hop joins from.
        anchor: String,
        /// Facet value id.
        id: i64,
    },
}

/// Rendered `FROM` clause plus `WHERE` conjuncts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Source {
    /// `FROM ... JOIN ...` text.
    pub(crate) from: String,
    /// Conjuncts; the access predicate comes first.
    pub(crate) conditions: Vec<String>,
}

impl Source {
    /// Renders ` WHERE a AND b`, or nothing.
    pub(crate) fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}

// ============================================================================
// SECTION: Select
// ============================================================================

/// Unauthorized select over one kind.
#[derive(Debug, Clone)]
pub struct Select<'r> {
    /// Registry resolving tables and columns.
    registry: &'r KindRegistry,
    /// Dialect used for search predicates.
    dialect: Dialect,
    /// Selected kind.
    kind: &'static str,
    /// Alias allocator shared by every part of the statement.
    aliases: AliasAllocator,
    /// Inheritance chain, root first; the last entry is the base table.
    chain: Vec<Occurrence>,
    /// Root row carrying authorization, when the kind is protected.
    root: Option<Occurrence>,
    /// Joins in render order.
    joins: Vec<Join>,
    /// Output columns.
    projections: Vec<Projection>,
    /// Predicates in insertion order.
    predicates: Vec<Predicate>,
    /// Output columns to order by, with descending flag.
    order: Vec<(String, bool)>,
    /// `(limit, offset)`.
    page: Option<(u64, u64)>,
    /// Set once a one-to-many join can repeat base rows.
    distinct: bool,
}

impl<'r> Select<'r> {
    /// Starts a select over `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Registry`] when the kind is unknown.
    pub fn new(
        registry: &'r KindRegistry,
        dialect: Dialect,
        kind: &str,
    ) -> Result<Self, QueryError> {
        let descriptors = registry.chain(kind)?;
        let mut aliases = AliasAllocator::new();
        let mut chain: Vec<Occurrence> = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            chain.push(Occurrence {
                table: descriptor.name,
                alias: aliases.next(descriptor.name),
            });
        }
        let base = chain.last().cloned().ok_or_else(|| column_error(kind, "id", "empty chain"))?;
        let mut joins = Vec::new();
        for occurrence in &chain[..chain.len() - 1] {
            joins.push(Join {
                left: false,
                target: occurrence.clone(),
                on: format!("{} = {}", occurrence.column("id"), base.column("id")),
                guard: None,
            });
        }
        let root = match registry.authorization_source(kind) {
            Some(source) if source.column == "id" => {
                chain.iter().find(|occurrence| occurrence.table == source.root).cloned()
            }
            Some(source) => {
                let occurrence = Occurrence {
                    table: source.root,
                    alias: aliases.next(source.root),
                };
                joins.push(Join {
                    left: false,
                    target: occurrence.clone(),
                    on: format!("{} = {}", occurrence.column("id"), base.column(source.column)),
                    guard: None,
                });
                Some(occurrence)
            }
            None => None,
        };

        let mut projections: Vec<Projection> = Vec::new();
        for (occurrence, descriptor) in chain.iter().zip(&descriptors) {
            for column in descriptor.columns {
                if column.ty == ColumnType::SearchDocument
                    || projections.iter().any(|projection| projection.label == column.name)
                {
                    continue;
                }
                projections.push(Projection {
                    expr: column_expression(occurrence, column),
                    label: column.name.to_string(),
                });
            }
        }

        Ok(Self {
            registry,
            dialect,
            kind: base.table,
            aliases,
            chain,
            root,
            joins,
            projections,
            predicates: Vec::new(),
            order: Vec::new(),
            page: None,
            distinct: false,
        })
    }

    /// Returns the selected kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns the alias of the kind's own table.
    #[must_use]
    pub fn base_alias(&self) -> &str {
        self.chain.last().map_or("", |occurrence| occurrence.alias.as_str())
    }

    /// Returns the alias of the root row carrying authorization.
    #[must_use]
    pub fn root_alias(&self) -> Option<&str> {
        self.root.as_ref().map(|occurrence| occurrence.alias.as_str())
    }

    /// Returns the registry this select resolves against.
    #[must_use]
    pub const fn registry(&self) -> &'r KindRegistry {
        self.registry
    }

    /// Returns the base table occurrence.
    pub(crate) fn base(&self) -> Result<&Occurrence, QueryError> {
        self.chain.last().ok_or_else(|| column_error(self.kind, "id", "empty chain"))
    }

    /// Returns the occurrence of chain table `table`.
    pub(crate) fn chain_occurrence(&self, table: &str) -> Option<&Occurrence> {
        self.chain.iter().find(|occurrence| occurrence.table == table)
    }

    /// Returns the values facet `name` is filtered to.
    pub(crate) fn facet_filters<'s>(&'s self, name: &'s str) -> impl Iterator<Item = i64> + 's {
        self.predicates.iter().filter_map(move |predicate| match predicate {
            Predicate::Facet {
                spec,
                id,
                ..
            } if spec.name == name => Some(*id),
            _ => None,
        })
    }

    /// Resolves `column` on the kind to its table occurrence.
    fn resolve(&self, column: &str) -> Result<(&Occurrence, &'static ColumnDef), QueryError> {
        let (table, definition) = self.registry.column(self.kind, column)?;
        let occurrence = self
            .chain_occurrence(table.name)
            .ok_or_else(|| column_error(self.kind, column, "table not in chain"))?;
        Ok((occurrence, definition))
    }

    /// Returns the occurrence with alias `alias`.
    fn occurrence(&self, alias: &str) -> Result<&Occurrence, QueryError> {
        self.chain
            .iter()
            .chain(self.joins.iter().map(|join| &join.target))
            .find(|occurrence| occurrence.alias == alias)
            .ok_or_else(|| QueryError::UnknownAlias(alias.to_string()))
    }

    /// Resolves `column` declared on the table behind `alias`.
    fn resolve_on(
        &self,
        alias: &str,
        column: &str,
    ) -> Result<(Occurrence, &'static ColumnDef), QueryError> {
        let occurrence = self.occurrence(alias)?.clone();
        let definition = self
            .registry
            .kind(occurrence.table)?
            .column(column)
            .ok_or_else(|| column_error(occurrence.table, column, "unknown column"))?;
        Ok((occurrence, definition))
    }

    // ------------------------------------------------------------------------
    // Predicates
    // ------------------------------------------------------------------------

    /// Restricts `column` of the kind to `value` (NULL matches `IS NULL`).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the column is unknown or a search document.
    pub fn filter_eq(
        &mut self,
        column: &str,
        value: impl Into<SqlValue>,
    ) -> Result<&mut Self, QueryError> {
        let (occurrence, definition) = self.resolve(column)?;
        let qualified = occurrence.column(definition.name);
        self.push_equals(definition, qualified, value.into())
    }

    /// Restricts `column` of a joined table to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the alias or column is unknown.
    pub fn filter_alias_eq(
        &mut self,
        alias: &str,
        column: &str,
        value: impl Into<SqlValue>,
    ) -> Result<&mut Self, QueryError> {
        let (occurrence, definition) = self.resolve_on(alias, column)?;
        let qualified = occurrence.column(definition.name);
        self.push_equals(definition, qualified, value.into())
    }

    /// Records an equality predicate after rejecting search documents.
    fn push_equals(
        &mut self,
        definition: &ColumnDef,
        column: String,
        value: SqlValue,
    ) -> Result<&mut Self, QueryError> {
        if definition.ty == ColumnType::SearchDocument {
            return Err(column_error(self.kind, definition.name, "use search() for documents"));
        }
        self.predicates.push(Predicate::Equals {
            column,
            value,
        });
        Ok(self)
    }

    /// Restricts rows to those whose search document matches `text`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Column`] when no table in the chain declares a
    /// search document.
    pub fn search(&mut self, text: &str) -> Result<&mut Self, QueryError> {
        let registry = self.registry;
        let column = self
            .chain
            .iter()
            .find_map(|occurrence| {
                let spec = registry.kind(occurrence.table).ok()?.search?;
                Some(occurrence.column(spec.column))
            })
            .ok_or_else(|| column_error(self.kind, "search", "kind has no search document"))?;
        self.predicates.push(Predicate::Search {
            column,
            text: text.to_string(),
        });
        Ok(self)
    }

    /// Restricts rows to those linked to value `id` of `facet`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Facet`] when the facet path does not resolve
    /// from this kind.
    pub fn filter_facet(&mut self, facet: &FacetSpec, id: i64) -> Result<&mut Self, QueryError> {
        let anchor_table = resolve_facet(self.registry, self.kind, facet)?;
        let first = facet.path.first().map_or("id", |hop| hop.from);
        let anchor = self
            .chain_occurrence(anchor_table)
            .map(|occurrence| occurrence.column(first))
            .ok_or_else(|| column_error(self.kind, first, "facet anchor not in chain"))?;
        self.predicates.push(Predicate::Facet {
            spec: *facet,
            anchor,
            id,
        });
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------------

    /// Left-joins the row referenced by `column` of the kind; returns its alias.
    ///
    /// Joining the same reference kind twice (creator and updater) yields
    /// two distinct aliases.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the column is unknown or not a reference.
    pub fn join_reference(&mut self, column: &str) -> Result<String, QueryError> {
        let alias = self.resolve(column)?.0.alias.clone();
        self.join_reference_from(&alias, column)
    }

    /// Left-joins the row referenced by `column` of the table behind `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the alias or column is unknown or the
    /// column is not a reference.
    pub fn join_reference_from(&mut self, alias: &str, column: &str) -> Result<String, QueryError> {
        let (source, definition) = self.resolve_on(alias, column)?;
        let target = definition
            .reference()
            .filter(|_| definition.name != "id")
            .ok_or_else(|| column_error(source.table, column, "not a reference"))?;
        let occurrence = Occurrence {
            table: target,
            alias: self.aliases.next(target),
        };
        let guard = self.registry.protected_root(target).map(|root| JoinGuard {
            column: occurrence.column("id"),
            root: root.name,
        });
        self.joins.push(Join {
            left: true,
            on: format!("{} = {}", occurrence.column("id"), source.column(definition.name)),
            target: occurrence.clone(),
            guard,
        });
        Ok(occurrence.alias)
    }

    /// Left-joins rows of `table` whose `foreign_key` points at this row;
    /// returns the alias. Rows may repeat, so reads switch to `DISTINCT`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when `foreign_key` does not reference a table
    /// of this kind's chain.
    pub fn join_related(&mut self, table: &str, foreign_key: &str) -> Result<String, QueryError> {
        let related = self.registry.kind(table)?;
        let definition = related
            .column(foreign_key)
            .ok_or_else(|| column_error(related.name, foreign_key, "unknown column"))?;
        let referenced = definition
            .reference()
            .and_then(|target| self.chain_occurrence(target))
            .ok_or_else(|| column_error(related.name, foreign_key, "does not reference this kind"))?
            .clone();
        let occurrence = Occurrence {
            table: related.name,
            alias: self.aliases.next(related.name),
        };
        let guard = self
            .registry
            .authorization_source(related.name)
            .filter(|source| source.column != foreign_key)
            .map(|source| JoinGuard {
                column: occurrence.column(source.column),
                root: source.root,
            });
        self.joins.push(Join {
            left: true,
            on: format!("{} = {}", occurrence.column(definition.name), referenced.column("id")),
            target: occurrence.clone(),
            guard,
        });
        self.distinct = true;
        Ok(occurrence.alias)
    }

    /// Adds `column` of the table behind `alias` to the output as `label`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the alias or column is unknown or the
    /// label is already taken.
    pub fn include(
        &mut self,
        alias: &str,
        column: &str,
        label: &str,
    ) -> Result<&mut Self, QueryError> {
        let (occurrence, definition) = self.resolve_on(alias, column)?;
        if self.projections.iter().any(|projection| projection.label == label) {
            return Err(column_error(self.kind, label, "output label already used"));
        }
        self.projections.push(Projection {
            expr: column_expression(&occurrence, definition),
            label: label.to_string(),
        });
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Ordering
    // ------------------------------------------------------------------------

    /// Orders by output column `label`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Column`] when the label is not selected.
    pub fn order_by(&mut self, label: &str, descending: bool) -> Result<&mut Self, QueryError> {
        if !self.projections.iter().any(|projection| projection.label == label) {
            return Err(column_error(self.kind, label, "not an output column"));
        }
        self.order.push((label.to_string(), descending));
        Ok(self)
    }

    /// Limits the read to one page.
    pub const fn page(&mut self, limit: u64, offset: u64) -> &mut Self {
        self.page = Some((limit, offset));
        self
    }

    /// Attaches the caller's scope.
    #[must_use]
    pub fn authorize(self, scope: AccessScope) -> AuthorizedSelect<'r> {
        AuthorizedSelect {
            select: self,
            scope,
        }
    }
}

// ============================================================================
// SECTION: Authorized Select
// ============================================================================

/// Select bound to a caller scope; the only renderable form.
#[derive(Debug, Clone)]
pub struct AuthorizedSelect<'r> {
    /// Underlying select.
    select: Select<'r>,
    /// Caller scope.
    scope: AccessScope,
}

impl<'r> AuthorizedSelect<'r> {
    /// Returns the underlying select.
    #[must_use]
    pub const fn select(&self) -> &Select<'r> {
        &self.select
    }

    /// Returns the caller scope.
    #[must_use]
    pub const fn scope(&self) -> &AccessScope {
        &self.scope
    }

    /// Returns a fresh allocator continuing after the select's aliases.
    pub(crate) fn aliases(&self) -> AliasAllocator {
        self.select.aliases.clone()
    }

    /// Renders the `FROM` clause and every `WHERE` conjunct.
    pub(crate) fn render_source(
        &self,
        aliases: &mut AliasAllocator,
        params: &mut Params,
    ) -> Source {
        let select = &self.select;
        let mut from = match select.chain.last() {
            Some(base) => {
                format!("FROM {} AS {}", quote_ident(base.table), quote_ident(&base.alias))
            }
            None => String::new(),
        };
        for join in &select.joins {
            let mut on = join.on.clone();
            if let Some(guard) = &join.guard {
                on.push_str(" AND ");
                on.push_str(&visible_ids(&guard.column, guard.root, &self.scope, aliases, params));
            }
            from.push_str(&format!(
                " {} {} AS {} ON {on}",
                if join.left { "LEFT JOIN" } else { "JOIN" },
                quote_ident(join.target.table),
                quote_ident(&join.target.alias)
            ));
        }
        let mut conditions = Vec::with_capacity(select.predicates.len() + 1);
        if let Some(root) = &select.root {
            conditions.push(access_predicate(&root.alias, &self.scope, params));
        }
        for predicate in &select.predicates {
            conditions.push(match predicate {
                Predicate::Equals {
                    column,
                    value: SqlValue::Null,
                } => format!("{column} IS NULL"),
                Predicate::Equals {
                    column,
                    value,
                } => format!("{column} = {}", params.push(value.clone())),
                Predicate::Search {
                    column,
                    text,
                } => search_predicate(select.dialect, column, params.push(text.as_str())),
                Predicate::Facet {
                    spec,
                    anchor,
                    id,
                } => render_facet_exists(
                    select.registry,
                    spec,
                    anchor,
                    *id,
                    &self.scope,
                    aliases,
                    params,
                ),
            });
        }
        Source {
            from,
            conditions,
        }
    }

    /// Renders the row query.
    #[must_use]
    pub fn rows_query(&self) -> BoundQuery {
        let select = &self.select;
        let mut aliases = self.aliases();
        let mut params = Params::new();
        let source = self.render_source(&mut aliases, &mut params);
        let columns: Vec<String> = select
            .projections
            .iter()
            .map(|projection| format!("{} AS {}", projection.expr, quote_ident(&projection.label)))
            .collect();
        let order: Vec<String> = if select.order.is_empty() {
            vec![quote_ident("id")]
        } else {
            select
                .order
                .iter()
                .map(|(label, descending)| {
                    format!("{}{}", quote_ident(label), if *descending { " DESC" } else { "" })
                })
                .collect()
        };
        let mut sql = format!(
            "SELECT {}{} {}{} ORDER BY {}",
            if select.distinct { "DISTINCT " } else { "" },
            columns.join(", "),
            source.from,
            source.where_clause(),
            order.join(", ")
        );
        if let Some((limit, offset)) = select.page {
            let limit = params.push(i64::try_from(limit).unwrap_or(i64::MAX));
            let offset = params.push(i64::try_from(offset).unwrap_or(i64::MAX));
            sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
        }
        params.bind(sql)
    }

    /// Renders the count of distinct matching rows.
    #[must_use]
    pub fn count_query(&self) -> BoundQuery {
        let mut aliases = self.aliases();
        let mut params = Params::new();
        let source = self.render_source(&mut aliases, &mut params);
        let base = self.select.base_alias();
        params.bind(format!(
            "SELECT COUNT(DISTINCT {}) AS \"count\" {}{}",
            qualified(base, "id"),
            source.from,
            source.where_clause()
        ))
    }

    /// Runs the row query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the executor fails.
    pub fn fetch<E: SqlExecutor + ?Sized>(&self, executor: &mut E) -> Result<Vec<Row>, StoreError> {
        executor.query(&self.rows_query())
    }

    /// Runs the count query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the executor fails or the result is
    /// malformed.
    pub fn count<E: SqlExecutor + ?Sized>(&self, executor: &mut E) -> Result<u64, StoreError> {
        let rows = executor.query(&self.count_query())?;
        let count = rows
            .first()
            .ok_or_else(|| QueryError::Decode("count returned no rows".to_string()))?
            .require_int("count")?;
        u64::try_from(count).map_err(|_| StoreError::Invalid("negative count".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns `"alias"."column"`.
pub(crate) fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(column))
}

/// Output expression for a column; timestamps are read as text.
fn column_expression(occurrence: &Occurrence, column: &ColumnDef) -> String {
    let expr = occurrence.column(column.name);
    match column.ty {
        ColumnType::Timestamp => format!("CAST({expr} AS TEXT)"),
        _ => expr,
    }
}

/// Dialect free-text predicate.
fn search_predicate(dialect: Dialect, column: &str, placeholder: String) -> String {
    match dialect {
        Dialect::Postgres => format!(
            "{column} @@ plainto_tsquery({}, {placeholder})",
            quote_literal(TEXT_SEARCH_CATALOG)
        ),
        Dialect::Sqlite => format!("instr({column}, lower(trim({placeholder}))) > 0"),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
