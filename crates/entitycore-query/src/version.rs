// crates/entitycore-query/src/version.rs
// ============================================================================
// Module: Version History
// Description: Reads shadow-table history joined to the transaction log.
// Purpose: Answer "what did this row look like, when, and who changed it".
// Dependencies: entitycore-core, entitycore-synth
// ============================================================================

//! ## Overview
//! History is read from the kind's own version table, one row per
//! transaction that touched the row, oldest first. Visibility follows the
//! authorization recorded in the newest root version row, so deleted rows
//! keep the access state they had when they were deleted.

use entitycore_core::AccessScope;
use entitycore_core::AgentId;
use entitycore_core::ColumnType;
use entitycore_core::IdentifierNamer;
use entitycore_core::KindRegistry;
use entitycore_core::StoreError;
use entitycore_core::TransactionId;
use entitycore_synth::OPERATION_TYPE_COLUMN;
use entitycore_synth::OperationType;
use entitycore_synth::TRANSACTION_ID_COLUMN;
use entitycore_synth::quote_ident;
use entitycore_synth::version_table_name;

use crate::access::access_predicate;
use crate::alias::AliasAllocator;
use crate::error::QueryError;
use crate::executor::SqlExecutor;
use crate::select::qualified;
use crate::value::BoundQuery;
use crate::value::Params;
use crate::value::Row;

/// One historical state of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    /// Transaction that produced this state.
    pub transaction_id: TransactionId,
    /// Operation recorded for the transaction.
    pub operation: OperationType,
    /// Agent recorded on the transaction, if any.
    pub actor: Option<AgentId>,
    /// Transaction timestamp as stored text.
    pub issued_at: String,
    /// Column values of the kind's own table.
    pub values: Row,
}

/// Where visibility of a versioned row is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Visibility {
    /// Global kind; every version is visible.
    Global,
    /// Newest row of the root's version table.
    RootVersion(String),
    /// Current root row (root not versioned).
    RootRow(&'static str),
}

/// History reader for one versioned kind.
#[derive(Debug, Clone)]
pub struct VersionQuery {
    /// Kind whose history is read.
    kind: &'static str,
    /// Version table of the kind.
    table: String,
    /// Transaction log table.
    log: &'static str,
    /// Output columns of the kind, with their types.
    columns: Vec<(&'static str, ColumnType)>,
    /// Visibility source.
    visibility: Visibility,
}

impl VersionQuery {
    /// Prepares history reads for `kind`, naming tables with `namer`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotVersioned`] for kinds without a version
    /// table and [`QueryError::Registry`] for unknown kinds.
    pub fn new(
        registry: &KindRegistry,
        namer: &IdentifierNamer,
        kind: &str,
    ) -> Result<Self, QueryError> {
        let descriptor = registry.kind(kind)?;
        if !registry.is_versioned(descriptor.name) {
            return Err(QueryError::NotVersioned(descriptor.name.to_string()));
        }
        let log = registry
            .transaction_log()
            .ok_or_else(|| QueryError::NotVersioned(descriptor.name.to_string()))?;
        let visibility = match registry.protected_root(descriptor.name) {
            None => Visibility::Global,
            Some(root) if registry.is_versioned(root.name) => {
                Visibility::RootVersion(version_table_name(namer, root.name)?)
            }
            Some(root) => Visibility::RootRow(root.name),
        };
        Ok(Self {
            kind: descriptor.name,
            table: version_table_name(namer, descriptor.name)?,
            log: log.name,
            columns: descriptor
                .columns
                .iter()
                .filter(|column| column.ty != ColumnType::SearchDocument)
                .map(|column| (column.name, column.ty))
                .collect(),
            visibility,
        })
    }

    /// Returns the kind whose history is read.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Renders the history query for row `id`.
    #[must_use]
    pub fn query(&self, scope: &AccessScope, id: i64) -> BoundQuery {
        let mut aliases = AliasAllocator::new();
        let mut params = Params::new();
        let version = aliases.next("version");
        let log = aliases.next(self.log);
        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|(name, ty)| {
                let expr = qualified(&version, name);
                let expr = if *ty == ColumnType::Timestamp {
                    format!("CAST({expr} AS TEXT)")
                } else {
                    expr
                };
                format!("{expr} AS {}", quote_ident(name))
            })
            .collect();
        columns.push(format!(
            "{} AS {}",
            qualified(&version, TRANSACTION_ID_COLUMN),
            quote_ident(TRANSACTION_ID_COLUMN)
        ));
        columns.push(format!(
            "{} AS {}",
            qualified(&version, OPERATION_TYPE_COLUMN),
            quote_ident(OPERATION_TYPE_COLUMN)
        ));
        columns.push(format!("{} AS \"actor_id\"", qualified(&log, "actor_id")));
        columns.push(format!("CAST({} AS TEXT) AS \"issued_at\"", qualified(&log, "issued_at")));

        let mut conditions = vec![format!("{} = {}", qualified(&version, "id"), params.push(id))];
        match &self.visibility {
            Visibility::Global => {}
            Visibility::RootVersion(root_table) => {
                let latest = aliases.next("root_version");
                let newer = aliases.next("root_version");
                conditions.push(format!(
                    "EXISTS (SELECT 1 FROM {table} AS {latest_q} WHERE {} = {} AND {} AND \
                     NOT EXISTS (SELECT 1 FROM {table} AS {newer_q} WHERE {} = {} AND {} > {}))",
                    qualified(&latest, "id"),
                    qualified(&version, "id"),
                    access_predicate(&latest, scope, &mut params),
                    qualified(&newer, "id"),
                    qualified(&latest, "id"),
                    qualified(&newer, TRANSACTION_ID_COLUMN),
                    qualified(&latest, TRANSACTION_ID_COLUMN),
                    table = quote_ident(root_table),
                    latest_q = quote_ident(&latest),
                    newer_q = quote_ident(&newer),
                ));
            }
            Visibility::RootRow(root) => {
                let current = aliases.next(root);
                conditions.push(format!(
                    "EXISTS (SELECT 1 FROM {} AS {} WHERE {} = {} AND {})",
                    quote_ident(root),
                    quote_ident(&current),
                    qualified(&current, "id"),
                    qualified(&version, "id"),
                    access_predicate(&current, scope, &mut params)
                ));
            }
        }
        params.bind(format!(
            "SELECT {} FROM {} AS {} JOIN {} AS {} ON {} = {} WHERE {} ORDER BY {}",
            columns.join(", "),
            quote_ident(&self.table),
            quote_ident(&version),
            quote_ident(self.log),
            quote_ident(&log),
            qualified(&log, "id"),
            qualified(&version, TRANSACTION_ID_COLUMN),
            conditions.join(" AND "),
            quote_ident(TRANSACTION_ID_COLUMN)
        ))
    }

    /// Reads the visible history of row `id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or a row is malformed.
    pub fn fetch<E: SqlExecutor + ?Sized>(
        &self,
        executor: &mut E,
        scope: &AccessScope,
        id: i64,
    ) -> Result<Vec<VersionRecord>, StoreError> {
        let rows = executor.query(&self.query(scope, id))?;
        Ok(rows.into_iter().map(|row| self.decode(row)).collect::<Result<Vec<_>, QueryError>>()?)
    }

    /// Splits a history row into its record.
    fn decode(&self, row: Row) -> Result<VersionRecord, QueryError> {
        let code = row.require_int(OPERATION_TYPE_COLUMN)?;
        let operation = OperationType::from_code(code)
            .ok_or_else(|| QueryError::Decode(format!("unknown operation code {code}")))?;
        let values = Row::new(
            row.columns()
                .iter()
                .filter(|(name, _)| self.columns.iter().any(|(column, _)| column == name))
                .cloned()
                .collect(),
        );
        Ok(VersionRecord {
            transaction_id: TransactionId::new(row.require_int(TRANSACTION_ID_COLUMN)?),
            operation,
            actor: row.int("actor_id").map(AgentId::new),
            issued_at: row.require_text("issued_at")?.to_string(),
            values,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use entitycore_core::ProjectId;

    use super::*;
    use crate::value::SqlValue;

    #[test]
    fn entity_history_checks_the_newest_root_version() {
        let registry = KindRegistry::standard().unwrap();
        let query = VersionQuery::new(&registry, &IdentifierNamer::default(), "emodel").unwrap();
        let bound = query.query(&AccessScope::Project(ProjectId::new("p1")), 7);
        assert!(bound.sql.contains(
            "FROM \"emodel_version\" AS \"version_1\" JOIN \"transaction\" AS \"transaction_1\" ON \
             \"transaction_1\".\"id\" = \"version_1\".\"transaction_id\""
        ));
        assert!(bound.sql.contains("FROM \"entity_version\" AS \"root_version_1\""));
        assert!(bound.sql.contains(
            "\"root_version_2\".\"transaction_id\" > \"root_version_1\".\"transaction_id\""
        ));
        assert!(!bound.sql.contains("description_vector"));
        assert!(bound.sql.ends_with("ORDER BY \"transaction_id\""));
        assert_eq!(bound.params, vec![SqlValue::Int(7), SqlValue::from("p1")]);
    }

    #[test]
    fn global_history_has_no_access_predicate() {
        let registry = KindRegistry::standard().unwrap();
        let query = VersionQuery::new(&registry, &IdentifierNamer::default(), "agent").unwrap();
        let bound = query.query(&AccessScope::Anonymous, 1);
        assert!(!bound.sql.contains("authorized_public"));
        assert!(
            bound.sql.contains("CAST(\"version_1\".\"creation_date\" AS TEXT) AS \"creation_date\"")
        );
    }

    #[test]
    fn unversioned_kinds_are_rejected() {
        let registry = KindRegistry::standard().unwrap();
        let namer = IdentifierNamer::default();
        for kind in ["asset", "derivation", "validation_result", "transaction"] {
            assert_eq!(
                VersionQuery::new(&registry, &namer, kind).unwrap_err(),
                QueryError::NotVersioned(kind.to_string())
            );
        }
    }

    #[test]
    fn decode_splits_values_from_metadata() {
        let registry = KindRegistry::standard().unwrap();
        let query = VersionQuery::new(&registry, &IdentifierNamer::default(), "agent").unwrap();
        let row = Row::new(vec![
            ("id".to_string(), SqlValue::Int(1)),
            ("pref_label".to_string(), SqlValue::from("Jane")),
            ("transaction_id".to_string(), SqlValue::Int(4)),
            ("operation_type".to_string(), SqlValue::Int(1)),
            ("actor_id".to_string(), SqlValue::Null),
            ("issued_at".to_string(), SqlValue::from("2026-01-01 00:00:00")),
        ]);
        let record = query.decode(row).unwrap();
        assert_eq!(record.operation, OperationType::Update);
        assert_eq!(record.transaction_id, TransactionId::new(4));
        assert_eq!(record.actor, None);
        assert_eq!(record.values.columns().len(), 2);
    }
}
