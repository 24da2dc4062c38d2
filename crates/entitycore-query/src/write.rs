// crates/entitycore-query/src/write.rs
// ============================================================================
// Module: Write Transaction
// Description: Registry-checked inserts, updates, and deletes.
// Purpose: Give both stores one write surface inside a logged transaction.
// Dependencies: entitycore-core, entitycore-synth
// ============================================================================

//! ## Overview
//! A [`WriteTx`] wraps an executor that is already inside a database
//! transaction whose transaction-log row has been written. Entity writes
//! fan out over the inheritance chain (root first on insert, leaf first on
//! delete) and maintain the root's bookkeeping columns; plain rows are
//! written to their single table.
//!
//! Authorization columns are never writable through field updates. Changing
//! them requires [`WriteTx::set_authorization`]. Reference checks are left
//! to the synthesized guards, so a rejected write surfaces as
//! [`StoreError::Forbidden`] from the executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::AgentId;
use entitycore_core::Authorization;
use entitycore_core::ColumnType;
use entitycore_core::EntityId;
use entitycore_core::KindDescriptor;
use entitycore_core::KindRegistry;
use entitycore_core::KindRole;
use entitycore_core::PROJECT_COLUMN;
use entitycore_core::PUBLIC_COLUMN;
use entitycore_core::StoreError;
use entitycore_core::TransactionId;
use entitycore_synth::quote_ident;

use crate::error::QueryError;
use crate::error::column_error;
use crate::executor::SqlExecutor;
use crate::value::BoundQuery;
use crate::value::Params;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Root columns maintained by the writer.
pub const MANAGED_ROOT_COLUMNS: &[&str] = &[
    "id",
    "type",
    PUBLIC_COLUMN,
    PROJECT_COLUMN,
    "created_by_id",
    "updated_by_id",
    "creation_date",
    "update_date",
];

// ============================================================================
// SECTION: Write Transaction
// ============================================================================

/// Writes inside one logged database transaction.
pub struct WriteTx<'a, E: SqlExecutor + ?Sized> {
    /// Executor bound to the open transaction.
    executor: &'a mut E,
    /// Registry resolving kinds and columns.
    registry: &'a KindRegistry,
    /// Agent recorded as creator or updater.
    actor: Option<AgentId>,
    /// Transaction-log row of this transaction.
    transaction: TransactionId,
}

impl<'a, E: SqlExecutor + ?Sized> WriteTx<'a, E> {
    /// Wraps an executor already inside a logged transaction.
    pub const fn new(
        executor: &'a mut E,
        registry: &'a KindRegistry,
        actor: Option<AgentId>,
        transaction: TransactionId,
    ) -> Self {
        Self {
            executor,
            registry,
            actor,
            transaction,
        }
    }

    /// Returns the transaction-log id of this transaction.
    #[must_use]
    pub const fn transaction_id(&self) -> TransactionId {
        self.transaction
    }

    /// Returns the acting agent.
    #[must_use]
    pub const fn actor(&self) -> Option<AgentId> {
        self.actor
    }

    /// Returns the underlying executor for reads inside the transaction.
    pub fn executor(&mut self) -> &mut E {
        &mut *self.executor
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    /// Inserts an entity or activity of `kind`; returns its id.
    ///
    /// `values` may name columns of any table in the chain except the
    /// managed root columns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for unknown or managed columns,
    /// [`StoreError::Forbidden`] when a guard rejects a reference, and
    /// [`StoreError::Constraint`] for other constraint failures.
    pub fn insert_entity(
        &mut self,
        kind: &str,
        authorization: &Authorization,
        values: &[(&str, SqlValue)],
    ) -> Result<EntityId, StoreError> {
        let chain = self.protected_chain(kind)?;
        let split = split_values(self.registry, &chain, values)?;
        let Some((root, root_values)) = split.first() else {
            return Err(column_error(kind, "id", "empty chain").into());
        };
        let mut params = Params::new();
        let mut columns =
            vec!["type", PUBLIC_COLUMN, PROJECT_COLUMN, "created_by_id", "updated_by_id"];
        let mut placeholders = vec![
            params.push(chain_leaf(&chain)),
            params.push(authorization.is_public()),
            params.push(authorization.project_id()),
            params.push(self.actor),
            params.push(self.actor),
        ];
        for (column, value) in root_values {
            columns.push(*column);
            placeholders.push(params.push((*value).clone()));
        }
        let sql = insert_sql(root.name, &columns, &placeholders, true);
        let rows = self.executor.query(&params.bind(sql))?;
        let id = rows
            .first()
            .ok_or_else(|| StoreError::Db(format!("insert into {} returned no id", root.name)))?
            .require_int("id")?;

        for (table, table_values) in split.iter().skip(1) {
            let mut params = Params::new();
            let mut columns = vec!["id"];
            let mut placeholders = vec![params.push(id)];
            for (column, value) in table_values {
                columns.push(*column);
                placeholders.push(params.push((*value).clone()));
            }
            let sql = insert_sql(table.name, &columns, &placeholders, false);
            self.executor.execute(&params.bind(sql))?;
        }
        Ok(EntityId::new(id))
    }

    /// Updates fields of entity `id` of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entity of `kind` has `id`,
    /// [`StoreError::Invalid`] for unknown or managed columns, and guard or
    /// constraint errors from the executor.
    pub fn update_entity(
        &mut self,
        kind: &str,
        id: EntityId,
        values: &[(&str, SqlValue)],
    ) -> Result<(), StoreError> {
        let chain = self.protected_chain(kind)?;
        let split = split_values(self.registry, &chain, values)?;
        let leaf = chain_leaf(&chain);
        for (index, (table, table_values)) in split.iter().enumerate() {
            if index > 0 && table_values.is_empty() {
                continue;
            }
            let mut params = Params::new();
            let mut assignments: Vec<String> = table_values
                .iter()
                .map(|(column, value)| {
                    format!("{} = {}", quote_ident(column), params.push((*value).clone()))
                })
                .collect();
            let mut condition = format!("\"id\" = {}", params.push(id.get()));
            if index == 0 {
                assignments.push("\"update_date\" = CURRENT_TIMESTAMP".to_string());
                assignments.push(format!("\"updated_by_id\" = {}", params.push(self.actor)));
                condition.push_str(&format!(" AND \"type\" = {}", params.push(leaf)));
            }
            let query = params.bind(format!(
                "UPDATE {} SET {} WHERE {condition}",
                quote_ident(table.name),
                assignments.join(", ")
            ));
            if self.executor.execute(&query)? == 0 {
                return Err(StoreError::NotFound(format!("{leaf} {}", id.get())));
            }
        }
        Ok(())
    }

    /// Replaces the authorization state of entity `id` of `kind`.
    ///
    /// This is the only write that touches the authorization columns.
    /// Existing references into the entity are not re-checked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entity of `kind` has `id`.
    pub fn set_authorization(
        &mut self,
        kind: &str,
        id: EntityId,
        authorization: &Authorization,
    ) -> Result<(), StoreError> {
        let chain = self.protected_chain(kind)?;
        let root =
            chain.first().ok_or_else(|| StoreError::from(column_error(kind, "id", "empty chain")))?;
        let mut params = Params::new();
        let sql = format!(
            "UPDATE {} SET {} = {}, {} = {}, \"update_date\" = CURRENT_TIMESTAMP, \
             \"updated_by_id\" = {} WHERE \"id\" = {} AND \"type\" = {}",
            quote_ident(root.name),
            quote_ident(PUBLIC_COLUMN),
            params.push(authorization.is_public()),
            quote_ident(PROJECT_COLUMN),
            params.push(authorization.project_id()),
            params.push(self.actor),
            params.push(id.get()),
            params.push(chain_leaf(&chain))
        );
        if self.executor.execute(&params.bind(sql))? == 0 {
            return Err(StoreError::NotFound(format!("{} {}", chain_leaf(&chain), id.get())));
        }
        Ok(())
    }

    /// Deletes entity `id` of `kind` from every table of its chain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no entity of `kind` has `id`
    /// and [`StoreError::Constraint`] when other rows still reference it.
    pub fn delete_entity(&mut self, kind: &str, id: EntityId) -> Result<(), StoreError> {
        let chain = self.protected_chain(kind)?;
        let leaf = chain_leaf(&chain);
        for table in chain.iter().rev() {
            let mut params = Params::new();
            let sql = format!(
                "DELETE FROM {} WHERE \"id\" = {}",
                quote_ident(table.name),
                params.push(id.get())
            );
            if self.executor.execute(&params.bind(sql))? == 0 {
                return Err(StoreError::NotFound(format!("{leaf} {}", id.get())));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Plain rows
    // ------------------------------------------------------------------------

    /// Inserts a row of a global, association, or dependent kind; returns
    /// its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for entity kinds, the transaction
    /// log, and unknown columns; guard and constraint errors otherwise.
    pub fn insert_row(
        &mut self,
        kind: &str,
        values: &[(&str, SqlValue)],
    ) -> Result<i64, StoreError> {
        let descriptor = self.plain_kind(kind)?;
        let mut params = Params::new();
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(plain_column(descriptor, column)?);
            placeholders.push(params.push(value.clone()));
        }
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING \"id\"", quote_ident(descriptor.name))
        } else {
            insert_sql(descriptor.name, &columns, &placeholders, true)
        };
        let rows = self.executor.query(&params.bind(sql))?;
        let row = rows.first().ok_or_else(|| {
            StoreError::Db(format!("insert into {} returned no id", descriptor.name))
        })?;
        Ok(row.require_int("id")?)
    }

    /// Updates fields of row `id` of a plain kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row does not exist and
    /// [`StoreError::Invalid`] for empty or invalid updates.
    pub fn update_row(
        &mut self,
        kind: &str,
        id: i64,
        values: &[(&str, SqlValue)],
    ) -> Result<(), StoreError> {
        let descriptor = self.plain_kind(kind)?;
        if values.is_empty() {
            let message = format!("update of {} sets no columns", descriptor.name);
            return Err(StoreError::Invalid(message));
        }
        let mut params = Params::new();
        let mut assignments = Vec::with_capacity(values.len());
        for (column, value) in values {
            let column = plain_column(descriptor, column)?;
            assignments.push(format!("{} = {}", quote_ident(column), params.push(value.clone())));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = {}",
            quote_ident(descriptor.name),
            assignments.join(", "),
            params.push(id)
        );
        self.expect_one(params.bind(sql), descriptor.name, id)
    }

    /// Deletes row `id` of a plain kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row does not exist.
    pub fn delete_row(&mut self, kind: &str, id: i64) -> Result<(), StoreError> {
        let descriptor = self.plain_kind(kind)?;
        let mut params = Params::new();
        let sql = format!(
            "DELETE FROM {} WHERE \"id\" = {}",
            quote_ident(descriptor.name),
            params.push(id)
        );
        self.expect_one(params.bind(sql), descriptor.name, id)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Resolves the chain of an entity or activity kind.
    fn protected_chain(&self, kind: &str) -> Result<Vec<&'a KindDescriptor>, StoreError> {
        let registry: &'a KindRegistry = self.registry;
        let descriptor = registry.kind(kind).map_err(QueryError::from)?;
        if !descriptor.role.is_protected() {
            let message = format!("{} is not an entity or activity kind", descriptor.name);
            return Err(StoreError::Invalid(message));
        }
        Ok(registry.chain(kind).map_err(QueryError::from)?)
    }

    /// Resolves a kind written as a single plain row.
    fn plain_kind(&self, kind: &str) -> Result<&'a KindDescriptor, StoreError> {
        let registry: &'a KindRegistry = self.registry;
        let descriptor = registry.kind(kind).map_err(QueryError::from)?;
        if descriptor.role.is_protected()
            || descriptor.role == KindRole::TransactionLog
            || descriptor.base.is_some()
        {
            let message = format!("{} cannot be written as a plain row", descriptor.name);
            return Err(StoreError::Invalid(message));
        }
        Ok(descriptor)
    }

    /// Runs a statement that must affect exactly one row.
    fn expect_one(&mut self, query: BoundQuery, table: &str, id: i64) -> Result<(), StoreError> {
        if self.executor.execute(&query)? == 0 {
            return Err(StoreError::NotFound(format!("{table} {id}")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Columns to write per chain table, root first.
type SplitValues<'k, 'v> = Vec<(&'k KindDescriptor, Vec<(&'static str, &'v SqlValue)>)>;

/// Returns the kind name stored in the root `type` column.
fn chain_leaf(chain: &[&KindDescriptor]) -> &'static str {
    chain.last().map_or("", |kind| kind.name)
}

/// Distributes `values` over the chain tables that declare them.
fn split_values<'k, 'v>(
    registry: &KindRegistry,
    chain: &[&'k KindDescriptor],
    values: &'v [(&str, SqlValue)],
) -> Result<SplitValues<'k, 'v>, StoreError> {
    let leaf = chain_leaf(chain);
    let mut split: SplitValues<'k, 'v> = chain.iter().map(|kind| (*kind, Vec::new())).collect();
    for (column, value) in values {
        if MANAGED_ROOT_COLUMNS.contains(column) {
            return Err(column_error(leaf, column, "managed by the store").into());
        }
        let (table, definition) = registry.column(leaf, column).map_err(QueryError::from)?;
        if definition.ty == ColumnType::SearchDocument {
            return Err(column_error(leaf, column, "maintained by trigger").into());
        }
        let slot = split
            .iter_mut()
            .find(|(kind, _)| kind.name == table.name)
            .ok_or_else(|| StoreError::from(column_error(leaf, column, "table not in chain")))?;
        if slot.1.iter().any(|(existing, _)| *existing == definition.name) {
            return Err(column_error(leaf, column, "set twice").into());
        }
        slot.1.push((definition.name, value));
    }
    Ok(split)
}

/// Validates a writable column of a plain kind.
fn plain_column(kind: &KindDescriptor, column: &str) -> Result<&'static str, StoreError> {
    let definition = kind
        .column(column)
        .ok_or_else(|| StoreError::from(column_error(kind.name, column, "unknown column")))?;
    if definition.ty == ColumnType::Key || definition.ty == ColumnType::SearchDocument {
        return Err(column_error(kind.name, column, "not writable").into());
    }
    Ok(definition.name)
}

/// Renders `INSERT INTO table (cols) VALUES (...)`.
fn insert_sql(table: &str, columns: &[&str], placeholders: &[String], returning: bool) -> String {
    let columns: Vec<String> = columns.iter().map(|column| quote_ident(column)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}){}",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", "),
        if returning { " RETURNING \"id\"" } else { "" }
    )
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
    use crate::value::Row;

    /// Records statements and answers inserts with id 41.
    #[derive(Default)]
    struct Recorder {
        statements: Vec<BoundQuery>,
        affected: u64,
    }

    impl SqlExecutor for Recorder {
        fn execute(&mut self, query: &BoundQuery) -> Result<u64, StoreError> {
            self.statements.push(query.clone());
            Ok(self.affected)
        }

        fn query(&mut self, query: &BoundQuery) -> Result<Vec<Row>, StoreError> {
            self.statements.push(query.clone());
            Ok(vec![Row::new(vec![("id".to_string(), SqlValue::Int(41))])])
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            statements: Vec::new(),
            affected: 1,
        }
    }

    #[test]
    fn entity_insert_writes_root_then_subclass() {
        let registry = KindRegistry::standard().unwrap();
        let mut executor = recorder();
        let mut tx =
            WriteTx::new(&mut executor, &registry, Some(AgentId::new(3)), TransactionId::new(1));
        let id = tx
            .insert_entity(
                "emodel",
                &Authorization::private(ProjectId::new("p1")),
                &[
                    ("name", "m".into()),
                    ("description", "d".into()),
                    ("brain_region_id", 5_i64.into()),
                ],
            )
            .unwrap();
        assert_eq!(id, EntityId::new(41));
        assert_eq!(
            executor.statements[0].sql,
            "INSERT INTO \"entity\" (\"type\", \"authorized_public\", \"authorized_project_id\", \
             \"created_by_id\", \"updated_by_id\") VALUES ($1, $2, $3, $4, $5) RETURNING \"id\""
        );
        assert_eq!(
            executor.statements[0].params,
            vec![
                SqlValue::from("emodel"),
                SqlValue::Bool(false),
                SqlValue::from("p1"),
                SqlValue::Int(3),
                SqlValue::Int(3)
            ]
        );
        assert_eq!(
            executor.statements[1].sql,
            "INSERT INTO \"emodel\" (\"id\", \"name\", \"description\", \"brain_region_id\") \
             VALUES ($1, $2, $3, $4)"
        );
        assert_eq!(executor.statements[1].params[0], SqlValue::Int(41));
    }

    #[test]
    fn managed_and_unknown_columns_are_rejected() {
        let registry = KindRegistry::standard().unwrap();
        let mut executor = recorder();
        let mut tx = WriteTx::new(&mut executor, &registry, None, TransactionId::new(1));
        let public = Authorization::public(None);
        assert!(matches!(
            tx.insert_entity("emodel", &public, &[("authorized_public", true.into())]),
            Err(StoreError::Invalid(_))
        ));
        let search_document = [("description_vector", SqlValue::from("x"))];
        assert!(tx.insert_entity("emodel", &public, &search_document).is_err());
        assert!(tx.insert_entity("emodel", &public, &[("bogus", 1_i64.into())]).is_err());
        assert!(tx.insert_entity("asset", &public, &[]).is_err());
        assert!(tx.insert_row("emodel", &[]).is_err());
        assert!(tx.insert_row("transaction", &[]).is_err());
        let managed = [("update_date", SqlValue::from("x"))];
        assert!(tx.update_entity("emodel", EntityId::new(1), &managed).is_err());
        assert!(executor.statements.is_empty());
    }

    #[test]
    fn entity_update_touches_root_bookkeeping() {
        let registry = KindRegistry::standard().unwrap();
        let mut executor = recorder();
        let mut tx =
            WriteTx::new(&mut executor, &registry, Some(AgentId::new(2)), TransactionId::new(1));
        tx.update_entity("emodel", EntityId::new(9), &[("name", "renamed".into())]).unwrap();
        assert_eq!(
            executor.statements[0].sql,
            "UPDATE \"entity\" SET \"update_date\" = CURRENT_TIMESTAMP, \"updated_by_id\" = $2 \
             WHERE \"id\" = $1 AND \"type\" = $3"
        );
        assert_eq!(
            executor.statements[1].sql,
            "UPDATE \"emodel\" SET \"name\" = $1 WHERE \"id\" = $2"
        );
    }

    #[test]
    fn missing_rows_report_not_found() {
        let registry = KindRegistry::standard().unwrap();
        let mut executor = Recorder::default();
        let mut tx = WriteTx::new(&mut executor, &registry, None, TransactionId::new(1));
        assert!(matches!(
            tx.delete_entity("emodel", EntityId::new(1)),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            tx.set_authorization("emodel", EntityId::new(1), &Authorization::public(None)),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(tx.delete_row("asset", 4), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn entity_delete_runs_leaf_first() {
        let registry = KindRegistry::standard().unwrap();
        let mut executor = recorder();
        let mut tx = WriteTx::new(&mut executor, &registry, None, TransactionId::new(1));
        tx.delete_entity("emodel", EntityId::new(9)).unwrap();
        let tables: Vec<&str> =
            executor.statements.iter().map(|query| query.sql.as_str()).collect();
        assert_eq!(
            tables,
            ["DELETE FROM \"emodel\" WHERE \"id\" = $1", "DELETE FROM \"entity\" WHERE \"id\" = $1"]
        );
    }

    #[test]
    fn plain_rows_return_their_id() {
        let registry = KindRegistry::standard().unwrap();
        let mut executor = recorder();
        let mut tx = WriteTx::new(&mut executor, &registry, None, TransactionId::new(1));
        let id = tx
            .insert_row("agent", &[("type", "person".into()), ("pref_label", "Jane".into())])
            .unwrap();
        assert_eq!(id, 41);
        assert!(tx.update_row("agent", id, &[]).is_err());
        tx.update_row("agent", id, &[("pref_label", "J.".into())]).unwrap();
        assert_eq!(
            executor.statements.last().unwrap().sql,
            "UPDATE \"agent\" SET \"pref_label\" = $1 WHERE \"id\" = $2"
        );
    }
}
