// crates/entitycore-synth/src/schema.rs
// ============================================================================
// Module: Table DDL
// Description: CREATE TABLE / INDEX statements for kinds and version tables.
// Purpose: Derive the physical schema from kind descriptors alone.
// Dependencies: entitycore-core
// ============================================================================

//! ## Overview
//! Every kind becomes one table. Protected roots carry a `CHECK` enforcing
//! the authorization invariant (public, or owned by a project). Versioned
//! kinds get a `<kind>_version` shadow table holding the same columns with
//! no constraints, plus `transaction_id` and `operation_type`, keyed by
//! `(id, transaction_id)`. All statements use `IF NOT EXISTS` so the bundle
//! can be re-applied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::ColumnType;
use entitycore_core::IdentifierNamer;
use entitycore_core::KindDescriptor;
use entitycore_core::KindRegistry;
use entitycore_core::PROJECT_COLUMN;
use entitycore_core::PUBLIC_COLUMN;

use crate::dialect::Dialect;
use crate::dialect::quote_ident;
use crate::error::SynthError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Version-table column holding the transaction log id.
pub const TRANSACTION_ID_COLUMN: &str = "transaction_id";
/// Version-table column holding the operation code.
pub const OPERATION_TYPE_COLUMN: &str = "operation_type";

/// Operation recorded in a version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OperationType {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted; the version row holds the pre-delete values.
    Delete,
}

impl OperationType {
    /// Returns the stored operation code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Insert => 0,
            Self::Update => 1,
            Self::Delete => 2,
        }
    }

    /// Decodes a stored operation code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Insert),
            1 => Some(Self::Update),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Names
// ============================================================================

/// Returns the shadow table name for `kind`.
///
/// # Errors
///
/// Returns [`SynthError::Naming`] when the name cannot be produced.
pub fn version_table_name(namer: &IdentifierNamer, kind: &str) -> Result<String, SynthError> {
    Ok(namer.name(&format!("{kind}_version"))?)
}

/// Returns the index name for `table.column`.
fn index_name(namer: &IdentifierNamer, table: &str, column: &str) -> Result<String, SynthError> {
    Ok(namer.name(&format!("ix_{table}_{column}"))?)
}

// ============================================================================
// SECTION: Statements
// ============================================================================

/// Renders `CREATE TABLE` and index statements for every kind.
///
/// # Errors
///
/// Returns [`SynthError`] when an index name cannot be produced.
pub fn table_statements(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<String>, SynthError> {
    let mut statements = Vec::new();
    if dialect == Dialect::Postgres {
        statements.push(format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)));
    }
    for kind in registry.kinds() {
        statements.push(create_table(kind, dialect, schema));
        statements.extend(kind_indexes(kind, dialect, schema, namer)?);
    }
    Ok(statements)
}

/// Renders shadow tables for every versioned kind.
///
/// # Errors
///
/// Returns [`SynthError`] when a table or index name cannot be produced or
/// no transaction log kind is declared.
pub fn version_table_statements(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<String>, SynthError> {
    let versioned = registry.versioned_kinds();
    if versioned.is_empty() {
        return Ok(Vec::new());
    }
    let log = registry.transaction_log().ok_or(SynthError::MissingTransactionLog)?;
    let mut statements = Vec::with_capacity(versioned.len() * 2);
    for kind in versioned {
        let table = version_table_name(namer, kind.name)?;
        let mut lines: Vec<String> = kind
            .columns
            .iter()
            .map(|column| {
                format!("{} {}", quote_ident(column.name), dialect.storage_type(column.ty))
            })
            .collect();
        lines.push(format!(
            "{} {} NOT NULL REFERENCES {} (\"id\")",
            quote_ident(TRANSACTION_ID_COLUMN),
            dialect.storage_type(ColumnType::Int),
            dialect.table(schema, log.name)
        ));
        lines.push(format!("{} SMALLINT NOT NULL", quote_ident(OPERATION_TYPE_COLUMN)));
        lines.push(format!("PRIMARY KEY (\"id\", {})", quote_ident(TRANSACTION_ID_COLUMN)));
        statements.push(render_create_table(&dialect.table(schema, &table), &lines));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&index_name(namer, &table, TRANSACTION_ID_COLUMN)?),
            dialect.table(schema, &table),
            quote_ident(TRANSACTION_ID_COLUMN)
        ));
    }
    Ok(statements)
}

/// Renders `CREATE TABLE` for one kind.
fn create_table(kind: &KindDescriptor, dialect: Dialect, schema: &str) -> String {
    let mut lines: Vec<String> = kind
        .columns
        .iter()
        .map(|column| dialect.column_definition(schema, column, kind.base))
        .collect();
    if kind.base.is_none() && kind.role.is_protected() {
        lines.push(format!(
            "CHECK ({} OR {} IS NOT NULL)",
            quote_ident(PUBLIC_COLUMN),
            quote_ident(PROJECT_COLUMN)
        ));
    }
    render_create_table(&dialect.table(schema, kind.name), &lines)
}

/// Renders indexes for foreign keys, owning projects, and search documents.
fn kind_indexes(
    kind: &KindDescriptor,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<String>, SynthError> {
    let table = dialect.table(schema, kind.name);
    let mut statements = Vec::new();
    for column in kind.columns {
        let indexed = (column.reference().is_some() && column.name != "id" && !column.unique)
            || column.name == PROJECT_COLUMN;
        if indexed {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
                quote_ident(&index_name(namer, kind.name, column.name)?),
                quote_ident(column.name)
            ));
        }
    }
    if let (Dialect::Postgres, Some(search)) = (dialect, kind.search) {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} USING GIN ({})",
            quote_ident(&index_name(namer, kind.name, search.column)?),
            quote_ident(search.column)
        ));
    }
    Ok(statements)
}

/// Joins column lines into a `CREATE TABLE IF NOT EXISTS` statement.
fn render_create_table(table: &str, lines: &[String]) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} (\n    {}\n)", lines.join(",\n    "))
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

    use super::*;

    #[test]
    fn protected_roots_carry_authorization_check() {
        let registry = KindRegistry::standard().unwrap();
        let statements =
            table_statements(&registry, Dialect::Sqlite, "public", &IdentifierNamer::default())
                .unwrap();
        let entity = statements
            .iter()
            .find(|statement| statement.starts_with("CREATE TABLE IF NOT EXISTS \"entity\""))
            .unwrap();
        let check = "CHECK (\"authorized_public\" OR \"authorized_project_id\" IS NOT NULL)";
        assert!(entity.contains(check));
        let emodel = statements
            .iter()
            .find(|statement| statement.starts_with("CREATE TABLE IF NOT EXISTS \"emodel\""))
            .unwrap();
        assert!(!emodel.contains("CHECK"));
        assert!(emodel.contains("\"id\" INTEGER PRIMARY KEY REFERENCES \"entity\" (\"id\")"));
    }

    #[test]
    fn version_tables_are_unconstrained_copies() {
        let registry = KindRegistry::standard().unwrap();
        let statements = version_table_statements(
            &registry,
            Dialect::Postgres,
            "public",
            &IdentifierNamer::default(),
        )
        .unwrap();
        let entity = statements
            .iter()
            .find(|statement| statement.contains("\"public\".\"entity_version\" ("))
            .unwrap();
        assert!(entity.contains("\"authorized_public\" BOOLEAN,"));
        let transaction =
            "\"transaction_id\" BIGINT NOT NULL REFERENCES \"public\".\"transaction\"";
        assert!(entity.contains(transaction));
        assert!(entity.contains("\"operation_type\" SMALLINT NOT NULL"));
        assert!(entity.contains("PRIMARY KEY (\"id\", \"transaction_id\")"));
        assert!(!entity.contains("UNIQUE"));
    }

    #[test]
    fn operation_codes_roundtrip() {
        for op in [OperationType::Insert, OperationType::Update, OperationType::Delete] {
            assert_eq!(OperationType::from_code(op.code()), Some(op));
        }
        assert_eq!(OperationType::from_code(7), None);
    }
}
