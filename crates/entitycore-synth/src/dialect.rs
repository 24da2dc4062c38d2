// crates/entitycore-synth/src/dialect.rs
// ============================================================================
// Module: SQL Dialects
// Description: Identifier quoting and column type rendering per backend.
// Purpose: Keep every dialect difference in one place.
// Dependencies: entitycore-core, serde
// ============================================================================

//! ## Overview
//! Postgres is the production target; `SQLite` is the embedded target used by
//! the embedded store and end-to-end tests. Both share identifier naming,
//! `$N` placeholders, and the guard error message. Only object bodies and
//! column types differ.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::ColumnDef;
use entitycore_core::ColumnType;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Text-search configuration used by Postgres search vectors.
pub const TEXT_SEARCH_CATALOG: &str = "pg_catalog.english";
/// Schema name `SQLite` uses for the main database.
pub const SQLITE_MAIN_SCHEMA: &str = "main";

// ============================================================================
// SECTION: Dialect
// ============================================================================

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// `PostgreSQL` 14 or newer.
    Postgres,
    /// `SQLite` 3.35 or newer.
    Sqlite,
}

impl Dialect {
    /// Returns the backend label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the schema objects are created in.
    #[must_use]
    pub fn object_schema(self, schema: &str) -> &str {
        match self {
            Self::Postgres => schema,
            Self::Sqlite => SQLITE_MAIN_SCHEMA,
        }
    }

    /// Renders a table reference for DDL and trigger bodies.
    ///
    /// Postgres tables are schema-qualified; `SQLite` trigger bodies may not
    /// qualify table names, so tables stay bare.
    #[must_use]
    pub fn table(self, schema: &str, table: &str) -> String {
        match self {
            Self::Postgres => format!("{}.{}", quote_ident(schema), quote_ident(table)),
            Self::Sqlite => quote_ident(table),
        }
    }

    /// Renders the storage type of a column without constraints.
    #[must_use]
    pub const fn storage_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (Self::Postgres, ColumnType::Key | ColumnType::Reference(_) | ColumnType::Int) => {
                "BIGINT"
            }
            (Self::Sqlite, ColumnType::Key | ColumnType::Reference(_) | ColumnType::Int) => {
                "INTEGER"
            }
            (_, ColumnType::Bool) => "BOOLEAN",
            (_, ColumnType::Text)
            | (Self::Sqlite, ColumnType::Timestamp | ColumnType::SearchDocument) => "TEXT",
            (Self::Postgres, ColumnType::Timestamp) => "TIMESTAMPTZ",
            (Self::Postgres, ColumnType::SearchDocument) => "TSVECTOR",
        }
    }

    /// Renders the full column definition used by `CREATE TABLE`.
    ///
    /// `base` is the base table for subclass keys.
    #[must_use]
    pub fn column_definition(self, schema: &str, column: &ColumnDef, base: Option<&str>) -> String {
        let name = quote_ident(column.name);
        match (column.ty, base) {
            (ColumnType::Key, None) => match self {
                Self::Postgres => format!("{name} BIGSERIAL PRIMARY KEY"),
                Self::Sqlite => format!("{name} INTEGER PRIMARY KEY"),
            },
            (ColumnType::Key, Some(base)) => format!(
                "{name} {} PRIMARY KEY REFERENCES {} (\"id\")",
                self.storage_type(column.ty),
                self.table(schema, base)
            ),
            (ty, _) => {
                let mut out = format!("{name} {}", self.storage_type(ty));
                if !column.nullable {
                    out.push_str(" NOT NULL");
                }
                if column.unique {
                    out.push_str(" UNIQUE");
                }
                if ty == ColumnType::Timestamp {
                    out.push_str(match self {
                        Self::Postgres => " DEFAULT now()",
                        Self::Sqlite => " DEFAULT CURRENT_TIMESTAMP",
                    });
                }
                if let ColumnType::Reference(target) = ty {
                    out.push_str(&format!(" REFERENCES {} (\"id\")", self.table(schema, target)));
                }
                out
            }
        }
    }
}

// ============================================================================
// SECTION: Quoting
// ============================================================================

/// Double-quotes an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quotes a string literal, doubling embedded quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
