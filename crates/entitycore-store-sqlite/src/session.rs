// crates/entitycore-store-sqlite/src/session.rs
// ============================================================================
// Module: SQLite Session
// Description: SqlExecutor over a borrowed rusqlite connection.
// Purpose: Bind `$N` placeholders, decode rows, and classify engine errors.
// Dependencies: entitycore-core, entitycore-query, entitycore-synth, rusqlite
// ============================================================================

//! ## Overview
//! `SQLite` reads `$1` as a named parameter, and parameter indexes follow the
//! order names first appear in the statement text, not their numbers. Values
//! are therefore bound by looking up each `$N` name, never by position.
//!
//! Engine errors are classified once here: guard aborts become
//! [`StoreError::Forbidden`], append-only aborts and constraint failures
//! become [`StoreError::Constraint`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::GuardViolation;
use entitycore_core::StoreError;
use entitycore_query::BoundQuery;
use entitycore_query::Row;
use entitycore_query::SqlExecutor;
use entitycore_query::SqlValue;
use entitycore_synth::APPEND_ONLY_MESSAGE_PREFIX;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::Statement;
use rusqlite::types::Null;
use rusqlite::types::ValueRef;

// ============================================================================
// SECTION: Session
// ============================================================================

/// Executor over a connection or an open transaction.
pub struct SqliteSession<'c> {
    /// Borrowed connection; transactions deref to it.
    connection: &'c Connection,
}

impl<'c> SqliteSession<'c> {
    /// Wraps a connection.
    #[must_use]
    pub const fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
        }
    }

    /// Prepares `query` and binds its parameters.
    fn prepare(&self, query: &BoundQuery) -> Result<Statement<'c>, StoreError> {
        let mut statement = self.connection.prepare(&query.sql).map_err(map_sqlite_error)?;
        if statement.parameter_count() != query.params.len() {
            return Err(StoreError::Invalid(format!(
                "statement expects {} parameters, {} bound",
                statement.parameter_count(),
                query.params.len()
            )));
        }
        for (index, value) in query.params.iter().enumerate() {
            let name = format!("${}", index + 1);
            let position = statement
                .parameter_index(&name)
                .map_err(map_sqlite_error)?
                .ok_or_else(|| StoreError::Invalid(format!("placeholder {name} is not used")))?;
            let bound = match value {
                SqlValue::Null => statement.raw_bind_parameter(position, Null),
                SqlValue::Bool(value) => statement.raw_bind_parameter(position, *value),
                SqlValue::Int(value) => statement.raw_bind_parameter(position, *value),
                SqlValue::Text(value) => statement.raw_bind_parameter(position, value.as_str()),
            };
            bound.map_err(map_sqlite_error)?;
        }
        Ok(statement)
    }
}

impl SqlExecutor for SqliteSession<'_> {
    fn execute(&mut self, query: &BoundQuery) -> Result<u64, StoreError> {
        let mut statement = self.prepare(query)?;
        let changed = statement.raw_execute().map_err(map_sqlite_error)?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn query(&mut self, query: &BoundQuery) -> Result<Vec<Row>, StoreError> {
        let mut statement = self.prepare(query)?;
        let names: Vec<String> = statement.column_names().into_iter().map(str::to_string).collect();
        let mut rows = statement.raw_query();
        let mut decoded = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            let mut columns = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                let value = row.get_ref(index).map_err(map_sqlite_error)?;
                columns.push((name.clone(), decode_value(name, value)?));
            }
            decoded.push(Row::new(columns));
        }
        Ok(decoded)
    }
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Converts one `SQLite` value.
fn decode_value(column: &str, value: ValueRef<'_>) -> Result<SqlValue, StoreError> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(value) => Ok(SqlValue::Int(value)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| SqlValue::Text(text.to_string()))
            .map_err(|_| StoreError::Db(format!("column {column} is not valid utf-8"))),
        ValueRef::Real(_) | ValueRef::Blob(_) => {
            Err(StoreError::Db(format!("column {column} has an unsupported storage class")))
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Classifies a rusqlite error.
pub fn map_sqlite_error(error: rusqlite::Error) -> StoreError {
    let message = error.to_string();
    if let Some(violation) = GuardViolation::parse(&message) {
        return violation.into();
    }
    if message.contains(APPEND_ONLY_MESSAGE_PREFIX) {
        return StoreError::Constraint(message);
    }
    match error.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Constraint(message),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Locked(message),
        Some(ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::DiskFull) => {
            StoreError::Io(message)
        }
        _ => StoreError::Db(message),
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

    use entitycore_query::Params;

    use super::*;

    #[test]
    fn placeholders_bind_by_name_not_position() {
        let connection = Connection::open_in_memory().unwrap();
        let mut session = SqliteSession::new(&connection);
        let mut params = Params::new();
        let first = params.push("a");
        let second = params.push(2_i64);
        let sql = format!("SELECT {second} AS \"n\", {first} AS \"s\", {first} AS \"again\"");
        let query = params.bind(sql);
        let rows = session.query(&query).unwrap();
        assert_eq!(rows[0].int("n"), Some(2));
        assert_eq!(rows[0].text("s"), Some("a"));
        assert_eq!(rows[0].text("again"), Some("a"));
    }

    #[test]
    fn parameter_count_mismatch_is_invalid() {
        let connection = Connection::open_in_memory().unwrap();
        let mut session = SqliteSession::new(&connection);
        let query = BoundQuery {
            sql: "SELECT $1".to_string(),
            params: Vec::new(),
        };
        assert!(matches!(session.query(&query), Err(StoreError::Invalid(_))));
    }

    fn engine_failure(message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some(message.to_string()),
        )
    }

    #[test]
    fn guard_aborts_map_to_forbidden() {
        let error = engine_failure("unauthorized private reference: memodel.emodel_id");
        assert_eq!(
            map_sqlite_error(error),
            StoreError::Forbidden {
                table: "memodel".to_string(),
                field: "emodel_id".to_string(),
            }
        );
    }

    #[test]
    fn append_only_and_constraint_failures_map_to_constraint() {
        let error = engine_failure("append-only audit table: transaction");
        assert!(matches!(map_sqlite_error(error), StoreError::Constraint(_)));
        let error = engine_failure("UNIQUE constraint failed: species.name");
        assert!(matches!(map_sqlite_error(error), StoreError::Constraint(_)));
    }
}
