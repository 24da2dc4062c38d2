// crates/entitycore-store-postgres/src/session.rs
// ============================================================================
// Module: Postgres Session
// Description: SqlExecutor over one open Postgres transaction.
// Purpose: Run bound queries and classify server errors.
// Dependencies: entitycore-core, entitycore-query, entitycore-synth, postgres
// ============================================================================

//! ## Overview
//! Every store call runs inside a transaction: writes so the transaction
//! log row, guarded inserts, and version rows commit together; reads so all
//! facet queries see one snapshot.

use entitycore_core::GuardViolation;
use entitycore_core::StoreError;
use entitycore_query::BoundQuery;
use entitycore_query::Row;
use entitycore_query::SqlExecutor;
use entitycore_synth::APPEND_ONLY_MESSAGE_PREFIX;
use postgres::Transaction;
use postgres::error::SqlState;
use postgres_types::ToSql;

use crate::value::PgValue;
use crate::value::decode_row;

// ============================================================================
// SECTION: Session
// ============================================================================

/// Executor owning an open transaction.
pub struct PostgresSession<'c> {
    /// Transaction every statement runs in.
    transaction: Transaction<'c>,
}

impl<'c> PostgresSession<'c> {
    /// Wraps an open transaction.
    #[must_use]
    pub fn new(transaction: Transaction<'c>) -> Self {
        Self {
            transaction,
        }
    }

    /// Commits the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails.
    pub fn commit(self) -> Result<(), StoreError> {
        self.transaction.commit().map_err(map_postgres_error)
    }

    /// Runs `sql` (possibly several statements) without parameters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any statement fails.
    pub fn batch(&mut self, sql: &str) -> Result<(), StoreError> {
        self.transaction.batch_execute(sql).map_err(map_postgres_error)
    }
}

/// Wraps bound values for the driver.
fn wire_values(query: &BoundQuery) -> Vec<PgValue<'_>> {
    query.params.iter().map(PgValue).collect()
}

impl SqlExecutor for PostgresSession<'_> {
    fn execute(&mut self, query: &BoundQuery) -> Result<u64, StoreError> {
        let values = wire_values(query);
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|value| value as &(dyn ToSql + Sync)).collect();
        self.transaction.execute(query.sql.as_str(), &params).map_err(map_postgres_error)
    }

    fn query(&mut self, query: &BoundQuery) -> Result<Vec<Row>, StoreError> {
        let values = wire_values(query);
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|value| value as &(dyn ToSql + Sync)).collect();
        let rows = self.transaction.query(query.sql.as_str(), &params).map_err(map_postgres_error)?;
        rows.iter().map(decode_row).collect()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Classifies a driver error.
#[must_use]
pub fn map_postgres_error(error: postgres::Error) -> StoreError {
    if let Some(db) = error.as_db_error() {
        return classify(Some(db.code()), db.message());
    }
    if error.is_closed() {
        return StoreError::Io(error.to_string());
    }
    classify(error.code(), &error.to_string())
}

/// Maps a SQLSTATE and server message onto [`StoreError`].
#[must_use]
pub fn classify(code: Option<&SqlState>, message: &str) -> StoreError {
    if let Some(violation) = GuardViolation::parse(message) {
        return violation.into();
    }
    let Some(code) = code else {
        return StoreError::Io(message.to_string());
    };
    if message.starts_with(APPEND_ONLY_MESSAGE_PREFIX) {
        return StoreError::Constraint(message.to_string());
    }
    if [
        SqlState::UNIQUE_VIOLATION,
        SqlState::FOREIGN_KEY_VIOLATION,
        SqlState::CHECK_VIOLATION,
        SqlState::NOT_NULL_VIOLATION,
        SqlState::EXCLUSION_VIOLATION,
    ]
    .contains(code)
    {
        return StoreError::Constraint(message.to_string());
    }
    if *code == SqlState::LOCK_NOT_AVAILABLE {
        return StoreError::Locked(message.to_string());
    }
    StoreError::Db(format!("{}: {message}", code.code()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use entitycore_core::GUARD_ERROR_CODE;
    use entitycore_synth::APPEND_ONLY_ERROR_CODE;

    use super::*;

    #[test]
    fn guard_messages_become_forbidden() {
        let code = SqlState::from_code(GUARD_ERROR_CODE);
        assert_eq!(code, SqlState::INSUFFICIENT_PRIVILEGE);
        assert_eq!(
            classify(Some(&code), "unauthorized private reference: memodel.emodel_id"),
            StoreError::Forbidden {
                table: "memodel".to_string(),
                field: "emodel_id".to_string(),
            }
        );
    }

    #[test]
    fn other_privilege_errors_are_not_guard_violations() {
        let error =
            classify(Some(&SqlState::INSUFFICIENT_PRIVILEGE), "permission denied for table emodel");
        assert!(matches!(error, StoreError::Db(message) if message.starts_with("42501")));
    }

    #[test]
    fn append_only_and_integrity_errors_become_constraint() {
        let code = SqlState::from_code(APPEND_ONLY_ERROR_CODE);
        assert!(matches!(
            classify(Some(&code), "append-only audit table: transaction"),
            StoreError::Constraint(_)
        ));
        assert!(matches!(
            classify(
                Some(&SqlState::UNIQUE_VIOLATION),
                "duplicate key value violates unique constraint"
            ),
            StoreError::Constraint(_)
        ));
        assert!(matches!(
            classify(Some(&SqlState::CHECK_VIOLATION), "new row violates check constraint"),
            StoreError::Constraint(_)
        ));
    }

    #[test]
    fn lock_timeouts_and_transport_errors() {
        assert!(matches!(
            classify(
                Some(&SqlState::LOCK_NOT_AVAILABLE),
                "canceling statement due to lock timeout"
            ),
            StoreError::Locked(_)
        ));
        assert!(matches!(classify(None, "connection reset"), StoreError::Io(_)));
    }
}
