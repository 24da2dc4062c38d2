// crates/entitycore-query/src/executor.rs
// ============================================================================
// Module: SQL Executor Seam
// Description: Backend-neutral execution of bound queries.
// Purpose: Let builders run against SQLite or Postgres without knowing which.
// Dependencies: entitycore-core
// ============================================================================

//! ## Overview
//! Store crates implement [`SqlExecutor`] over a connection or an open
//! transaction. Placeholders are `$1..$n` in both dialects and values arrive
//! as [`crate::SqlValue`]; implementations own the conversion and map driver
//! errors into [`StoreError`].

use entitycore_core::StoreError;

use crate::value::BoundQuery;
use crate::value::Row;

/// Runs bound statements against one backend session.
pub trait SqlExecutor {
    /// Executes a statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend rejects the statement.
    fn execute(&mut self, query: &BoundQuery) -> Result<u64, StoreError>;

    /// Runs a query and returns every row, columns named by their labels.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend rejects the query or a value
    /// cannot be decoded.
    fn query(&mut self, query: &BoundQuery) -> Result<Vec<Row>, StoreError>;
}

impl<E: SqlExecutor + ?Sized> SqlExecutor for &mut E {
    fn execute(&mut self, query: &BoundQuery) -> Result<u64, StoreError> {
        (**self).execute(query)
    }

    fn query(&mut self, query: &BoundQuery) -> Result<Vec<Row>, StoreError> {
        (**self).query(query)
    }
}
