// crates/entitycore-query/src/error.rs
// ============================================================================
// Module: Query Errors
// Description: Build-time and decode errors raised by query builders.
// Purpose: Surface facet misconfiguration before any SQL reaches a database.
// Dependencies: entitycore-core, entitycore-synth, thiserror
// ============================================================================

use entitycore_core::RegistryError;
use entitycore_core::StoreError;
use entitycore_synth::SynthError;
use thiserror::Error;

/// Query construction and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Unknown kind or column.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Version-table name could not be produced.
    #[error(transparent)]
    Synth(#[from] SynthError),
    /// Alias was not produced by this select.
    #[error("unknown alias {0}")]
    UnknownAlias(String),
    /// Column exists but cannot be used this way.
    #[error("column {kind}.{column} cannot be used here: {reason}")]
    Column {
        /// Kind holding the column.
        kind: String,
        /// Column name.
        column: String,
        /// Why the column was rejected.
        reason: String,
    },
    /// Facet path does not resolve against the registry.
    #[error("facet {facet} is misconfigured: {reason}")]
    Facet {
        /// Facet name.
        facet: String,
        /// Resolution failure.
        reason: String,
    },
    /// Kind has no version table.
    #[error("kind {0} is not versioned")]
    NotVersioned(String),
    /// Result row did not have the expected shape.
    #[error("query result decode failed: {0}")]
    Decode(String),
}

impl From<QueryError> for StoreError {
    fn from(error: QueryError) -> Self {
        Self::Invalid(error.to_string())
    }
}

/// Builds a [`QueryError::Column`].
pub(crate) fn column_error(kind: &str, column: &str, reason: impl Into<String>) -> QueryError {
    QueryError::Column {
        kind: kind.to_string(),
        column: column.to_string(),
        reason: reason.into(),
    }
}

/// Builds a [`QueryError::Facet`].
pub(crate) fn facet_error(facet: &str, reason: impl Into<String>) -> QueryError {
    QueryError::Facet {
        facet: facet.to_string(),
        reason: reason.into(),
    }
}
