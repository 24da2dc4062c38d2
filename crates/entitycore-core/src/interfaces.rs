// crates/entitycore-core/src/interfaces.rs
// ============================================================================
// Module: Store Interfaces
// Description: Backend-agnostic store errors and write intent.
// Purpose: Give every backend one typed error surface for callers.
// Dependencies: crate::{authorization, identifiers}, thiserror
// ============================================================================

//! ## Overview
//! Guard violations are reported as [`StoreError::Forbidden`], distinct from
//! generic constraint failures, so the calling layer can translate them into
//! a "forbidden" response without inspecting database messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::authorization::Authorization;
use crate::authorization::GuardViolation;
use crate::identifiers::AgentId;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Entity store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A guard rejected a cross-tenant private reference.
    #[error("unauthorized private reference: {table}.{field}")]
    Forbidden {
        /// Table whose write was rejected.
        table: String,
        /// Offending foreign-key field.
        field: String,
    },
    /// Uniqueness, foreign-key, check, or append-only violation.
    #[error("entity store constraint violation: {0}")]
    Constraint(String),
    /// Requested row does not exist or is not visible.
    #[error("entity store row not found: {0}")]
    NotFound(String),
    /// Caller supplied invalid input.
    #[error("entity store invalid input: {0}")]
    Invalid(String),
    /// Another migration holds the schema lock.
    #[error("entity store schema locked: {0}")]
    Locked(String),
    /// Filesystem or connection I/O error.
    #[error("entity store io error: {0}")]
    Io(String),
    /// Database reported an error.
    #[error("entity store error: {0}")]
    Db(String),
}

impl StoreError {
    /// Returns the guard violation carried by this error, if any.
    #[must_use]
    pub fn guard_violation(&self) -> Option<GuardViolation> {
        match self {
            Self::Forbidden {
                table,
                field,
            } => Some(GuardViolation {
                table: table.clone(),
                field: field.clone(),
            }),
            _ => None,
        }
    }
}

impl From<GuardViolation> for StoreError {
    fn from(violation: GuardViolation) -> Self {
        Self::Forbidden {
            table: violation.table,
            field: violation.field,
        }
    }
}

// ============================================================================
// SECTION: Write Intent
// ============================================================================

/// Caller-supplied intent accompanying every entity creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteIntent {
    /// Agent issuing the write, recorded as creator/updater.
    pub actor: Option<AgentId>,
    /// Authorization state of the new row.
    pub authorization: Authorization,
}

impl WriteIntent {
    /// Creates a write intent.
    #[must_use]
    pub const fn new(actor: Option<AgentId>, authorization: Authorization) -> Self {
        Self {
            actor,
            authorization,
        }
    }
}
