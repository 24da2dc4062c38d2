// crates/entitycore-core/src/authorization.rs
// ============================================================================
// Module: Authorization Model
// Description: Two-predicate authorization state (public flag, owning project).
// Purpose: State the read and reference rules once, in Rust, for every layer.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every protected row is either public or private to exactly one project.
//! Reads see a row when it is public or owned by the caller's project; a row
//! may reference another protected row only when the target is public or both
//! are private to the same project. The synthesized guard triggers enforce the
//! reference rule in the database; [`Authorization::check_reference`] is the
//! same rule for callers that want to pre-validate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::identifiers::ProjectId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Column carrying the public flag on protected roots.
pub const PUBLIC_COLUMN: &str = "authorized_public";
/// Column carrying the owning project on protected roots.
pub const PROJECT_COLUMN: &str = "authorized_project_id";
/// SQLSTATE raised by guard triggers (Postgres "insufficient privilege").
pub const GUARD_ERROR_CODE: &str = "42501";
/// Message prefix raised by guard triggers, followed by `<table>.<field>`.
pub const GUARD_MESSAGE_PREFIX: &str = "unauthorized private reference: ";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when constructing authorization state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// Private rows must name an owning project.
    #[error("private rows require authorized_project_id")]
    MissingProject,
}

// ============================================================================
// SECTION: Authorization State
// ============================================================================

/// Authorization state of a protected row.
///
/// # Invariants
/// - `public` is true or `project_id` is set; never both unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Visible to every caller when true.
    public: bool,
    /// Owning project; required when private.
    project_id: Option<ProjectId>,
}

impl Authorization {
    /// Builds a public authorization, optionally recording the owning project.
    #[must_use]
    pub const fn public(owner: Option<ProjectId>) -> Self {
        Self {
            public: true,
            project_id: owner,
        }
    }

    /// Builds a private authorization owned by `project_id`.
    #[must_use]
    pub const fn private(project_id: ProjectId) -> Self {
        Self {
            public: false,
            project_id: Some(project_id),
        }
    }

    /// Rebuilds authorization from stored column values.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationError::MissingProject`] when the row is private
    /// without an owning project.
    pub fn from_columns(
        public: bool,
        project_id: Option<ProjectId>,
    ) -> Result<Self, AuthorizationError> {
        if !public && project_id.is_none() {
            return Err(AuthorizationError::MissingProject);
        }
        Ok(Self {
            public,
            project_id,
        })
    }

    /// Returns true when the row is public.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        self.public
    }

    /// Returns the owning project, if any.
    #[must_use]
    pub const fn project_id(&self) -> Option<&ProjectId> {
        self.project_id.as_ref()
    }

    /// Returns true when a caller in `scope` may read the row.
    #[must_use]
    pub fn is_visible_to(&self, scope: &AccessScope) -> bool {
        if self.public {
            return true;
        }
        match scope {
            AccessScope::Anonymous => false,
            AccessScope::Project(project) => self.project_id.as_ref() == Some(project),
        }
    }

    /// Returns true when a row with this authorization may reference a row
    /// with `referenced` authorization.
    #[must_use]
    pub fn check_reference(&self, referenced: &Self) -> bool {
        if referenced.public {
            return true;
        }
        !self.public && self.project_id.is_some() && self.project_id == referenced.project_id
    }
}

// ============================================================================
// SECTION: Access Scope
// ============================================================================

/// Caller scope supplied with every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    /// No tenant: only public rows are visible.
    Anonymous,
    /// Caller acting within a project.
    Project(ProjectId),
}

impl AccessScope {
    /// Builds a scope from an optional project.
    #[must_use]
    pub fn from_project(project_id: Option<ProjectId>) -> Self {
        project_id.map_or(Self::Anonymous, Self::Project)
    }
}

// ============================================================================
// SECTION: Guard Violation
// ============================================================================

/// Guard violation decoded from a database error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardViolation {
    /// Table whose write was rejected.
    pub table: String,
    /// Foreign-key field that referenced an inaccessible row.
    pub field: String,
}

impl GuardViolation {
    /// Renders the stable error message raised by guard triggers.
    #[must_use]
    pub fn message(table: &str, field: &str) -> String {
        format!("{GUARD_MESSAGE_PREFIX}{table}.{field}")
    }

    /// Parses a database error message produced by a guard trigger.
    ///
    /// Returns `None` when the message is not a guard violation.
    #[must_use]
    pub fn parse(message: &str) -> Option<Self> {
        let start = message.find(GUARD_MESSAGE_PREFIX)?;
        let rest = &message[start + GUARD_MESSAGE_PREFIX.len()..];
        let target = rest.split_whitespace().next()?;
        let (table, field) = target.split_once('.')?;
        if table.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self {
            table: table.to_string(),
            field: field.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
