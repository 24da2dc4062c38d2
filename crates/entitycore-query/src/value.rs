// crates/entitycore-query/src/value.rs
// ============================================================================
// Module: Bound Values
// Description: Parameter values, bound queries, and decoded result rows.
// Purpose: Carry SQL and its values between builders and executors.
// Dependencies: entitycore-core, serde
// ============================================================================

//! ## Overview
//! Builders never splice values into SQL text. Every value goes through
//! [`Params::push`], which returns a `$N` placeholder; both dialects accept
//! that form. Executors bind [`BoundQuery::params`] by placeholder number and
//! decode result columns into [`Row`]s of [`SqlValue`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::AgentId;
use entitycore_core::EntityId;
use entitycore_core::ProjectId;
use serde::Serialize;

use crate::error::QueryError;

// ============================================================================
// SECTION: Values
// ============================================================================

/// Value bound to a placeholder or decoded from a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Text.
    Text(String),
}

impl SqlValue {
    /// Returns true for NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<EntityId> for SqlValue {
    fn from(value: EntityId) -> Self {
        Self::Int(value.get())
    }
}

impl From<AgentId> for SqlValue {
    fn from(value: AgentId) -> Self {
        Self::Int(value.get())
    }
}

impl From<&ProjectId> for SqlValue {
    fn from(value: &ProjectId) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Ordered placeholder values for one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// Values in placeholder order (`$1` first).
    values: Vec<SqlValue>,
}

impl Params {
    /// Creates an empty parameter list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: Vec::new(),
        }
    }

    /// Appends `value` and returns its placeholder.
    pub fn push(&mut self, value: impl Into<SqlValue>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    /// Returns the number of bound values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Finishes a statement.
    #[must_use]
    pub fn bind(self, sql: String) -> BoundQuery {
        BoundQuery {
            sql,
            params: self.values,
        }
    }
}

/// SQL text with its placeholder values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    /// Statement text using `$N` placeholders.
    pub sql: String,
    /// Values for `$1..=$N`.
    pub params: Vec<SqlValue>,
}

impl BoundQuery {
    /// Builds a statement without parameters.
    #[must_use]
    pub fn unbound(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Decoded result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Row {
    /// `(column name, value)` pairs.
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Builds a row from named values.
    #[must_use]
    pub const fn new(columns: Vec<(String, SqlValue)>) -> Self {
        Self {
            columns,
        }
    }

    /// Returns the columns in select order.
    #[must_use]
    pub fn columns(&self) -> &[(String, SqlValue)] {
        &self.columns
    }

    /// Returns the value of `name`, if selected.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns.iter().find(|(column, _)| column == name).map(|(_, value)| value)
    }

    /// Returns `name` as an integer; NULL and non-integers yield `None`.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            SqlValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns `name` as text.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            SqlValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Returns `name` as a boolean. `SQLite` stores booleans as 0/1.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            SqlValue::Bool(value) => Some(*value),
            SqlValue::Int(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// Returns `name` as a non-null integer.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] when the column is missing or not an
    /// integer.
    pub fn require_int(&self, name: &str) -> Result<i64, QueryError> {
        self.int(name).ok_or_else(|| QueryError::Decode(format!("column {name} is not an integer")))
    }

    /// Returns `name` as non-null text.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] when the column is missing or not text.
    pub fn require_text(&self, name: &str) -> Result<&str, QueryError> {
        self.text(name).ok_or_else(|| QueryError::Decode(format!("column {name} is not text")))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
