// crates/entitycore-core/src/kinds.rs
// ============================================================================
// Module: Kind Descriptors
// Description: Static, tagged-variant descriptions of persisted entity kinds.
// Purpose: Declare tables, inheritance, ownership, versioning, and search.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! One [`KindDescriptor`] exists per concrete table. Joined-table inheritance
//! is expressed by `base`: a subclass table holds only its own columns and its
//! `id` references the base row. Descriptors are plain `'static` data and are
//! checked when a [`crate::KindRegistry`] is built.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Columns
// ============================================================================

/// Logical column type, rendered per dialect by the synthesizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum ColumnType {
    /// Primary key. Generated on roots, references the base on subclasses.
    Key,
    /// Foreign key to the `id` of the named kind.
    Reference(&'static str),
    /// Boolean flag.
    Bool,
    /// 64-bit integer.
    Int,
    /// Free text.
    Text,
    /// Timestamp defaulting to the write time.
    Timestamp,
    /// Free-text search document maintained by a search-vector trigger.
    SearchDocument,
}

/// Column declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: &'static str,
    /// Logical type.
    pub ty: ColumnType,
    /// Whether NULL is accepted.
    pub nullable: bool,
    /// Whether a UNIQUE constraint applies.
    pub unique: bool,
}

impl ColumnDef {
    /// Declares a NOT NULL column.
    #[must_use]
    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            unique: false,
        }
    }

    /// Declares a nullable column.
    #[must_use]
    pub const fn optional(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            unique: false,
        }
    }

    /// Marks the column unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Returns the referenced kind for foreign-key columns.
    #[must_use]
    pub const fn reference(&self) -> Option<&'static str> {
        match self.ty {
            ColumnType::Reference(target) => Some(target),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Kind Classification
// ============================================================================

/// Role a kind plays in the authorization and audit model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KindRole {
    /// Unprotected reference data (agents, brain regions, species).
    Global,
    /// Protected entity (root or subclass).
    Entity,
    /// Protected activity (root or subclass).
    Activity,
    /// Many-to-many join row; never versioned.
    Association,
    /// Row owned by an entity but not itself an entity (assets).
    Dependent,
    /// Append-only transaction log.
    TransactionLog,
}

impl KindRole {
    /// Returns true for roles carrying authorization columns on their root.
    #[must_use]
    pub const fn is_protected(self) -> bool {
        matches!(self, Self::Entity | Self::Activity)
    }
}

/// Where a kind's own authorization is read from when it writes a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "column", rename_all = "snake_case")]
pub enum Owner {
    /// The kind's own root row, looked up by `id`.
    Itself,
    /// The protected root row referenced by this column.
    Column(&'static str),
    /// No authorization (global reference data, transaction log).
    None,
}

/// Versioning policy for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Versioning {
    /// Maintain a `<kind>_version` shadow table.
    Enabled,
    /// No shadow table.
    Disabled,
    /// Follow the base kind.
    Inherit,
    /// Explicit opt-out from a versioned base.
    Excluded,
}

/// Free-text search column and its ordered source fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchSpec {
    /// Column holding the search document.
    pub column: &'static str,
    /// Text columns concatenated, in order, into the document.
    pub sources: &'static [&'static str],
}

// ============================================================================
// SECTION: Kind Descriptor
// ============================================================================

/// Descriptor for one concrete table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindDescriptor {
    /// Kind (and table) name.
    pub name: &'static str,
    /// Authorization/audit role.
    pub role: KindRole,
    /// Base kind for joined-table inheritance.
    pub base: Option<&'static str>,
    /// Authorization source used by guards.
    pub owner: Owner,
    /// Versioning policy.
    pub versioning: Versioning,
    /// Columns stored in this table (inherited columns live on the base).
    pub columns: &'static [ColumnDef],
    /// Optional free-text search declaration.
    pub search: Option<SearchSpec>,
}

impl KindDescriptor {
    /// Looks up a column declared directly on this table.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns true when the column is declared directly on this table.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}
