// crates/entitycore-core/src/registry.rs
// ============================================================================
// Module: Kind Registry
// Description: Immutable, validated registry of kinds and guarded references.
// Purpose: Thread one checked view of the schema through synthesis and queries.
// Dependencies: crate::kinds, crate::catalog, thiserror
// ============================================================================

//! ## Overview
//! [`KindRegistry::new`] validates static descriptors and the relationship
//! table once; every later lookup is infallible for names that came from the
//! registry itself. Names supplied by callers are checked against the
//! registry, so only allow-listed identifiers ever reach generated SQL.
//!
//! The registry also derives, from column declarations alone, the set of
//! foreign keys that must be guarded ([`KindRegistry::protected_foreign_keys`])
//! and the set of versioned kinds ([`KindRegistry::versioned_kinds`]), which
//! completeness tests compare against the live schema.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::authorization::PROJECT_COLUMN;
use crate::authorization::PUBLIC_COLUMN;
use crate::catalog::STANDARD_KINDS;
use crate::catalog::STANDARD_RELATIONSHIPS;
use crate::kinds::ColumnDef;
use crate::kinds::ColumnType;
use crate::kinds::KindDescriptor;
use crate::kinds::KindRole;
use crate::kinds::Owner;
use crate::kinds::Versioning;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Build-time registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Kind name is not declared.
    #[error("unknown kind: {0}")]
    UnknownKind(String),
    /// Field is not declared on the kind or its bases.
    #[error("unknown field: {kind}.{field}")]
    UnknownField {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },
    /// Kind declared twice.
    #[error("duplicate kind: {0}")]
    DuplicateKind(String),
    /// Relationship declared twice.
    #[error("duplicate relationship: {kind}.{field}")]
    DuplicateRelationship {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },
    /// Field is not a foreign key.
    #[error("{kind}.{field} is not a foreign key")]
    NotAForeignKey {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },
    /// Field references an unprotected kind.
    #[error("{kind}.{field} does not reference a protected kind")]
    UnprotectedTarget {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },
    /// Descriptor is internally inconsistent.
    #[error("invalid kind {kind}: {reason}")]
    InvalidKind {
        /// Kind name.
        kind: String,
        /// Human-readable reason.
        reason: String,
    },
}

/// Builds an [`RegistryError::InvalidKind`].
fn invalid(kind: &str, reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidKind {
        kind: kind.to_string(),
        reason: reason.into(),
    }
}

// ============================================================================
// SECTION: Relationship Entries
// ============================================================================

/// Declared guarded foreign key `(kind, field)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RelationshipEntry {
    /// Kind whose table holds the foreign key.
    pub kind: &'static str,
    /// Foreign-key column.
    pub field: &'static str,
}

impl RelationshipEntry {
    /// Declares a guarded relationship.
    #[must_use]
    pub const fn new(kind: &'static str, field: &'static str) -> Self {
        Self {
            kind,
            field,
        }
    }
}

/// Root row that carries the authorization used by a guard lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorizationSource {
    /// Protected root table holding the authorization columns.
    pub root: &'static str,
    /// Column on the writing table whose value is the root row id.
    pub column: &'static str,
}

/// Fully resolved guarded reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardedReference {
    /// Kind whose table holds the foreign key.
    pub kind: &'static str,
    /// Foreign-key column.
    pub field: &'static str,
    /// Whether the field accepts NULL.
    pub nullable: bool,
    /// Kind named by the foreign key.
    pub target: &'static str,
    /// Protected root of the target kind.
    pub target_root: &'static str,
    /// Authorization source of the writing row.
    pub owner: AuthorizationSource,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Immutable registry of kinds and guarded relationships.
#[derive(Debug, Clone)]
pub struct KindRegistry {
    /// Kinds in declaration (dependency) order.
    kinds: Vec<KindDescriptor>,
    /// Kind index by name.
    index: BTreeMap<&'static str, usize>,
    /// Resolved guarded references in declaration order.
    relationships: Vec<GuardedReference>,
}

impl KindRegistry {
    /// Builds the registry for the standard catalog.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the catalog is inconsistent.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new(STANDARD_KINDS, STANDARD_RELATIONSHIPS)
    }

    /// Builds and validates a registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when a descriptor or relationship is invalid.
    pub fn new(
        kinds: &[KindDescriptor],
        relationships: &[RelationshipEntry],
    ) -> Result<Self, RegistryError> {
        let mut registry = Self {
            kinds: Vec::with_capacity(kinds.len()),
            index: BTreeMap::new(),
            relationships: Vec::with_capacity(relationships.len()),
        };
        for kind in kinds {
            registry.add_kind(*kind)?;
        }
        if registry.kinds.iter().filter(|kind| kind.role == KindRole::TransactionLog).count() > 1 {
            return Err(invalid("transaction", "at most one transaction log kind"));
        }
        let mut seen = BTreeSet::new();
        for entry in relationships {
            if !seen.insert(*entry) {
                return Err(RegistryError::DuplicateRelationship {
                    kind: entry.kind.to_string(),
                    field: entry.field.to_string(),
                });
            }
            let resolved = registry.resolve_relationship(*entry)?;
            registry.relationships.push(resolved);
        }
        Ok(registry)
    }

    /// Validates and appends one kind.
    fn add_kind(&mut self, kind: KindDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(kind.name) {
            return Err(RegistryError::DuplicateKind(kind.name.to_string()));
        }
        let id = kind.column("id").ok_or_else(|| invalid(kind.name, "missing id column"))?;
        if id.ty != ColumnType::Key {
            return Err(invalid(kind.name, "id column must be the key"));
        }
        let mut names = BTreeSet::new();
        for column in kind.columns {
            if !names.insert(column.name) {
                return Err(invalid(kind.name, format!("duplicate column {}", column.name)));
            }
            if column.ty == ColumnType::Key && column.name != "id" {
                return Err(invalid(kind.name, "only id may be the key"));
            }
            if let Some(target) = column.reference()
                && target != kind.name
                && !self.index.contains_key(target)
            {
                return Err(invalid(
                    kind.name,
                    format!("{} references undeclared kind {target}", column.name),
                ));
            }
        }
        self.validate_base(&kind)?;
        self.validate_owner(&kind)?;
        self.validate_versioning(&kind)?;
        self.validate_search(&kind)?;
        self.index.insert(kind.name, self.kinds.len());
        self.kinds.push(kind);
        Ok(())
    }

    /// Checks the inheritance declaration.
    fn validate_base(&self, kind: &KindDescriptor) -> Result<(), RegistryError> {
        match kind.base {
            None => {
                if kind.role.is_protected()
                    && (!kind.has_column(PUBLIC_COLUMN) || !kind.has_column(PROJECT_COLUMN))
                {
                    return Err(invalid(kind.name, "protected roots need authorization columns"));
                }
                Ok(())
            }
            Some(base) => {
                let parent = self.kind(base).map_err(|_| {
                    invalid(kind.name, format!("base {base} must be declared first"))
                })?;
                if !kind.role.is_protected() || parent.role != kind.role {
                    return Err(invalid(kind.name, "only protected kinds inherit, within a role"));
                }
                if kind.has_column(PUBLIC_COLUMN) || kind.has_column(PROJECT_COLUMN) {
                    return Err(invalid(kind.name, "authorization columns belong on the root"));
                }
                Ok(())
            }
        }
    }

    /// Checks the authorization owner declaration.
    fn validate_owner(&self, kind: &KindDescriptor) -> Result<(), RegistryError> {
        match (kind.role, kind.owner) {
            (KindRole::Entity | KindRole::Activity, Owner::Itself)
            | (KindRole::Global | KindRole::TransactionLog, Owner::None) => Ok(()),
            (KindRole::Association | KindRole::Dependent, Owner::Column(column)) => {
                let def = kind.column(column).ok_or_else(|| {
                    invalid(kind.name, format!("owner column {column} is not declared"))
                })?;
                let target = def
                    .reference()
                    .ok_or_else(|| invalid(kind.name, "owner column must be a foreign key"))?;
                if self.protected_root(target).is_none() {
                    return Err(invalid(kind.name, "owner column must reference a protected kind"));
                }
                Ok(())
            }
            _ => Err(invalid(kind.name, "owner does not match role")),
        }
    }

    /// Checks the versioning declaration.
    fn validate_versioning(&self, kind: &KindDescriptor) -> Result<(), RegistryError> {
        match (kind.role, kind.versioning) {
            (KindRole::Association | KindRole::TransactionLog, versioning)
                if versioning != Versioning::Disabled =>
            {
                Err(invalid(kind.name, "association and log tables are never versioned"))
            }
            (_, Versioning::Inherit | Versioning::Excluded) if kind.base.is_none() => {
                Err(invalid(kind.name, "inherit/excluded versioning requires a base"))
            }
            _ => Ok(()),
        }
    }

    /// Checks the search declaration.
    fn validate_search(&self, kind: &KindDescriptor) -> Result<(), RegistryError> {
        let Some(search) = kind.search else {
            return Ok(());
        };
        let column = kind.column(search.column).ok_or_else(|| RegistryError::UnknownField {
            kind: kind.name.to_string(),
            field: search.column.to_string(),
        })?;
        if column.ty != ColumnType::SearchDocument {
            return Err(invalid(kind.name, "search column must be a search document"));
        }
        if search.sources.is_empty() {
            return Err(invalid(kind.name, "search requires at least one source field"));
        }
        for source in search.sources {
            match kind.column(source) {
                Some(def) if def.ty == ColumnType::Text => {}
                Some(_) => return Err(invalid(kind.name, format!("{source} is not text"))),
                None => {
                    return Err(RegistryError::UnknownField {
                        kind: kind.name.to_string(),
                        field: (*source).to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resolves one relationship entry against the declared kinds.
    fn resolve_relationship(
        &self,
        entry: RelationshipEntry,
    ) -> Result<GuardedReference, RegistryError> {
        let kind = self.kind(entry.kind)?;
        let column = kind.column(entry.field).ok_or_else(|| RegistryError::UnknownField {
            kind: entry.kind.to_string(),
            field: entry.field.to_string(),
        })?;
        let target = column.reference().ok_or_else(|| RegistryError::NotAForeignKey {
            kind: entry.kind.to_string(),
            field: entry.field.to_string(),
        })?;
        let target_root =
            self.protected_root(target).ok_or_else(|| RegistryError::UnprotectedTarget {
                kind: entry.kind.to_string(),
                field: entry.field.to_string(),
            })?;
        let owner = self
            .authorization_source(entry.kind)
            .ok_or_else(|| invalid(entry.kind, "guarded kinds need an authorization source"))?;
        if owner.column == entry.field {
            return Err(invalid(entry.kind, "the owner column cannot be guarded against itself"));
        }
        Ok(GuardedReference {
            kind: kind.name,
            field: column.name,
            nullable: column.nullable,
            target,
            target_root: target_root.name,
            owner,
        })
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Returns the kind named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownKind`] when the kind is not declared.
    pub fn kind(&self, name: &str) -> Result<&KindDescriptor, RegistryError> {
        self.index
            .get(name)
            .and_then(|index| self.kinds.get(*index))
            .ok_or_else(|| RegistryError::UnknownKind(name.to_string()))
    }

    /// Returns every kind in declaration order.
    #[must_use]
    pub fn kinds(&self) -> &[KindDescriptor] {
        &self.kinds
    }

    /// Returns resolved guarded references in declaration order.
    #[must_use]
    pub fn relationships(&self) -> &[GuardedReference] {
        &self.relationships
    }

    /// Returns the inheritance chain of `name`, root first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownKind`] when the kind is not declared.
    pub fn chain(&self, name: &str) -> Result<Vec<&KindDescriptor>, RegistryError> {
        let mut chain = vec![self.kind(name)?];
        while let Some(base) = chain.last().and_then(|kind| kind.base) {
            chain.push(self.kind(base)?);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Returns the protected root of `name`, or `None` for unprotected kinds.
    #[must_use]
    pub fn protected_root(&self, name: &str) -> Option<&KindDescriptor> {
        let mut current = self.kind(name).ok()?;
        if !current.role.is_protected() {
            return None;
        }
        while let Some(base) = current.base {
            current = self.kind(base).ok()?;
        }
        Some(current)
    }

    /// Returns the root row carrying `name`'s authorization.
    #[must_use]
    pub fn authorization_source(&self, name: &str) -> Option<AuthorizationSource> {
        let kind = self.kind(name).ok()?;
        match kind.owner {
            Owner::Itself => self.protected_root(name).map(|root| AuthorizationSource {
                root: root.name,
                column: "id",
            }),
            Owner::Column(column) => {
                let target = kind.column(column)?.reference()?;
                self.protected_root(target).map(|root| AuthorizationSource {
                    root: root.name,
                    column,
                })
            }
            Owner::None => None,
        }
    }

    /// Resolves `column` on `kind` or one of its bases.
    ///
    /// Returns the table that physically stores the column with its
    /// declaration; the kind's own table wins over bases.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the kind or column is unknown.
    pub fn column(
        &self,
        kind: &str,
        column: &str,
    ) -> Result<(&KindDescriptor, &'static ColumnDef), RegistryError> {
        let chain = self.chain(kind)?;
        chain
            .into_iter()
            .rev()
            .find_map(|table| table.column(column).map(|def| (table, def)))
            .ok_or_else(|| RegistryError::UnknownField {
                kind: kind.to_string(),
                field: column.to_string(),
            })
    }

    /// Returns the resolved versioning of `name`.
    #[must_use]
    pub fn is_versioned(&self, name: &str) -> bool {
        let Ok(mut current) = self.kind(name) else {
            return false;
        };
        loop {
            match current.versioning {
                Versioning::Enabled => return true,
                Versioning::Disabled | Versioning::Excluded => return false,
                Versioning::Inherit => {
                    let Some(base) = current.base.and_then(|base| self.kind(base).ok()) else {
                        return false;
                    };
                    current = base;
                }
            }
        }
    }

    /// Returns every versioned kind in declaration order.
    #[must_use]
    pub fn versioned_kinds(&self) -> Vec<&KindDescriptor> {
        self.kinds.iter().filter(|kind| self.is_versioned(kind.name)).collect()
    }

    /// Returns the transaction log kind, if declared.
    #[must_use]
    pub fn transaction_log(&self) -> Option<&KindDescriptor> {
        self.kinds.iter().find(|kind| kind.role == KindRole::TransactionLog)
    }

    /// Returns `(kind, field)` for every foreign key that must be guarded.
    ///
    /// A foreign key must be guarded when the writing kind has an
    /// authorization source and the key references a protected kind, except
    /// the inheritance link (`id`) and the owner column itself.
    #[must_use]
    pub fn protected_foreign_keys(&self) -> BTreeSet<(String, String)> {
        let mut keys = BTreeSet::new();
        for kind in &self.kinds {
            let Some(source) = self.authorization_source(kind.name) else {
                continue;
            };
            for column in kind.columns {
                let Some(target) = column.reference() else {
                    continue;
                };
                if column.name == "id" || column.name == source.column {
                    continue;
                }
                if self.protected_root(target).is_some() {
                    keys.insert((kind.name.to_string(), column.name.to_string()));
                }
            }
        }
        keys
    }

    /// Returns `(kind, field)` for every declared relationship.
    #[must_use]
    pub fn declared_relationships(&self) -> BTreeSet<(String, String)> {
        self.relationships
            .iter()
            .map(|reference| (reference.kind.to_string(), reference.field.to_string()))
            .collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
