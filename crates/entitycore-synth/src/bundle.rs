// crates/entitycore-synth/src/bundle.rs
// ============================================================================
// Module: Schema Bundle
// Description: Complete, ordered schema for one registry and dialect.
// Purpose: Single entry point for migration tooling and completeness checks.
// Dependencies: entitycore-core, sha2
// ============================================================================

//! ## Overview
//! [`SchemaBundle::build`] runs every synthesizer once and keeps the result.
//! Statements come out in a fixed order (tables, version tables, audit
//! infrastructure, guards, search vectors, per-kind audit), so building twice
//! from the same registry yields byte-identical SQL and the same
//! [`SchemaBundle::digest`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use entitycore_core::DEFAULT_MAX_IDENTIFIER_LENGTH;
use entitycore_core::IdentifierNamer;
use entitycore_core::KindRegistry;
use sha2::Digest;
use sha2::Sha256;

use crate::audit::synthesize_audit_infrastructure;
use crate::audit::synthesize_kind_audit;
use crate::dialect::Dialect;
use crate::error::SynthError;
use crate::guard::synthesize_guards;
use crate::object::DbObject;
use crate::object::ObjectFamily;
use crate::object::ObjectKind;
use crate::schema::table_statements;
use crate::schema::version_table_name;
use crate::schema::version_table_statements;
use crate::search::synthesize_search_vectors;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Default schema for synthesized objects.
pub const DEFAULT_SCHEMA: &str = "public";

/// Synthesis options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthOptions {
    /// Schema for tables and functions (Postgres only).
    pub schema: String,
    /// Namer bounding object names.
    pub namer: IdentifierNamer,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            namer: IdentifierNamer::default(),
        }
    }
}

impl SynthOptions {
    /// Builds options for `schema` with names bounded by `max_identifier_length`.
    ///
    /// # Errors
    ///
    /// Returns [`SynthError::Naming`] when the schema is not a valid
    /// identifier or the length cannot hold a digest suffix.
    pub fn new(schema: &str, max_identifier_length: usize) -> Result<Self, SynthError> {
        let namer = IdentifierNamer::new(max_identifier_length.min(DEFAULT_MAX_IDENTIFIER_LENGTH))?;
        namer.qualify(schema, "entity")?;
        Ok(Self {
            schema: schema.to_string(),
            namer,
        })
    }
}

// ============================================================================
// SECTION: Bundle
// ============================================================================

/// Synthesized schema for one registry and dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaBundle {
    /// Target dialect.
    dialect: Dialect,
    /// Options used for synthesis.
    options: SynthOptions,
    /// `CREATE SCHEMA` / `CREATE TABLE` / `CREATE INDEX` statements.
    tables: Vec<String>,
    /// Version-table statements.
    version_tables: Vec<String>,
    /// Synthesized functions and triggers in application order.
    objects: Vec<DbObject>,
    /// Names of version tables, in registry order.
    version_table_names: Vec<(&'static str, String)>,
}

impl SchemaBundle {
    /// Synthesizes the full schema.
    ///
    /// # Errors
    ///
    /// Returns [`SynthError`] when any synthesizer fails or two objects share
    /// a name.
    pub fn build(
        registry: &KindRegistry,
        dialect: Dialect,
        options: &SynthOptions,
    ) -> Result<Self, SynthError> {
        let schema = options.schema.as_str();
        let namer = &options.namer;
        let tables = table_statements(registry, dialect, schema, namer)?;
        let version_tables = version_table_statements(registry, dialect, schema, namer)?;
        let mut objects = synthesize_audit_infrastructure(registry, dialect, schema, namer)?;
        objects.extend(synthesize_guards(registry, dialect, schema, namer)?);
        objects.extend(synthesize_search_vectors(registry, dialect, schema, namer)?);
        objects.extend(synthesize_kind_audit(registry, dialect, schema, namer)?);

        let mut seen = BTreeSet::new();
        for object in &objects {
            if !seen.insert((object.kind, object.name.as_str())) {
                return Err(SynthError::DuplicateName(object.name.clone()));
            }
        }
        let version_table_names = registry
            .versioned_kinds()
            .into_iter()
            .map(|kind| Ok((kind.name, version_table_name(namer, kind.name)?)))
            .collect::<Result<Vec<_>, SynthError>>()?;
        Ok(Self {
            dialect,
            options: options.clone(),
            tables,
            version_tables,
            objects,
            version_table_names,
        })
    }

    /// Returns the target dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Returns the options used for synthesis.
    #[must_use]
    pub const fn options(&self) -> &SynthOptions {
        &self.options
    }

    /// Returns table and index statements.
    #[must_use]
    pub fn table_statements(&self) -> &[String] {
        &self.tables
    }

    /// Returns version-table statements.
    #[must_use]
    pub fn version_table_statements(&self) -> &[String] {
        &self.version_tables
    }

    /// Returns every synthesized object in application order.
    #[must_use]
    pub fn objects(&self) -> &[DbObject] {
        &self.objects
    }

    /// Returns the objects produced by one synthesizer.
    pub fn objects_of(&self, family: ObjectFamily) -> impl Iterator<Item = &DbObject> {
        self.objects.iter().filter(move |object| object.family == family)
    }

    /// Returns the objects of one family and kind.
    pub fn objects_of_kind(
        &self,
        family: ObjectFamily,
        kind: ObjectKind,
    ) -> impl Iterator<Item = &DbObject> {
        self.objects_of(family).filter(move |object| object.kind == kind)
    }

    /// Returns `(kind, version table)` for every versioned kind.
    #[must_use]
    pub fn version_tables(&self) -> &[(&'static str, String)] {
        &self.version_table_names
    }

    /// Returns every statement needed to create the schema, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        let mut statements: Vec<String> =
            self.tables.iter().chain(&self.version_tables).cloned().collect();
        for object in &self.objects {
            statements.extend(object.create_statements());
        }
        statements
    }

    /// Returns statements dropping every synthesized object, reverse order.
    ///
    /// Tables are left in place; dropping data is the migration tool's call.
    #[must_use]
    pub fn drop_statements(&self) -> Vec<String> {
        self.objects.iter().rev().map(DbObject::drop_statement).collect()
    }

    /// Returns the hex SHA-256 digest of [`Self::statements`].
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for statement in self.statements() {
            hasher.update(statement.as_bytes());
            hasher.update(b";\n");
        }
        hasher.finalize().iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
