// crates/entitycore-synth/src/object.rs
// ============================================================================
// Module: Database Objects
// Description: Synthesized functions and triggers with create/drop SQL.
// Purpose: Hand migration tooling an idempotent (schema, signature, table, body).
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`DbObject`] is the unit handed to migration tooling: the
//! `(schema, signature, on_table, definition)` tuple plus the statements
//! that create it idempotently and drop it on rollback. Postgres objects use
//! `CREATE OR REPLACE`; `SQLite` has no replace form for triggers, so its
//! create statements drop the trigger first.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::dialect::Dialect;
use crate::dialect::quote_ident;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Kind of database object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Stored function.
    Function,
    /// Row trigger.
    Trigger,
}

/// Synthesizer that produced an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectFamily {
    /// Authorization guard.
    Guard,
    /// Free-text search vector maintenance.
    SearchVector,
    /// Transaction log and version tables.
    Audit,
}

/// Synthesized database object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbObject {
    /// Dialect the definition is written for.
    pub dialect: Dialect,
    /// Producing synthesizer.
    pub family: ObjectFamily,
    /// Function or trigger.
    pub kind: ObjectKind,
    /// Schema the object lives in.
    pub schema: String,
    /// Length-bounded object name.
    pub name: String,
    /// Function signature (`name()`) or trigger name.
    pub signature: String,
    /// Table a trigger is attached to.
    pub on_table: Option<String>,
    /// Object body following the name in `CREATE`.
    pub definition: String,
}

impl DbObject {
    /// Builds a function object.
    #[must_use]
    pub fn function(
        dialect: Dialect,
        family: ObjectFamily,
        schema: &str,
        name: String,
        definition: String,
    ) -> Self {
        Self {
            dialect,
            family,
            kind: ObjectKind::Function,
            schema: dialect.object_schema(schema).to_string(),
            signature: format!("{name}()"),
            name,
            on_table: None,
            definition,
        }
    }

    /// Builds a trigger object attached to `table`.
    #[must_use]
    pub fn trigger(
        dialect: Dialect,
        family: ObjectFamily,
        schema: &str,
        name: String,
        table: &str,
        definition: String,
    ) -> Self {
        Self {
            dialect,
            family,
            kind: ObjectKind::Trigger,
            schema: dialect.object_schema(schema).to_string(),
            signature: name.clone(),
            name,
            on_table: Some(table.to_string()),
            definition,
        }
    }

    /// Returns the statements that create or replace the object.
    #[must_use]
    pub fn create_statements(&self) -> Vec<String> {
        let name = quote_ident(&self.name);
        match (self.dialect, self.kind) {
            (Dialect::Postgres, ObjectKind::Function) => vec![format!(
                "CREATE OR REPLACE FUNCTION {}.{name}() {}",
                quote_ident(&self.schema),
                self.definition
            )],
            (Dialect::Postgres, ObjectKind::Trigger) => {
                vec![format!("CREATE OR REPLACE TRIGGER {name} {}", self.definition)]
            }
            (Dialect::Sqlite, _) => vec![
                format!("DROP TRIGGER IF EXISTS {name}"),
                format!("CREATE TRIGGER {name} {}", self.definition),
            ],
        }
    }

    /// Returns the statement that drops the object.
    #[must_use]
    pub fn drop_statement(&self) -> String {
        let name = quote_ident(&self.name);
        match (self.dialect, self.kind) {
            (Dialect::Postgres, ObjectKind::Function) => {
                format!("DROP FUNCTION IF EXISTS {}.{name}()", quote_ident(&self.schema))
            }
            (Dialect::Postgres, ObjectKind::Trigger) => format!(
                "DROP TRIGGER IF EXISTS {name} ON {}",
                self.dialect.table(&self.schema, self.on_table.as_deref().unwrap_or_default())
            ),
            (Dialect::Sqlite, _) => format!("DROP TRIGGER IF EXISTS {name}"),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_function_replaces_in_place() {
        let object = DbObject::function(
            Dialect::Postgres,
            ObjectFamily::Guard,
            "public",
            "guard_fn_x".to_string(),
            "RETURNS TRIGGER LANGUAGE plpgsql AS $fn$ BEGIN RETURN NEW; END; $fn$".to_string(),
        );
        assert_eq!(object.signature, "guard_fn_x()");
        assert_eq!(
            object.create_statements(),
            vec![
                "CREATE OR REPLACE FUNCTION \"public\".\"guard_fn_x\"() RETURNS TRIGGER LANGUAGE \
                 plpgsql AS $fn$ BEGIN RETURN NEW; END; $fn$"
                    .to_string()
            ]
        );
        assert_eq!(object.drop_statement(), "DROP FUNCTION IF EXISTS \"public\".\"guard_fn_x\"()");
    }

    #[test]
    fn postgres_trigger_drops_on_its_table() {
        let object = DbObject::trigger(
            Dialect::Postgres,
            ObjectFamily::Guard,
            "public",
            "guard_trg_x".to_string(),
            "emodel",
            "BEFORE INSERT OR UPDATE ON \"public\".\"emodel\"".to_string(),
        );
        assert_eq!(
            object.drop_statement(),
            "DROP TRIGGER IF EXISTS \"guard_trg_x\" ON \"public\".\"emodel\""
        );
    }

    #[test]
    fn sqlite_trigger_is_dropped_before_create() {
        let object = DbObject::trigger(
            Dialect::Sqlite,
            ObjectFamily::Audit,
            "public",
            "audit_trg_x".to_string(),
            "entity",
            "AFTER DELETE ON \"entity\" BEGIN SELECT 1; END".to_string(),
        );
        assert_eq!(object.schema, "main");
        let statements = object.create_statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "DROP TRIGGER IF EXISTS \"audit_trg_x\"");
        assert!(statements[1].starts_with("CREATE TRIGGER \"audit_trg_x\" AFTER DELETE"));
    }
}
