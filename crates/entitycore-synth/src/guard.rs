// crates/entitycore-synth/src/guard.rs
// ============================================================================
// Module: Guard Synthesizer
// Description: Storage-level guards against cross-tenant private references.
// Purpose: Enforce the reference rule inside the database on every write.
// Dependencies: entitycore-core
// ============================================================================

//! ## Overview
//! For every guarded reference `(K, F)` the synthesizer emits a check that
//! runs before each insert or update on `K`. The write is allowed when `F` is
//! null, when the referenced row does not exist (the foreign key reports
//! that), when the referenced row is public, or when both the referenced row
//! and the writing row are private to the same project. Everything else
//! raises `unauthorized private reference: K.F` with SQLSTATE `42501`.
//!
//! Postgres gets one PL/pgSQL function and one `BEFORE INSERT OR UPDATE`
//! trigger per entry. `SQLite` has no stored functions, so each entry becomes
//! a `BEFORE INSERT` and a `BEFORE UPDATE` trigger that `RAISE(ABORT, ..)`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::GUARD_ERROR_CODE;
use entitycore_core::GuardViolation;
use entitycore_core::GuardedReference;
use entitycore_core::IdentifierNamer;
use entitycore_core::KindRegistry;
use entitycore_core::PROJECT_COLUMN;
use entitycore_core::PUBLIC_COLUMN;

use crate::dialect::Dialect;
use crate::dialect::quote_ident;
use crate::dialect::quote_literal;
use crate::error::SynthError;
use crate::object::DbObject;
use crate::object::ObjectFamily;

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// Synthesizes guard objects for every registered relationship.
///
/// # Errors
///
/// Returns [`SynthError`] when an object name cannot be produced.
pub fn synthesize_guards(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    let mut objects = Vec::with_capacity(registry.relationships().len() * 2);
    for reference in registry.relationships() {
        objects.extend(guard_objects(reference, dialect, schema, namer)?);
    }
    Ok(objects)
}

/// Synthesizes the guard objects for one relationship.
///
/// # Errors
///
/// Returns [`SynthError`] when an object name cannot be produced.
pub fn guard_objects(
    reference: &GuardedReference,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    let stem = format!("{}_{}", reference.kind, reference.field);
    match dialect {
        Dialect::Postgres => {
            let function = namer.name(&format!("guard_fn_{stem}"))?;
            let trigger = namer.name(&format!("guard_trg_{stem}"))?;
            let definition = format!(
                "BEFORE INSERT OR UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}.{}()",
                dialect.table(schema, reference.kind),
                quote_ident(schema),
                quote_ident(&function)
            );
            Ok(vec![
                DbObject::function(
                    dialect,
                    ObjectFamily::Guard,
                    schema,
                    function,
                    postgres_function_body(reference, schema),
                ),
                DbObject::trigger(
                    dialect,
                    ObjectFamily::Guard,
                    schema,
                    trigger,
                    reference.kind,
                    definition,
                ),
            ])
        }
        Dialect::Sqlite => {
            let mut objects = Vec::with_capacity(2);
            for (suffix, event) in [("ins", "INSERT"), ("upd", "UPDATE")] {
                let trigger = namer.name(&format!("guard_trg_{stem}_{suffix}"))?;
                objects.push(DbObject::trigger(
                    dialect,
                    ObjectFamily::Guard,
                    schema,
                    trigger,
                    reference.kind,
                    sqlite_trigger_body(reference, event),
                ));
            }
            Ok(objects)
        }
    }
}

// ============================================================================
// SECTION: Bodies
// ============================================================================

/// Renders the PL/pgSQL guard function body.
fn postgres_function_body(reference: &GuardedReference, schema: &str) -> String {
    let field = quote_ident(reference.field);
    let owner = quote_ident(reference.owner.column);
    let public = quote_ident(PUBLIC_COLUMN);
    let project = quote_ident(PROJECT_COLUMN);
    let target = Dialect::Postgres.table(schema, reference.target_root);
    let own_root = Dialect::Postgres.table(schema, reference.owner.root);
    let message = quote_literal(&GuardViolation::message(reference.kind, reference.field));
    let null_check = if reference.nullable {
        format!("    IF NEW.{field} IS NULL THEN\n        RETURN NEW;\n    END IF;\n")
    } else {
        String::new()
    };
    format!(
        "RETURNS TRIGGER LANGUAGE plpgsql AS $fn$
DECLARE
    ref_public BOOLEAN;
    ref_project TEXT;
    own_public BOOLEAN;
    own_project TEXT;
BEGIN
{null_check}    SELECT {public}, {project} INTO ref_public, ref_project
        FROM {target} WHERE \"id\" = NEW.{field};
    IF NOT FOUND OR ref_public THEN
        RETURN NEW;
    END IF;
    SELECT {public}, {project} INTO own_public, own_project
        FROM {own_root} WHERE \"id\" = NEW.{owner};
    IF FOUND AND NOT own_public AND own_project = ref_project THEN
        RETURN NEW;
    END IF;
    RAISE EXCEPTION {message} USING ERRCODE = {code};
END;
$fn$",
        code = quote_literal(GUARD_ERROR_CODE)
    )
}

/// Renders one `SQLite` guard trigger body for `event`.
fn sqlite_trigger_body(reference: &GuardedReference, event: &str) -> String {
    let field = quote_ident(reference.field);
    let owner = quote_ident(reference.owner.column);
    let public = quote_ident(PUBLIC_COLUMN);
    let project = quote_ident(PROJECT_COLUMN);
    let target = Dialect::Sqlite.table("", reference.target_root);
    let own_root = Dialect::Sqlite.table("", reference.owner.root);
    let message = quote_literal(&GuardViolation::message(reference.kind, reference.field));
    format!(
        "BEFORE {event} ON {table} FOR EACH ROW WHEN NEW.{field} IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, {message})
        FROM {target} AS \"ref\"
        WHERE \"ref\".\"id\" = NEW.{field}
          AND NOT \"ref\".{public}
          AND NOT EXISTS (
              SELECT 1 FROM {own_root} AS \"own\"
              WHERE \"own\".\"id\" = NEW.{owner}
                AND NOT \"own\".{public}
                AND \"own\".{project} = \"ref\".{project}
          );
END",
        table = Dialect::Sqlite.table("", reference.kind)
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
