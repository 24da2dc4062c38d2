// crates/entitycore-synth/src/search.rs
// ============================================================================
// Module: Search-Vector Synthesizer
// Description: Triggers maintaining free-text search documents.
// Purpose: Recompute a kind's search column from its source text fields.
// Dependencies: entitycore-core
// ============================================================================

//! ## Overview
//! Postgres uses the built-in `tsvector_update_trigger` with the fixed
//! `pg_catalog.english` configuration. `SQLite` has no text-search type in the
//! core engine, so its document is the lower-cased, space-joined source text,
//! refreshed by `AFTER INSERT` and `AFTER UPDATE OF <sources>` triggers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::ColumnType;
use entitycore_core::IdentifierNamer;
use entitycore_core::KindDescriptor;
use entitycore_core::KindRegistry;
use entitycore_core::SearchSpec;

use crate::dialect::Dialect;
use crate::dialect::TEXT_SEARCH_CATALOG;
use crate::dialect::quote_ident;
use crate::dialect::quote_literal;
use crate::error::SynthError;
use crate::object::DbObject;
use crate::object::ObjectFamily;

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// Synthesizes search-vector triggers for every kind declaring one.
///
/// # Errors
///
/// Returns [`SynthError`] when a declaration is invalid or a name cannot be
/// produced.
pub fn synthesize_search_vectors(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    let mut objects = Vec::new();
    for kind in registry.kinds() {
        if let Some(search) = kind.search {
            objects.extend(search_objects(kind, &search, dialect, schema, namer)?);
        }
    }
    Ok(objects)
}

/// Synthesizes the search-vector triggers for one kind.
///
/// # Errors
///
/// Returns [`SynthError::Search`] when the column is missing or not a search
/// document, when no source fields are given, or when a source is not a text
/// column of the kind.
pub fn search_objects(
    kind: &KindDescriptor,
    search: &SearchSpec,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    validate(kind, search)?;
    let table = dialect.table(schema, kind.name);
    let column = quote_ident(search.column);
    match dialect {
        Dialect::Postgres => {
            let name = namer.name(&format!("search_trg_{}", kind.name))?;
            let definition = format!(
                "BEFORE INSERT OR UPDATE ON {table} FOR EACH ROW EXECUTE FUNCTION \
                 tsvector_update_trigger({}, {}, {})",
                search.column,
                quote_literal(TEXT_SEARCH_CATALOG),
                search.sources.join(", ")
            );
            Ok(vec![DbObject::trigger(
                dialect,
                ObjectFamily::SearchVector,
                schema,
                name,
                kind.name,
                definition,
            )])
        }
        Dialect::Sqlite => {
            let document = search
                .sources
                .iter()
                .map(|source| format!("coalesce(NEW.{}, '')", quote_ident(source)))
                .collect::<Vec<_>>()
                .join(" || ' ' || ");
            let sources =
                search.sources.iter().map(|source| quote_ident(source)).collect::<Vec<_>>();
            let body = format!(
                "BEGIN\n    UPDATE {table} SET {column} = lower(trim({document})) WHERE \"id\" = \
                 NEW.\"id\";\nEND"
            );
            let events = [
                ("ins", "AFTER INSERT".to_string()),
                ("upd", format!("AFTER UPDATE OF {}", sources.join(", "))),
            ];
            let mut objects = Vec::with_capacity(events.len());
            for (suffix, event) in events {
                let name = namer.name(&format!("search_trg_{}_{suffix}", kind.name))?;
                objects.push(DbObject::trigger(
                    dialect,
                    ObjectFamily::SearchVector,
                    schema,
                    name,
                    kind.name,
                    format!("{event} ON {table} FOR EACH ROW\n{body}"),
                ));
            }
            Ok(objects)
        }
    }
}

/// Checks the search declaration against the kind's own columns.
fn validate(kind: &KindDescriptor, search: &SearchSpec) -> Result<(), SynthError> {
    let reject = |reason: String| SynthError::Search {
        kind: kind.name.to_string(),
        reason,
    };
    match kind.column(search.column) {
        Some(column) if column.ty == ColumnType::SearchDocument => {}
        Some(_) => return Err(reject(format!("{} is not a search document", search.column))),
        None => return Err(reject(format!("unknown column {}", search.column))),
    }
    if search.sources.is_empty() {
        return Err(reject("at least one source field is required".to_string()));
    }
    for source in search.sources {
        match kind.column(source) {
            Some(column) if column.ty == ColumnType::Text => {}
            Some(_) => return Err(reject(format!("source {source} is not text"))),
            None => return Err(reject(format!("unknown source field {source}"))),
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
