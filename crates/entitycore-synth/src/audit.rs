// crates/entitycore-synth/src/audit.rs
// ============================================================================
// Module: Audit Synthesizer
// Description: Transaction-log and version-table triggers.
// Purpose: Snapshot every mutation of a versioned kind, append-only.
// Dependencies: entitycore-core
// ============================================================================

//! ## Overview
//! Each write transaction owns exactly one transaction-log row. Every insert,
//! update, or delete of a versioned kind upserts one version row keyed by
//! `(id, transaction_id)`: several writes to the same row in one transaction
//! coalesce into a single version row, whose operation stays as first
//! recorded unless the row is deleted. Deletes store the pre-delete values.
//!
//! The log and version tables reject deletes, and reject updates unless they
//! coalesce a version row of the current transaction.
//!
//! On Postgres the current transaction is found (or created) by
//! `txid_current()`, with the actor read from the `entitycore.actor_id`
//! setting. `SQLite` serializes writers, so the current transaction is the
//! newest log row, which the store inserts when a write begins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::IdentifierNamer;
use entitycore_core::KindDescriptor;
use entitycore_core::KindRegistry;

use crate::dialect::Dialect;
use crate::dialect::quote_ident;
use crate::error::SynthError;
use crate::object::DbObject;
use crate::object::ObjectFamily;
use crate::schema::OPERATION_TYPE_COLUMN;
use crate::schema::OperationType;
use crate::schema::TRANSACTION_ID_COLUMN;
use crate::schema::version_table_name;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session setting carrying the acting agent on Postgres.
pub const ACTOR_SETTING: &str = "entitycore.actor_id";
/// Function returning (and lazily creating) the current log row.
pub const CURRENT_TRANSACTION_FUNCTION: &str = "audit_fn_current_transaction";
/// Message prefix raised by append-only checks.
pub const APPEND_ONLY_MESSAGE_PREFIX: &str = "append-only audit table: ";
/// SQLSTATE raised by append-only checks (object not in prerequisite state).
pub const APPEND_ONLY_ERROR_CODE: &str = "55000";

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// Synthesizes audit objects for the transaction log and versioned kinds.
///
/// # Errors
///
/// Returns [`SynthError`] when a name cannot be produced or versioned kinds
/// exist without a transaction log.
pub fn synthesize_audit(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    let mut objects = synthesize_audit_infrastructure(registry, dialect, schema, namer)?;
    objects.extend(synthesize_kind_audit(registry, dialect, schema, namer)?);
    Ok(objects)
}

/// Synthesizes the transaction-log objects shared by every versioned kind.
///
/// # Errors
///
/// Returns [`SynthError`] when a name cannot be produced or versioned kinds
/// exist without a transaction log.
pub fn synthesize_audit_infrastructure(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    match AuditContext::new(registry, dialect, schema, namer)? {
        Some(context) => context.log_objects(),
        None => Ok(Vec::new()),
    }
}

/// Synthesizes the version-row triggers of every versioned kind.
///
/// # Errors
///
/// Returns [`SynthError`] when a name cannot be produced or versioned kinds
/// exist without a transaction log.
pub fn synthesize_kind_audit(
    registry: &KindRegistry,
    dialect: Dialect,
    schema: &str,
    namer: &IdentifierNamer,
) -> Result<Vec<DbObject>, SynthError> {
    let Some(context) = AuditContext::new(registry, dialect, schema, namer)? else {
        return Ok(Vec::new());
    };
    let mut objects = Vec::new();
    for kind in registry.versioned_kinds() {
        objects.extend(context.kind_objects(kind)?);
    }
    Ok(objects)
}

/// Shared inputs for rendering audit objects.
struct AuditContext<'a> {
    /// Target dialect.
    dialect: Dialect,
    /// Object schema.
    schema: &'a str,
    /// Object namer.
    namer: &'a IdentifierNamer,
    /// Transaction log table.
    log: &'static str,
}

impl<'a> AuditContext<'a> {
    /// Returns a context, or `None` when nothing is versioned.
    fn new(
        registry: &KindRegistry,
        dialect: Dialect,
        schema: &'a str,
        namer: &'a IdentifierNamer,
    ) -> Result<Option<Self>, SynthError> {
        if registry.versioned_kinds().is_empty() {
            return Ok(None);
        }
        let log = registry.transaction_log().ok_or(SynthError::MissingTransactionLog)?;
        Ok(Some(Self {
            dialect,
            schema,
            namer,
            log: log.name,
        }))
    }

    /// Builds a trigger in the audit family.
    fn trigger(&self, name: &str, table: &str, definition: String) -> Result<DbObject, SynthError> {
        Ok(DbObject::trigger(
            self.dialect,
            ObjectFamily::Audit,
            self.schema,
            self.namer.name(name)?,
            table,
            definition,
        ))
    }

    /// Builds a function in the audit family.
    fn function(&self, name: &str, definition: String) -> Result<DbObject, SynthError> {
        Ok(DbObject::function(
            self.dialect,
            ObjectFamily::Audit,
            self.schema,
            self.namer.name(name)?,
            definition,
        ))
    }

    /// Returns the qualified name of a function for use in SQL.
    fn function_ref(&self, name: &str) -> Result<String, SynthError> {
        Ok(format!("{}.{}()", quote_ident(self.schema), quote_ident(&self.namer.name(name)?)))
    }

    /// Expression evaluating to the current transaction log id.
    fn current_transaction(&self) -> Result<String, SynthError> {
        match self.dialect {
            Dialect::Postgres => self.function_ref(CURRENT_TRANSACTION_FUNCTION),
            Dialect::Sqlite => {
                Ok(format!("(SELECT MAX(\"id\") FROM {})", self.dialect.table("", self.log)))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Transaction log
    // ------------------------------------------------------------------------

    /// Objects attached to the transaction log and shared by version tables.
    fn log_objects(&self) -> Result<Vec<DbObject>, SynthError> {
        let log = self.dialect.table(self.schema, self.log);
        match self.dialect {
            Dialect::Postgres => {
                let current = self.function(
                    CURRENT_TRANSACTION_FUNCTION,
                    format!(
                        "RETURNS BIGINT LANGUAGE plpgsql AS $fn$
DECLARE
    tx_id BIGINT;
BEGIN
    SELECT \"id\" INTO tx_id FROM {log} WHERE \"native_tx_id\" = txid_current();
    IF tx_id IS NULL THEN
        INSERT INTO {log} (\"native_tx_id\", \"actor_id\")
            VALUES (txid_current(), NULLIF(current_setting('{ACTOR_SETTING}', true), '')::BIGINT)
            RETURNING \"id\" INTO tx_id;
    END IF;
    RETURN tx_id;
END;
$fn$"
                    ),
                )?;
                let log_guard = self.function(
                    "audit_fn_transaction_append_only",
                    format!(
                        "RETURNS TRIGGER LANGUAGE plpgsql AS $fn$
BEGIN
    RAISE EXCEPTION '{APPEND_ONLY_MESSAGE_PREFIX}%', TG_TABLE_NAME
        USING ERRCODE = '{APPEND_ONLY_ERROR_CODE}';
END;
$fn$"
                    ),
                )?;
                let log_trigger = self.trigger(
                    "audit_trg_transaction_append_only",
                    self.log,
                    format!(
                        "BEFORE UPDATE OR DELETE ON {log} FOR EACH ROW EXECUTE FUNCTION {}",
                        self.function_ref("audit_fn_transaction_append_only")?
                    ),
                )?;
                let version_guard = self.function(
                    "audit_fn_version_append_only",
                    format!(
                        "RETURNS TRIGGER LANGUAGE plpgsql AS $fn$
BEGIN
    IF TG_OP = 'UPDATE' AND OLD.\"{TRANSACTION_ID_COLUMN}\" = (
        SELECT \"id\" FROM {log} WHERE \"native_tx_id\" = txid_current()
    ) THEN
        RETURN NEW;
    END IF;
    RAISE EXCEPTION '{APPEND_ONLY_MESSAGE_PREFIX}%', TG_TABLE_NAME
        USING ERRCODE = '{APPEND_ONLY_ERROR_CODE}';
END;
$fn$"
                    ),
                )?;
                Ok(vec![current, log_guard, log_trigger, version_guard])
            }
            Dialect::Sqlite => {
                let raise = self.raise_append_only(self.log);
                Ok(vec![
                    self.trigger(
                        "audit_trg_transaction_no_update",
                        self.log,
                        format!("BEFORE UPDATE ON {log} FOR EACH ROW\nBEGIN\n    {raise};\nEND"),
                    )?,
                    self.trigger(
                        "audit_trg_transaction_no_delete",
                        self.log,
                        format!("BEFORE DELETE ON {log} FOR EACH ROW\nBEGIN\n    {raise};\nEND"),
                    )?,
                ])
            }
        }
    }

    /// `SQLite` statement aborting with the append-only message.
    fn raise_append_only(&self, table: &str) -> String {
        format!("SELECT RAISE(ABORT, '{APPEND_ONLY_MESSAGE_PREFIX}{table}')")
    }

    // ------------------------------------------------------------------------
    // Versioned kinds
    // ------------------------------------------------------------------------

    /// Objects maintaining one kind's version table.
    fn kind_objects(&self, kind: &KindDescriptor) -> Result<Vec<DbObject>, SynthError> {
        let version = version_table_name(self.namer, kind.name)?;
        let table = self.dialect.table(self.schema, kind.name);
        let version_ref = self.dialect.table(self.schema, &version);
        let current = self.current_transaction()?;
        match self.dialect {
            Dialect::Postgres => {
                let function_name = format!("audit_fn_{}", kind.name);
                let function = self.function(
                    &function_name,
                    self.postgres_body(kind, &version_ref, &current),
                )?;
                let trigger = self.trigger(
                    &format!("audit_trg_{}", kind.name),
                    kind.name,
                    format!(
                        "AFTER INSERT OR UPDATE OR DELETE ON {table} FOR EACH ROW EXECUTE \
                         FUNCTION {}",
                        self.function_ref(&function_name)?
                    ),
                )?;
                let append_only = self.trigger(
                    &format!("audit_trg_{}_version_append_only", kind.name),
                    &version,
                    format!(
                        "BEFORE UPDATE OR DELETE ON {version_ref} FOR EACH ROW EXECUTE FUNCTION {}",
                        self.function_ref("audit_fn_version_append_only")?
                    ),
                )?;
                Ok(vec![function, trigger, append_only])
            }
            Dialect::Sqlite => {
                let raise = self.raise_append_only(&version);
                let mut objects = vec![
                    self.trigger(
                        &format!("audit_trg_{}_version_no_update", kind.name),
                        &version,
                        format!(
                            "BEFORE UPDATE ON {version_ref} FOR EACH ROW WHEN OLD.{} IS NOT \
                             {current}\nBEGIN\n    {raise};\nEND",
                            quote_ident(TRANSACTION_ID_COLUMN)
                        ),
                    )?,
                    self.trigger(
                        &format!("audit_trg_{}_version_no_delete", kind.name),
                        &version,
                        format!(
                            "BEFORE DELETE ON {version_ref} FOR EACH ROW\nBEGIN\n    {raise};\nEND"
                        ),
                    )?,
                ];
                for (suffix, event, row, op) in [
                    ("ins", "INSERT", "NEW", OperationType::Insert),
                    ("upd", "UPDATE", "NEW", OperationType::Update),
                    ("del", "DELETE", "OLD", OperationType::Delete),
                ] {
                    let code = op.code().to_string();
                    let upsert =
                        upsert_version(kind, &version_ref, row, &current, &code, "excluded");
                    objects.push(self.trigger(
                        &format!("audit_trg_{}_{suffix}", kind.name),
                        kind.name,
                        format!("AFTER {event} ON {table} FOR EACH ROW\nBEGIN\n    {upsert};\nEND"),
                    )?);
                }
                Ok(objects)
            }
        }
    }

    /// Renders the PL/pgSQL body of a kind's audit function.
    fn postgres_body(&self, kind: &KindDescriptor, version: &str, current: &str) -> String {
        let delete_code = OperationType::Delete.code().to_string();
        let delete = upsert_version(kind, version, "OLD", "tx_id", &delete_code, "EXCLUDED");
        let operation = format!(
            "CASE WHEN TG_OP = 'INSERT' THEN {} ELSE {} END",
            OperationType::Insert.code(),
            OperationType::Update.code()
        );
        let write = upsert_version(kind, version, "NEW", "tx_id", &operation, "EXCLUDED");
        format!(
            "RETURNS TRIGGER LANGUAGE plpgsql AS $fn$
DECLARE
    tx_id BIGINT := {current};
BEGIN
    IF TG_OP = 'DELETE' THEN
        {delete};
        RETURN OLD;
    END IF;
    {write};
    RETURN NEW;
END;
$fn$"
        )
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Renders the version-row upsert for `row` (`NEW`, or `OLD` for deletes).
///
/// On conflict the columns take the latest values; the operation changes
/// only when the row is deleted.
fn upsert_version(
    kind: &KindDescriptor,
    version: &str,
    row: &str,
    transaction: &str,
    operation: &str,
    excluded: &str,
) -> String {
    let columns: Vec<String> = kind.columns.iter().map(|column| quote_ident(column.name)).collect();
    let values: Vec<String> = columns.iter().map(|column| format!("{row}.{column}")).collect();
    let mut assignments: Vec<String> =
        columns.iter().map(|column| format!("{column} = {excluded}.{column}")).collect();
    if row == "OLD" {
        assignments.push(format!(
            "{} = {excluded}.{}",
            quote_ident(OPERATION_TYPE_COLUMN),
            quote_ident(OPERATION_TYPE_COLUMN)
        ));
    }
    format!(
        "INSERT INTO {version} ({}, {}, {}) VALUES ({}, {transaction}, {operation})\n        ON \
         CONFLICT (\"id\", {}) DO UPDATE SET {}",
        columns.join(", "),
        quote_ident(TRANSACTION_ID_COLUMN),
        quote_ident(OPERATION_TYPE_COLUMN),
        values.join(", "),
        quote_ident(TRANSACTION_ID_COLUMN),
        assignments.join(", ")
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
