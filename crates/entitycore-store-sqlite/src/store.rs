// crates/entitycore-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Entity Store
// Description: Embedded entity store backed by SQLite.
// Purpose: Apply the synthesized schema, run logged writes, serve reads.
// Dependencies: entitycore-core, entitycore-query, entitycore-synth, rusqlite,
//               serde, serde_json
// ============================================================================

//! ## Overview
//! One connection guarded by a mutex serves every call. Writes open a
//! `BEGIN IMMEDIATE` transaction, append one transaction-log row, and hand a
//! [`WriteTx`] to the caller; the synthesized triggers guard references and
//! snapshot versions inside that same transaction. Reads always carry an
//! [`AccessScope`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use entitycore_core::AccessScope;
use entitycore_core::AgentId;
use entitycore_core::EntityId;
use entitycore_core::KindRegistry;
use entitycore_core::StoreAuditEvent;
use entitycore_core::StoreAuditKind;
use entitycore_core::StoreAuditSink;
use entitycore_core::StoreError;
use entitycore_core::TransactionId;
use entitycore_core::WriteIntent;
use entitycore_query::AuthorizedSelect;
use entitycore_query::Descendant;
use entitycore_query::FacetEngine;
use entitycore_query::FacetResults;
use entitycore_query::HierarchyTree;
use entitycore_query::LineageQuery;
use entitycore_query::Params;
use entitycore_query::Row;
use entitycore_query::Select;
use entitycore_query::SqlExecutor;
use entitycore_query::SqlValue;
use entitycore_query::VersionQuery;
use entitycore_query::VersionRecord;
use entitycore_query::WriteTx;
use entitycore_synth::Dialect;
use entitycore_synth::SchemaBundle;
use entitycore_synth::SynthOptions;
use entitycore_synth::quote_ident;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::TransactionBehavior;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::session::SqliteSession;
use crate::session::map_sqlite_error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Backend label used in audit events.
pub const BACKEND: &str = "sqlite";
/// Default `SQLite` busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// Write-ahead logging.
    #[default]
    Wal,
    /// Rollback journal.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the pragma keyword.
    const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// `SQLite` synchronous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Sync on every commit.
    #[default]
    Full,
    /// Sync at checkpoints only.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the pragma keyword.
    const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Normal => "NORMAL",
        }
    }
}

/// File-backed store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Database file.
    pub path: PathBuf,
    /// Busy timeout (ms).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// Synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Serde default for the busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while opening the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqliteStoreError {
    /// Filesystem failure.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// Engine failure.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Rejected configuration.
    #[error("sqlite store invalid config: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Entity store over one `SQLite` connection.
#[derive(Clone)]
pub struct SqliteEntityStore {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
    /// Kinds served by the store.
    registry: Arc<KindRegistry>,
    /// Naming options used for synthesis and version reads.
    options: SynthOptions,
    /// Audit sink.
    audit: Arc<dyn StoreAuditSink>,
}

impl SqliteEntityStore {
    /// Opens (creating if needed) a file-backed store.
    ///
    /// The schema is not applied; call [`Self::apply_schema`].
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is rejected or the
    /// database cannot be opened.
    pub fn open(
        config: &SqliteStoreConfig,
        registry: Arc<KindRegistry>,
        options: SynthOptions,
        audit: Arc<dyn StoreAuditSink>,
    ) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(config)?;
        Ok(Self::from_connection(connection, registry, options, audit))
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the connection cannot be opened.
    pub fn open_in_memory(
        registry: Arc<KindRegistry>,
        options: SynthOptions,
        audit: Arc<dyn StoreAuditSink>,
    ) -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(Self::from_connection(connection, registry, options, audit))
    }

    /// Assembles the store around an opened connection.
    fn from_connection(
        connection: Connection,
        registry: Arc<KindRegistry>,
        options: SynthOptions,
        audit: Arc<dyn StoreAuditSink>,
    ) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            registry,
            options,
            audit,
        }
    }

    /// Returns the registry served by the store.
    #[must_use]
    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Synthesizes the `SQLite` schema bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when synthesis fails.
    pub fn bundle(&self) -> Result<SchemaBundle, StoreError> {
        SchemaBundle::build(&self.registry, Dialect::Sqlite, &self.options)
            .map_err(|err| StoreError::Invalid(err.to_string()))
    }

    /// Creates tables and (re)creates every synthesized trigger.
    ///
    /// Safe to run repeatedly: tables use `IF NOT EXISTS` and triggers are
    /// dropped before being recreated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when synthesis or any statement fails; nothing
    /// is applied in that case.
    pub fn apply_schema(&self) -> Result<SchemaBundle, StoreError> {
        let bundle = self.bundle()?;
        let statements = bundle.statements();
        {
            let mut guard = self.lock()?;
            let tx = guard
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sqlite_error)?;
            for statement in &statements {
                tx.execute_batch(statement).map_err(map_sqlite_error)?;
            }
            tx.commit().map_err(map_sqlite_error)?;
        }
        self.audit.record(&StoreAuditEvent::new(
            StoreAuditKind::SchemaApplied,
            BACKEND,
            json!({
                "digest": bundle.digest(),
                "statements": statements.len(),
            }),
        ));
        Ok(bundle)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Runs `operation` inside one logged write transaction.
    ///
    /// The transaction commits when `operation` returns `Ok` and rolls back
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error of `operation`, or [`StoreError`] when the
    /// transaction cannot be opened, logged, or committed.
    pub fn write<T, F>(&self, actor: Option<AgentId>, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut WriteTx<'_, SqliteSession<'_>>) -> Result<T, StoreError>,
    {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sqlite_error)?;
        let outcome = {
            let mut session = SqliteSession::new(&tx);
            match self.log_transaction(&mut session, actor) {
                Ok(transaction) => {
                    let mut write = WriteTx::new(&mut session, &self.registry, actor, transaction);
                    operation(&mut write).map(|value| (value, transaction))
                }
                Err(err) => Err(err),
            }
        };
        match outcome {
            Ok((value, transaction)) => {
                tx.commit().map_err(map_sqlite_error)?;
                self.audit.record(&StoreAuditEvent::new(
                    StoreAuditKind::WriteCommitted,
                    BACKEND,
                    json!({
                        "transaction_id": transaction,
                        "actor_id": actor,
                    }),
                ));
                Ok(value)
            }
            Err(err) => {
                drop(tx);
                if let Some(violation) = err.guard_violation() {
                    self.audit.record(&StoreAuditEvent::new(
                        StoreAuditKind::AuthorizationDenied,
                        BACKEND,
                        json!({
                            "table": violation.table,
                            "field": violation.field,
                            "actor_id": actor,
                        }),
                    ));
                }
                Err(err)
            }
        }
    }

    /// Creates one entity or activity in its own write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] as [`WriteTx::insert_entity`] does.
    pub fn create_entity(
        &self,
        kind: &str,
        intent: &WriteIntent,
        values: &[(&str, SqlValue)],
    ) -> Result<EntityId, StoreError> {
        self.write(intent.actor, |tx| tx.insert_entity(kind, &intent.authorization, values))
    }

    /// Appends the transaction-log row for the open transaction.
    fn log_transaction(
        &self,
        session: &mut SqliteSession<'_>,
        actor: Option<AgentId>,
    ) -> Result<TransactionId, StoreError> {
        let log = self
            .registry
            .transaction_log()
            .ok_or_else(|| StoreError::Invalid("registry has no transaction log".to_string()))?;
        let mut params = Params::new();
        let actor_param = params.push(actor);
        let query = params.bind(format!(
            "INSERT INTO {} (\"actor_id\") VALUES ({actor_param}) RETURNING \"id\"",
            quote_ident(log.name)
        ));
        let rows = session.query(&query)?;
        let id = rows
            .first()
            .and_then(|row| row.int("id"))
            .ok_or_else(|| StoreError::Db("transaction log insert returned no id".to_string()))?;
        Ok(TransactionId::new(id))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Starts a select over `kind` in the `SQLite` dialect.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for unknown kinds.
    pub fn select(&self, kind: &str) -> Result<Select<'_>, StoreError> {
        Ok(Select::new(&self.registry, Dialect::Sqlite, kind)?)
    }

    /// Runs `read` against the connection outside any write transaction.
    ///
    /// # Errors
    ///
    /// Returns the error of `read`, or [`StoreError::Db`] when the
    /// connection mutex is poisoned.
    pub fn read<T>(
        &self,
        read: impl FnOnce(&mut SqliteSession<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.lock()?;
        let mut session = SqliteSession::new(&guard);
        read(&mut session)
    }

    /// Returns the visible rows of `select`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn fetch(&self, select: &AuthorizedSelect<'_>) -> Result<Vec<Row>, StoreError> {
        self.read(|session| select.fetch(session))
    }

    /// Counts the visible rows of `select`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    pub fn count(&self, select: &AuthorizedSelect<'_>) -> Result<u64, StoreError> {
        self.read(|session| select.count(session))
    }

    /// Reads one visible row of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row is missing or not
    /// visible to `scope`.
    pub fn get(&self, scope: &AccessScope, kind: &str, id: i64) -> Result<Row, StoreError> {
        let mut select = self.select(kind)?;
        select.filter_eq("id", id)?;
        let select = select.authorize(scope.clone());
        self.fetch(&select)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("{kind} {id}")))
    }

    /// Computes the standard facets of the select's kind.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a facet query fails.
    pub fn facets(&self, select: &AuthorizedSelect<'_>) -> Result<FacetResults, StoreError> {
        let engine = FacetEngine::standard(&self.registry, select.select().kind())?;
        self.facets_with(&engine, select)
    }

    /// Computes the facets of `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a facet query fails.
    pub fn facets_with(
        &self,
        engine: &FacetEngine<'_>,
        select: &AuthorizedSelect<'_>,
    ) -> Result<FacetResults, StoreError> {
        self.read(|session| engine.compute(session, select))
    }

    /// Reads the visible history of row `id` of `kind`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for kinds without history.
    pub fn versions(
        &self,
        scope: &AccessScope,
        kind: &str,
        id: i64,
    ) -> Result<Vec<VersionRecord>, StoreError> {
        let query = VersionQuery::new(&self.registry, &self.options.namer, kind)?;
        self.read(|session| query.fetch(session, scope, id))
    }

    /// Builds the visible derivation hierarchy of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the kind cannot be derived or a query fails.
    pub fn lineage(
        &self,
        scope: &AccessScope,
        kind: &str,
        derivation_type: &str,
    ) -> Result<HierarchyTree, StoreError> {
        let query = LineageQuery::new(&self.registry, kind, derivation_type)?;
        self.read(|session| query.tree(session, scope))
    }

    /// Lists visible descendants of `root` up to `max_depth` levels.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the kind cannot be derived or a query fails.
    pub fn descendants(
        &self,
        scope: &AccessScope,
        kind: &str,
        derivation_type: &str,
        root: EntityId,
        max_depth: u32,
    ) -> Result<Vec<Descendant>, StoreError> {
        let query = LineageQuery::new(&self.registry, kind, derivation_type)?;
        self.read(|session| query.descendants(session, scope, root, max_depth))
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Db("sqlite connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the parent directory of the database file.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path has no parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Rejects empty, overlong, and directory paths.
pub(crate) fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.as_os_str().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path.components().any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH) {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path is a directory".to_string()));
    }
    Ok(())
}

/// Opens the database file with full-mutex threading.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Enables foreign keys and applies journal, sync, and busy settings.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    let pragmas = format!(
        "PRAGMA foreign_keys = ON; PRAGMA journal_mode = {}; PRAGMA synchronous = {};",
        config.journal_mode.pragma_value(),
        config.sync_mode.pragma_value()
    );
    connection.execute_batch(&pragmas).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
