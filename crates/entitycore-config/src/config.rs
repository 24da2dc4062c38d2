// crates/entitycore-config/src/config.rs
// ============================================================================
// Module: Entitycore Configuration
// Description: Configuration loading and validation for entity stores.
// Purpose: Strict, fail-closed parsing of entitycore.toml with hard limits.
// Dependencies: entitycore-core, entitycore-store-*, entitycore-synth, serde,
//               toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits
//! and validated before anything is opened. A validated config builds the
//! synthesis options, the audit sink, and the configured store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use entitycore_core::DEFAULT_MAX_IDENTIFIER_LENGTH;
use entitycore_core::FileAuditSink;
use entitycore_core::KindRegistry;
use entitycore_core::NoopAuditSink;
use entitycore_core::StderrAuditSink;
use entitycore_core::StoreAuditSink;
use entitycore_core::StoreError;
use entitycore_store_postgres::PostgresEntityStore;
use entitycore_store_postgres::PostgresStoreConfig;
use entitycore_store_sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use entitycore_store_sqlite::SqliteEntityStore;
use entitycore_store_sqlite::SqliteStoreConfig;
use entitycore_store_sqlite::SqliteStoreMode;
use entitycore_store_sqlite::SqliteSyncMode;
use entitycore_synth::DEFAULT_SCHEMA;
use entitycore_synth::SchemaBundle;
use entitycore_synth::SynthOptions;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "entitycore.toml";
/// Environment variable naming the config file.
pub(crate) const CONFIG_ENV_VAR: &str = "ENTITYCORE_CONFIG";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Smallest identifier limit that still fits a digest suffix.
pub const MIN_IDENTIFIER_LENGTH: usize = 16;
/// Maximum pool size accepted for the Postgres store.
pub(crate) const MAX_POSTGRES_CONNECTIONS: u32 = 1024;
/// Default `SQLite` database file.
const DEFAULT_SQLITE_PATH: &str = "entitycore.db";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Top-level entitycore configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitycoreConfig {
    /// Store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Schema synthesis options.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    /// Audit sink.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl EntitycoreConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.synthesis.validate()?;
        self.store.validate(&self.synthesis)?;
        self.audit.validate()
    }

    /// Builds synthesis options from the `[synthesis]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the schema or length is rejected.
    pub fn synth_options(&self) -> Result<SynthOptions, ConfigError> {
        SynthOptions::new(&self.synthesis.schema, self.synthesis.max_identifier_length)
            .map_err(|err| ConfigError::Invalid(format!("synthesis: {err}")))
    }

    /// Opens the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened.
    pub fn audit_sink(&self) -> Result<Arc<dyn StoreAuditSink>, ConfigError> {
        match self.audit.sink {
            AuditSinkType::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkType::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkType::File => {
                let path = self
                    .audit
                    .path
                    .as_ref()
                    .ok_or_else(|| {
                        ConfigError::Invalid("file audit sink requires path".to_string())
                    })?;
                let sink =
                    FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }

    /// Opens the configured store. The schema is not applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when options, the sink, or the store cannot be
    /// built.
    pub fn open_store(&self, registry: Arc<KindRegistry>) -> Result<EntityStore, ConfigError> {
        let options = self.synth_options()?;
        let audit = self.audit_sink()?;
        match self.store.store_type {
            StoreType::Sqlite => {
                let config = self.store.sqlite_config()?;
                SqliteEntityStore::open(&config, registry, options, audit)
                    .map(EntityStore::Sqlite)
                    .map_err(|err| ConfigError::Store(err.to_string()))
            }
            StoreType::Postgres => {
                let config = self.store.postgres_config(&self.synthesis)?;
                PostgresEntityStore::connect(&config, registry, options, audit)
                    .map(EntityStore::Postgres)
                    .map_err(|err| ConfigError::Store(err.to_string()))
            }
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Embedded `SQLite` file.
    #[default]
    Sqlite,
    /// Postgres server.
    Postgres,
}

/// `[store]` section. Backend-specific keys must match `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: Option<SqliteStoreMode>,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: Option<SqliteSyncMode>,
    /// Postgres connection string.
    #[serde(default)]
    pub connection: Option<String>,
    /// Postgres pool size.
    #[serde(default)]
    pub max_connections: Option<u32>,
    /// Postgres connect timeout in milliseconds.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    /// Postgres statement timeout in milliseconds.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
    /// Postgres migration lock wait in milliseconds.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
    /// Postgres `search_path` schema; defaults to the synthesis schema.
    #[serde(default)]
    pub schema: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Sqlite,
            path: Some(PathBuf::from(DEFAULT_SQLITE_PATH)),
            busy_timeout_ms: None,
            journal_mode: None,
            sync_mode: None,
            connection: None,
            max_connections: None,
            connect_timeout_ms: None,
            statement_timeout_ms: None,
            lock_timeout_ms: None,
            schema: None,
        }
    }
}

impl StoreConfig {
    /// Validates store configuration against the synthesis section.
    fn validate(&self, synthesis: &SynthesisConfig) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Sqlite => {
                let postgres_keys = [
                    self.connection.is_some(),
                    self.max_connections.is_some(),
                    self.connect_timeout_ms.is_some(),
                    self.statement_timeout_ms.is_some(),
                    self.lock_timeout_ms.is_some(),
                    self.schema.is_some(),
                ];
                if postgres_keys.contains(&true) {
                    return Err(ConfigError::Invalid(
                        "sqlite store must not set postgres keys".to_string(),
                    ));
                }
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::Invalid("sqlite store requires path".to_string()))?;
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.busy_timeout_ms == Some(0) {
                    return Err(ConfigError::Invalid(
                        "store.busy_timeout_ms must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
            StoreType::Postgres => {
                let sqlite_keys = [
                    self.path.is_some(),
                    self.busy_timeout_ms.is_some(),
                    self.journal_mode.is_some(),
                    self.sync_mode.is_some(),
                ];
                if sqlite_keys.contains(&true) {
                    return Err(ConfigError::Invalid(
                        "postgres store must not set sqlite keys".to_string(),
                    ));
                }
                let connection = self
                    .connection
                    .as_deref()
                    .ok_or_else(|| {
                        ConfigError::Invalid("postgres store requires connection".to_string())
                    })?;
                if connection.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "store.connection must be non-empty".to_string(),
                    ));
                }
                if let Some(max) = self.max_connections
                    && (max == 0 || max > MAX_POSTGRES_CONNECTIONS)
                {
                    return Err(ConfigError::Invalid(format!(
                        "store.max_connections must be between 1 and {MAX_POSTGRES_CONNECTIONS}"
                    )));
                }
                for (field, value) in [
                    ("store.connect_timeout_ms", self.connect_timeout_ms),
                    ("store.statement_timeout_ms", self.statement_timeout_ms),
                    ("store.lock_timeout_ms", self.lock_timeout_ms),
                ] {
                    if value == Some(0) {
                        return Err(ConfigError::Invalid(format!(
                            "{field} must be greater than zero"
                        )));
                    }
                }
                if let Some(schema) = &self.schema
                    && *schema != synthesis.schema
                {
                    return Err(ConfigError::Invalid(format!(
                        "store.schema {schema} must match synthesis.schema {}",
                        synthesis.schema
                    )));
                }
                Ok(())
            }
        }
    }

    /// Builds the `SQLite` store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the backend is not `SQLite`.
    pub fn sqlite_config(&self) -> Result<SqliteStoreConfig, ConfigError> {
        let path = match (self.store_type, &self.path) {
            (StoreType::Sqlite, Some(path)) => path.clone(),
            _ => {
                return Err(ConfigError::Invalid(
                    "store is not a configured sqlite store".to_string(),
                ));
            }
        };
        Ok(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            journal_mode: self.journal_mode.unwrap_or_default(),
            sync_mode: self.sync_mode.unwrap_or_default(),
        })
    }

    /// Builds the Postgres store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the backend is not Postgres.
    pub fn postgres_config(
        &self,
        synthesis: &SynthesisConfig,
    ) -> Result<PostgresStoreConfig, ConfigError> {
        let connection = match (self.store_type, &self.connection) {
            (StoreType::Postgres, Some(connection)) => connection.clone(),
            _ => {
                return Err(ConfigError::Invalid(
                    "store is not a configured postgres store".to_string(),
                ));
            }
        };
        let defaults = PostgresStoreConfig::default();
        Ok(PostgresStoreConfig {
            connection,
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            connect_timeout_ms: self.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            statement_timeout_ms: self
                .statement_timeout_ms
                .unwrap_or(defaults.statement_timeout_ms),
            lock_timeout_ms: self.lock_timeout_ms.unwrap_or(defaults.lock_timeout_ms),
            schema: self.schema.clone().unwrap_or_else(|| synthesis.schema.clone()),
        })
    }
}

/// Store opened from configuration.
pub enum EntityStore {
    /// Embedded store.
    Sqlite(SqliteEntityStore),
    /// Postgres store.
    Postgres(PostgresEntityStore),
}

impl EntityStore {
    /// Applies the synthesized schema on whichever backend is configured.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] as the backend's `apply_schema` does.
    pub fn apply_schema(&self) -> Result<SchemaBundle, StoreError> {
        match self {
            Self::Sqlite(store) => store.apply_schema(),
            Self::Postgres(store) => store.apply_schema(),
        }
    }
}

// ============================================================================
// SECTION: Synthesis
// ============================================================================

/// `[synthesis]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynthesisConfig {
    /// Byte limit for synthesized identifiers.
    #[serde(default = "default_max_identifier_length")]
    pub max_identifier_length: usize,
    /// Schema qualifying synthesized object names.
    #[serde(default = "default_schema")]
    pub schema: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_identifier_length: default_max_identifier_length(),
            schema: default_schema(),
        }
    }
}

impl SynthesisConfig {
    /// Validates identifier limits and the schema name.
    fn validate(&self) -> Result<(), ConfigError> {
        let lengths = MIN_IDENTIFIER_LENGTH ..= DEFAULT_MAX_IDENTIFIER_LENGTH;
        if !lengths.contains(&self.max_identifier_length) {
            return Err(ConfigError::Invalid(format!(
                "synthesis.max_identifier_length must be between {MIN_IDENTIFIER_LENGTH} and \
                 {DEFAULT_MAX_IDENTIFIER_LENGTH}"
            )));
        }
        if self.schema.trim().is_empty() {
            return Err(ConfigError::Invalid("synthesis.schema must be non-empty".to_string()));
        }
        if self.schema.len() > self.max_identifier_length {
            return Err(ConfigError::Invalid(
                "synthesis.schema exceeds max_identifier_length".to_string(),
            ));
        }
        if self.schema.contains(['.', '"']) || self.schema.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "synthesis.schema must be a bare identifier".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde default for `max_identifier_length`.
const fn default_max_identifier_length() -> usize {
    DEFAULT_MAX_IDENTIFIER_LENGTH
}

/// Serde default for `schema`.
fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// `[audit]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file when `sink = "file"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The configured store could not be opened.
    #[error("config store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn empty_config_uses_sqlite_defaults() {
        let config = EntitycoreConfig::from_toml("").unwrap();
        let sqlite = config.store.sqlite_config().unwrap();
        assert_eq!(sqlite.path, PathBuf::from(DEFAULT_SQLITE_PATH));
        assert_eq!(sqlite.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert_eq!(config.synthesis.schema, "public");
        assert_eq!(config.audit.sink, AuditSinkType::Stderr);
        assert!(config.store.postgres_config(&config.synthesis).is_err());
    }

    #[test]
    fn postgres_schema_defaults_to_the_synthesis_schema() {
        let config = EntitycoreConfig::from_toml(
            r#"
            [store]
            type = "postgres"
            connection = "postgres://localhost/entities"
            lock_timeout_ms = 250

            [synthesis]
            schema = "entities"
            "#,
        )
        .unwrap();
        let postgres = config.store.postgres_config(&config.synthesis).unwrap();
        assert_eq!(postgres.schema, "entities");
        assert_eq!(postgres.lock_timeout_ms, 250);
        assert_eq!(postgres.max_connections, 16);
        assert_eq!(config.synth_options().unwrap().schema, "entities");
    }

    #[test]
    fn path_strings_are_bounded() {
        assert!(validate_path_string("store.path", "  ").is_err());
        assert!(validate_path_string("store.path", &"a".repeat(300)).is_err());
        assert!(validate_path_string("store.path", "data/entitycore.db").is_ok());
    }
}
