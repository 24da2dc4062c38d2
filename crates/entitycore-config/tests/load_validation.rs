//! Config load validation tests for entitycore-config.
// crates/entitycore-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and section rules.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use entitycore_config::ConfigError;
use entitycore_config::EntityStore;
use entitycore_config::EntitycoreConfig;
use entitycore_core::KindRegistry;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<EntitycoreConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(
        EntitycoreConfig::load(Some(Path::new(&long_path))),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        EntitycoreConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_identifier_limits_out_of_range() -> TestResult {
    for length in [8, 64] {
        let file = write_config(&format!("[synthesis]\nmax_identifier_length = {length}\n"))?;
        assert_invalid(
            EntitycoreConfig::load(Some(file.path())),
            "max_identifier_length must be between",
        )?;
    }
    Ok(())
}

#[test]
fn load_rejects_mixed_backend_keys() -> TestResult {
    let file = write_config(
        r#"[store]
type = "sqlite"
path = "db.sqlite"
connection = "postgres://x"
"#,
    )?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "must not set postgres keys")?;
    let file = write_config(
        r#"[store]
type = "postgres"
connection = "postgres://x"
path = "db.sqlite"
"#,
    )?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "must not set sqlite keys")
}

#[test]
fn load_rejects_postgres_without_connection() -> TestResult {
    let file = write_config("[store]\ntype = \"postgres\"\n")?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "postgres store requires connection")
}

#[test]
fn load_rejects_store_schema_differing_from_synthesis() -> TestResult {
    let file = write_config(
        r#"[store]
type = "postgres"
connection = "postgres://x"
schema = "other"

[synthesis]
schema = "entities"
"#,
    )?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "must match synthesis.schema")
}

#[test]
fn load_rejects_file_sink_without_path() -> TestResult {
    let file = write_config("[audit]\nsink = \"file\"\n")?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "file audit sink requires path")?;
    let file = write_config("[audit]\nsink = \"none\"\npath = \"audit.log\"\n")?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "only valid for the file sink")
}

#[test]
fn load_rejects_unknown_backend() -> TestResult {
    let file = write_config("[store]\ntype = \"mysql\"\n")?;
    assert_invalid(EntitycoreConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn configured_sqlite_store_opens_and_migrates() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let db = dir.path().join("entities.db");
    let audit = dir.path().join("audit.jsonl");
    let file = write_config(&format!(
        r#"[store]
type = "sqlite"
path = {:?}
journal_mode = "delete"

[audit]
sink = "file"
path = {:?}
"#,
        db.to_string_lossy(),
        audit.to_string_lossy()
    ))?;
    let config = EntitycoreConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let registry = Arc::new(KindRegistry::standard().map_err(|err| err.to_string())?);
    let store = config.open_store(registry).map_err(|err| err.to_string())?;
    if !matches!(store, EntityStore::Sqlite(_)) {
        return Err("expected sqlite store".to_string());
    }
    store.apply_schema().map_err(|err| err.to_string())?;
    let log = std::fs::read_to_string(&audit).map_err(|err| err.to_string())?;
    if !log.contains("schema_applied") {
        return Err(format!("audit log missing schema_applied: {log}"));
    }
    Ok(())
}
