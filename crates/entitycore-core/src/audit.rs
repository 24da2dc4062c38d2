// crates/entitycore-core/src/audit.rs
// ============================================================================
// Module: Store Audit Logging
// Description: Structured audit events for schema application and writes.
// Purpose: Emit JSON-line audit records without a logging framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Stores emit [`StoreAuditEvent`] records when a schema is applied, when a
//! migration lock is contended, when a guard rejects a write, and when a
//! write transaction commits. Sinks are pluggable so deployments can route
//! records to their own pipeline; the defaults write one JSON object per line
//! to stderr or to an append-only file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Audit event kinds emitted by stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreAuditKind {
    /// Synthesized schema objects were applied.
    SchemaApplied,
    /// Another migration holds the advisory lock.
    MigrationLockContended,
    /// A guard trigger rejected a write.
    AuthorizationDenied,
    /// A write transaction committed.
    WriteCommitted,
}

impl StoreAuditKind {
    /// Returns the stable event label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SchemaApplied => "schema_applied",
            Self::MigrationLockContended => "migration_lock_contended",
            Self::AuthorizationDenied => "authorization_denied",
            Self::WriteCommitted => "write_committed",
        }
    }
}

/// Store audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct StoreAuditEvent {
    /// Event identifier.
    pub event: StoreAuditKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Backend label (`sqlite`, `postgres`).
    pub backend: &'static str,
    /// Event-specific detail.
    pub detail: Value,
}

impl StoreAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(event: StoreAuditKind, backend: &'static str, detail: Value) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            backend,
            detail,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for store events.
pub trait StoreAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &StoreAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StoreAuditSink for StderrAuditSink {
    fn record(&self, event: &StoreAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl StoreAuditSink for FileAuditSink {
    fn record(&self, event: &StoreAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl StoreAuditSink for NoopAuditSink {
    fn record(&self, _event: &StoreAuditEvent) {}
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

    use serde_json::json;

    use super::*;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(&StoreAuditEvent::new(
            StoreAuditKind::SchemaApplied,
            "sqlite",
            json!({"objects": 3}),
        ));
        sink.record(&StoreAuditEvent::new(
            StoreAuditKind::AuthorizationDenied,
            "sqlite",
            json!({"table": "emodel", "field": "exemplar_morphology_id"}),
        ));
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> =
            contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "schema_applied");
        assert_eq!(lines[1]["event"], "authorization_denied");
        assert_eq!(lines[1]["detail"]["table"], "emodel");
        assert!(lines[0]["timestamp_ms"].as_u64().is_some());
    }

    #[test]
    fn kind_labels_match_serialized_form() {
        for kind in [
            StoreAuditKind::SchemaApplied,
            StoreAuditKind::MigrationLockContended,
            StoreAuditKind::AuthorizationDenied,
            StoreAuditKind::WriteCommitted,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), Value::from(kind.as_str()));
        }
    }
}
