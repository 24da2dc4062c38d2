// crates/entitycore-store-sqlite/src/lib.rs
// ============================================================================
// Module: Entitycore SQLite Store
// Description: Embedded entity store over SQLite.
// Purpose: Run the synthesized schema and the query layer against rusqlite.
// Dependencies: crate::{session, store}
// ============================================================================

//! ## Overview
//! [`SqliteEntityStore`] applies the `SQLite` schema bundle (tables, guard
//! trigger pairs, search-document triggers, version triggers) and serves
//! writes and access-filtered reads. [`SqliteSession`] is the executor the
//! query layer runs on.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod session;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use session::SqliteSession;
pub use session::map_sqlite_error;
pub use store::DEFAULT_BUSY_TIMEOUT_MS;
pub use store::SqliteEntityStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
