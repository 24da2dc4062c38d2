// crates/entitycore-store-postgres/src/lib.rs
// ============================================================================
// Module: Entitycore Postgres Store
// Description: Pooled entity store over Postgres.
// Purpose: Run the synthesized schema and the query layer against postgres.
// Dependencies: crate::{session, store, value}
// ============================================================================

//! ## Overview
//! [`PostgresEntityStore`] applies the Postgres schema bundle under an
//! advisory lock and serves writes and access-filtered reads from an r2d2
//! pool. [`PostgresSession`] is the executor the query layer runs on;
//! [`PgValue`] carries bound values over the wire.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod session;
pub mod store;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use session::PostgresSession;
pub use session::map_postgres_error;
pub use store::MIGRATION_LOCK_KEY;
pub use store::PostgresEntityStore;
pub use store::PostgresStoreConfig;
pub use store::PostgresStoreError;
pub use value::PgValue;
pub use value::decode_row;
