// crates/entitycore-synth/src/lib.rs
// ============================================================================
// Module: Entitycore Synth Library
// Description: Schema, guard, search-vector, and audit synthesis.
// Purpose: Turn the kind registry into SQL objects for migration tooling.
// Dependencies: crate::{audit, bundle, dialect, error, guard, object, schema,
//               search}
// ============================================================================

//! ## Overview
//! Synthesis is pure and deterministic: a [`KindRegistry`] and a [`Dialect`]
//! in, a [`SchemaBundle`] of ordered SQL out. Nothing here touches a
//! database; stores apply [`SchemaBundle::statements`] themselves.
//!
//! [`KindRegistry`]: entitycore_core::KindRegistry

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod bundle;
pub mod dialect;
pub mod error;
pub mod guard;
pub mod object;
pub mod schema;
pub mod search;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::ACTOR_SETTING;
pub use audit::APPEND_ONLY_ERROR_CODE;
pub use audit::APPEND_ONLY_MESSAGE_PREFIX;
pub use audit::CURRENT_TRANSACTION_FUNCTION;
pub use bundle::DEFAULT_SCHEMA;
pub use bundle::SchemaBundle;
pub use bundle::SynthOptions;
pub use dialect::Dialect;
pub use dialect::TEXT_SEARCH_CATALOG;
pub use dialect::quote_ident;
pub use error::SynthError;
pub use object::DbObject;
pub use object::ObjectFamily;
pub use object::ObjectKind;
pub use schema::OPERATION_TYPE_COLUMN;
pub use schema::OperationType;
pub use schema::TRANSACTION_ID_COLUMN;
pub use schema::version_table_name;
