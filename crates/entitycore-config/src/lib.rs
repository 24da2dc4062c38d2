// crates/entitycore-config/src/lib.rs
// ============================================================================
// Module: Entitycore Config Library
// Description: Canonical configuration model and validation.
// Purpose: Single source of truth for entitycore.toml semantics.
// Dependencies: entitycore-core, entitycore-store-*, entitycore-synth, serde,
//               toml
// ============================================================================

//! ## Overview
//! `entitycore-config` reads `entitycore.toml`, rejects anything
//! inconsistent, and turns the result into [`entitycore_synth::SynthOptions`],
//! an audit sink, and an opened [`EntityStore`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditSinkType;
pub use config::ConfigError;
pub use config::EntityStore;
pub use config::EntitycoreConfig;
pub use config::MIN_IDENTIFIER_LENGTH;
pub use config::StoreConfig;
pub use config::StoreType;
pub use config::SynthesisConfig;
