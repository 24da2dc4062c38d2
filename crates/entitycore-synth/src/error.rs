// crates/entitycore-synth/src/error.rs
// ============================================================================
// Module: Synthesis Errors
// Description: Build-time errors raised while synthesizing schema objects.
// Purpose: Make every malformed declaration fatal to the schema build.
// Dependencies: entitycore-core, thiserror
// ============================================================================

use entitycore_core::NamingError;
use entitycore_core::RegistryError;
use thiserror::Error;

/// Schema synthesis errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    /// Registry lookup or validation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Object name could not be produced.
    #[error(transparent)]
    Naming(#[from] NamingError),
    /// Search-vector declaration is unusable.
    #[error("invalid search vector for {kind}: {reason}")]
    Search {
        /// Kind name.
        kind: String,
        /// Human-readable reason.
        reason: String,
    },
    /// Versioned kinds exist but no transaction log kind is declared.
    #[error("versioned kinds require a transaction log kind")]
    MissingTransactionLog,
    /// Two synthesized objects ended up with the same name.
    #[error("duplicate synthesized object name: {0}")]
    DuplicateName(String),
}
