// crates/entitycore-core/src/naming.rs
// ============================================================================
// Module: Identifier Namer
// Description: Deterministic, length-bounded database object names.
// Purpose: Keep synthesized names under the target identifier limit.
// Dependencies: sha2, thiserror
// ============================================================================

//! ## Overview
//! Names that already fit are returned unchanged. Longer names are truncated
//! and suffixed with `_` plus the first eight hex characters of the SHA-256
//! digest of the full name, so two long names sharing a prefix still map to
//! different identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Postgres identifier limit (`NAMEDATALEN - 1`).
pub const DEFAULT_MAX_IDENTIFIER_LENGTH: usize = 63;
/// Hex characters of digest appended to shortened names.
pub const DIGEST_HEX_LENGTH: usize = 8;
/// Minimum accepted name length.
pub const MIN_NAME_LENGTH: usize = 1;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier naming errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// Name shorter than [`MIN_NAME_LENGTH`].
    #[error("identifier must be at least {MIN_NAME_LENGTH} character")]
    TooShort,
    /// Name contains characters that break qualification or quoting.
    #[error("identifier {0:?} contains characters outside [A-Za-z0-9_]")]
    InvalidCharacters(String),
    /// Maximum length leaves no room for a digest suffix.
    #[error("max identifier length {0} is too small to shorten names")]
    LimitTooSmall(usize),
    /// Qualified name could not be split back into schema and object.
    #[error("qualified identifier {0:?} cannot be parsed")]
    Unqualifiable(String),
}

// ============================================================================
// SECTION: Namer
// ============================================================================

/// Deterministic generator of length-bounded identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierNamer {
    /// Hard maximum identifier length in bytes.
    max_length: usize,
}

impl Default for IdentifierNamer {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_IDENTIFIER_LENGTH,
        }
    }
}

impl IdentifierNamer {
    /// Creates a namer bounded by `max_length` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::LimitTooSmall`] when the limit cannot hold a
    /// one-character prefix, the separator, and the digest.
    pub const fn new(max_length: usize) -> Result<Self, NamingError> {
        if max_length < DIGEST_HEX_LENGTH + 2 {
            return Err(NamingError::LimitTooSmall(max_length));
        }
        Ok(Self {
            max_length,
        })
    }

    /// Returns the configured maximum length.
    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    /// Returns a name that fits the limit for `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError`] when `desired` is empty or contains characters
    /// other than ASCII letters, digits, and underscores.
    pub fn name(&self, desired: &str) -> Result<String, NamingError> {
        validate_name(desired)?;
        if desired.len() <= self.max_length {
            return Ok(desired.to_string());
        }
        let digest = short_digest(desired);
        let keep = self.max_length - DIGEST_HEX_LENGTH - 1;
        Ok(format!("{}_{digest}", &desired[..keep]))
    }

    /// Names `desired` and qualifies it with `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError`] when either part is invalid or the qualified
    /// form does not parse back into the same parts.
    pub fn qualify(&self, schema: &str, desired: &str) -> Result<QualifiedName, NamingError> {
        validate_name(schema)?;
        let name = self.name(desired)?;
        let qualified = QualifiedName {
            schema: schema.to_string(),
            name,
        };
        let rendered = qualified.to_string();
        let parsed = QualifiedName::parse(&rendered)?;
        if parsed != qualified {
            return Err(NamingError::Unqualifiable(rendered));
        }
        Ok(qualified)
    }
}

/// Schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    /// Schema part.
    pub schema: String,
    /// Object part (already length-bounded).
    pub name: String,
}

impl QualifiedName {
    /// Parses `schema.name`.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::Unqualifiable`] unless the input is exactly two
    /// valid identifiers joined by a single dot.
    pub fn parse(value: &str) -> Result<Self, NamingError> {
        let (schema, name) =
            value.split_once('.').ok_or_else(|| NamingError::Unqualifiable(value.to_string()))?;
        if validate_name(schema).is_err() || validate_name(name).is_err() {
            return Err(NamingError::Unqualifiable(value.to_string()));
        }
        Ok(Self {
            schema: schema.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects empty names and names outside the identifier alphabet.
fn validate_name(value: &str) -> Result<(), NamingError> {
    if value.len() < MIN_NAME_LENGTH {
        return Err(NamingError::TooShort);
    }
    if !value.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'_') {
        return Err(NamingError::InvalidCharacters(value.to_string()));
    }
    Ok(())
}

/// Returns the leading hex characters of the SHA-256 digest of `value`.
fn short_digest(value: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let digest = Sha256::digest(value.as_bytes());
    let mut out = String::with_capacity(DIGEST_HEX_LENGTH);
    for byte in digest.iter().take(DIGEST_HEX_LENGTH / 2) {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
