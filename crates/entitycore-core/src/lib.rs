// crates/entitycore-core/src/lib.rs
// ============================================================================
// Module: Entitycore Core Library
// Description: Public API surface for the Entitycore core.
// Purpose: Expose the kind registry, authorization model, naming, and audit.
// Dependencies: crate::{authorization, audit, catalog, identifiers, interfaces,
//               kinds, naming, registry}
// ============================================================================

//! ## Overview
//! Entitycore stores scientific entities in a multi-tenant relational store
//! where every protected row is public or private to one project. This crate
//! holds the backend-agnostic pieces: kind descriptors, the validated
//! [`KindRegistry`], the two-predicate [`Authorization`] rule, the
//! [`IdentifierNamer`] used for synthesized object names, store audit sinks,
//! and the [`StoreError`] surface shared by every backend.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod authorization;
pub mod catalog;
pub mod identifiers;
pub mod interfaces;
pub mod kinds;
pub mod naming;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use audit::StoreAuditEvent;
pub use audit::StoreAuditKind;
pub use audit::StoreAuditSink;
pub use authorization::AccessScope;
pub use authorization::Authorization;
pub use authorization::AuthorizationError;
pub use authorization::GUARD_ERROR_CODE;
pub use authorization::GUARD_MESSAGE_PREFIX;
pub use authorization::GuardViolation;
pub use authorization::PROJECT_COLUMN;
pub use authorization::PUBLIC_COLUMN;
pub use catalog::STANDARD_KINDS;
pub use catalog::STANDARD_RELATIONSHIPS;
pub use identifiers::AgentId;
pub use identifiers::EntityId;
pub use identifiers::ProjectId;
pub use identifiers::TransactionId;
pub use interfaces::StoreError;
pub use interfaces::WriteIntent;
pub use kinds::ColumnDef;
pub use kinds::ColumnType;
pub use kinds::KindDescriptor;
pub use kinds::KindRole;
pub use kinds::Owner;
pub use kinds::SearchSpec;
pub use kinds::Versioning;
pub use naming::DEFAULT_MAX_IDENTIFIER_LENGTH;
pub use naming::IdentifierNamer;
pub use naming::NamingError;
pub use naming::QualifiedName;
pub use registry::AuthorizationSource;
pub use registry::GuardedReference;
pub use registry::KindRegistry;
pub use registry::RegistryError;
pub use registry::RelationshipEntry;
