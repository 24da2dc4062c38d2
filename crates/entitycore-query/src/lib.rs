// crates/entitycore-query/src/lib.rs
// ============================================================================
// Module: Entitycore Query Library
// Description: Access-filtered reads, facets, lineage, history, and writes.
// Purpose: Build every statement a store runs from the kind registry.
// Dependencies: crate::{access, alias, error, executor, facet, lineage,
//               select, value, version, write}
// ============================================================================

//! ## Overview
//! Builders here produce [`BoundQuery`] values (SQL with `$N` placeholders
//! and their values) and run them through the [`SqlExecutor`] seam that each
//! store implements. Reads are only renderable once a caller scope is
//! attached, so the access filter cannot be forgotten; writes go through
//! [`WriteTx`], which knows which columns the store manages itself.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod access;
pub mod alias;
pub mod error;
pub mod executor;
pub mod facet;
pub mod lineage;
pub mod select;
pub mod value;
pub mod version;
pub mod write;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use access::access_predicate;
pub use access::visible_ids;
pub use alias::AliasAllocator;
pub use error::QueryError;
pub use executor::SqlExecutor;
pub use facet::FacetBucket;
pub use facet::FacetEngine;
pub use facet::FacetResults;
pub use facet::FacetSpec;
pub use facet::Hop;
pub use facet::STANDARD_FACETS;
pub use lineage::Descendant;
pub use lineage::HierarchyNode;
pub use lineage::HierarchyTree;
pub use lineage::LineageQuery;
pub use select::AuthorizedSelect;
pub use select::Select;
pub use value::BoundQuery;
pub use value::Params;
pub use value::Row;
pub use value::SqlValue;
pub use version::VersionQuery;
pub use version::VersionRecord;
pub use write::MANAGED_ROOT_COLUMNS;
pub use write::WriteTx;
