// crates/entitycore-query/src/access.rs
// ============================================================================
// Module: Access Filter
// Description: The read-side authorization predicate.
// Purpose: Express "public OR owned by the caller's project" in one place.
// Dependencies: entitycore-core, entitycore-synth
// ============================================================================

//! ## Overview
//! Every read path renders its authorization through these two functions:
//! [`access_predicate`] for a root row already in the statement and
//! [`visible_ids`] for a column that must point at a visible root row.
//! The predicate is always parenthesized, so it composes with any other
//! conjunct or join without changing meaning.
//!
//! Security posture: the scope is caller-supplied and trusted only as far as
//! it narrows visibility. [`AccessScope::Anonymous`] sees public rows only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use entitycore_core::AccessScope;
use entitycore_core::PROJECT_COLUMN;
use entitycore_core::PUBLIC_COLUMN;
use entitycore_synth::quote_ident;

use crate::alias::AliasAllocator;
use crate::value::Params;

// ============================================================================
// SECTION: Predicates
// ============================================================================

/// Renders the visibility predicate for the root row aliased `alias`.
pub fn access_predicate(alias: &str, scope: &AccessScope, params: &mut Params) -> String {
    let public = format!("{}.{}", quote_ident(alias), quote_ident(PUBLIC_COLUMN));
    match scope {
        AccessScope::Anonymous => format!("({public})"),
        AccessScope::Project(project) => format!(
            "({public} OR {}.{} = {})",
            quote_ident(alias),
            quote_ident(PROJECT_COLUMN),
            params.push(project)
        ),
    }
}

/// Renders `column IN (visible ids of root)`.
///
/// `column` must already be qualified and quoted.
pub fn visible_ids(
    column: &str,
    root: &str,
    scope: &AccessScope,
    aliases: &mut AliasAllocator,
    params: &mut Params,
) -> String {
    let alias = aliases.next(root);
    format!(
        "{column} IN (SELECT {}.\"id\" FROM {} AS {} WHERE {})",
        quote_ident(&alias),
        quote_ident(root),
        quote_ident(&alias),
        access_predicate(&alias, scope, params)
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
