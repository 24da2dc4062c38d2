// crates/entitycore-query/src/alias.rs
// ============================================================================
// Module: Join Aliases
// Description: Per-statement allocator of distinct table aliases.
// Purpose: Let one statement join the same kind any number of times.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Every table occurrence in a statement gets its own alias `<table>_<n>`,
//! numbered per table in allocation order. Two joins against `agent`
//! (creator and updater) become `agent_1` and `agent_2`, so neither
//! predicates nor grouping can bind to the wrong occurrence.

use std::collections::BTreeMap;

/// Allocator of unique table aliases for one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasAllocator {
    /// Last number handed out per table.
    counters: BTreeMap<String, usize>,
}

impl AliasAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    /// Returns a fresh alias for `table`.
    pub fn next(&mut self, table: &str) -> String {
        let counter = self.counters.entry(table.to_string()).or_insert(0);
        *counter += 1;
        format!("{table}_{counter}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_numbered_per_table() {
        let mut aliases = AliasAllocator::new();
        assert_eq!(aliases.next("agent"), "agent_1");
        assert_eq!(aliases.next("entity"), "entity_1");
        assert_eq!(aliases.next("agent"), "agent_2");
        let mut copy = aliases.clone();
        assert_eq!(copy.next("agent"), "agent_3");
        assert_eq!(aliases.next("agent"), "agent_3");
    }
}
