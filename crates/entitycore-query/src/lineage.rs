// crates/entitycore-query/src/lineage.rs
// ============================================================================
// Module: Lineage Queries
// Description: Derivation edges, hierarchy trees, and recursive descendants.
// Purpose: Navigate provenance without exposing private entities.
// Dependencies: entitycore-core, serde
// ============================================================================

//! ## Overview
//! Lineage follows the `derivation` association from the used entity
//! (parent) to the generated entity (child). Every node that appears in a
//! result passes the access filter; an edge is visible only when both of
//! its endpoints are.
//!
//! [`HierarchyTree::build`] assembles the visible edges into trees. Each
//! node appears exactly once: a node with several visible parents hangs
//! under the first one in id order, and nodes only reachable through a
//! cycle are promoted to roots.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use entitycore_core::AccessScope;
use entitycore_core::EntityId;
use entitycore_core::KindRegistry;
use entitycore_core::StoreError;
use entitycore_synth::quote_ident;
use serde::Serialize;

use crate::access::access_predicate;
use crate::alias::AliasAllocator;
use crate::error::QueryError;
use crate::error::column_error;
use crate::executor::SqlExecutor;
use crate::select::qualified;
use crate::value::BoundQuery;
use crate::value::Params;
use crate::value::Row;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Association table holding derivation edges.
pub const DERIVATION_TABLE: &str = "derivation";
/// Column naming the parent (used) entity.
pub const PARENT_COLUMN: &str = "used_id";
/// Column naming the child (generated) entity.
pub const CHILD_COLUMN: &str = "generated_id";
/// Column classifying the derivation.
pub const DERIVATION_TYPE_COLUMN: &str = "derivation_type";

// ============================================================================
// SECTION: Tree
// ============================================================================

/// Node of a lineage hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyNode {
    /// Entity id.
    pub id: EntityId,
    /// Entities derived from this one, in id order.
    pub children: Vec<HierarchyNode>,
}

/// Forest of visible entities ordered from roots to leaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyTree {
    /// Nodes without a visible parent, in id order.
    pub roots: Vec<HierarchyNode>,
}

impl HierarchyTree {
    /// Builds the forest from node ids and `(parent, child)` edges.
    ///
    /// Edges with an endpoint outside `nodes` are ignored.
    #[must_use]
    pub fn build(nodes: &[EntityId], edges: &[(EntityId, EntityId)]) -> Self {
        let known: BTreeSet<EntityId> = nodes.iter().copied().collect();
        let mut children: BTreeMap<EntityId, BTreeSet<EntityId>> = BTreeMap::new();
        let mut has_parent = BTreeSet::new();
        for (parent, child) in edges {
            if parent != child && known.contains(parent) && known.contains(child) {
                children.entry(*parent).or_default().insert(*child);
                has_parent.insert(*child);
            }
        }
        let mut visited = BTreeSet::new();
        let mut roots = Vec::new();
        for id in known.iter().filter(|id| !has_parent.contains(*id)) {
            roots.push(expand(*id, &children, &mut visited));
        }
        for id in &known {
            if !visited.contains(id) {
                roots.push(expand(*id, &children, &mut visited));
            }
        }
        Self {
            roots,
        }
    }

    /// Returns the number of nodes in the forest.
    #[must_use]
    pub fn len(&self) -> usize {
        fn count(node: &HierarchyNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        self.roots.iter().map(count).sum()
    }

    /// Returns true when the forest has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Expands `id` depth-first, skipping nodes already placed.
fn expand(
    id: EntityId,
    children: &BTreeMap<EntityId, BTreeSet<EntityId>>,
    visited: &mut BTreeSet<EntityId>,
) -> HierarchyNode {
    visited.insert(id);
    let mut node = HierarchyNode {
        id,
        children: Vec::new(),
    };
    for child in children.get(&id).into_iter().flatten() {
        if !visited.contains(child) {
            node.children.push(expand(*child, children, visited));
        }
    }
    node
}

/// Entity reached from a lineage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Descendant {
    /// Entity id.
    pub id: EntityId,
    /// Shortest derivation distance from the root.
    pub depth: u32,
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Lineage reads over one entity kind and one derivation type.
#[derive(Debug, Clone)]
pub struct LineageQuery<'r> {
    /// Selected kind.
    kind: &'static str,
    /// Root table carrying authorization for the kind.
    root: &'static str,
    /// Registry the kind was resolved against.
    registry: &'r KindRegistry,
    /// Derivation type followed.
    derivation_type: String,
}

impl<'r> LineageQuery<'r> {
    /// Prepares lineage reads for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the kind is unknown or derivations cannot
    /// point at it.
    pub fn new(
        registry: &'r KindRegistry,
        kind: &str,
        derivation_type: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let descriptor = registry.kind(kind)?;
        let derivation = registry.kind(DERIVATION_TABLE)?;
        for column in [PARENT_COLUMN, CHILD_COLUMN, DERIVATION_TYPE_COLUMN] {
            if !derivation.has_column(column) {
                return Err(column_error(DERIVATION_TABLE, column, "unknown column"));
            }
        }
        let target = derivation.column(CHILD_COLUMN).and_then(|column| column.reference());
        let root = registry
            .protected_root(descriptor.name)
            .filter(|root| Some(root.name) == target)
            .ok_or_else(|| {
                column_error(descriptor.name, CHILD_COLUMN, "derivations do not reach this kind")
            })?;
        Ok(Self {
            kind: descriptor.name,
            root: root.name,
            registry,
            derivation_type: derivation_type.into(),
        })
    }

    /// Returns the registry the kind was resolved against.
    #[must_use]
    pub const fn registry(&self) -> &'r KindRegistry {
        self.registry
    }

    /// Renders the visible node ids of the kind.
    #[must_use]
    pub fn nodes_query(&self, scope: &AccessScope) -> BoundQuery {
        let mut aliases = AliasAllocator::new();
        let mut params = Params::new();
        let kind = aliases.next(self.kind);
        let root = aliases.next(self.root);
        let from = self.kind_with_root(&kind, &root);
        let predicate = access_predicate(self.visible_alias(&kind, &root), scope, &mut params);
        params.bind(format!(
            "SELECT {} AS \"id\" {from} WHERE {predicate} ORDER BY \"id\"",
            qualified(&kind, "id")
        ))
    }

    /// Renders the visible `(parent_id, child_id)` edges.
    #[must_use]
    pub fn edges_query(&self, scope: &AccessScope) -> BoundQuery {
        let mut aliases = AliasAllocator::new();
        let mut params = Params::new();
        let edge = aliases.next(DERIVATION_TABLE);
        let mut from = format!("FROM {} AS {}", quote_ident(DERIVATION_TABLE), quote_ident(&edge));
        let derivation_type = params.push(self.derivation_type.as_str());
        let mut conditions =
            vec![format!("{} = {derivation_type}", qualified(&edge, DERIVATION_TYPE_COLUMN))];
        for column in [PARENT_COLUMN, CHILD_COLUMN] {
            let kind = aliases.next(self.kind);
            let root = aliases.next(self.root);
            from.push_str(&format!(
                " JOIN {} AS {} ON {} = {}",
                quote_ident(self.kind),
                quote_ident(&kind),
                qualified(&kind, "id"),
                qualified(&edge, column)
            ));
            if self.kind != self.root {
                from.push_str(&format!(
                    " JOIN {} AS {} ON {} = {}",
                    quote_ident(self.root),
                    quote_ident(&root),
                    qualified(&root, "id"),
                    qualified(&kind, "id")
                ));
            }
            let visible = if self.kind == self.root { kind } else { root };
            conditions.push(access_predicate(&visible, scope, &mut params));
        }
        params.bind(format!(
            "SELECT {} AS \"parent_id\", {} AS \"child_id\" {from} WHERE {} \
             ORDER BY \"parent_id\", \"child_id\"",
            qualified(&edge, PARENT_COLUMN),
            qualified(&edge, CHILD_COLUMN),
            conditions.join(" AND ")
        ))
    }

    /// Renders the recursive descendants query rooted at `root`.
    ///
    /// The root itself must be visible; each step only follows edges into
    /// visible entities of the kind, up to `max_depth` derivations.
    #[must_use]
    pub fn descendants_query(
        &self,
        scope: &AccessScope,
        root: EntityId,
        max_depth: u32,
    ) -> BoundQuery {
        let mut aliases = AliasAllocator::new();
        let mut params = Params::new();
        let start_kind = aliases.next(self.kind);
        let start_root = aliases.next(self.root);
        let seed = format!(
            "SELECT {}, 0 {} WHERE {} = {} AND {}",
            qualified(&start_kind, "id"),
            self.kind_with_root(&start_kind, &start_root),
            qualified(&start_kind, "id"),
            params.push(root.get()),
            access_predicate(self.visible_alias(&start_kind, &start_root), scope, &mut params)
        );
        let edge = aliases.next(DERIVATION_TABLE);
        let step_kind = aliases.next(self.kind);
        let step_root = aliases.next(self.root);
        let mut step = format!(
            "SELECT {}, \"lineage\".\"depth\" + 1 FROM \"lineage\" JOIN {} AS {} ON {} = \
             \"lineage\".\"id\" JOIN {} AS {} ON {} = {}",
            qualified(&edge, CHILD_COLUMN),
            quote_ident(DERIVATION_TABLE),
            quote_ident(&edge),
            qualified(&edge, PARENT_COLUMN),
            quote_ident(self.kind),
            quote_ident(&step_kind),
            qualified(&step_kind, "id"),
            qualified(&edge, CHILD_COLUMN)
        );
        if self.kind != self.root {
            step.push_str(&format!(
                " JOIN {} AS {} ON {} = {}",
                quote_ident(self.root),
                quote_ident(&step_root),
                qualified(&step_root, "id"),
                qualified(&step_kind, "id")
            ));
        }
        step.push_str(&format!(
            " WHERE {} = {} AND {} AND \"lineage\".\"depth\" < {}",
            qualified(&edge, DERIVATION_TYPE_COLUMN),
            params.push(self.derivation_type.as_str()),
            access_predicate(self.visible_alias(&step_kind, &step_root), scope, &mut params),
            params.push(i64::from(max_depth))
        ));
        params.bind(format!(
            "WITH RECURSIVE \"lineage\"(\"id\", \"depth\") AS ({seed} UNION ALL {step}) SELECT \
             \"id\", MIN(\"depth\") AS \"depth\" FROM \"lineage\" WHERE \"depth\" > 0 GROUP BY \
             \"id\" ORDER BY \"depth\", \"id\""
        ))
    }

    /// Reads the visible hierarchy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a query fails or rows are malformed.
    pub fn tree<E: SqlExecutor + ?Sized>(
        &self,
        executor: &mut E,
        scope: &AccessScope,
    ) -> Result<HierarchyTree, StoreError> {
        let nodes = executor
            .query(&self.nodes_query(scope))?
            .iter()
            .map(|row| row.require_int("id").map(EntityId::new))
            .collect::<Result<Vec<_>, QueryError>>()?;
        let edges = executor
            .query(&self.edges_query(scope))?
            .iter()
            .map(|row| -> Result<_, QueryError> {
                let parent = EntityId::new(row.require_int("parent_id")?);
                Ok((parent, EntityId::new(row.require_int("child_id")?)))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;
        Ok(HierarchyTree::build(&nodes, &edges))
    }

    /// Reads the visible descendants of `root`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails or rows are malformed.
    pub fn descendants<E: SqlExecutor + ?Sized>(
        &self,
        executor: &mut E,
        scope: &AccessScope,
        root: EntityId,
        max_depth: u32,
    ) -> Result<Vec<Descendant>, StoreError> {
        let rows = executor.query(&self.descendants_query(scope, root, max_depth))?;
        Ok(rows.iter().map(decode_descendant).collect::<Result<Vec<_>, QueryError>>()?)
    }

    /// Renders `FROM kind [JOIN root]`.
    fn kind_with_root(&self, kind: &str, root: &str) -> String {
        let mut from = format!("FROM {} AS {}", quote_ident(self.kind), quote_ident(kind));
        if self.kind != self.root {
            from.push_str(&format!(
                " JOIN {} AS {} ON {} = {}",
                quote_ident(self.root),
                quote_ident(root),
                qualified(root, "id"),
                qualified(kind, "id")
            ));
        }
        from
    }

    /// Returns the alias carrying authorization columns.
    fn visible_alias<'a>(&self, kind: &'a str, root: &'a str) -> &'a str {
        if self.kind == self.root { kind } else { root }
    }
}

/// Decodes one descendants row.
fn decode_descendant(row: &Row) -> Result<Descendant, QueryError> {
    let depth = row.require_int("depth")?;
    Ok(Descendant {
        id: EntityId::new(row.require_int("id")?),
        depth: u32::try_from(depth)
            .map_err(|_| QueryError::Decode(format!("invalid depth {depth}")))?,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
