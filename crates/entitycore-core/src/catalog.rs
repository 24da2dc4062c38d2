// crates/entitycore-core/src/catalog.rs
// ============================================================================
// Module: Standard Catalog
// Description: Statically declared kinds and guarded relationships.
// Purpose: Single source for the schema, guards, versioning, and search.
// Dependencies: crate::kinds, crate::registry
// ============================================================================

//! ## Overview
//! Kinds are listed in dependency order: every referenced kind is declared
//! before the kinds referencing it (self references excepted). The guarded
//! relationship table is written out by hand and diffed against the foreign
//! keys in the schema by the completeness tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::kinds::ColumnDef;
use crate::kinds::ColumnType;
use crate::kinds::KindDescriptor;
use crate::kinds::KindRole;
use crate::kinds::Owner;
use crate::kinds::SearchSpec;
use crate::kinds::Versioning;
use crate::registry::RelationshipEntry;

// ============================================================================
// SECTION: Shared Column Sets
// ============================================================================

/// Columns of a protected root table (`entity`, `activity`).
const ROOT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::required("id", ColumnType::Key),
    ColumnDef::required("type", ColumnType::Text),
    ColumnDef::required("authorized_public", ColumnType::Bool),
    ColumnDef::optional("authorized_project_id", ColumnType::Text),
    ColumnDef::optional("created_by_id", ColumnType::Reference("agent")),
    ColumnDef::optional("updated_by_id", ColumnType::Reference("agent")),
    ColumnDef::required("creation_date", ColumnType::Timestamp),
    ColumnDef::required("update_date", ColumnType::Timestamp),
];

/// Source fields of every entity search document.
const NAME_AND_DESCRIPTION: &[&str] = &["name", "description"];

// ============================================================================
// SECTION: Kinds
// ============================================================================

/// Standard kinds in dependency order.
pub const STANDARD_KINDS: &[KindDescriptor] = &[
    KindDescriptor {
        name: "agent",
        role: KindRole::Global,
        base: None,
        owner: Owner::None,
        versioning: Versioning::Enabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("type", ColumnType::Text),
            ColumnDef::required("pref_label", ColumnType::Text),
            ColumnDef::required("creation_date", ColumnType::Timestamp),
        ],
        search: None,
    },
    KindDescriptor {
        name: "transaction",
        role: KindRole::TransactionLog,
        base: None,
        owner: Owner::None,
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::optional("native_tx_id", ColumnType::Int).unique(),
            ColumnDef::optional("actor_id", ColumnType::Reference("agent")),
            ColumnDef::required("issued_at", ColumnType::Timestamp),
        ],
        search: None,
    },
    KindDescriptor {
        name: "brain_region",
        role: KindRole::Global,
        base: None,
        owner: Owner::None,
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("acronym", ColumnType::Text).unique(),
        ],
        search: None,
    },
    KindDescriptor {
        name: "species",
        role: KindRole::Global,
        base: None,
        owner: Owner::None,
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text).unique(),
        ],
        search: None,
    },
    KindDescriptor {
        name: "mtype_class",
        role: KindRole::Global,
        base: None,
        owner: Owner::None,
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("pref_label", ColumnType::Text).unique(),
        ],
        search: None,
    },
    KindDescriptor {
        name: "entity",
        role: KindRole::Entity,
        base: None,
        owner: Owner::Itself,
        versioning: Versioning::Enabled,
        columns: ROOT_COLUMNS,
        search: None,
    },
    KindDescriptor {
        name: "activity",
        role: KindRole::Activity,
        base: None,
        owner: Owner::Itself,
        versioning: Versioning::Enabled,
        columns: ROOT_COLUMNS,
        search: None,
    },
    KindDescriptor {
        name: "reconstruction_morphology",
        role: KindRole::Entity,
        base: Some("entity"),
        owner: Owner::Itself,
        versioning: Versioning::Inherit,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("description", ColumnType::Text),
            ColumnDef::required("brain_region_id", ColumnType::Reference("brain_region")),
            ColumnDef::optional("species_id", ColumnType::Reference("species")),
            ColumnDef::optional("morphology_description_vector", ColumnType::SearchDocument),
        ],
        search: Some(SearchSpec {
            column: "morphology_description_vector",
            sources: NAME_AND_DESCRIPTION,
        }),
    },
    KindDescriptor {
        name: "emodel",
        role: KindRole::Entity,
        base: Some("entity"),
        owner: Owner::Itself,
        versioning: Versioning::Inherit,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("description", ColumnType::Text),
            ColumnDef::required("brain_region_id", ColumnType::Reference("brain_region")),
            ColumnDef::optional("species_id", ColumnType::Reference("species")),
            ColumnDef::optional(
                "exemplar_morphology_id",
                ColumnType::Reference("reconstruction_morphology"),
            ),
            ColumnDef::optional("description_vector", ColumnType::SearchDocument),
        ],
        search: Some(SearchSpec {
            column: "description_vector",
            sources: NAME_AND_DESCRIPTION,
        }),
    },
    KindDescriptor {
        name: "memodel",
        role: KindRole::Entity,
        base: Some("entity"),
        owner: Owner::Itself,
        versioning: Versioning::Inherit,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("description", ColumnType::Text),
            ColumnDef::required("brain_region_id", ColumnType::Reference("brain_region")),
            ColumnDef::required("emodel_id", ColumnType::Reference("emodel")),
            ColumnDef::required(
                "morphology_id",
                ColumnType::Reference("reconstruction_morphology"),
            ),
            ColumnDef::optional("description_vector", ColumnType::SearchDocument),
        ],
        search: Some(SearchSpec {
            column: "description_vector",
            sources: NAME_AND_DESCRIPTION,
        }),
    },
    KindDescriptor {
        name: "single_neuron_simulation",
        role: KindRole::Entity,
        base: Some("entity"),
        owner: Owner::Itself,
        versioning: Versioning::Inherit,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("description", ColumnType::Text),
            ColumnDef::required("brain_region_id", ColumnType::Reference("brain_region")),
            ColumnDef::required("me_model_id", ColumnType::Reference("memodel")),
            ColumnDef::optional("description_vector", ColumnType::SearchDocument),
        ],
        search: Some(SearchSpec {
            column: "description_vector",
            sources: NAME_AND_DESCRIPTION,
        }),
    },
    KindDescriptor {
        name: "circuit",
        role: KindRole::Entity,
        base: Some("entity"),
        owner: Owner::Itself,
        versioning: Versioning::Inherit,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("description", ColumnType::Text),
            ColumnDef::required("brain_region_id", ColumnType::Reference("brain_region")),
            ColumnDef::optional("species_id", ColumnType::Reference("species")),
            ColumnDef::optional("root_circuit_id", ColumnType::Reference("circuit")),
            ColumnDef::optional("description_vector", ColumnType::SearchDocument),
        ],
        search: Some(SearchSpec {
            column: "description_vector",
            sources: NAME_AND_DESCRIPTION,
        }),
    },
    KindDescriptor {
        name: "validation_result",
        role: KindRole::Entity,
        base: Some("entity"),
        owner: Owner::Itself,
        versioning: Versioning::Excluded,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("name", ColumnType::Text),
            ColumnDef::required("passed", ColumnType::Bool),
            ColumnDef::required("validated_entity_id", ColumnType::Reference("entity")),
        ],
        search: None,
    },
    KindDescriptor {
        name: "simulation_execution",
        role: KindRole::Activity,
        base: Some("activity"),
        owner: Owner::Itself,
        versioning: Versioning::Inherit,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("status", ColumnType::Text),
        ],
        search: None,
    },
    KindDescriptor {
        name: "usage",
        role: KindRole::Association,
        base: None,
        owner: Owner::Column("usage_activity_id"),
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("usage_entity_id", ColumnType::Reference("entity")),
            ColumnDef::required("usage_activity_id", ColumnType::Reference("activity")),
        ],
        search: None,
    },
    KindDescriptor {
        name: "generation",
        role: KindRole::Association,
        base: None,
        owner: Owner::Column("generation_activity_id"),
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("generation_entity_id", ColumnType::Reference("entity")),
            ColumnDef::required("generation_activity_id", ColumnType::Reference("activity")),
        ],
        search: None,
    },
    KindDescriptor {
        name: "derivation",
        role: KindRole::Association,
        base: None,
        owner: Owner::Column("generated_id"),
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("used_id", ColumnType::Reference("entity")),
            ColumnDef::required("generated_id", ColumnType::Reference("entity")),
            ColumnDef::required("derivation_type", ColumnType::Text),
        ],
        search: None,
    },
    KindDescriptor {
        name: "contribution",
        role: KindRole::Association,
        base: None,
        owner: Owner::Column("entity_id"),
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("agent_id", ColumnType::Reference("agent")),
            ColumnDef::required("entity_id", ColumnType::Reference("entity")),
            ColumnDef::required("role", ColumnType::Text),
        ],
        search: None,
    },
    KindDescriptor {
        name: "mtype_classification",
        role: KindRole::Association,
        base: None,
        owner: Owner::Column("entity_id"),
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("entity_id", ColumnType::Reference("entity")),
            ColumnDef::required("mtype_class_id", ColumnType::Reference("mtype_class")),
        ],
        search: None,
    },
    KindDescriptor {
        name: "asset",
        role: KindRole::Dependent,
        base: None,
        owner: Owner::Column("entity_id"),
        versioning: Versioning::Disabled,
        columns: &[
            ColumnDef::required("id", ColumnType::Key),
            ColumnDef::required("entity_id", ColumnType::Reference("entity")),
            ColumnDef::required("path", ColumnType::Text),
            ColumnDef::required("content_type", ColumnType::Text),
        ],
        search: None,
    },
];

// ============================================================================
// SECTION: Guarded Relationships
// ============================================================================

/// Foreign keys pointing from one protected row to another.
pub const STANDARD_RELATIONSHIPS: &[RelationshipEntry] = &[
    RelationshipEntry::new("emodel", "exemplar_morphology_id"),
    RelationshipEntry::new("memodel", "emodel_id"),
    RelationshipEntry::new("memodel", "morphology_id"),
    RelationshipEntry::new("single_neuron_simulation", "me_model_id"),
    RelationshipEntry::new("circuit", "root_circuit_id"),
    RelationshipEntry::new("validation_result", "validated_entity_id"),
    RelationshipEntry::new("usage", "usage_entity_id"),
    RelationshipEntry::new("generation", "generation_entity_id"),
    RelationshipEntry::new("derivation", "used_id"),
];
