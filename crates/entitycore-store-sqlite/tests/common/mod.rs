// crates/entitycore-store-sqlite/tests/common/mod.rs
// ============================================================================
// Module: SQLite Store Test Fixtures
// Description: Seeded in-memory stores and a recording audit sink.
// Purpose: Share setup between the store test binaries.
// ============================================================================

#![allow(dead_code, reason = "Each test binary uses a different subset of the fixtures.")]

use std::sync::Arc;
use std::sync::Mutex;

use entitycore_core::AccessScope;
use entitycore_core::AgentId;
use entitycore_core::Authorization;
use entitycore_core::EntityId;
use entitycore_core::KindRegistry;
use entitycore_core::ProjectId;
use entitycore_core::StoreAuditEvent;
use entitycore_core::StoreAuditKind;
use entitycore_core::StoreAuditSink;
use entitycore_core::StoreError;
use entitycore_core::WriteIntent;
use entitycore_query::SqlValue;
use entitycore_store_sqlite::SqliteEntityStore;
use entitycore_synth::SynthOptions;

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Sink keeping every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StoreAuditEvent>>,
}

impl RecordingSink {
    pub fn kinds(&self) -> Vec<StoreAuditKind> {
        self.events.lock().unwrap().iter().map(|event| event.event).collect()
    }

    pub fn events(&self) -> Vec<StoreAuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl StoreAuditSink for RecordingSink {
    fn record(&self, event: &StoreAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Scopes
// ============================================================================

pub fn public() -> Authorization {
    Authorization::public(None)
}

pub fn private(project: &str) -> Authorization {
    Authorization::private(ProjectId::new(project))
}

pub fn project(project: &str) -> AccessScope {
    AccessScope::Project(ProjectId::new(project))
}

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// In-memory store with reference data in place.
pub struct Fixture {
    pub store: SqliteEntityStore,
    pub audit: Arc<RecordingSink>,
    pub agent: AgentId,
    pub region: i64,
    pub other_region: i64,
    pub species: i64,
}

pub fn fixture() -> Fixture {
    let audit = Arc::new(RecordingSink::default());
    let registry = Arc::new(KindRegistry::standard().expect("standard registry"));
    let store = SqliteEntityStore::open_in_memory(registry, SynthOptions::default(), audit.clone())
        .expect("open in-memory store");
    store.apply_schema().expect("apply schema");
    seed(store, audit)
}

/// Inserts an agent, two brain regions, and a species.
pub fn seed(store: SqliteEntityStore, audit: Arc<RecordingSink>) -> Fixture {
    let (agent, region, other_region, species) = store
        .write(None, |tx| {
            let agent = tx.insert_row(
                "agent",
                &[("type", "person".into()), ("pref_label", "Ada Lovelace".into())],
            )?;
            let region = tx.insert_row(
                "brain_region",
                &[("name", "Isocortex".into()), ("acronym", "CTX".into())],
            )?;
            let other_region = tx.insert_row(
                "brain_region",
                &[("name", "Thalamus".into()), ("acronym", "TH".into())],
            )?;
            let species = tx.insert_row("species", &[("name", "Mus musculus".into())])?;
            Ok((AgentId::new(agent), region, other_region, species))
        })
        .expect("seed reference data");
    Fixture {
        store,
        audit,
        agent,
        region,
        other_region,
        species,
    }
}

impl Fixture {
    pub fn intent(&self, authorization: Authorization) -> WriteIntent {
        WriteIntent::new(Some(self.agent), authorization)
    }

    pub fn morphology(
        &self,
        authorization: Authorization,
        name: &str,
    ) -> Result<EntityId, StoreError> {
        self.store.create_entity(
            "reconstruction_morphology",
            &self.intent(authorization),
            &[
                ("name", name.into()),
                ("description", format!("{name} reconstruction").into()),
                ("brain_region_id", self.region.into()),
            ],
        )
    }

    pub fn emodel(
        &self,
        authorization: Authorization,
        name: &str,
        region: i64,
        exemplar: Option<EntityId>,
    ) -> Result<EntityId, StoreError> {
        self.store.create_entity(
            "emodel",
            &self.intent(authorization),
            &[
                ("name", name.into()),
                ("description", format!("{name} electrical model").into()),
                ("brain_region_id", region.into()),
                ("exemplar_morphology_id", SqlValue::from(exemplar)),
            ],
        )
    }

    pub fn circuit(
        &self,
        authorization: Authorization,
        name: &str,
    ) -> Result<EntityId, StoreError> {
        self.store.create_entity(
            "circuit",
            &self.intent(authorization),
            &[
                ("name", name.into()),
                ("description", format!("{name} circuit").into()),
                ("brain_region_id", self.region.into()),
            ],
        )
    }

    /// Number of transaction-log rows.
    pub fn transactions(&self) -> u64 {
        let select = self.store.select("transaction").unwrap().authorize(AccessScope::Anonymous);
        self.store.count(&select).unwrap()
    }
}
