/// Test utilities for myWorld
///
/// [`TestWorld`] builds an in-memory database with a small network model.
/// The fakes in [`platform`] stand in for the application services the
/// upload plugin depends on.

pub mod platform;

use myworld_core::{
    ChangeType, Database, FeatureChange, FeatureDef, FeatureRecord, FeatureView, Geometry, GetOptions, Layer,
    MemoryStore, Schema, TableId,
};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const DESIGN: &str = "design/1";

/// Install a test log subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// In-memory database holding poles, cables and companies
pub struct TestWorld {
    pub store: Arc<MemoryStore>,
    pub db: Arc<Database>,
    pub pole: Arc<FeatureDef>,
    pub cable: Arc<FeatureDef>,
    pub company: Arc<FeatureDef>,
}

impl TestWorld {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let pole = store.register(
            "myworld",
            FeatureDef::new("pole")
                .field("name", "string")
                .field("height", "double")
                .field("owner", "foreign_key(company)")
                .field("location", "point")
                .field("footprint", "polygon")
                .calculated_field("cables", "reference_set", "select(cable.pole)"),
        );
        let cable = store.register(
            "myworld",
            FeatureDef::new("cable")
                .field("name", "string")
                .field("pole", "reference")
                .field("route", "linestring"),
        );
        let company = store.register("myworld", FeatureDef::new("company").field("name", "string"));
        let db = Database::new(store.clone());

        Self {
            store,
            db,
            pole,
            cable,
            company,
        }
    }

    pub fn pole(&self, id: &str, name: &str) -> FeatureRecord {
        FeatureRecord::new(self.pole.clone(), id)
            .with_property("name", name)
            .with_geometry(Geometry::point(0.0, 0.0))
    }

    pub fn cable(&self, id: &str, pole_urn: &str) -> FeatureRecord {
        FeatureRecord::new(self.cable.clone(), id).with_property("pole", pole_urn)
    }

    pub fn company(&self, id: &str, name: &str) -> FeatureRecord {
        FeatureRecord::new(self.company.clone(), id).with_property("name", name)
    }

    pub fn live(&self) -> FeatureView {
        self.db.view("", Schema::Data)
    }

    pub fn design(&self) -> FeatureView {
        self.db.view(DESIGN, Schema::Data)
    }

    /// Write records straight into a layer, bypassing views
    pub fn seed(&self, layer: Layer, recs: Vec<FeatureRecord>) {
        for rec in recs {
            let table = TableId::new("myworld", rec.feature_type.clone(), layer.clone());
            self.store.insert(&table, rec);
        }
    }

    /// Commit changes to master through the live view
    pub async fn commit_to_master(&self, changes: Vec<FeatureChange>) -> myworld_core::Result<()> {
        self.live().apply_changes(changes).await
    }

    /// Edit a master record in the design delta
    pub async fn edit_in_design(&self, urn: &str, field: &str, value: impl Into<Value>) -> myworld_core::Result<()> {
        let design = self.design();
        let orig = design
            .get(urn, GetOptions::strict())
            .await?
            .ok_or_else(|| myworld_core::Error::Internal(format!("no record {}", urn)))?;
        let edited = orig.clone().with_property(field, value);
        design.apply_changes(vec![FeatureChange::update(edited, orig)]).await
    }

    /// Delta row as stored, with its change tag
    pub async fn delta_row(&self, feature_type: &str, id: &str) -> Option<FeatureRecord> {
        self.design()
            .versioned_table(feature_type)
            .ok()?
            .delta_table()
            .get(id)
            .await
            .ok()
            .flatten()
    }

    pub async fn delta_change(&self, feature_type: &str, id: &str) -> Option<ChangeType> {
        self.delta_row(feature_type, id).await.and_then(|rec| rec.change_type)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
