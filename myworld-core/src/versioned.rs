/// Conflict detection for one feature type of a delta
///
/// Composes the delta, base and master tables of a feature type. A delta
/// record is in conflict when master changed the record since the base
/// snapshot the delta was working from.

use std::sync::Arc;
use tracing::debug;

use crate::conflict::Conflict;
use crate::diff;
use crate::store::{FeatureStore, Layer};
use crate::table::{FeatureTable, TableKind};
use crate::types::FeatureRecord;
use crate::reference::MYWORLD;
use crate::Result;

#[derive(Clone)]
pub struct VersionedFeatureTable {
    delta_name: String,
    delta: FeatureTable,
    base: FeatureTable,
    master: FeatureTable,
}

impl VersionedFeatureTable {
    pub fn new(store: Arc<dyn FeatureStore>, feature_type: &str, delta_name: &str) -> Self {
        let table = |layer| FeatureTable::new(store.clone(), MYWORLD, feature_type, TableKind::Plain(layer));
        Self {
            delta_name: delta_name.to_string(),
            delta: table(Layer::Delta(delta_name.to_string())),
            base: table(Layer::Base(delta_name.to_string())),
            master: table(Layer::Master),
        }
    }

    pub fn delta_name(&self) -> &str {
        &self.delta_name
    }

    pub fn feature_type(&self) -> &str {
        self.delta.feature_type()
    }

    /// Raw delta rows, including delete markers
    pub fn delta_table(&self) -> &FeatureTable {
        &self.delta
    }

    pub fn base_table(&self) -> &FeatureTable {
        &self.base
    }

    pub fn master_table(&self) -> &FeatureTable {
        &self.master
    }

    /// The conflict for a delta record, if master changed it since the base snapshot
    pub async fn conflict_for(&self, delta_rec: &FeatureRecord) -> Result<Option<Conflict>> {
        let base_rec = self
            .base
            .get(&delta_rec.id)
            .await
            .map_err(|e| e.with_context("loading base record"))?;
        let master_rec = self
            .master
            .get(&delta_rec.id)
            .await
            .map_err(|e| e.with_context("loading master record"))?;

        let Some(master_change) = diff::change_type(base_rec.as_ref(), master_rec.as_ref()) else {
            return Ok(None);
        };

        debug!(
            "Conflict on {} in delta {}: master {}",
            delta_rec.urn(),
            self.delta_name,
            master_change
        );
        Ok(Some(Conflict::new(master_change, delta_rec.clone(), master_rec, base_rec)))
    }

    /// Conflicts for every record of this type in the delta, ordered by id
    pub async fn conflicts(&self) -> Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();
        for rec in self.delta.all().await? {
            if let Some(conflict) = self.conflict_for(&rec).await? {
                conflicts.push(conflict);
            }
        }
        Ok(conflicts)
    }
}
