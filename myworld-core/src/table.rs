use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::store::{FeatureStore, Layer, TableId};
use crate::types::{FeatureDef, FeatureRecord};
use crate::Result;

/// Where a table's rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// Rows of a single layer, as stored
    Plain(Layer),
    /// The named delta's rows laid over master; delete markers hide master rows
    Overlay(String),
}

/// Accessor for one feature type of one datasource
#[derive(Clone)]
pub struct FeatureTable {
    store: Arc<dyn FeatureStore>,
    datasource: String,
    feature_type: String,
    kind: TableKind,
}

impl FeatureTable {
    pub fn new(
        store: Arc<dyn FeatureStore>,
        datasource: impl Into<String>,
        feature_type: impl Into<String>,
        kind: TableKind,
    ) -> Self {
        Self {
            store,
            datasource: datasource.into(),
            feature_type: feature_type.into(),
            kind,
        }
    }

    pub fn datasource(&self) -> &str {
        &self.datasource
    }

    pub fn feature_type(&self) -> &str {
        &self.feature_type
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    pub fn def(&self) -> Result<Arc<FeatureDef>> {
        self.store.feature_def(&self.datasource, &self.feature_type)
    }

    fn table_id(&self, layer: Layer) -> TableId {
        TableId::new(self.datasource.clone(), self.feature_type.clone(), layer)
    }

    pub async fn get(&self, id: &str) -> Result<Option<FeatureRecord>> {
        Ok(self.get_recs(&[id.to_string()]).await?.into_iter().next())
    }

    /// Records for the given ids in request order, skipping ids with no row
    pub async fn get_recs(&self, ids: &[String]) -> Result<Vec<FeatureRecord>> {
        match &self.kind {
            TableKind::Plain(layer) => self.store.get(&self.table_id(layer.clone()), ids).await,
            TableKind::Overlay(delta) => {
                let delta_rows = self
                    .store
                    .get(&self.table_id(Layer::Delta(delta.clone())), ids)
                    .await?;
                let mut by_id: HashMap<String, FeatureRecord> =
                    delta_rows.into_iter().map(|rec| (rec.id.clone(), rec)).collect();

                let missing: Vec<String> = ids.iter().filter(|id| !by_id.contains_key(*id)).cloned().collect();
                if !missing.is_empty() {
                    for rec in self.store.get(&self.table_id(Layer::Master), &missing).await? {
                        by_id.insert(rec.id.clone(), rec);
                    }
                }

                Ok(ids
                    .iter()
                    .filter_map(|id| by_id.remove(id))
                    .filter_map(as_data_record)
                    .collect())
            }
        }
    }

    /// Every visible record, ordered by id
    pub async fn all(&self) -> Result<Vec<FeatureRecord>> {
        match &self.kind {
            TableKind::Plain(layer) => self.store.scan(&self.table_id(layer.clone())).await,
            TableKind::Overlay(delta) => {
                let mut rows: BTreeMap<String, FeatureRecord> = self
                    .store
                    .scan(&self.table_id(Layer::Master))
                    .await?
                    .into_iter()
                    .map(|rec| (rec.id.clone(), rec))
                    .collect();
                for rec in self.store.scan(&self.table_id(Layer::Delta(delta.clone()))).await? {
                    rows.insert(rec.id.clone(), rec);
                }
                Ok(rows.into_values().filter_map(as_data_record).collect())
            }
        }
    }

    /// Records whose `field` holds (or lists) `value`
    pub async fn query(&self, field: &str, value: &str) -> Result<Vec<FeatureRecord>> {
        match &self.kind {
            TableKind::Plain(layer) => self.store.query(&self.table_id(layer.clone()), field, value).await,
            TableKind::Overlay(delta) => {
                let delta_table = self.table_id(Layer::Delta(delta.clone()));
                let master_hits = self.store.query(&self.table_id(Layer::Master), field, value).await?;

                // Master rows edited in the delta are judged on their delta version
                let master_ids: Vec<String> = master_hits.iter().map(|rec| rec.id.clone()).collect();
                let shadowed: HashSet<String> = self
                    .store
                    .get(&delta_table, &master_ids)
                    .await?
                    .into_iter()
                    .map(|rec| rec.id)
                    .collect();

                let mut rows: BTreeMap<String, FeatureRecord> = master_hits
                    .into_iter()
                    .filter(|rec| !shadowed.contains(&rec.id))
                    .map(|rec| (rec.id.clone(), rec))
                    .collect();
                for rec in self.store.query(&delta_table, field, value).await? {
                    rows.insert(rec.id.clone(), rec);
                }
                Ok(rows.into_values().filter_map(as_data_record).collect())
            }
        }
    }

    /// Write a row into a plain table
    pub async fn put(&self, rec: FeatureRecord) -> Result<()> {
        self.store.put(&self.write_target()?, rec).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.remove(&self.write_target()?, id).await
    }

    fn write_target(&self) -> Result<TableId> {
        match &self.kind {
            TableKind::Plain(layer) => Ok(self.table_id(layer.clone())),
            TableKind::Overlay(_) => Err(crate::Error::Internal(format!(
                "overlay table {} is not directly writable",
                self.feature_type
            ))),
        }
    }
}

/// Delete markers are hidden; surviving delta rows lose their change tag
fn as_data_record(mut rec: FeatureRecord) -> Option<FeatureRecord> {
    if rec.is_delete_marker() {
        return None;
    }
    rec.change_type = None;
    Some(rec)
}
