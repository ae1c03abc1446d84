/// In-memory feature store
///
/// Keeps every table in a map and implements transactions by snapshotting
/// all tables on `begin`. Supports injected failures so callers can exercise
/// their error paths.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::store::{FeatureStore, TableId};
use crate::types::{FeatureDef, FeatureRecord};
use crate::{Error, Result};

type Tables = HashMap<TableId, BTreeMap<String, FeatureRecord>>;

/// Operation counters, for tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryStoreStats {
    pub gets: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

#[derive(Default)]
pub struct MemoryStore {
    defs: RwLock<HashMap<(String, String), Arc<FeatureDef>>>,
    tables: RwLock<Tables>,
    /// Table contents at `begin`, present while a transaction is open
    snapshot: Mutex<Option<Tables>>,
    failing_types: RwLock<HashSet<String>>,
    fail_next_commit: AtomicBool,
    stats: MemoryStoreStats,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature type in a datasource
    pub fn register(&self, datasource: &str, def: FeatureDef) -> Arc<FeatureDef> {
        let def = Arc::new(def);
        self.defs
            .write()
            .insert((datasource.to_string(), def.feature_type.clone()), def.clone());
        def
    }

    /// Seed a record directly, outside any transaction
    pub fn insert(&self, table: &TableId, rec: FeatureRecord) {
        self.tables
            .write()
            .entry(table.clone())
            .or_default()
            .insert(rec.id.clone(), rec);
    }

    pub fn len(&self, table: &TableId) -> usize {
        self.tables.read().get(table).map(|t| t.len()).unwrap_or(0)
    }

    /// Make every read of `feature_type` fail until cleared
    pub fn fail_reads_for(&self, feature_type: &str) {
        self.failing_types.write().insert(feature_type.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_types.write().clear();
        self.fail_next_commit.store(false, Ordering::SeqCst);
    }

    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn stats(&self) -> &MemoryStoreStats {
        &self.stats
    }

    fn check_readable(&self, table: &TableId) -> Result<()> {
        if self.failing_types.read().contains(&table.feature_type) {
            return Err(Error::Store(format!("read failed for {}", table)));
        }
        Ok(())
    }

    fn matches(value: Option<&Value>, target: &str) -> bool {
        match value {
            Some(Value::String(s)) => s == target || s.split(';').any(|part| part == target),
            Some(Value::Number(n)) => n.to_string() == target,
            Some(Value::Array(items)) => items.iter().any(|item| item.as_str() == Some(target)),
            _ => false,
        }
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    fn feature_def(&self, datasource: &str, feature_type: &str) -> Result<Arc<FeatureDef>> {
        self.defs
            .read()
            .get(&(datasource.to_string(), feature_type.to_string()))
            .cloned()
            .ok_or_else(|| Error::UnknownFeatureType(format!("{}/{}", datasource, feature_type)))
    }

    async fn get(&self, table: &TableId, ids: &[String]) -> Result<Vec<FeatureRecord>> {
        self.stats.gets.fetch_add(1, Ordering::SeqCst);
        self.check_readable(table)?;

        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn scan(&self, table: &TableId) -> Result<Vec<FeatureRecord>> {
        self.check_readable(table)?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn query(&self, table: &TableId, field: &str, value: &str) -> Result<Vec<FeatureRecord>> {
        self.check_readable(table)?;
        Ok(self
            .tables
            .read()
            .get(table)
            .map(|rows| {
                rows.values()
                    .filter(|rec| Self::matches(rec.field_value(field), value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(&self, table: &TableId, rec: FeatureRecord) -> Result<()> {
        self.insert(table, rec);
        Ok(())
    }

    async fn remove(&self, table: &TableId, id: &str) -> Result<()> {
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn begin(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock();
        if snapshot.is_some() {
            return Err(Error::Transaction("transaction already open".to_string()));
        }
        *snapshot = Some(self.tables.read().clone());
        self.stats.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if self.snapshot.lock().is_none() {
            return Err(Error::Transaction("no open transaction".to_string()));
        }
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::Store("commit failed".to_string()));
        }
        *self.snapshot.lock() = None;
        self.stats.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let snapshot = self
            .snapshot
            .lock()
            .take()
            .ok_or_else(|| Error::Transaction("no open transaction".to_string()))?;
        *self.tables.write() = snapshot;
        self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
