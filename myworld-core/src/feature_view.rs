/// Delta-scoped access to feature records
///
/// A [`Database`] owns the shared store and the write lock. Each
/// [`FeatureView`] is bound to one delta (empty for the live context) and
/// one schema, and resolves URNs, follows relationships and runs write
/// transactions within that scope.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::config::CoreConfig;
use crate::feature_change::FeatureChange;
use crate::readonly_view::ReadonlyFeatureView;
use crate::reference::{IntoReference, Reference, MYWORLD};
use crate::store::{FeatureStore, Layer};
use crate::table::{FeatureTable, TableKind};
use crate::types::{ChangeType, FeatureRecord, FieldType, Schema};
use crate::versioned::VersionedFeatureTable;
use crate::{Error, Result};

/// Options for record lookups
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Fail on malformed URNs instead of skipping them
    pub error_if_bad: bool,
}

impl GetOptions {
    pub fn strict() -> Self {
        Self { error_if_bad: true }
    }
}

/// Shared store, configuration and system-wide write lock
pub struct Database {
    store: Arc<dyn FeatureStore>,
    config: CoreConfig,
    write_lock: Arc<Mutex<()>>,
}

impl Database {
    pub fn new(store: Arc<dyn FeatureStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            config: CoreConfig::default(),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn with_config(store: Arc<dyn FeatureStore>, config: CoreConfig) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(|e| Error::Internal(format!("invalid configuration: {}", e)))?;
        Ok(Arc::new(Self {
            store,
            config,
            write_lock: Arc::new(Mutex::new(())),
        }))
    }

    pub fn store(&self) -> &Arc<dyn FeatureStore> {
        &self.store
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// A view of `delta` ("" for live data) in the given schema
    pub fn view(self: &Arc<Self>, delta: impl Into<String>, schema: Schema) -> FeatureView {
        FeatureView {
            db: self.clone(),
            delta: delta.into(),
            schema,
            in_transaction: false,
        }
    }

    /// A caching read-only view sized by `readonly_cache_size`
    pub fn readonly_view(self: &Arc<Self>, delta: impl Into<String>, schema: Schema) -> ReadonlyFeatureView {
        ReadonlyFeatureView::new(self.view(delta, schema), self.config.readonly_cache_size)
    }
}

#[derive(Clone)]
pub struct FeatureView {
    db: Arc<Database>,
    delta: String,
    schema: Schema,
    in_transaction: bool,
}

impl FeatureView {
    pub fn delta(&self) -> &str {
        &self.delta
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn is_live(&self) -> bool {
        self.delta.is_empty()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn default_datasource(&self) -> &str {
        &self.db.config.default_datasource
    }

    /// Table for a feature type.
    ///
    /// myWorld tables follow the view's delta and schema; tables of other
    /// datasources are never versioned.
    pub fn table(&self, feature_type: &str, datasource: &str) -> FeatureTable {
        let kind = if datasource != MYWORLD || self.is_live() {
            TableKind::Plain(Layer::Master)
        } else {
            match self.schema {
                Schema::Data => TableKind::Overlay(self.delta.clone()),
                Schema::Delta => TableKind::Plain(Layer::Delta(self.delta.clone())),
            }
        };
        FeatureTable::new(self.db.store.clone(), datasource, feature_type, kind)
    }

    /// Conflict-aware table for a feature type of this view's delta
    pub fn versioned_table(&self, feature_type: &str) -> Result<VersionedFeatureTable> {
        if self.is_live() {
            return Err(Error::NoDelta);
        }
        Ok(VersionedFeatureTable::new(self.db.store.clone(), feature_type, &self.delta))
    }

    pub async fn get<R: IntoReference + ?Sized>(&self, r: &R, options: GetOptions) -> Result<Option<FeatureRecord>> {
        let Some(reference) = r.to_reference(self.default_datasource(), options.error_if_bad)? else {
            return Ok(None);
        };
        Ok(self.get_recs(&[reference], options).await?.into_iter().next())
    }

    /// Resolve many references, batching lookups per feature type.
    ///
    /// Malformed URNs are skipped unless `error_if_bad` is set. A failed
    /// lookup for one feature type is logged and its records omitted.
    pub async fn get_recs<R: IntoReference>(&self, refs: &[R], options: GetOptions) -> Result<Vec<FeatureRecord>> {
        let mut groups: Vec<((String, String), Vec<String>)> = Vec::new();
        let mut group_index: HashMap<(String, String), usize> = HashMap::new();

        for r in refs {
            let Some(reference) = r.to_reference(self.default_datasource(), options.error_if_bad)? else {
                continue;
            };
            let key = (reference.datasource, reference.feature_type);
            let idx = *group_index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            let ids = &mut groups[idx].1;
            if !ids.contains(&reference.id) {
                ids.push(reference.id);
            }
        }

        let mut recs = Vec::new();
        for ((datasource, feature_type), ids) in groups {
            match self.table(&feature_type, &datasource).get_recs(&ids).await {
                Ok(found) => recs.extend(found),
                Err(e) if e.is_lookup_failure() => {
                    warn!("Lookup of {}/{} failed, skipping {} ids: {}", datasource, feature_type, ids.len(), e)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(recs)
    }

    /// Records a relationship field of `feature` points at
    pub async fn follow_relationship(&self, feature: &FeatureRecord, name: &str) -> Result<Vec<FeatureRecord>> {
        let field = feature.def.get_field(name).ok_or_else(|| Error::UnknownRelationship {
            feature_type: feature.feature_type.clone(),
            name: name.to_string(),
        })?;

        if let Some(columns) = field.select_expression() {
            return self.select_related(feature, &columns).await;
        }

        let value = feature.field_value(name);
        match &field.field_type {
            FieldType::ForeignKey(target) => match value.and_then(scalar_string) {
                Some(id) => Ok(self
                    .get(&Reference::new(target.clone(), id), GetOptions::default())
                    .await?
                    .into_iter()
                    .collect()),
                None => Ok(Vec::new()),
            },
            FieldType::Reference => match value.and_then(scalar_string) {
                Some(urn) => Ok(self.get(urn.as_str(), GetOptions::default()).await?.into_iter().collect()),
                None => Ok(Vec::new()),
            },
            FieldType::ReferenceSet => {
                let urns = value.map(urn_list).unwrap_or_default();
                self.get_recs(&urns[..], GetOptions::default()).await
            }
            _ => Err(Error::UnknownRelationship {
                feature_type: feature.feature_type.clone(),
                name: name.to_string(),
            }),
        }
    }

    /// Reverse lookup for `select(type.field, ...)`: records whose field refers to `feature`
    async fn select_related(&self, feature: &FeatureRecord, columns: &[&str]) -> Result<Vec<FeatureRecord>> {
        let mut recs = Vec::new();
        for column in columns {
            let Some((feature_type, field_name)) = column.split_once('.') else {
                warn!("Ignoring malformed select column '{}' on {}", column, feature.feature_type);
                continue;
            };

            let table = self.table(feature_type, MYWORLD);
            let def = table.def()?;
            let target = match def.get_field(field_name).map(|f| &f.field_type) {
                Some(FieldType::ForeignKey(_)) => feature.id.clone(),
                _ => feature.urn(),
            };
            recs.extend(table.query(field_name, &target).await?);
        }
        Ok(recs)
    }

    /// Run `f` inside a write transaction.
    ///
    /// Transactions are serialized through the database's write lock. On
    /// any failure of `f` or of the commit the transaction is rolled back
    /// before the error is returned. If the returned future is dropped
    /// part way, the rollback runs on a spawned task that keeps the write
    /// lock until it finishes. Called on the view handed to `f`, this joins
    /// the enclosing transaction.
    pub async fn run_in_transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(FeatureView) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.in_transaction {
            return f(self.clone()).await;
        }

        let lock = self.db.write_lock.clone().lock_owned().await;
        let store = &self.db.store;

        store.begin().await?;
        let mut guard = TransactionGuard {
            store: store.clone(),
            lock: Some(lock),
            armed: true,
        };
        debug!("Transaction started (delta '{}')", self.delta);

        let view = FeatureView {
            in_transaction: true,
            ..self.clone()
        };
        let result = match f(view).await {
            Ok(value) => store.commit().await.map(|_| value),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => debug!("Transaction committed (delta '{}')", self.delta),
            Err(e) => {
                warn!("Transaction failed, rolling back: {}", e);
                if let Err(rollback_err) = store.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
            }
        }
        guard.armed = false;

        result
    }

    /// Apply one change in this view's context.
    ///
    /// Live views write master. Delta views write the delta layer, saving
    /// the master record to the base layer the first time the delta touches it.
    /// Outside a transaction the change runs in one of its own.
    pub async fn apply_change(&self, change: &FeatureChange) -> Result<()> {
        if self.in_transaction {
            return self.write_change(change).await;
        }
        self.run_in_transaction(|view| async move { view.write_change(change).await })
            .await
    }

    /// Write one change without taking the write lock; callers hold it
    pub(crate) async fn write_change(&self, change: &FeatureChange) -> Result<()> {
        change.rec.reference().assert_myworld()?;
        let feature_type = change.rec.feature_type.as_str();
        let id = change.rec.id.as_str();

        if self.is_live() {
            let master = self.table(feature_type, MYWORLD);
            return match change.change_type {
                ChangeType::Insert | ChangeType::Update => master.put(stored(&change.rec, None)).await,
                ChangeType::Delete => master.remove(id).await,
            };
        }

        let versioned = self.versioned_table(feature_type)?;
        let existing = versioned.delta_table().get(id).await?;
        let master_rec = versioned.master_table().get(id).await?;

        if existing.is_none() {
            if let Some(master_rec) = &master_rec {
                if versioned.base_table().get(id).await?.is_none() {
                    versioned.base_table().put(master_rec.clone()).await?;
                }
            }
        }

        let inserted_in_delta = existing.as_ref().and_then(|rec| rec.change_type) == Some(ChangeType::Insert)
            || (existing.is_none() && master_rec.is_none());

        match change.change_type {
            ChangeType::Insert | ChangeType::Update => {
                let tag = if inserted_in_delta { ChangeType::Insert } else { ChangeType::Update };
                versioned.delta_table().put(stored(&change.rec, Some(tag))).await
            }
            ChangeType::Delete if inserted_in_delta => versioned.delta_table().remove(id).await,
            ChangeType::Delete => {
                versioned
                    .delta_table()
                    .put(stored(&change.rec, Some(ChangeType::Delete)))
                    .await
            }
        }
    }

    /// Apply a batch of changes atomically
    pub async fn apply_changes(&self, changes: Vec<FeatureChange>) -> Result<()> {
        self.run_in_transaction(|view| async move {
            for change in &changes {
                view.write_change(change).await?;
            }
            debug!("Applied {} changes", changes.len());
            Ok::<_, Error>(())
        })
        .await
    }
}

/// Rolls back a transaction whose future was dropped before it finished
struct TransactionGuard {
    store: Arc<dyn FeatureStore>,
    lock: Option<OwnedMutexGuard<()>>,
    armed: bool,
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let lock = self.lock.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Transaction abandoned, rolling back");
                handle.spawn(async move {
                    if let Err(e) = store.rollback().await {
                        error!("Rollback of abandoned transaction failed: {}", e);
                    }
                    drop(lock);
                });
            }
            Err(_) => error!("Transaction abandoned outside a runtime, cannot roll back"),
        }
    }
}

fn stored(rec: &FeatureRecord, change_type: Option<ChangeType>) -> FeatureRecord {
    let mut rec = rec.clone();
    rec.detached = false;
    rec.change_type = change_type;
    rec
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// URNs held by a reference_set value: a JSON list or a ';'-separated string
fn urn_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect(),
        Value::String(s) => s.split(';').filter(|u| !u.is_empty()).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store::TableId;
    use crate::types::FeatureDef;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const DELTA: &str = "design/1";

    fn setup() -> (Arc<MemoryStore>, Arc<Database>) {
        let store = Arc::new(MemoryStore::new());
        let pole = store.register(
            "myworld",
            FeatureDef::new("pole")
                .field("name", "string")
                .field("owner", "foreign_key(company)")
                .field("photo", "reference")
                .field("attachments", "reference_set")
                .field("location", "point")
                .calculated_field("cables", "reference_set", "select(cable.pole)"),
        );
        let company = store.register("myworld", FeatureDef::new("company").field("name", "string"));
        let cable = store.register("myworld", FeatureDef::new("cable").field("pole", "reference"));
        let road = store.register("gis", FeatureDef::new("road").field("name", "string"));

        let master = |ft: &str| TableId::new("myworld", ft, Layer::Master);
        store.insert(
            &master("pole"),
            FeatureRecord::new(pole.clone(), "1")
                .with_property("name", "P1")
                .with_property("owner", 5)
                .with_property("photo", "gis/road/9")
                .with_property("attachments", json!(["company/5", "cable/1", "cable/404", "bogus"])),
        );
        store.insert(&master("pole"), FeatureRecord::new(pole, "2").with_property("name", "P2"));
        store.insert(&master("company"), FeatureRecord::new(company, "5").with_property("name", "Acme"));
        store.insert(&master("cable"), FeatureRecord::new(cable.clone(), "1").with_property("pole", "pole/1"));
        store.insert(&master("cable"), FeatureRecord::new(cable.clone(), "2").with_property("pole", "pole/1"));
        store.insert(&master("cable"), FeatureRecord::new(cable, "3").with_property("pole", "pole/2"));

        let mut road_rec = FeatureRecord::new(road, "9").with_property("name", "High St");
        road_rec.datasource = "gis".to_string();
        store.insert(&TableId::new("gis", "road", Layer::Master), road_rec);

        let db = Database::new(store.clone());
        (store, db)
    }

    fn ids(recs: &[FeatureRecord]) -> Vec<String> {
        recs.iter().map(|r| r.urn()).collect()
    }

    #[tokio::test]
    async fn test_table_routing() {
        let (_, db) = setup();
        let live = db.view("", Schema::Data);
        assert_eq!(live.table("pole", MYWORLD).kind(), &TableKind::Plain(Layer::Master));

        let data = db.view(DELTA, Schema::Data);
        assert_eq!(data.table("pole", MYWORLD).kind(), &TableKind::Overlay(DELTA.into()));
        assert_eq!(data.table("road", "gis").kind(), &TableKind::Plain(Layer::Master));

        let delta = db.view(DELTA, Schema::Delta);
        assert_eq!(
            delta.table("pole", MYWORLD).kind(),
            &TableKind::Plain(Layer::Delta(DELTA.into()))
        );
        assert!(matches!(live.versioned_table("pole"), Err(Error::NoDelta)));
    }

    #[tokio::test]
    async fn test_get_recs_across_types_and_datasources() {
        let (_, db) = setup();
        let view = db.view("", Schema::Data);
        let recs = view
            .get_recs(&["pole/2", "gis/road/9", "not a urn", "pole/1", "pole/2"], GetOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&recs), vec!["pole/2", "pole/1", "gis/road/9"]);
    }

    #[tokio::test]
    async fn test_get_recs_strict_rejects_bad_urn() {
        let (_, db) = setup();
        let view = db.view("", Schema::Data);
        let err = view.get_recs(&["pole/1", "bad"], GetOptions::strict()).await.unwrap_err();
        assert_eq!(err, Error::InvalidUrn("bad".into()));
        assert!(view.get("bad", GetOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_recs_survives_failing_type() {
        let (store, db) = setup();
        store.fail_reads_for("cable");
        let view = db.view("", Schema::Data);
        let recs = view
            .get_recs(&["cable/1", "pole/1", "company/5"], GetOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&recs), vec!["pole/1", "company/5"]);
    }

    #[tokio::test]
    async fn test_follow_relationships() {
        let (_, db) = setup();
        let view = db.view("", Schema::Data);
        let pole = view.get("pole/1", GetOptions::default()).await.unwrap().unwrap();

        let owner = view.follow_relationship(&pole, "owner").await.unwrap();
        assert_eq!(ids(&owner), vec!["company/5"]);

        let photo = view.follow_relationship(&pole, "photo").await.unwrap();
        assert_eq!(ids(&photo), vec!["gis/road/9"]);

        let attachments = view.follow_relationship(&pole, "attachments").await.unwrap();
        assert_eq!(ids(&attachments), vec!["company/5", "cable/1"]);

        let cables = view.follow_relationship(&pole, "cables").await.unwrap();
        assert_eq!(ids(&cables), vec!["cable/1", "cable/2"]);
    }

    #[tokio::test]
    async fn test_follow_relationship_errors() {
        let (_, db) = setup();
        let view = db.view("", Schema::Data);
        let pole = view.get("pole/2", GetOptions::default()).await.unwrap().unwrap();

        let err = view.follow_relationship(&pole, "nope").await.unwrap_err();
        assert_eq!(
            err,
            Error::UnknownRelationship {
                feature_type: "pole".into(),
                name: "nope".into()
            }
        );
        assert!(view.follow_relationship(&pole, "name").await.is_err());
        assert!(view.follow_relationship(&pole, "owner").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let (store, db) = setup();
        let view = db.view("", Schema::Data);
        let def = store.feature_def(MYWORLD, "pole").unwrap();

        let n = view
            .run_in_transaction(|v| async move {
                v.apply_change(&FeatureChange::insert(FeatureRecord::new(def, "3"))).await?;
                Ok::<_, Error>(42)
            })
            .await
            .unwrap();

        assert_eq!(n, 42);
        assert_eq!(store.stats().commits.load(Ordering::SeqCst), 1);
        assert!(view.get("pole/3", GetOptions::default()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let (store, db) = setup();
        let view = db.view("", Schema::Data);
        let def = store.feature_def(MYWORLD, "pole").unwrap();

        let err = view
            .run_in_transaction(|v| async move {
                v.apply_change(&FeatureChange::insert(FeatureRecord::new(def, "3"))).await?;
                Err::<(), _>(Error::Internal("boom".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(err, Error::Internal("boom".into()));
        assert_eq!(store.stats().rollbacks.load(Ordering::SeqCst), 1);
        assert!(view.get("pole/3", GetOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_commit_failure() {
        let (store, db) = setup();
        store.fail_next_commit();
        let view = db.view("", Schema::Data);

        let err = view.run_in_transaction(|_| async { Ok::<_, Error>(()) }).await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(store.stats().rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let (store, db) = setup();
        let view = db.view("", Schema::Data);
        let def = store.feature_def(MYWORLD, "pole").unwrap();

        let abandoned = view.run_in_transaction(|v| async move {
            v.apply_change(&FeatureChange::insert(FeatureRecord::new(def, "3"))).await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), abandoned).await.is_err());

        view.run_in_transaction(|_| async { Ok::<_, Error>(()) }).await.unwrap();
        assert_eq!(store.stats().rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats().commits.load(Ordering::SeqCst), 1);
        assert!(view.get("pole/3", GetOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_change_waits_for_open_transaction() {
        let (store, db) = setup();
        let view = db.view("", Schema::Data);
        let def = store.feature_def(MYWORLD, "pole").unwrap();

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let failing = {
            let view = view.clone();
            let def = def.clone();
            tokio::spawn(async move {
                view.run_in_transaction(|v| async move {
                    v.apply_change(&FeatureChange::insert(FeatureRecord::new(def, "40"))).await?;
                    let _ = started_tx.send(());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<(), _>(Error::Internal("boom".into()))
                })
                .await
            })
        };
        started_rx.await.unwrap();

        view.apply_change(&FeatureChange::insert(FeatureRecord::new(def, "99")))
            .await
            .unwrap();

        assert!(failing.await.unwrap().is_err());
        assert!(view.get("pole/99", GetOptions::default()).await.unwrap().is_some());
        assert!(view.get("pole/40", GetOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delta_edits_capture_base() {
        let (store, db) = setup();
        let view = db.view(DELTA, Schema::Data);
        let pole = view.get("pole/1", GetOptions::default()).await.unwrap().unwrap();

        let edited = pole.detached_clone().with_property("name", "P1-new");
        view.apply_changes(vec![FeatureChange::update(edited.clone(), pole.clone())])
            .await
            .unwrap();

        let base = TableId::new(MYWORLD, "pole", Layer::Base(DELTA.into()));
        assert_eq!(store.len(&base), 1);

        // A second edit keeps the original base snapshot
        let again = edited.with_property("name", "P1-newer");
        view.apply_changes(vec![FeatureChange::update(again, pole)]).await.unwrap();
        let base_rec = store.get(&base, &["1".to_string()]).await.unwrap().remove(0);
        assert_eq!(base_rec.field_value("name").unwrap(), "P1");

        let seen = view.get("pole/1", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(seen.field_value("name").unwrap(), "P1-newer");
        let live = db.view("", Schema::Data).get("pole/1", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(live.field_value("name").unwrap(), "P1");

        let raw = db.view(DELTA, Schema::Delta).get("pole/1", GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(raw.change_type, Some(ChangeType::Update));
    }

    #[tokio::test]
    async fn test_delta_insert_then_delete_leaves_nothing() {
        let (store, db) = setup();
        let view = db.view(DELTA, Schema::Data);
        let def = store.feature_def(MYWORLD, "pole").unwrap();
        let rec = FeatureRecord::new(def, "77");

        view.apply_changes(vec![FeatureChange::insert(rec.clone())]).await.unwrap();
        let delta = TableId::new(MYWORLD, "pole", Layer::Delta(DELTA.into()));
        assert_eq!(store.len(&delta), 1);

        view.apply_changes(vec![FeatureChange::delete(rec)]).await.unwrap();
        assert_eq!(store.len(&delta), 0);
    }

    #[tokio::test]
    async fn test_delta_delete_hides_master_record() {
        let (_, db) = setup();
        let view = db.view(DELTA, Schema::Data);
        let pole = view.get("pole/2", GetOptions::default()).await.unwrap().unwrap();

        view.apply_changes(vec![FeatureChange::delete(pole)]).await.unwrap();
        assert!(view.get("pole/2", GetOptions::default()).await.unwrap().is_none());
        let marker = db.view(DELTA, Schema::Delta).get("pole/2", GetOptions::default()).await.unwrap().unwrap();
        assert!(marker.is_delete_marker());
    }

    #[tokio::test]
    async fn test_writes_to_foreign_datasource_rejected() {
        let (_, db) = setup();
        let view = db.view("", Schema::Data);
        let road = view.get("gis/road/9", GetOptions::default()).await.unwrap().unwrap();
        let err = view.apply_change(&FeatureChange::delete(road)).await.unwrap_err();
        assert_eq!(err, Error::WrongDatasource("gis".into()));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryStore::new());
        let config = CoreConfig::new().with_readonly_cache_size(0);
        assert!(Database::with_config(store, config).is_err());
    }
}
