/// Built-in upload tasks
///
/// [`ExportDeltaTask`] reads the edits recorded in a delta and hands them to
/// a [`ChangeSink`], one feature type at a time.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use myworld_core::{ChangeType, Database, FeatureChange, FeatureChangeDefinition, Schema};

use crate::engine::{SyncTask, TaskContext};
use crate::error::SyncError;

/// Destination of exported changes
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn send_changes(
        &self,
        delta: &str,
        feature_type: &str,
        changes: Vec<FeatureChangeDefinition>,
    ) -> Result<(), SyncError>;
}

pub struct ExportDeltaTask {
    db: Arc<Database>,
    delta: String,
    feature_types: Vec<String>,
    sink: Arc<dyn ChangeSink>,
}

impl ExportDeltaTask {
    pub fn new(
        db: Arc<Database>,
        delta: impl Into<String>,
        feature_types: Vec<String>,
        sink: Arc<dyn ChangeSink>,
    ) -> Self {
        Self {
            db,
            delta: delta.into(),
            feature_types,
            sink,
        }
    }

    /// Changes recorded in the delta for one feature type, ordered by id
    pub async fn collect_changes(&self, feature_type: &str) -> Result<Vec<FeatureChange>, SyncError> {
        let table = self.db.view(self.delta.as_str(), Schema::Delta).versioned_table(feature_type)?;

        let mut changes = Vec::new();
        for rec in table.delta_table().all().await? {
            let base_rec = table.base_table().get(&rec.id).await?;
            let change = match rec.change_type {
                Some(ChangeType::Delete) => FeatureChange::delete(base_rec.unwrap_or(rec)),
                Some(ChangeType::Insert) => FeatureChange::insert(rec),
                _ => FeatureChange::new(ChangeType::Update, rec, base_rec),
            };
            changes.push(change);
        }
        Ok(changes)
    }
}

#[async_trait]
impl SyncTask for ExportDeltaTask {
    fn id(&self) -> &str {
        "export"
    }

    fn name(&self) -> &str {
        "Exporting changes"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), SyncError> {
        let total = self.feature_types.len().max(1) as f32;

        for (i, feature_type) in self.feature_types.iter().enumerate() {
            ctx.check_cancelled()?;

            let changes = self.collect_changes(feature_type).await?;
            if changes.is_empty() {
                debug!("No {} changes in delta {}", feature_type, self.delta);
            } else {
                info!("Exporting {} {} changes from delta {}", changes.len(), feature_type, self.delta);
                let definitions = changes.iter().map(FeatureChange::definition).collect();
                self.sink.send_changes(&self.delta, feature_type, definitions).await?;
            }

            ctx.report_progress((i + 1) as f32 / total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyncEngine;
    use myworld_core::{FeatureDef, FeatureRecord, GetOptions, MemoryStore};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<(String, Vec<FeatureChangeDefinition>)>>,
    }

    #[async_trait]
    impl ChangeSink for RecordingSink {
        async fn send_changes(
            &self,
            _delta: &str,
            feature_type: &str,
            changes: Vec<FeatureChangeDefinition>,
        ) -> Result<(), SyncError> {
            self.batches.lock().push((feature_type.to_string(), changes));
            Ok(())
        }
    }

    async fn edited_database() -> Arc<Database> {
        let store = Arc::new(MemoryStore::new());
        let def = store.register("myworld", FeatureDef::new("pole").field("name", "string"));
        store.register("myworld", FeatureDef::new("cable").field("name", "string"));
        let db = Database::new(store.clone());

        let live = db.view("", Schema::Data);
        live.apply_changes(vec![
            FeatureChange::insert(FeatureRecord::new(def.clone(), "1").with_property("name", "P1")),
            FeatureChange::insert(FeatureRecord::new(def.clone(), "2").with_property("name", "P2")),
        ])
        .await
        .unwrap();

        let design = db.view("design/7", Schema::Data);
        let p1 = design.get("pole/1", GetOptions::default()).await.unwrap().unwrap();
        let p2 = design.get("pole/2", GetOptions::default()).await.unwrap().unwrap();
        design
            .apply_changes(vec![
                FeatureChange::update(p1.clone().with_property("name", "P1b"), p1),
                FeatureChange::delete(p2),
                FeatureChange::insert(FeatureRecord::new(def, "3").with_property("name", "P3")),
            ])
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_collect_changes() {
        let db = edited_database().await;
        let sink = Arc::new(RecordingSink::default());
        let task = ExportDeltaTask::new(db, "design/7", vec!["pole".into()], sink);

        let changes = task.collect_changes("pole").await.unwrap();
        let kinds: Vec<(String, ChangeType)> = changes.iter().map(|c| (c.rec.id.clone(), c.change_type)).collect();
        assert_eq!(
            kinds,
            vec![
                ("1".to_string(), ChangeType::Update),
                ("2".to_string(), ChangeType::Delete),
                ("3".to_string(), ChangeType::Insert),
            ]
        );
        assert_eq!(changes[0].changed_fields(), vec!["name".to_string()]);
        assert_eq!(changes[1].rec.field_value("name"), Some(&serde_json::json!("P2")));
    }

    #[tokio::test]
    async fn test_export_through_engine() {
        let db = edited_database().await;
        let sink = Arc::new(RecordingSink::default());
        let task: Arc<dyn SyncTask> = Arc::new(ExportDeltaTask::new(
            db,
            "design/7",
            vec!["pole".into(), "cable".into()],
            sink.clone(),
        ));

        let engine = SyncEngine::new();
        engine.run(vec![task]).await.unwrap();

        let batches = sink.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, "pole");
        assert_eq!(batches[0].1.len(), 3);
        assert_eq!(engine.current_progress(), 1.0);
    }

    #[tokio::test]
    async fn test_live_view_has_nothing_to_export() {
        let db = edited_database().await;
        let task = ExportDeltaTask::new(db, "", vec!["pole".into()], Arc::new(RecordingSink::default()));
        assert!(task.collect_changes("pole").await.is_err());
    }
}
