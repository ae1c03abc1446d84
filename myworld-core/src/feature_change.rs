use serde::Serialize;

use crate::diff;
use crate::types::{ChangeType, FeatureRecord};

/// One record-level change, optionally with the version it replaced
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureChange {
    pub change_type: ChangeType,
    pub rec: FeatureRecord,
    pub orig_rec: Option<FeatureRecord>,
}

/// Serialized form of a [`FeatureChange`]
#[derive(Debug, Clone, Serialize)]
pub struct FeatureChangeDefinition {
    pub change_type: ChangeType,
    pub feature: FeatureRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orig_feature: Option<FeatureRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl FeatureChange {
    pub fn new(change_type: ChangeType, rec: FeatureRecord, orig_rec: Option<FeatureRecord>) -> Self {
        Self {
            change_type,
            rec,
            orig_rec,
        }
    }

    pub fn insert(rec: FeatureRecord) -> Self {
        Self::new(ChangeType::Insert, rec, None)
    }

    pub fn update(rec: FeatureRecord, orig_rec: FeatureRecord) -> Self {
        Self::new(ChangeType::Update, rec, Some(orig_rec))
    }

    pub fn delete(rec: FeatureRecord) -> Self {
        Self::new(ChangeType::Delete, rec, None)
    }

    /// Fields that differ from the original record; empty without one
    pub fn changed_fields(&self) -> Vec<String> {
        match &self.orig_rec {
            Some(orig) => diff::changed_fields(Some(orig), Some(&self.rec), None).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn definition(&self) -> FeatureChangeDefinition {
        let fields = match (self.change_type, &self.orig_rec) {
            (ChangeType::Update, Some(_)) => Some(self.changed_fields()),
            _ => None,
        };

        FeatureChangeDefinition {
            change_type: self.change_type,
            feature: self.rec.clone(),
            orig_feature: self.orig_rec.clone(),
            fields,
        }
    }
}
