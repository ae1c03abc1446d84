/// Three-way conflict between a delta record and master
///
/// Built from the base snapshot, the current master record and the delta
/// record whenever master has changed since the delta's base. Conflicts are
/// recomputed on demand and never stored.

use serde::Serialize;

use crate::diff;
use crate::types::{ChangeType, FeatureRecord};

/// A delta record whose master counterpart changed since the base snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub delta_rec: FeatureRecord,
    pub master_rec: Option<FeatureRecord>,
    pub base_rec: Option<FeatureRecord>,
    /// How master changed relative to base
    pub master_change: ChangeType,
    /// How the delta changed relative to base; `None` for no change
    pub delta_change: Option<ChangeType>,
    /// Fields master changed relative to base
    pub master_fields: Vec<String>,
    /// Fields the delta changed relative to base
    pub delta_fields: Vec<String>,
    /// Fields changed on both sides that now hold different values
    pub conflict_fields: Vec<String>,
}

/// Serialized form of a [`Conflict`]
#[derive(Debug, Clone, Serialize)]
pub struct ConflictDefinition {
    pub delta: FeatureRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<FeatureRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<FeatureRecord>,
    pub master_change: ChangeType,
    pub master_fields: Vec<String>,
    pub delta_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_fields: Option<Vec<String>>,
}

impl Conflict {
    pub fn new(
        master_change: ChangeType,
        delta_rec: FeatureRecord,
        master_rec: Option<FeatureRecord>,
        base_rec: Option<FeatureRecord>,
    ) -> Self {
        let master_fields =
            diff::changed_fields(base_rec.as_ref(), master_rec.as_ref(), None).unwrap_or_default();
        let delta_fields =
            diff::changed_fields(base_rec.as_ref(), Some(&delta_rec), None).unwrap_or_default();

        let both_changed: Vec<String> = master_fields
            .iter()
            .filter(|field| delta_fields.contains(field))
            .cloned()
            .collect();

        // Re-diff delta against master so fields both sides set to the same value drop out
        let conflict_fields = if both_changed.is_empty() {
            Vec::new()
        } else {
            diff::changed_fields(Some(&delta_rec), master_rec.as_ref(), Some(&both_changed)).unwrap_or_default()
        };

        let delta_change = delta_rec
            .change_type
            .or_else(|| diff::change_type(base_rec.as_ref(), Some(&delta_rec)));

        Self {
            delta_rec,
            master_rec,
            base_rec,
            master_change,
            delta_change,
            master_fields,
            delta_fields,
            conflict_fields,
        }
    }

    pub fn urn(&self) -> String {
        self.delta_rec.urn()
    }

    /// True when both sides changed some field to different values
    pub fn has_field_conflicts(&self) -> bool {
        !self.conflict_fields.is_empty()
    }

    pub fn definition(&self) -> ConflictDefinition {
        ConflictDefinition {
            delta: self.delta_rec.clone(),
            base: self.base_rec.clone(),
            master: self.master_rec.clone(),
            master_change: self.master_change,
            master_fields: self.master_fields.clone(),
            delta_fields: self.delta_fields.clone(),
            conflict_fields: if self.conflict_fields.is_empty() {
                None
            } else {
                Some(self.conflict_fields.clone())
            },
        }
    }
}
