/// Backing store interface
///
/// Every table lives in a layer: master holds authoritative rows, each named
/// delta holds its pending edits (including delete markers), and the
/// delta's base layer holds master rows as they were when the delta first
/// touched them.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::types::{FeatureDef, FeatureRecord};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Master,
    Delta(String),
    Base(String),
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Master => write!(f, "master"),
            Layer::Delta(name) => write!(f, "delta:{}", name),
            Layer::Base(name) => write!(f, "base:{}", name),
        }
    }
}

/// Addresses one physical table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    pub datasource: String,
    pub feature_type: String,
    pub layer: Layer,
}

impl TableId {
    pub fn new(datasource: impl Into<String>, feature_type: impl Into<String>, layer: Layer) -> Self {
        Self {
            datasource: datasource.into(),
            feature_type: feature_type.into(),
            layer,
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.datasource, self.feature_type, self.layer)
    }
}

/// Storage backend shared by every view of a database
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Schema of a feature type
    fn feature_def(&self, datasource: &str, feature_type: &str) -> Result<Arc<FeatureDef>>;

    /// Records with the given ids, in request order; unknown ids are skipped
    async fn get(&self, table: &TableId, ids: &[String]) -> Result<Vec<FeatureRecord>>;

    /// Every record in the table, ordered by id
    async fn scan(&self, table: &TableId) -> Result<Vec<FeatureRecord>>;

    /// Records whose `field` equals `value`, or whose list-valued `field` contains it
    async fn query(&self, table: &TableId, field: &str, value: &str) -> Result<Vec<FeatureRecord>>;

    /// Insert or replace a record
    async fn put(&self, table: &TableId, rec: FeatureRecord) -> Result<()>;

    /// Remove a record; removing an absent record is not an error
    async fn remove(&self, table: &TableId, id: &str) -> Result<()>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}
