/// Delta-versioned feature model for myWorld
///
/// Records live in a master layer and in named deltas, each delta keeping a
/// base snapshot of the master records it edits. Views resolve URNs within
/// one delta, and versioned tables compare delta, base and master to find
/// three-way conflicts.

pub mod error;
pub mod config;
pub mod reference;
pub mod types;
pub mod diff;
pub mod feature_change;
pub mod conflict;
pub mod store;
pub mod memory_store;
pub mod table;
pub mod versioned;
pub mod feature_view;
pub mod readonly_view;

pub use error::{Error, Result};
pub use config::CoreConfig;
pub use reference::{IntoReference, Reference, MYWORLD};
pub use types::*;
pub use feature_change::{FeatureChange, FeatureChangeDefinition};
pub use conflict::{Conflict, ConflictDefinition};
pub use store::{FeatureStore, Layer, TableId};
pub use memory_store::MemoryStore;
pub use table::{FeatureTable, TableKind};
pub use versioned::VersionedFeatureTable;
pub use feature_view::{Database, FeatureView, GetOptions};
pub use readonly_view::ReadonlyFeatureView;
