/// Upload orchestration for myWorld
///
/// Local edits are exported and uploaded by a sequential task engine. The
/// upload plugin decides when that happens: on demand, on a timer while
/// online, and when the application closes.

pub mod error;
pub mod config;
pub mod engine;
pub mod platform;
pub mod tasks;
pub mod upload_plugin;

pub use error::SyncError;
pub use config::UploadConfig;
pub use engine::{SyncEngine, SyncEvent, SyncTask, TaskContext, TaskStatus};
pub use platform::{Authenticator, Connectivity, ConnectivityMonitor, UploadServer, UserPrompt};
pub use tasks::{ChangeSink, ExportDeltaTask};
pub use upload_plugin::{CloseDecision, UploadPlugin, UploadPluginBuilder, UploadState};
