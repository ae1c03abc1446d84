/// Application services the upload plugin depends on
///
/// The plugin never talks to the server, the login flow or the user
/// directly. Hosts provide these capabilities; tests provide fakes.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::engine::SyncTask;
use crate::error::SyncError;

/// Local database as seen by the upload flow
#[async_trait]
pub trait UploadServer: Send + Sync {
    /// True when local edits have not been uploaded yet
    async fn has_unsynced_changes(&self) -> Result<bool, SyncError>;

    /// True while an upload started outside the plugin is in progress
    fn is_uploading(&self) -> bool;

    /// Resolves once no outside upload is in progress
    async fn wait_until_idle(&self);

    /// Tasks that export and upload the local changes, in order
    fn upload_tasks(&self) -> Vec<Arc<dyn SyncTask>>;

    /// Record that every local change has been uploaded
    async fn mark_synced(&self) -> Result<(), SyncError>;
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Log in if needed. Fails when the user cannot be logged in.
    async fn ensure_logged_in(&self) -> Result<(), SyncError>;
}

pub trait Connectivity: Send + Sync {
    /// Receiver that holds `true` while the device is online
    fn subscribe(&self) -> watch::Receiver<bool>;

    fn is_online(&self) -> bool {
        *self.subscribe().borrow()
    }
}

#[async_trait]
pub trait UserPrompt: Send + Sync {
    async fn show_error(&self, error: &SyncError);

    /// Tell the user an upload is running. Resolves when they stop waiting.
    async fn upload_in_progress(&self);

    /// Ask whether to close with changes that were not uploaded
    async fn confirm_close_with_unsynced_changes(&self) -> bool;
}

/// Connectivity driven by the host's network notifications
#[derive(Debug)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl Connectivity for ConnectivityMonitor {
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}
