//! Fake application services for upload tests

use async_trait::async_trait;
use myworld_sync::{Authenticator, SyncError, SyncTask, TaskContext, UploadServer, UserPrompt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

/// Upload task that sleeps, then succeeds or fails as configured
pub struct FakeUploadTask {
    delay: Duration,
    failure: Option<SyncError>,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl SyncTask for FakeUploadTask {
    fn id(&self) -> &str {
        "upload"
    }

    fn name(&self) -> &str {
        "Uploading changes"
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), SyncError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay / 2).await;
        ctx.report_progress(0.5);
        tokio::time::sleep(self.delay / 2).await;
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Local database with a switchable "unsynced changes" flag
pub struct FakeServer {
    unsynced: AtomicBool,
    external_upload: watch::Sender<bool>,
    failure: Mutex<Option<SyncError>>,
    delay: Mutex<Duration>,
    runs: Arc<AtomicUsize>,
    synced_calls: AtomicUsize,
}

impl FakeServer {
    pub fn new(unsynced: bool) -> Arc<Self> {
        let (external_upload, _) = watch::channel(false);
        Arc::new(Self {
            unsynced: AtomicBool::new(unsynced),
            external_upload,
            failure: Mutex::new(None),
            delay: Mutex::new(Duration::from_millis(10)),
            runs: Arc::new(AtomicUsize::new(0)),
            synced_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_unsynced(&self, unsynced: bool) {
        self.unsynced.store(unsynced, Ordering::SeqCst);
    }

    /// Make the upload task fail with `error`
    pub fn fail_with(&self, error: Option<SyncError>) {
        *self.failure.lock() = error;
    }

    pub fn set_task_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Simulate an upload started outside the plugin
    pub fn set_external_upload(&self, uploading: bool) {
        self.external_upload.send_replace(uploading);
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn synced_calls(&self) -> usize {
        self.synced_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadServer for FakeServer {
    async fn has_unsynced_changes(&self) -> Result<bool, SyncError> {
        Ok(self.unsynced.load(Ordering::SeqCst))
    }

    fn is_uploading(&self) -> bool {
        *self.external_upload.borrow()
    }

    async fn wait_until_idle(&self) {
        let mut rx = self.external_upload.subscribe();
        let _ = rx.wait_for(|uploading| !*uploading).await;
    }

    fn upload_tasks(&self) -> Vec<Arc<dyn SyncTask>> {
        vec![Arc::new(FakeUploadTask {
            delay: *self.delay.lock(),
            failure: self.failure.lock().clone(),
            runs: self.runs.clone(),
        })]
    }

    async fn mark_synced(&self) -> Result<(), SyncError> {
        self.synced_calls.fetch_add(1, Ordering::SeqCst);
        self.unsynced.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAuthenticator {
    reject: AtomicBool,
    calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn rejecting() -> Arc<Self> {
        let auth = Self::default();
        auth.reject.store(true, Ordering::SeqCst);
        Arc::new(auth)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn ensure_logged_in(&self) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            Err(SyncError::Login("invalid credentials".into()))
        } else {
            Ok(())
        }
    }
}

/// Records what the user was shown and answers prompts as scripted
pub struct FakePrompt {
    errors: Mutex<Vec<SyncError>>,
    confirm_close: AtomicBool,
    confirm_calls: AtomicUsize,
    in_progress_calls: AtomicUsize,
    stop_waiting: Notify,
    stop_waiting_immediately: AtomicBool,
}

impl FakePrompt {
    pub fn new(confirm_close: bool) -> Arc<Self> {
        Arc::new(Self {
            errors: Mutex::new(Vec::new()),
            confirm_close: AtomicBool::new(confirm_close),
            confirm_calls: AtomicUsize::new(0),
            in_progress_calls: AtomicUsize::new(0),
            stop_waiting: Notify::new(),
            stop_waiting_immediately: AtomicBool::new(false),
        })
    }

    /// Answer every "upload in progress" notice by stopping to wait at once
    pub fn stop_waiting_immediately(&self) {
        self.stop_waiting_immediately.store(true, Ordering::SeqCst);
    }

    /// Stop waiting on the notice currently shown
    pub fn stop_waiting(&self) {
        self.stop_waiting.notify_waiters();
    }

    pub fn errors(&self) -> Vec<SyncError> {
        self.errors.lock().clone()
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    pub fn in_progress_calls(&self) -> usize {
        self.in_progress_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserPrompt for FakePrompt {
    async fn show_error(&self, error: &SyncError) {
        self.errors.lock().push(error.clone());
    }

    async fn upload_in_progress(&self) {
        self.in_progress_calls.fetch_add(1, Ordering::SeqCst);
        if self.stop_waiting_immediately.load(Ordering::SeqCst) {
            return;
        }
        self.stop_waiting.notified().await;
    }

    async fn confirm_close_with_unsynced_changes(&self) -> bool {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        self.confirm_close.load(Ordering::SeqCst)
    }
}
