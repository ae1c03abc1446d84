/// Upload orchestration for local changes
///
/// The plugin uploads on demand, on a timer while the device is online, and
/// when the application closes. At most one upload runs at a time: callers
/// arriving while one is in flight wait for it and receive its outcome.

use anyhow::anyhow;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::UploadConfig;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::platform::{Authenticator, Connectivity, UploadServer, UserPrompt};

/// Observable state of the plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Inactive,
    Processing,
    /// The last upload failed; kept until the next upload starts
    Error(SyncError),
}

/// Answer to a close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Proceed,
    Abort,
}

type Outcome = Option<Result<(), SyncError>>;

enum Role {
    Leader(watch::Sender<Outcome>),
    Follower(watch::Receiver<Outcome>),
}

struct Timer {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct UploadPlugin {
    config: UploadConfig,
    server: Arc<dyn UploadServer>,
    auth: Option<Arc<dyn Authenticator>>,
    connectivity: Arc<dyn Connectivity>,
    prompt: Arc<dyn UserPrompt>,
    engine: Arc<SyncEngine>,
    state_tx: watch::Sender<UploadState>,
    in_flight: Mutex<Option<watch::Receiver<Outcome>>>,
    timer: Mutex<Option<Timer>>,
}

/// Releases the in-flight slot even if the leading upload is dropped
struct InFlight<'a>(&'a UploadPlugin);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.lock().take();
        self.0.state_tx.send_if_modified(|state| {
            if *state == UploadState::Processing {
                *state = UploadState::Inactive;
                true
            } else {
                false
            }
        });
    }
}

impl UploadPlugin {
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn state(&self) -> UploadState {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe_state(&self) -> watch::Receiver<UploadState> {
        self.state_tx.subscribe()
    }

    /// True while any upload is running, including ones started elsewhere
    pub fn is_uploading(&self) -> bool {
        self.in_flight.lock().is_some() || self.engine.is_running() || self.server.is_uploading()
    }

    /// Upload local changes, or join the upload already in flight
    pub async fn run_upload(&self) -> Result<(), SyncError> {
        let role = {
            let mut slot = self.in_flight.lock();
            if let Some(rx) = slot.as_ref() {
                Role::Follower(rx.clone())
            } else if self.server.is_uploading() {
                debug!("Upload already running outside the plugin, skipping");
                return Ok(());
            } else {
                let (tx, rx) = watch::channel(None);
                *slot = Some(rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(rx) => {
                debug!("Joining upload in flight");
                Self::await_outcome(rx).await
            }
            Role::Leader(tx) => {
                let in_flight = InFlight(self);
                let result = self.process_upload().await;
                drop(in_flight);
                tx.send_replace(Some(result.clone()));
                result
            }
        }
    }

    async fn await_outcome(mut rx: watch::Receiver<Outcome>) -> Result<(), SyncError> {
        let outcome = rx.wait_for(Option::is_some).await.map(|o| (*o).clone());
        match outcome {
            Ok(Some(result)) => result,
            // The leading upload was dropped before finishing
            Ok(None) | Err(_) => Err(SyncError::Cancelled),
        }
    }

    async fn process_upload(&self) -> Result<(), SyncError> {
        self.state_tx.send_replace(UploadState::Processing);
        let result = self.upload_changes().await;

        let state = match &result {
            Ok(()) => UploadState::Inactive,
            Err(e) if e.is_cancelled() => {
                info!("Upload cancelled");
                UploadState::Inactive
            }
            Err(e) => {
                error!("Upload failed: {}", e);
                UploadState::Error(e.clone())
            }
        };
        self.state_tx.send_replace(state);
        result
    }

    async fn upload_changes(&self) -> Result<(), SyncError> {
        if !self.server.has_unsynced_changes().await? {
            debug!("No local changes to upload");
            return Ok(());
        }

        if self.config.require_login {
            if let Some(auth) = &self.auth {
                auth.ensure_logged_in().await?;
            }
        }

        info!("Uploading local changes");
        self.engine.run(self.server.upload_tasks()).await?;
        self.server.mark_synced().await?;
        info!("Upload complete");
        Ok(())
    }

    /// Start the automatic upload timer. No-op when automatic upload is
    /// disabled, no interval is configured or the timer is already running.
    pub fn start(self: &Arc<Self>) {
        let Some(interval) = self.config.upload_interval else {
            debug!("No upload interval configured");
            return;
        };
        if !self.config.auto_upload {
            return;
        }

        let mut timer = self.timer.lock();
        if timer.is_some() {
            warn!("Upload timer already running");
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Self::run_timer(
            Arc::clone(self),
            interval,
            self.connectivity.subscribe(),
            shutdown_rx,
        ));
        *timer = Some(Timer { shutdown_tx, handle });
        info!("Automatic upload every {:?}", interval);
    }

    /// Stop the automatic upload timer, waiting for a running tick to finish
    pub async fn stop(&self) {
        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            let _ = timer.shutdown_tx.send(()).await;
            if let Err(e) = timer.handle.await {
                warn!("Upload timer ended abnormally: {}", e);
            }
        }
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    async fn run_timer(
        plugin: Arc<Self>,
        interval: Duration,
        mut online: watch::Receiver<bool>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let is_online = *online.borrow_and_update();
            if !is_online {
                debug!("Offline, automatic upload suspended");
                tokio::select! {
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online.borrow() {
                            info!("Back online, automatic upload resumed");
                            ticker.reset();
                        }
                        continue;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Automatic upload");
                    if let Err(e) = plugin.run_upload().await {
                        if !e.is_cancelled() {
                            warn!("Automatic upload failed: {}", e);
                        }
                    }
                }
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
        debug!("Upload timer stopped");
    }

    /// Decide whether the application may close.
    ///
    /// Shows a pending upload error, waits for an upload in flight (the user
    /// may stop waiting, which cancels it), uploads remaining changes when
    /// online and finally asks the user before closing with changes that
    /// were not uploaded.
    pub async fn application_closing(&self) -> CloseDecision {
        if let UploadState::Error(e) = self.state() {
            self.prompt.show_error(&e).await;
        }

        if self.is_uploading() {
            info!("Upload in progress at close");
            match self.wait_or_stop(self.wait_for_upload()).await {
                None => return CloseDecision::Proceed,
                Some(Err(e)) if !e.is_cancelled() => self.prompt.show_error(&e).await,
                Some(_) => {}
            }
        }

        let unsynced = match self.server.has_unsynced_changes().await {
            Ok(unsynced) => unsynced,
            Err(e) => {
                warn!("Could not check for local changes: {}", e);
                true
            }
        };
        if !unsynced {
            return CloseDecision::Proceed;
        }

        if self.config.auto_upload && self.connectivity.is_online() {
            match self.wait_or_stop(self.run_upload()).await {
                None | Some(Ok(())) => return CloseDecision::Proceed,
                Some(Err(e)) if e.is_cancelled() => debug!("Upload at close cancelled"),
                Some(Err(e)) => self.prompt.show_error(&e).await,
            }
        }

        if !self.config.confirm_close_with_changes
            || self.prompt.confirm_close_with_unsynced_changes().await
        {
            CloseDecision::Proceed
        } else {
            info!("Close aborted with local changes not uploaded");
            CloseDecision::Abort
        }
    }

    /// Await `upload`, or `None` once the user stops waiting for it
    async fn wait_or_stop<F>(&self, upload: F) -> Option<Result<(), SyncError>>
    where
        F: Future<Output = Result<(), SyncError>>,
    {
        tokio::select! {
            outcome = upload => Some(outcome),
            _ = self.prompt.upload_in_progress() => {
                info!("Stopped waiting for upload, cancelling");
                self.engine.cancel();
                None
            }
        }
    }

    async fn wait_for_upload(&self) -> Result<(), SyncError> {
        let in_flight = self.in_flight.lock().clone();
        match in_flight {
            Some(rx) => Self::await_outcome(rx).await,
            None => {
                self.server.wait_until_idle().await;
                Ok(())
            }
        }
    }
}

/// Builder for an [`UploadPlugin`]
pub struct UploadPluginBuilder {
    config: UploadConfig,
    server: Option<Arc<dyn UploadServer>>,
    auth: Option<Arc<dyn Authenticator>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    prompt: Option<Arc<dyn UserPrompt>>,
    engine: Option<Arc<SyncEngine>>,
}

impl UploadPluginBuilder {
    pub fn new() -> Self {
        Self {
            config: UploadConfig::default(),
            server: None,
            auth: None,
            connectivity: None,
            prompt: None,
            engine: None,
        }
    }

    pub fn with_config(mut self, config: UploadConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_server(mut self, server: Arc<dyn UploadServer>) -> Self {
        self.server = Some(server);
        self
    }

    pub fn with_authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn UserPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Share an existing engine instead of creating one
    pub fn with_engine(mut self, engine: Arc<SyncEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn build(self) -> anyhow::Result<Arc<UploadPlugin>> {
        self.config.validate().map_err(anyhow::Error::msg)?;

        let server = self.server.ok_or_else(|| anyhow!("Upload server is required"))?;
        let connectivity = self.connectivity.ok_or_else(|| anyhow!("Connectivity is required"))?;
        let prompt = self.prompt.ok_or_else(|| anyhow!("User prompt is required"))?;
        if self.config.require_login && self.auth.is_none() {
            return Err(anyhow!("Authenticator is required when login is required"));
        }

        let (state_tx, _) = watch::channel(UploadState::Inactive);
        Ok(Arc::new(UploadPlugin {
            config: self.config,
            server,
            auth: self.auth,
            connectivity,
            prompt,
            engine: self.engine.unwrap_or_default(),
            state_tx,
            in_flight: Mutex::new(None),
            timer: Mutex::new(None),
        }))
    }
}

impl Default for UploadPluginBuilder {
    fn default() -> Self {
        Self::new()
    }
}
