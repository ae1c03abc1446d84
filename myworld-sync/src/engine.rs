/// Sequential task engine used for uploads
///
/// Runs a list of tasks one after another, publishing the current task and
/// its progress as events. A run can be cancelled from any thread; the task
/// in progress is interrupted at its next await point and the run fails
/// with [`SyncError::Cancelled`].

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::SyncError;

/// Status of the engine's current task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Events published while a run progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncEvent {
    /// A new task started
    TaskChanged {
        task_id: String,
        name: String,
    },
    /// Progress of the current task, between 0.0 and 1.0
    TaskProgress {
        task_id: String,
        progress: f32,
    },
    /// The run ended
    Finished {
        status: TaskStatus,
    },
}

/// One step of an upload run
#[async_trait]
pub trait SyncTask: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), SyncError>;
}

/// Handle given to a running task
pub struct TaskContext<'a> {
    engine: &'a SyncEngine,
    task_id: String,
    cancel_rx: watch::Receiver<bool>,
}

impl TaskContext<'_> {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Record progress of the current task
    pub fn report_progress(&self, progress: f32) {
        let progress = progress.clamp(0.0, 1.0);
        self.engine.state.write().current_progress = progress;
        self.engine.emit_event(SyncEvent::TaskProgress {
            task_id: self.task_id.clone(),
            progress,
        });
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Fail with `Cancelled` if the run was cancelled
    pub fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the run is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        // The engine owns the sender, so it outlives every context
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[derive(Debug, Clone)]
struct EngineState {
    current_task_id: Option<String>,
    current_task: Option<String>,
    current_progress: f32,
    current_status: TaskStatus,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            current_task_id: None,
            current_task: None,
            current_progress: 0.0,
            current_status: TaskStatus::Pending,
        }
    }
}

/// Clears the running flag when a run ends or its future is dropped
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine {
    state: RwLock<EngineState>,
    running: AtomicBool,
    cancel_tx: watch::Sender<bool>,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SyncEvent>>>,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, _) = watch::channel(false);
        Self {
            state: RwLock::new(EngineState::default()),
            running: AtomicBool::new(false),
            cancel_tx,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Take the event receiver; only the first caller gets it
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx.lock().take()
    }

    pub fn current_task_id(&self) -> Option<String> {
        self.state.read().current_task_id.clone()
    }

    pub fn current_task(&self) -> Option<String> {
        self.state.read().current_task.clone()
    }

    pub fn current_progress(&self) -> f32 {
        self.state.read().current_progress
    }

    pub fn current_task_status(&self) -> TaskStatus {
        self.state.read().current_status
    }

    /// True while a run is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Cancel the run in progress. Has no effect when idle.
    pub fn cancel(&self) {
        if self.is_running() {
            info!("Cancelling sync run");
            self.cancel_tx.send_replace(true);
        }
    }

    /// Run `tasks` in order, stopping at the first failure
    pub async fn run(&self, tasks: Vec<Arc<dyn SyncTask>>) -> Result<(), SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SyncError::Busy);
        }
        let _running = RunningGuard(&self.running);
        self.cancel_tx.send_replace(false);
        *self.state.write() = EngineState::default();

        let result = self.run_tasks(&tasks).await;

        let status = match &result {
            Ok(()) => TaskStatus::Completed,
            Err(e) if e.is_cancelled() => TaskStatus::Cancelled,
            Err(_) => TaskStatus::Failed,
        };
        self.state.write().current_status = status;
        self.emit_event(SyncEvent::Finished { status });
        result
    }

    async fn run_tasks(&self, tasks: &[Arc<dyn SyncTask>]) -> Result<(), SyncError> {
        for task in tasks {
            if self.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            {
                let mut state = self.state.write();
                state.current_task_id = Some(task.id().to_string());
                state.current_task = Some(task.name().to_string());
                state.current_progress = 0.0;
                state.current_status = TaskStatus::Running;
            }
            self.emit_event(SyncEvent::TaskChanged {
                task_id: task.id().to_string(),
                name: task.name().to_string(),
            });
            debug!("Running sync task {}", task.id());

            let ctx = TaskContext {
                engine: self,
                task_id: task.id().to_string(),
                cancel_rx: self.cancel_tx.subscribe(),
            };
            let outcome = tokio::select! {
                outcome = task.run(&ctx) => outcome,
                _ = ctx.cancelled() => Err(SyncError::Cancelled),
            };

            if let Err(e) = outcome {
                if !e.is_cancelled() {
                    warn!("Sync task {} failed: {}", task.id(), e);
                }
                return Err(e);
            }
            ctx.report_progress(1.0);
        }
        Ok(())
    }

    fn emit_event(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }
}
