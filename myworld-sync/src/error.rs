use thiserror::Error;

/// Failure of an upload run.
///
/// Cloneable so that every caller waiting on one in-flight upload receives
/// the same outcome. Cancellation is not a failure and has its own variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("cancelled")]
    Cancelled,

    #[error("Sync engine busy")]
    Busy,

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Task {task} failed: {message}")]
    Task { task: String, message: String },

    #[error("Upload failed: {0}")]
    Upload(String),
}

impl SyncError {
    /// True when the user or the engine cancelled the run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Cancelled => "CANCELLED",
            SyncError::Busy => "BUSY",
            SyncError::Login(_) => "LOGIN_FAILED",
            SyncError::Server(_) => "SERVER_ERROR",
            SyncError::Task { .. } => "TASK_FAILED",
            SyncError::Upload(_) => "UPLOAD_FAILED",
        }
    }
}

impl From<myworld_core::Error> for SyncError {
    fn from(e: myworld_core::Error) -> Self {
        SyncError::Upload(e.to_string())
    }
}
