//! Upload job records and the views handed out to callers

use crate::transfer::{Payload, TransferProgress, UploadResult};
use crate::utils::error::UploadError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Opaque job identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobToken(Uuid);

impl JobToken {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Waiting,
    Uploading,
    Completed,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Uploading => "uploading",
            JobState::Completed => "completed",
            JobState::Error => "error",
        }
    }
}

/// Progress notification passed to [`UploadHooks::on_progress`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub token: JobToken,
    pub progress: u8,
    pub sent_bytes: u64,
    pub total_bytes: u64,
    pub speed: f64,
    pub eta: Option<Duration>,
}

pub type ProgressHook = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;
pub type CompleteHook = Arc<dyn Fn(&UploadResult) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&UploadError) + Send + Sync>;

/// Caller callbacks for a single job
///
/// Each hook runs after the matching state change is visible through the
/// queue, and never while the queue is locked. A `cancel` racing a progress
/// report on another worker thread may therefore be followed by one last
/// `on_progress` call for the interrupted run. Reports that arrive after
/// `cancel` took the lock are dropped.
#[derive(Clone, Default)]
pub struct UploadHooks {
    pub on_progress: Option<ProgressHook>,
    pub on_complete: Option<CompleteHook>,
    pub on_error: Option<ErrorHook>,
}

impl UploadHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, hook: impl Fn(&ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(hook));
        self
    }

    pub fn on_complete(mut self, hook: impl Fn(&UploadResult) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&UploadError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for UploadHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadHooks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Upload job owned by the queue
#[derive(Debug, Clone)]
pub struct Job {
    pub token: JobToken,
    pub payload: Payload,
    pub priority: i32,
    pub state: JobState,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub transfer: TransferProgress,
    pub hooks: UploadHooks,
    pub added_at: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Submission order, breaks priority ties
    pub(crate) seq: u64,
    /// Earliest instant a retried job may be admitted again
    pub(crate) not_before: Option<Instant>,
}

impl Job {
    /// Create a new waiting job
    pub fn new(payload: Payload, priority: i32, max_retries: u32, hooks: UploadHooks, seq: u64) -> Self {
        let total = payload.size();

        Self {
            token: JobToken::generate(),
            payload,
            priority,
            state: JobState::Waiting,
            progress: 0,
            retry_count: 0,
            max_retries,
            transfer: TransferProgress::new(total),
            hooks,
            added_at: Utc::now(),
            last_error: None,
            seq,
            not_before: None,
        }
    }

    /// Put the job back in line with a clean progress record
    pub(crate) fn reset_to_waiting(&mut self) {
        self.state = JobState::Waiting;
        self.progress = 0;
        self.transfer = TransferProgress::new(self.payload.size());
    }

    pub(crate) fn start(&mut self) {
        self.reset_to_waiting();
        self.state = JobState::Uploading;
        self.not_before = None;
    }

    pub(crate) fn complete(&mut self) {
        self.state = JobState::Completed;
        self.transfer.complete();
        self.progress = 100;
        self.last_error = None;
    }

    pub(crate) fn fail(&mut self, error: &UploadError) {
        self.reset_to_waiting();
        self.state = JobState::Error;
        self.last_error = Some(error.to_string());
    }

    pub fn view(&self) -> JobView {
        JobView {
            token: self.token,
            name: self.payload.name.clone(),
            content_type: self.payload.content_type.clone(),
            size: self.payload.size(),
            priority: self.priority,
            state: self.state,
            progress: self.progress,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            sent_bytes: self.transfer.sent_bytes,
            speed: self.transfer.speed,
            eta: self.transfer.eta,
            added_at: self.added_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Read-only copy of a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub token: JobToken,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub priority: i32,
    pub state: JobState,
    pub progress: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub sent_bytes: u64,
    pub speed: f64,
    pub eta: Option<Duration>,
    pub added_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Job counts by state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueSnapshot {
    pub total: usize,
    pub waiting: usize,
    pub uploading: usize,
    pub completed: usize,
    pub error: usize,
}

impl QueueSnapshot {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut snapshot = Self::default();
        for job in jobs {
            snapshot.total += 1;
            match job.state {
                JobState::Waiting => snapshot.waiting += 1,
                JobState::Uploading => snapshot.uploading += 1,
                JobState::Completed => snapshot.completed += 1,
                JobState::Error => snapshot.error += 1,
            }
        }
        snapshot
    }
}
