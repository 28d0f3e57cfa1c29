use crate::queue::job::JobToken;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Events that describe changes in the upload queue state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A new job was added to the queue
    JobSubmitted {
        token: JobToken,
        priority: i32,
        timestamp: DateTime<Utc>,
    },
    /// A job was admitted and started uploading
    JobStarted {
        token: JobToken,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A job's upload percentage moved forward
    JobProgress {
        token: JobToken,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job finished uploading
    JobCompleted {
        token: JobToken,
        location: String,
        timestamp: DateTime<Utc>,
    },
    /// A failed attempt will be retried after `delay`
    RetryScheduled {
        token: JobToken,
        retry_count: u32,
        delay: Duration,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A job ran out of retries
    JobFailed {
        token: JobToken,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// An in-flight upload was interrupted and put back in line
    JobInterrupted {
        token: JobToken,
        timestamp: DateTime<Utc>,
    },
    /// A job was taken out of the queue
    JobRemoved {
        token: JobToken,
        timestamp: DateTime<Utc>,
    },
    /// A waiting job's priority changed
    JobReprioritized {
        token: JobToken,
        priority: i32,
        timestamp: DateTime<Utc>,
    },
    /// Completed jobs were dropped
    FinishedCleared {
        count: usize,
        timestamp: DateTime<Utc>,
    },
    /// Failed jobs were put back in line
    FailedRetried {
        count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Job the event refers to, if any
    pub fn token(&self) -> Option<JobToken> {
        match self {
            QueueEvent::JobSubmitted { token, .. }
            | QueueEvent::JobStarted { token, .. }
            | QueueEvent::JobProgress { token, .. }
            | QueueEvent::JobCompleted { token, .. }
            | QueueEvent::RetryScheduled { token, .. }
            | QueueEvent::JobFailed { token, .. }
            | QueueEvent::JobInterrupted { token, .. }
            | QueueEvent::JobRemoved { token, .. }
            | QueueEvent::JobReprioritized { token, .. } => Some(*token),
            QueueEvent::FinishedCleared { .. } | QueueEvent::FailedRetried { .. } => None,
        }
    }
}
