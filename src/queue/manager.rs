//! Upload queue manager with bounded concurrent uploads

use crate::queue::events::QueueEvent;
use crate::queue::job::{Job, JobState, JobToken, JobView, QueueSnapshot, UploadHooks};
use crate::queue::ordering::sort_jobs;
use crate::queue::retry::RetryPolicy;
use crate::transfer::{Payload, Transport};
use crate::utils::config::QueueSettings;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Upload queue manager
///
/// Cloning yields another handle to the same queue. Every instance built with
/// [`QueueManager::new`] is fully independent.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

/// State shared between the manager handles, the scheduler loop and the
/// running uploads
pub(crate) struct Inner {
    pub(crate) state: Mutex<QueueState>,
    /// Signalled whenever a slot frees up or new work arrives
    pub(crate) wakeup: Notify,
    pub(crate) settings: QueueSettings,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) transport: Arc<dyn Transport>,
    events: broadcast::Sender<QueueEvent>,
}

/// Job collection plus the registry of in-flight uploads
pub(crate) struct QueueState {
    pub(crate) jobs: Vec<Job>,
    pub(crate) active: HashMap<JobToken, ActiveUpload>,
    /// Whether a scheduler loop is currently alive
    pub(crate) running: bool,
    next_seq: u64,
    next_run: u64,
}

/// Handle for a running upload
pub(crate) struct ActiveUpload {
    /// Distinguishes this run from earlier runs of the same job
    pub(crate) run: u64,
    pub(crate) cancel: CancellationToken,
}

impl QueueState {
    fn new() -> Self {
        Self {
            jobs: Vec::new(),
            active: HashMap::new(),
            running: false,
            next_seq: 0,
            next_run: 0,
        }
    }

    pub(crate) fn position(&self, token: &JobToken) -> Option<usize> {
        self.jobs.iter().position(|job| job.token == *token)
    }

    pub(crate) fn find_mut(&mut self, token: &JobToken) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.token == *token)
    }

    pub(crate) fn resort(&mut self) {
        sort_jobs(&mut self.jobs);
    }

    /// True while `run` is the registered upload for `token`
    pub(crate) fn is_current(&self, token: &JobToken, run: u64) -> bool {
        self.active.get(token).map(|active| active.run) == Some(run)
    }

    /// Returns true if the caller must start a scheduler loop
    pub(crate) fn claim_scheduler(&mut self) -> bool {
        if self.running {
            false
        } else {
            self.running = true;
            true
        }
    }

    pub(crate) fn next_run(&mut self) -> u64 {
        self.next_run += 1;
        self.next_run
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

impl Inner {
    pub(crate) fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl QueueManager {
    /// Create new queue manager
    pub fn new(settings: QueueSettings, transport: Arc<dyn Transport>) -> Self {
        let settings = settings.validated();
        let retry_policy = RetryPolicy::new(settings.backoff_base(), settings.backoff_max());
        let (events, _) = broadcast::channel(settings.event_capacity);

        info!(
            "Created upload queue (max_concurrent={}, max_retries={}, transport={})",
            settings.max_concurrent,
            settings.max_retries,
            transport.id()
        );

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::new()),
                wakeup: Notify::new(),
                settings,
                retry_policy,
                transport,
                events,
            }),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.inner.settings
    }

    /// Add a job to the queue and make sure the scheduler is running
    pub async fn submit(&self, payload: Payload, priority: i32, hooks: UploadHooks) -> JobToken {
        let name = payload.name.clone();
        let size = payload.size();

        let (token, start) = {
            let mut state = self.inner.state.lock().await;
            let seq = state.next_seq();
            let job = Job::new(payload, priority, self.inner.settings.max_retries, hooks, seq);
            let token = job.token;
            state.jobs.push(job);
            state.resort();
            (token, state.claim_scheduler())
        };

        info!(
            "Added job {} ({}, {} bytes, priority {}) to queue",
            token, name, size, priority
        );
        self.inner.emit(QueueEvent::JobSubmitted {
            token,
            priority,
            timestamp: Utc::now(),
        });

        self.inner.wakeup.notify_one();
        if start {
            self.inner.spawn_scheduler();
        }

        token
    }

    /// Cancel a job.
    ///
    /// An uploading job is interrupted and goes back to waiting; any other
    /// job is removed. Returns false for unknown tokens.
    pub async fn cancel(&self, token: &JobToken) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(index) = state.position(token) else {
            return false;
        };

        if state.jobs[index].state != JobState::Uploading {
            let removed = state.jobs.remove(index);
            drop(state);

            info!("Removed {} job {} from queue", removed.state.as_str(), token);
            self.inner.emit(QueueEvent::JobRemoved {
                token: *token,
                timestamp: Utc::now(),
            });
            return true;
        }

        match state.active.remove(token) {
            Some(active) => active.cancel.cancel(),
            None => error!("Uploading job {} has no cancellation handle", token),
        }
        state.jobs[index].reset_to_waiting();
        state.resort();
        let start = state.claim_scheduler();
        drop(state);

        info!("Interrupted upload of job {}", token);
        self.inner.emit(QueueEvent::JobInterrupted {
            token: *token,
            timestamp: Utc::now(),
        });

        self.inner.wakeup.notify_one();
        if start {
            self.inner.spawn_scheduler();
        }
        true
    }

    /// Change the priority of a waiting job
    pub async fn reorder(&self, token: &JobToken, priority: i32) -> bool {
        {
            let mut state = self.inner.state.lock().await;
            let Some(job) = state.find_mut(token) else {
                return false;
            };
            if job.state != JobState::Waiting {
                return false;
            }
            job.priority = priority;
            state.resort();
        }

        info!("Job {} reprioritized to {}", token, priority);
        self.inner.emit(QueueEvent::JobReprioritized {
            token: *token,
            priority,
            timestamp: Utc::now(),
        });
        true
    }

    /// Count jobs by state
    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock().await;
        QueueSnapshot::from_jobs(&state.jobs)
    }

    /// Get all jobs in queue order
    pub async fn list(&self) -> Vec<JobView> {
        let state = self.inner.state.lock().await;
        state.jobs.iter().map(Job::view).collect()
    }

    /// Get a single job
    pub async fn get(&self, token: &JobToken) -> Option<JobView> {
        let state = self.inner.state.lock().await;
        state.jobs.iter().find(|job| job.token == *token).map(Job::view)
    }

    /// Drop completed jobs; failed jobs stay
    pub async fn clear_finished(&self) -> usize {
        let count = {
            let mut state = self.inner.state.lock().await;
            let before = state.jobs.len();
            state.jobs.retain(|job| job.state != JobState::Completed);
            before - state.jobs.len()
        };

        info!("Cleared {} completed jobs from queue", count);
        self.inner.emit(QueueEvent::FinishedCleared {
            count,
            timestamp: Utc::now(),
        });
        count
    }

    /// Give every failed job a fresh retry budget and queue it again
    pub async fn retry_all(&self) -> usize {
        let (count, start) = {
            let mut state = self.inner.state.lock().await;
            let mut count = 0;
            for job in state.jobs.iter_mut().filter(|job| job.state == JobState::Error) {
                job.reset_to_waiting();
                job.retry_count = 0;
                job.last_error = None;
                job.not_before = None;
                count += 1;
            }
            if count == 0 {
                return 0;
            }
            state.resort();
            (count, state.claim_scheduler())
        };

        info!("Re-queued {} failed jobs", count);
        self.inner.emit(QueueEvent::FailedRetried {
            count,
            timestamp: Utc::now(),
        });

        self.inner.wakeup.notify_one();
        if start {
            self.inner.spawn_scheduler();
        }
        count
    }

    /// Receive queue events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// True when no scheduler loop is running
    pub async fn is_idle(&self) -> bool {
        !self.inner.state.lock().await.running
    }

    /// Number of registered in-flight uploads
    pub async fn active_count(&self) -> usize {
        self.inner.state.lock().await.active.len()
    }
}
