//! Scheduling loop: admits waiting jobs while upload slots are free

use crate::queue::manager::{ActiveUpload, Inner, QueueState};
use crate::queue::ordering::{select_next, Selection};
use crate::queue::job::JobToken;
use crate::transfer::Payload;
use std::sync::Arc;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A job that was just moved to uploading
pub(crate) struct Admission {
    pub(crate) token: JobToken,
    pub(crate) run: u64,
    pub(crate) attempt: u32,
    pub(crate) payload: Payload,
    pub(crate) cancel: CancellationToken,
}

enum Step {
    Admitted(Admission),
    /// Every slot is taken
    Saturated,
    /// Only backed-off jobs are waiting
    Backoff(Instant),
    Idle,
}

impl QueueState {
    /// Mark the job at `index` as uploading and register its cancellation handle
    fn admit(&mut self, index: usize, max_concurrent: usize) -> Admission {
        debug_assert!(self.active.len() < max_concurrent);

        let run = self.next_run();
        let cancel = CancellationToken::new();

        let job = &mut self.jobs[index];
        job.start();
        let admission = Admission {
            token: job.token,
            run,
            attempt: job.retry_count + 1,
            payload: job.payload.clone(),
            cancel: cancel.clone(),
        };

        self.active.insert(admission.token, ActiveUpload { run, cancel });
        self.resort();
        admission
    }
}

impl Inner {
    pub(crate) fn spawn_scheduler(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_scheduler().await;
        });
    }

    async fn run_scheduler(self: Arc<Self>) {
        debug!("Scheduler started");

        loop {
            match self.next_step().await {
                Step::Admitted(admission) => self.spawn_upload(admission),
                Step::Saturated => {
                    // Woken when an upload exits; the poll interval is only a fallback
                    let _ = timeout(self.settings.poll_interval(), self.wakeup.notified()).await;
                }
                Step::Backoff(until) => {
                    tokio::select! {
                        _ = self.wakeup.notified() => {}
                        _ = sleep_until(until) => {}
                    }
                }
                Step::Idle => break,
            }
        }

        debug!("Scheduler idle");
    }

    /// Decide and, when possible, admit under a single lock acquisition
    async fn next_step(&self) -> Step {
        let max_concurrent = self.settings.max_concurrent;
        let mut state = self.state.lock().await;

        match select_next(&state.jobs, Instant::now()) {
            Selection::Empty => {
                state.running = false;
                Step::Idle
            }
            _ if state.active.len() >= max_concurrent => Step::Saturated,
            Selection::Ready(index) => Step::Admitted(state.admit(index, max_concurrent)),
            Selection::NotBefore(at) => Step::Backoff(at),
        }
    }
}
