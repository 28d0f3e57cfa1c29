//! Per-job upload execution and exit handling

use crate::queue::events::QueueEvent;
use crate::queue::job::{CompleteHook, ErrorHook, JobToken, ProgressUpdate};
use crate::queue::manager::Inner;
use crate::queue::retry::RetryDecision;
use crate::queue::scheduler::Admission;
use crate::transfer::{Payload, SpeedMeter, UploadResult};
use crate::utils::error::UploadError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How an upload left the uploading state
enum Exit {
    Completed(UploadResult, Option<CompleteHook>),
    Retrying {
        retry_count: u32,
        delay: Duration,
        error: String,
    },
    Failed(UploadError, Option<ErrorHook>),
}

impl Inner {
    pub(crate) fn spawn_upload(self: &Arc<Self>, admission: Admission) {
        info!(
            "Started upload for job {} (attempt {})",
            admission.token, admission.attempt
        );
        self.emit(QueueEvent::JobStarted {
            token: admission.token,
            attempt: admission.attempt,
            timestamp: Utc::now(),
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.supervise(admission).await;
        });
    }

    /// Runs the upload in its own task so that the exit handling below also
    /// happens when the upload panics
    async fn supervise(self: Arc<Self>, admission: Admission) {
        let Admission {
            token,
            run,
            payload,
            cancel,
            ..
        } = admission;

        let worker = Arc::clone(&self);
        let handle = tokio::spawn(async move { worker.upload(token, run, payload, cancel).await });

        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = panic_message(e);
                error!("Upload task for job {} died: {}", token, message);
                Err(UploadError::TaskPanicked(message))
            }
        };

        self.finish(token, run, outcome).await;
    }

    async fn upload(
        &self,
        token: JobToken,
        run: u64,
        payload: Payload,
        cancel: CancellationToken,
    ) -> Result<UploadResult, UploadError> {
        let (progress_tx, mut progress_rx) = mpsc::channel::<u64>(100);
        let mut meter = SpeedMeter::new(self.settings.speed_window(), Instant::now());

        let transfer = self.transport.transfer(payload, cancel.clone(), progress_tx);
        tokio::pin!(transfer);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                Some(sent) = progress_rx.recv() => {
                    self.record_progress(token, run, sent, &mut meter).await;
                }
                result = &mut transfer => {
                    // Progress sent right before the transfer returned
                    while let Ok(sent) = progress_rx.try_recv() {
                        self.record_progress(token, run, sent, &mut meter).await;
                    }
                    return result;
                }
            }
        }
    }

    async fn record_progress(&self, token: JobToken, run: u64, sent: u64, meter: &mut SpeedMeter) {
        let (update, advanced, hook) = {
            let mut state = self.state.lock().await;
            if !state.is_current(&token, run) {
                return;
            }
            let Some(job) = state.find_mut(&token) else {
                return;
            };

            job.transfer.advance(sent);
            if let Some(speed) = meter.sample(job.transfer.sent_bytes, Instant::now()) {
                job.transfer.update_speed(speed);
            }

            let percent = job.transfer.percent();
            let advanced = percent > job.progress;
            if advanced {
                job.progress = percent;
            }

            let update = ProgressUpdate {
                token,
                progress: job.progress,
                sent_bytes: job.transfer.sent_bytes,
                total_bytes: job.transfer.total_bytes,
                speed: job.transfer.speed,
                eta: job.transfer.eta,
            };
            (update, advanced, job.hooks.on_progress.clone())
        };

        if advanced {
            self.emit(QueueEvent::JobProgress {
                token,
                progress: update.progress,
                timestamp: Utc::now(),
            });
        }
        if let Some(hook) = hook {
            hook(&update);
        }
    }

    /// Release the upload slot and move the job to its next state
    async fn finish(self: &Arc<Self>, token: JobToken, run: u64, outcome: Result<UploadResult, UploadError>) {
        let mut state = self.state.lock().await;

        if !state.is_current(&token, run) {
            // Already put back in line by `cancel`
            debug!("Ignoring exit of superseded upload for job {}", token);
            return;
        }
        state.active.remove(&token);

        let Some(index) = state.position(&token) else {
            drop(state);
            self.wakeup.notify_one();
            return;
        };
        let job = &mut state.jobs[index];

        // `cancel` unregisters the run before firing its token, so any error
        // reaching this point, `Cancelled` included, came from the transport
        let exit = match outcome {
            Ok(result) => {
                job.complete();
                Exit::Completed(result, job.hooks.on_complete.clone())
            }
            Err(error) => {
                job.retry_count += 1;
                match self.retry_policy.decide(job.retry_count, job.max_retries) {
                    RetryDecision::Retry(delay) => {
                        job.reset_to_waiting();
                        job.not_before = Some(Instant::now() + delay);
                        job.last_error = Some(error.to_string());
                        Exit::Retrying {
                            retry_count: job.retry_count,
                            delay,
                            error: error.to_string(),
                        }
                    }
                    RetryDecision::GiveUp => {
                        job.fail(&error);
                        Exit::Failed(error, job.hooks.on_error.clone())
                    }
                }
            }
        };

        // Published before the slot can be handed to the next job
        self.emit(match &exit {
            Exit::Completed(result, _) => QueueEvent::JobCompleted {
                token,
                location: result.location.clone(),
                timestamp: Utc::now(),
            },
            Exit::Retrying {
                retry_count,
                delay,
                error,
            } => QueueEvent::RetryScheduled {
                token,
                retry_count: *retry_count,
                delay: *delay,
                error: error.clone(),
                timestamp: Utc::now(),
            },
            Exit::Failed(error, _) => QueueEvent::JobFailed {
                token,
                error: error.to_string(),
                timestamp: Utc::now(),
            },
        });

        state.resort();
        let start = matches!(exit, Exit::Retrying { .. }) && state.claim_scheduler();
        drop(state);

        self.wakeup.notify_one();
        if start {
            self.spawn_scheduler();
        }

        match exit {
            Exit::Completed(result, hook) => {
                info!("Job {} completed ({} bytes)", token, result.size);
                if let Some(hook) = hook {
                    hook(&result);
                }
            }
            Exit::Retrying {
                retry_count,
                delay,
                error,
            } => {
                warn!(
                    "Job {} failed (retry {} in {:?}): {}",
                    token, retry_count, delay, error
                );
            }
            Exit::Failed(error, hook) => {
                error!("Job {} failed permanently: {}", token, error);
                if let Some(hook) = hook {
                    hook(&error);
                }
            }
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }

    let panic = err.into_panic();
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
