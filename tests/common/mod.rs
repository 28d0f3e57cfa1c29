//! Shared fixtures for the queue integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use upload_queue::queue::JobToken;
use upload_queue::{
    JobState, Payload, QueueManager, QueueSettings, Transport, UploadError, UploadResult,
};

/// Transport whose behaviour is chosen by the payload name prefix:
///
/// * `stall-*` never finishes until cancelled
/// * `fail-*` fails every attempt
/// * `flaky-*` fails the first `flaky_failures` attempts, then succeeds
/// * anything else succeeds after `chunks` chunks
pub struct ScriptedTransport {
    pub chunks: u64,
    pub chunk_delay: Duration,
    pub flaky_failures: u32,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new(chunks: u64, chunk_delay: Duration) -> Self {
        Self {
            chunks,
            chunk_delay,
            flaky_failures: 2,
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_flaky_failures(mut self, failures: u32) -> Self {
        self.flaky_failures = failures;
        self
    }

    /// Number of transfer calls made for a payload name
    pub fn attempts(&self, name: &str) -> u32 {
        self.attempts.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Highest number of transfers observed running at once
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn transfer(
        &self,
        payload: Payload,
        cancel: CancellationToken,
        progress: mpsc::Sender<u64>,
    ) -> Result<UploadResult, UploadError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(payload.name.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if payload.name.starts_with("stall") {
            cancel.cancelled().await;
            return Err(UploadError::Cancelled);
        }

        let failing = payload.name.starts_with("fail")
            || (payload.name.starts_with("flaky") && attempt <= self.flaky_failures);

        let total = payload.size();
        for chunk in 1..=self.chunks {
            tokio::select! {
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = sleep(self.chunk_delay) => {}
            }
            let sent = total * chunk / self.chunks;
            let _ = progress.send(sent).await;

            if failing && chunk * 2 >= self.chunks {
                return Err(UploadError::Transfer(format!(
                    "attempt {} of {} failed",
                    attempt, payload.name
                )));
            }
        }

        Ok(UploadResult {
            id: format!("{}-{}", payload.name, attempt),
            location: format!("test://{}", payload.name),
            size: total,
            content_type: payload.content_type.clone(),
            content: payload.data.clone(),
        })
    }
}

pub fn payload(name: &str, size: usize) -> Payload {
    Payload::new(name, "application/octet-stream", vec![0u8; size])
}

pub fn settings(max_concurrent: usize, max_retries: u32) -> QueueSettings {
    QueueSettings {
        max_concurrent,
        max_retries,
        ..Default::default()
    }
}

pub fn queue_with(
    settings: QueueSettings,
    transport: ScriptedTransport,
) -> (QueueManager, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    let queue = QueueManager::new(settings, transport.clone());
    (queue, transport)
}

/// Poll the queue until `state` is reached. Relies on the paused test clock.
pub async fn wait_for_state(queue: &QueueManager, token: &JobToken, state: JobState) {
    for _ in 0..10_000 {
        if queue.get(token).await.map(|view| view.state) == Some(state) {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {:?}", token, state);
}

/// Poll the queue until no job is waiting or uploading
pub async fn wait_until_settled(queue: &QueueManager) {
    for _ in 0..10_000 {
        let snapshot = queue.snapshot().await;
        if snapshot.waiting == 0 && snapshot.uploading == 0 {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("queue never settled: {:?}", queue.snapshot().await);
}
