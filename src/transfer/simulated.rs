//! Local stand-in for a real upload endpoint

use crate::transfer::transport::{Payload, Transport, UploadResult};
use crate::utils::config::SimulationSettings;
use crate::utils::error::UploadError;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transport that sends the payload in fixed-size chunks with a randomized
/// delay per chunk, optionally failing a share of the attempts.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    settings: SimulationSettings,
}

impl SimulatedTransport {
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    fn chunk_delay(&self) -> Duration {
        let min = self.settings.min_chunk_delay_ms;
        let max = self.settings.max_chunk_delay_ms.max(min);
        let ms = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_millis(ms)
    }

    fn should_fail(&self) -> bool {
        let rate = self.settings.failure_rate;
        rate > 0.0 && rand::thread_rng().gen_bool(rate.min(1.0))
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new(SimulationSettings::default())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn id(&self) -> &'static str {
        "simulated"
    }

    async fn transfer(
        &self,
        payload: Payload,
        cancel: CancellationToken,
        progress: mpsc::Sender<u64>,
    ) -> Result<UploadResult, UploadError> {
        let total = payload.size();
        let chunk = self.settings.chunk_size.max(1) as u64;
        // Decided up front, triggered halfway through
        let fail_at = self.should_fail().then(|| total / 2);
        let mut sent = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Simulated transfer of {} interrupted at {} bytes", payload.name, sent);
                    return Err(UploadError::Cancelled);
                }
                _ = sleep(self.chunk_delay()) => {}
            }

            sent = (sent + chunk).min(total);
            if progress.send(sent).await.is_err() {
                warn!("Progress receiver dropped for {}", payload.name);
            }

            if let Some(limit) = fail_at {
                if sent >= limit {
                    return Err(UploadError::Transfer(format!(
                        "simulated network error after {} of {} bytes",
                        sent, total
                    )));
                }
            }

            if sent >= total {
                break;
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        Ok(UploadResult {
            location: format!("memory://{}/{}", id, payload.name),
            id,
            size: total,
            content_type: payload.content_type.clone(),
            content: payload.data.clone(),
        })
    }
}
