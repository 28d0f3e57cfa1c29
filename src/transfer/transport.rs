//! Transport abstraction: what a job uploads and what a finished upload returns

use crate::utils::error::UploadError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Content handed to the queue by the caller
///
/// The queue only ever reads it; cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Payload {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Total size in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Record produced by a finished transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    /// Identifier assigned by the remote side
    pub id: String,
    /// Where the stored content can be fetched from
    pub location: String,
    pub size: u64,
    pub content_type: String,
    /// Handle to the stored bytes
    #[serde(skip)]
    pub content: Bytes,
}

/// Core trait for all upload transports
///
/// This isolates the queue from the way bytes actually leave the process
/// (simulated, HTTP, object storage, ...).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns a unique identifier for this transport (e.g., "simulated")
    fn id(&self) -> &'static str;

    /// Sends the payload.
    ///
    /// Cumulative bytes sent are reported on `progress`. Implementations should
    /// stop at their next suspension point once `cancel` fires and return
    /// [`UploadError::Cancelled`].
    async fn transfer(
        &self,
        payload: Payload,
        cancel: CancellationToken,
        progress: mpsc::Sender<u64>,
    ) -> Result<UploadResult, UploadError>;
}
