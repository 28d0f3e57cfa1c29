//! Queue configuration

use crate::utils::error::UploadError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Maximum concurrent uploads
    pub max_concurrent: usize,

    /// Retries granted to each job before it is marked as failed
    pub max_retries: u32,

    /// Fallback interval for re-checking free upload slots (ms)
    pub poll_interval_ms: u64,

    /// Minimum time between transfer rate samples (ms)
    pub speed_window_ms: u64,

    /// First retry delay, doubled on every further attempt (ms)
    pub backoff_base_ms: u64,

    /// Upper bound for a single retry delay (ms)
    pub backoff_max_ms: u64,

    /// Capacity of the queue event broadcast channel
    pub event_capacity: usize,

    /// Transfer simulation parameters
    pub simulation: SimulationSettings,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries: 3,
            poll_interval_ms: 100,
            speed_window_ms: 1000,
            backoff_base_ms: 2000,
            backoff_max_ms: 60_000,
            event_capacity: 256,
            simulation: SimulationSettings::default(),
        }
    }
}

/// Simulated transfer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Bytes sent per simulated chunk
    pub chunk_size: usize,

    /// Lower bound of the per-chunk delay (ms)
    pub min_chunk_delay_ms: u64,

    /// Upper bound of the per-chunk delay (ms)
    pub max_chunk_delay_ms: u64,

    /// Probability (0.0 - 1.0) that a transfer attempt fails
    pub failure_rate: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024, // 64KB
            min_chunk_delay_ms: 50,
            max_chunk_delay_ms: 250,
            failure_rate: 0.0,
        }
    }
}

impl QueueSettings {
    /// Parse settings from a JSON document, filling gaps with defaults
    pub fn from_json_str(json: &str) -> Result<Self, UploadError> {
        let settings: QueueSettings = serde_json::from_str(json)?;
        settings.check()?;
        Ok(settings.validated())
    }

    /// Load settings from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    /// Reject values that cannot be clamped into something meaningful
    fn check(&self) -> Result<(), UploadError> {
        let rate = self.simulation.failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(UploadError::InvalidConfig(format!(
                "failure_rate must be within 0.0..=1.0, got {}",
                rate
            )));
        }
        Ok(())
    }

    /// Enforce sane minimums
    pub fn validated(mut self) -> Self {
        if self.max_concurrent == 0 {
            self.max_concurrent = 1;
        }
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = 1;
        }
        if self.event_capacity == 0 {
            self.event_capacity = 1;
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            self.backoff_max_ms = self.backoff_base_ms;
        }
        if self.simulation.chunk_size == 0 {
            self.simulation.chunk_size = 1;
        }
        if self.simulation.max_chunk_delay_ms < self.simulation.min_chunk_delay_ms {
            self.simulation.max_chunk_delay_ms = self.simulation.min_chunk_delay_ms;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn speed_window(&self) -> Duration {
        Duration::from_millis(self.speed_window_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}
