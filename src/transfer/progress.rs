//! Progress tracking for uploads

use std::time::Duration;
use tokio::time::Instant;

/// Progress tracking structure
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    pub total_bytes: u64,
    pub sent_bytes: u64,
    pub speed: f64, // bytes per second
    pub eta: Option<Duration>,
}

impl TransferProgress {
    /// Create a new progress tracker
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            sent_bytes: 0,
            speed: 0.0,
            eta: None,
        }
    }

    /// Record the cumulative byte count; never moves backwards
    pub fn advance(&mut self, sent_bytes: u64) {
        let sent_bytes = sent_bytes.min(self.total_bytes);
        if sent_bytes > self.sent_bytes {
            self.sent_bytes = sent_bytes;
        }
    }

    /// Update the transfer rate and recompute the ETA from it
    pub fn update_speed(&mut self, speed: f64) {
        self.speed = speed;

        if self.sent_bytes >= self.total_bytes {
            self.eta = Some(Duration::from_secs(0));
        } else if speed > 0.0 {
            let remaining = self.total_bytes - self.sent_bytes;
            self.eta = Some(Duration::from_secs_f64((remaining as f64) / speed));
        } else {
            self.eta = None;
        }
    }

    /// Mark as completed
    pub fn complete(&mut self) {
        self.sent_bytes = self.total_bytes;
        self.eta = Some(Duration::from_secs(0));
    }

    /// Whole-number percentage (0 to 100)
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.sent_bytes.min(self.total_bytes) * 100) / self.total_bytes) as u8
    }
}

/// Samples the transfer rate no more often than once per window
#[derive(Debug, Clone)]
pub struct SpeedMeter {
    window: Duration,
    last_sample_at: Instant,
    last_sample_bytes: u64,
}

impl SpeedMeter {
    pub fn new(window: Duration, started_at: Instant) -> Self {
        Self {
            window,
            last_sample_at: started_at,
            last_sample_bytes: 0,
        }
    }

    /// Returns the rate over the elapsed window once it is at least `window` long
    pub fn sample(&mut self, sent_bytes: u64, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        let delta = sent_bytes.saturating_sub(self.last_sample_bytes);
        let speed = delta as f64 / elapsed.as_secs_f64();

        self.last_sample_at = now;
        self.last_sample_bytes = sent_bytes;
        Some(speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // TRANSFER PROGRESS
    // ============================================================

    #[test]
    fn test_transfer_progress_new() {
        let progress = TransferProgress::new(1000);

        assert_eq!(progress.total_bytes, 1000);
        assert_eq!(progress.sent_bytes, 0);
        assert_eq!(progress.speed, 0.0);
        assert_eq!(progress.eta, None);
        assert_eq!(progress.percent(), 0);
    }

    #[test]
    fn test_advance_is_monotonic_and_clamped() {
        let mut progress = TransferProgress::new(1000);
        progress.advance(600);
        progress.advance(400);
        assert_eq!(progress.sent_bytes, 600);

        progress.advance(5000);
        assert_eq!(progress.sent_bytes, 1000);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_eta_from_speed() {
        let mut progress = TransferProgress::new(1000);
        progress.advance(500);
        progress.update_speed(100.0);

        assert_eq!(
            progress.eta.unwrap().as_secs(),
            5,
            "ETA should be 5 seconds (500 bytes remaining at 100 B/s)"
        );
    }

    #[test]
    fn test_eta_zero_speed() {
        let mut progress = TransferProgress::new(1000);
        progress.advance(100);
        progress.update_speed(0.0);
        assert_eq!(progress.eta, None, "ETA should be None with zero speed");
    }

    #[test]
    fn test_eta_decreases_as_upload_advances() {
        let mut progress = TransferProgress::new(1000);

        progress.advance(250);
        progress.update_speed(100.0);
        let eta1 = progress.eta.unwrap();

        progress.advance(750);
        progress.update_speed(100.0);
        let eta2 = progress.eta.unwrap();

        assert!(eta1 > eta2);
    }

    #[test]
    fn test_complete() {
        let mut progress = TransferProgress::new(1000);
        progress.advance(10);
        progress.complete();

        assert_eq!(progress.sent_bytes, 1000);
        assert_eq!(progress.eta, Some(Duration::from_secs(0)));
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_percent_zero_total() {
        let progress = TransferProgress::new(0);
        assert_eq!(progress.percent(), 0, "Should return 0 for zero total, not panic");
    }

    #[test]
    fn test_percent_rounds_down() {
        let mut progress = TransferProgress::new(3);
        progress.advance(2);
        assert_eq!(progress.percent(), 66);
    }

    // ============================================================
    // SPEED SAMPLING
    // ============================================================

    #[test]
    fn test_speed_meter_waits_for_window() {
        let start = Instant::now();
        let mut meter = SpeedMeter::new(Duration::from_secs(1), start);

        assert_eq!(meter.sample(100, start + Duration::from_millis(200)), None);
        assert_eq!(meter.sample(400, start + Duration::from_millis(900)), None);

        let speed = meter.sample(1000, start + Duration::from_secs(2)).unwrap();
        assert!((speed - 500.0).abs() < 0.001);
    }

    #[test]
    fn test_speed_meter_is_instantaneous() {
        let start = Instant::now();
        let mut meter = SpeedMeter::new(Duration::from_secs(1), start);

        meter.sample(1000, start + Duration::from_secs(1)).unwrap();
        let speed = meter.sample(1200, start + Duration::from_secs(2)).unwrap();
        assert!((speed - 200.0).abs() < 0.001, "Rate covers only the last window");
    }
}
