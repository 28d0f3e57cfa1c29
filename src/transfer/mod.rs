//! Upload transfer module

pub mod progress;
pub mod simulated;
pub mod transport;

// Re-export for convenience
pub use progress::{SpeedMeter, TransferProgress};
pub use simulated::SimulatedTransport;
pub use transport::{Payload, Transport, UploadResult};
