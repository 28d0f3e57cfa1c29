//! Upload queue library

pub mod queue;
pub mod transfer;
pub mod utils;

// Re-export main types for easier use
pub use queue::{JobState, JobToken, JobView, QueueEvent, QueueManager, QueueSnapshot, UploadHooks};
pub use transfer::{Payload, SimulatedTransport, Transport, UploadResult};
pub use utils::{QueueSettings, SimulationSettings, UploadError};
