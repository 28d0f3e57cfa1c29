pub mod events;
mod executor;
pub mod job;
pub mod manager;
pub mod ordering;
pub mod retry;
mod scheduler;

pub use events::QueueEvent;
pub use job::{JobState, JobToken, JobView, ProgressUpdate, QueueSnapshot, UploadHooks};
pub use manager::QueueManager;
pub use retry::{RetryDecision, RetryPolicy};
