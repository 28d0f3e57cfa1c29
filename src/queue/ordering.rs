//! Scheduling policy: how jobs are ordered and which one runs next

use crate::queue::job::{Job, JobState};
use std::cmp::Ordering;
use tokio::time::Instant;

/// Precedence of a state when presenting or selecting jobs
pub fn state_weight(state: JobState) -> u8 {
    match state {
        JobState::Uploading => 3,
        JobState::Waiting => 2,
        JobState::Error => 1,
        JobState::Completed => 0,
    }
}

/// Heavier state first, then higher priority, then submission order
pub fn compare(a: &Job, b: &Job) -> Ordering {
    state_weight(b.state)
        .cmp(&state_weight(a.state))
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.seq.cmp(&b.seq))
}

pub fn sort_jobs(jobs: &mut [Job]) {
    jobs.sort_by(compare);
}

/// What the scheduler should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index of the job to admit
    Ready(usize),
    /// Only backed-off jobs are waiting; the earliest becomes eligible then
    NotBefore(Instant),
    /// No job is waiting
    Empty,
}

/// Pick the first waiting job, in queue order, whose backoff has elapsed.
///
/// `jobs` must already be sorted with [`sort_jobs`].
pub fn select_next(jobs: &[Job], now: Instant) -> Selection {
    let mut earliest: Option<Instant> = None;

    for (index, job) in jobs.iter().enumerate() {
        if job.state != JobState::Waiting {
            continue;
        }
        match job.not_before {
            Some(at) if at > now => {
                earliest = Some(earliest.map_or(at, |e| e.min(at)));
            }
            _ => return Selection::Ready(index),
        }
    }

    match earliest {
        Some(at) => Selection::NotBefore(at),
        None => Selection::Empty,
    }
}
