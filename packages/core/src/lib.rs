//! Core domain types for the job admission queue.
//!
//! This crate contains the types shared by the queue runtime and its callers:
//! - JobId, JobRecord and JobState for admitted work
//! - QueueConfig and QueueStats for queue instances
//! - QueueEvent for lifecycle notifications
//! - JobError for the ways a job can settle without a value

mod error;
mod events;
mod job;
mod queue;

pub use error::JobError;
pub use events::{QueueEvent, topics};
pub use job::{JobId, JobRecord, JobState, Settlement};
pub use queue::{JobCounts, QueueConfig, QueueId, QueueStats};
