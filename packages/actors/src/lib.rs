//! Actor-backed job admission queue.
//!
//! Each [`JobQueue`] owns one Ractor actor that serializes every event which
//! can change the queue: submissions, cancellations, timer fires and job
//! completions. Job bodies run on their own tokio tasks and report back to
//! the actor when they finish.
//!
//! # Lifecycle
//!
//! A submission is admitted if `waiting + in progress < max_task_count`,
//! otherwise it settles with `QueueFull`. Admitted jobs wait in FIFO order
//! until fewer than `concurrency` jobs are running, then start. A job that
//! waits longer than the queue timeout settles with `QueueTimeout`; one that
//! runs longer than the execution timeout has its cancel hook run and settles
//! with `JobTimeout`. Any job can be cancelled until it settles.
//!
//! # Usage
//!
//! ```ignore
//! use jobgate_actors::JobQueue;
//! use jobgate_core::QueueConfig;
//!
//! let queue: JobQueue<u32, String> =
//!     JobQueue::start(QueueConfig::default().with_max_task_count(8)).await?;
//!
//! let handle = queue.submit(|| async { Ok(42) }).await;
//! assert_eq!(handle.await?, 42);
//! ```

mod body;
mod execution;
mod handle;
mod job_queue;
mod messages;
mod queue_actor;
mod timers;

pub use body::{CancelHook, JobBody, JobFuture};
pub use handle::{Canceller, JobHandle};
pub use job_queue::JobQueue;
pub use messages::{JobOutcome, QueueError};
