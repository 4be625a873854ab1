//! Ways a submitted job can fail to produce a value.

use chrono::{DateTime, Utc};

use crate::Settlement;

/// Error a job handle settles with.
///
/// `E` is the error type of the job body. A body error is carried through
/// untouched in [`JobError::Failed`]; every other variant is raised by the
/// queue itself.
#[derive(Debug, thiserror::Error)]
pub enum JobError<E> {
    /// Admission was rejected because the queue was at capacity.
    #[error("queue is full ({waiting_count} waiting, {in_progress_count} in progress)")]
    QueueFull {
        waiting_count: usize,
        in_progress_count: usize,
    },

    /// The job was not dispatched before its queue timeout elapsed.
    #[error("job admitted at {admitted_at} timed out waiting in the queue")]
    QueueTimeout { admitted_at: DateTime<Utc> },

    /// The job ran past its execution timeout.
    #[error("job timed out")]
    JobTimeout,

    /// The job was cancelled.
    #[error("job cancelled")]
    JobCancelled,

    /// The job body returned an error.
    #[error("{0}")]
    Failed(E),

    /// The job body panicked while being built or polled.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// The queue was shut down before the job settled.
    #[error("queue stopped before the job settled")]
    QueueStopped,
}

impl<E> JobError<E> {
    /// The body's own error, if that is what this is.
    pub fn into_failure(self) -> Option<E> {
        match self {
            JobError::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Whether either timeout produced this error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, JobError::QueueTimeout { .. } | JobError::JobTimeout)
    }

    /// The settlement this error corresponds to, if the job was ever admitted.
    pub fn settlement(&self) -> Option<Settlement> {
        match self {
            JobError::QueueFull { .. } | JobError::QueueStopped => None,
            JobError::QueueTimeout { .. } => Some(Settlement::QueueTimeout),
            JobError::JobTimeout => Some(Settlement::JobTimeout),
            JobError::JobCancelled => Some(Settlement::Cancelled),
            JobError::Failed(_) | JobError::Panicked(_) => Some(Settlement::Failed),
        }
    }
}
