//! Lifecycle notifications emitted by a queue instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Topic names, one per [`QueueEvent`] variant.
pub mod topics {
    pub const QUEUE_NEW: &str = "queue.new";
    pub const QUEUE_TIMEOUT: &str = "queue.timeout";
    pub const QUEUE_FULL: &str = "queue.full";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_SUCCESS: &str = "job.success";
    pub const JOB_TIMEOUT: &str = "job.timeout";
    pub const JOB_CANCEL: &str = "job.cancel";
    pub const JOB_FAILURE: &str = "job.failure";
}

/// Events emitted by a queue at the moment of each state transition.
///
/// Serialized as `{"event": "<topic>", ...}` with camelCase payload fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// A job was admitted into the wait queue.
    #[serde(rename = "queue.new", rename_all = "camelCase")]
    QueueNew {
        id: JobId,
        in_progress_count: usize,
        waiting_count: usize,
    },
    /// A job waited too long and was dropped from the wait queue.
    #[serde(rename = "queue.timeout", rename_all = "camelCase")]
    QueueTimeout {
        id: JobId,
        admitted_at: DateTime<Utc>,
    },
    /// A submission was rejected because the queue was at capacity.
    #[serde(rename = "queue.full", rename_all = "camelCase")]
    QueueFull {
        waiting_count: usize,
        in_progress_count: usize,
    },
    /// A job was dispatched into the active set.
    #[serde(rename = "job.started", rename_all = "camelCase")]
    JobStarted {
        id: JobId,
        admitted_at: DateTime<Utc>,
    },
    /// A job's body returned a value.
    #[serde(rename = "job.success", rename_all = "camelCase")]
    JobSuccess {
        id: JobId,
        admitted_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    },
    /// A job ran past its execution timeout.
    #[serde(rename = "job.timeout", rename_all = "camelCase")]
    JobTimeout {
        id: JobId,
        admitted_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
    },
    /// A job was cancelled by its holder.
    #[serde(rename = "job.cancel", rename_all = "camelCase")]
    JobCancelled {
        id: JobId,
        admitted_at: DateTime<Utc>,
    },
    /// A job's body failed or panicked.
    #[serde(rename = "job.failure", rename_all = "camelCase")]
    JobFailure {
        id: JobId,
        admitted_at: DateTime<Utc>,
        started_at: DateTime<Utc>,
        error: String,
    },
}

impl QueueEvent {
    /// Get the topic this event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            QueueEvent::QueueNew { .. } => topics::QUEUE_NEW,
            QueueEvent::QueueTimeout { .. } => topics::QUEUE_TIMEOUT,
            QueueEvent::QueueFull { .. } => topics::QUEUE_FULL,
            QueueEvent::JobStarted { .. } => topics::JOB_STARTED,
            QueueEvent::JobSuccess { .. } => topics::JOB_SUCCESS,
            QueueEvent::JobTimeout { .. } => topics::JOB_TIMEOUT,
            QueueEvent::JobCancelled { .. } => topics::JOB_CANCEL,
            QueueEvent::JobFailure { .. } => topics::JOB_FAILURE,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            QueueEvent::QueueNew { id, .. }
            | QueueEvent::QueueTimeout { id, .. }
            | QueueEvent::JobStarted { id, .. }
            | QueueEvent::JobSuccess { id, .. }
            | QueueEvent::JobTimeout { id, .. }
            | QueueEvent::JobCancelled { id, .. }
            | QueueEvent::JobFailure { id, .. } => Some(*id),
            QueueEvent::QueueFull { .. } => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            QueueEvent::QueueNew {
                id,
                in_progress_count,
                waiting_count,
            } => format!(
                "Job {} admitted ({} waiting, {} in progress)",
                id, waiting_count, in_progress_count
            ),
            QueueEvent::QueueTimeout { id, .. } => format!("Job {} timed out waiting", id),
            QueueEvent::QueueFull {
                waiting_count,
                in_progress_count,
            } => format!(
                "Queue full ({} waiting, {} in progress)",
                waiting_count, in_progress_count
            ),
            QueueEvent::JobStarted { id, .. } => format!("Job {} started", id),
            QueueEvent::JobSuccess { id, started_at, .. } => {
                let elapsed = (Utc::now() - *started_at).num_milliseconds();
                format!("Job {} succeeded after {}ms", id, elapsed)
            }
            QueueEvent::JobTimeout { id, .. } => format!("Job {} timed out running", id),
            QueueEvent::JobCancelled { id, .. } => format!("Job {} cancelled", id),
            QueueEvent::JobFailure { id, error, .. } => format!("Job {} failed: {}", id, error),
        }
    }
}
