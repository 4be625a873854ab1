//! Message types for the queue actor.

use jobgate_core::{JobError, JobId, QueueStats};
use ractor::RpcReplyPort;
use tokio::sync::oneshot;

use crate::body::{CancelHook, JobBody};
use crate::timers::TimerTicket;

/// What a job handle eventually resolves to.
pub type JobOutcome<T, E> = Result<T, JobError<E>>;

/// Everything the caller hands over when submitting a job.
pub(crate) struct Submission<T, E> {
    pub body: JobBody<T, E>,
    pub cancel_hook: Option<CancelHook>,
    pub outcome_tx: oneshot::Sender<JobOutcome<T, E>>,
}

/// How a job body finished on its execution task.
pub(crate) enum BodyOutcome<T, E> {
    /// The body's future resolved.
    Returned(Result<T, E>),
    /// The body's future panicked while being polled.
    Panicked(String),
}

/// Messages for the QueueActor.
///
/// Every event that can change a queue's state arrives here, so the actor
/// handles them one at a time.
pub(crate) enum QueueMessage<T, E> {
    /// Admit a new job, replying with its id or `None` if it was rejected.
    Submit {
        job: Box<Submission<T, E>>,
        reply: RpcReplyPort<Option<JobId>>,
    },

    /// Cancel a job. Unknown or settled jobs are ignored.
    Cancel { job_id: JobId },

    /// A queue-wait or execution timer elapsed.
    TimerFired { ticket: TimerTicket },

    /// A job body finished on its execution task.
    JobFinished {
        job_id: JobId,
        outcome: BodyOutcome<T, E>,
    },

    /// Get an occupancy snapshot.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Stop the queue.
    Shutdown,
}

impl<T, E> std::fmt::Debug for QueueMessage<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueMessage::Submit { .. } => f.write_str("Submit"),
            QueueMessage::Cancel { job_id } => {
                f.debug_struct("Cancel").field("job_id", job_id).finish()
            }
            QueueMessage::TimerFired { ticket } => {
                f.debug_struct("TimerFired").field("ticket", ticket).finish()
            }
            QueueMessage::JobFinished { job_id, .. } => f
                .debug_struct("JobFinished")
                .field("job_id", job_id)
                .finish_non_exhaustive(),
            QueueMessage::GetStats { .. } => f.write_str("GetStats"),
            QueueMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Error type for queue-level operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Failed to spawn queue actor: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("Queue actor is not running")]
    Stopped,

    #[error("Actor error: {0}")]
    Actor(String),
}
