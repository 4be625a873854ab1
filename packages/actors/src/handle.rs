//! Caller-facing handle to a submitted job.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use jobgate_core::{JobError, JobId};
use ractor::ActorRef;
use tokio::sync::oneshot;

use crate::messages::{JobOutcome, QueueMessage};

/// Cancel control for a job, detached from its outcome.
///
/// Cheap to clone and safe to use from any task, any number of times.
pub struct Canceller<T, E> {
    job_id: Option<JobId>,
    queue: ActorRef<QueueMessage<T, E>>,
}

impl<T, E> Canceller<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Request cancellation. A no-op once the job has settled, and for
    /// submissions that were never admitted.
    pub fn cancel(&self) {
        let Some(job_id) = self.job_id else {
            return;
        };
        if self
            .queue
            .send_message(QueueMessage::Cancel { job_id })
            .is_err()
        {
            tracing::debug!("Cancel of job {} dropped: queue stopped", job_id);
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }
}

impl<T, E> Clone for Canceller<T, E> {
    fn clone(&self) -> Self {
        Self {
            job_id: self.job_id,
            queue: self.queue.clone(),
        }
    }
}

/// Eventual outcome of a submitted job, plus its cancel control.
///
/// Await the handle to get the job's value or the single error it settled
/// with. Dropping the handle does not cancel the job.
pub struct JobHandle<T, E> {
    canceller: Canceller<T, E>,
    outcome: oneshot::Receiver<JobOutcome<T, E>>,
}

impl<T, E> JobHandle<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn new(
        job_id: Option<JobId>,
        queue: ActorRef<QueueMessage<T, E>>,
        outcome: oneshot::Receiver<JobOutcome<T, E>>,
    ) -> Self {
        Self {
            canceller: Canceller { job_id, queue },
            outcome,
        }
    }

    /// Id assigned at admission; `None` if the submission was rejected.
    pub fn id(&self) -> Option<JobId> {
        self.canceller.job_id
    }

    /// Request cancellation of this job.
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A cancel control that outlives awaiting this handle.
    pub fn canceller(&self) -> Canceller<T, E> {
        self.canceller.clone()
    }
}

impl<T, E> Future for JobHandle<T, E> {
    type Output = JobOutcome<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.outcome)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(JobError::QueueStopped)))
    }
}
