//! Running job bodies and reporting their outcome back to the queue.

use std::panic::{AssertUnwindSafe, catch_unwind};

use futures_util::FutureExt;
use jobgate_core::JobId;
use ractor::ActorRef;
use tokio::task::JoinHandle;

use crate::body::{JobBody, panic_message};
use crate::messages::{BodyOutcome, QueueMessage};

/// Build a job's future and run it on its own task.
///
/// The body closure is called right here, so a panic while building the
/// future comes back as `Err` with the panic message. Once running, the
/// outcome (including a panic while polling) is sent to `queue` as
/// [`QueueMessage::JobFinished`]. Aborting the returned handle drops the
/// future and nothing is reported.
pub(crate) fn start<T, E>(
    job_id: JobId,
    body: JobBody<T, E>,
    queue: ActorRef<QueueMessage<T, E>>,
) -> Result<JoinHandle<()>, String>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let future = catch_unwind(AssertUnwindSafe(body)).map_err(panic_message)?;

    Ok(tokio::spawn(async move {
        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => BodyOutcome::Returned(result),
            Err(payload) => BodyOutcome::Panicked(panic_message(payload)),
        };

        if queue
            .send_message(QueueMessage::JobFinished { job_id, outcome })
            .is_err()
        {
            tracing::debug!("Queue stopped before job {} reported its outcome", job_id);
        }
    }))
}
