//! Public entry point: a running queue instance.

use std::fmt::Display;
use std::future::Future;

use jobgate_core::{QueueConfig, QueueEvent, QueueId, QueueStats};
use ractor::{Actor, ActorRef};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::body::{CancelHook, JobBody, boxed_body};
use crate::handle::JobHandle;
use crate::messages::{QueueError, QueueMessage, Submission};
use crate::queue_actor::{QueueActor, QueueActorArgs};

/// Capacity of each queue's notification channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A running job queue.
///
/// Jobs return `Result<T, E>`. The queue runs on its own actor; dropping the
/// `JobQueue` stops it, settling any unfinished handles with
/// [`JobError::QueueStopped`](jobgate_core::JobError::QueueStopped).
pub struct JobQueue<T, E> {
    id: QueueId,
    config: QueueConfig,
    actor: ActorRef<QueueMessage<T, E>>,
    join: Option<JoinHandle<()>>,
    event_tx: broadcast::Sender<QueueEvent>,
}

impl<T, E> JobQueue<T, E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    /// Start a queue with the given configuration.
    pub async fn start(config: QueueConfig) -> Result<Self, QueueError> {
        let id = QueueId::new();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let args = QueueActorArgs {
            queue_id: id,
            config: config.clone(),
            event_tx: event_tx.clone(),
        };
        let (actor, join) =
            Actor::spawn(Some(format!("job-queue-{}", id)), QueueActor::<T, E>::new(), args)
                .await?;

        Ok(Self {
            id,
            config,
            actor,
            join: Some(join),
            event_tx,
        })
    }

    /// Submit a job. Resolves as soon as the queue has decided on admission;
    /// the returned handle resolves when the job settles.
    ///
    /// A rejected submission yields a handle already settled with
    /// [`JobError::QueueFull`](jobgate_core::JobError::QueueFull).
    pub async fn submit<F, Fut>(&self, body: F) -> JobHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.enqueue(boxed_body(body), None).await
    }

    /// Submit a job with a hook that runs if the job is cancelled, or times
    /// out while running.
    pub async fn submit_with_cancel_hook<F, Fut, H>(
        &self,
        body: F,
        on_cancel: H,
    ) -> JobHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        H: FnOnce() + Send + 'static,
    {
        self.enqueue(boxed_body(body), Some(Box::new(on_cancel))).await
    }

    async fn enqueue(
        &self,
        body: JobBody<T, E>,
        cancel_hook: Option<CancelHook>,
    ) -> JobHandle<T, E> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (tx, rx) = ractor::concurrency::oneshot();

        let message = QueueMessage::Submit {
            job: Box::new(Submission {
                body,
                cancel_hook,
                outcome_tx,
            }),
            reply: tx.into(),
        };

        // If the actor is gone the submission is dropped with it, and the
        // handle resolves as stopped.
        let job_id = match self.actor.send_message(message) {
            Ok(()) => rx.await.ok().flatten(),
            Err(_) => {
                tracing::warn!("Submit to stopped queue {}", self.id);
                None
            }
        };

        JobHandle::new(job_id, self.actor.clone(), outcome_rx)
    }

    /// Get a consistent occupancy snapshot.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(QueueMessage::GetStats { reply: tx.into() })
            .map_err(|_| QueueError::Stopped)?;
        rx.await.map_err(|_| QueueError::Stopped)
    }

    /// Subscribe to this queue's lifecycle events.
    ///
    /// Events are delivered in the order the transitions happened. A receiver
    /// that falls more than the channel capacity behind loses the oldest
    /// events; the queue itself is never slowed down by subscribers.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the queue and wait for its actor to finish.
    pub async fn shutdown(mut self) -> Result<(), QueueError> {
        if self.actor.send_message(QueueMessage::Shutdown).is_err() {
            tracing::debug!("Queue {} was already stopped", self.id);
        }
        match self.join.take() {
            Some(join) => join.await.map_err(|e| QueueError::Actor(e.to_string())),
            None => Ok(()),
        }
    }
}

impl<T, E> JobQueue<T, E> {
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl<T, E> Drop for JobQueue<T, E> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.actor.stop(Some("queue dropped".to_string()));
        }
    }
}
