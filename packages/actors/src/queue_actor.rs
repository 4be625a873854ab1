//! Queue actor: admission, dispatch, timeouts, cancellation and settlement
//! for a single queue instance.

use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::marker::PhantomData;

use jobgate_core::{
    JobError, JobId, JobRecord, QueueConfig, QueueEvent, QueueId, QueueStats, Settlement,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::body::{CancelHook, JobBody, run_cancel_hook};
use crate::execution;
use crate::messages::{BodyOutcome, JobOutcome, QueueMessage, Submission};
use crate::timers::{TimerKind, TimerRegistry, TimerTicket};

/// An admitted job while it sits in the wait queue or the active set.
struct QueuedJob<T, E> {
    record: JobRecord,
    /// Taken when the job is dispatched.
    body: Option<JobBody<T, E>>,
    cancel_hook: Option<CancelHook>,
    outcome_tx: oneshot::Sender<JobOutcome<T, E>>,
    /// Task polling the body, once dispatched.
    execution: Option<JoinHandle<()>>,
}

impl<T, E> QueuedJob<T, E> {
    /// Resolve the caller's handle and drop the job.
    ///
    /// Consuming `self` is what makes settlement happen at most once.
    fn settle(mut self, settlement: Settlement, outcome: JobOutcome<T, E>) {
        if let Some(execution) = self.execution.take() {
            execution.abort();
        }
        if !self.record.settle(settlement) {
            tracing::warn!(
                "Job {} was already settled, not settling as {}",
                self.record.id,
                settlement
            );
            return;
        }
        match self.record.run_time() {
            Some(run_time) => tracing::debug!(
                "Job {} settled: {} after running {}ms",
                self.record.id,
                settlement,
                run_time.num_milliseconds()
            ),
            None => tracing::debug!(
                "Job {} settled: {} without running",
                self.record.id,
                settlement
            ),
        }
        // The holder may have dropped its handle; that is not an error.
        let _ = self.outcome_tx.send(outcome);
    }
}

/// Arguments for spawning a queue actor.
pub(crate) struct QueueActorArgs {
    pub queue_id: QueueId,
    pub config: QueueConfig,
    pub event_tx: broadcast::Sender<QueueEvent>,
}

/// State for the queue actor.
pub(crate) struct QueueActorState<T, E> {
    queue_id: QueueId,
    config: QueueConfig,
    /// Id the next admitted job receives.
    next_id: JobId,
    /// Admitted jobs in admission order.
    waiting: VecDeque<QueuedJob<T, E>>,
    /// Dispatched jobs by ID.
    active: HashMap<JobId, QueuedJob<T, E>>,
    timers: TimerRegistry,
    /// Set while a dispatch pass runs; nested passes return immediately.
    dispatching: bool,
    /// Event broadcaster.
    event_tx: broadcast::Sender<QueueEvent>,
    /// Handed to timers and execution tasks so they can report back.
    myself: ActorRef<QueueMessage<T, E>>,
}

impl<T, E> QueueActorState<T, E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    fn new(args: QueueActorArgs, myself: ActorRef<QueueMessage<T, E>>) -> Self {
        Self {
            queue_id: args.queue_id,
            config: args.config,
            next_id: JobId::FIRST,
            waiting: VecDeque::new(),
            active: HashMap::new(),
            timers: TimerRegistry::new(),
            dispatching: false,
            event_tx: args.event_tx,
            myself,
        }
    }

    /// Broadcast an event.
    fn broadcast(&self, event: QueueEvent) {
        tracing::debug!("Queue {}: {}", self.queue_id, event.description());
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    fn stats(&self) -> QueueStats {
        QueueStats::snapshot(
            self.waiting.len(),
            self.active.len(),
            self.config.max_task_count,
        )
    }

    fn arm_timer(&mut self, job_id: JobId, kind: TimerKind) {
        let after = match kind {
            TimerKind::QueueWait => self.config.queue_timeout(),
            TimerKind::Execution => self.config.execution_timeout(),
        };
        let queue = self.myself.clone();
        self.timers.arm(job_id, kind, after, move |ticket| {
            let _ = queue.send_message(QueueMessage::TimerFired { ticket });
        });
    }

    /// Detach a job from the queue: disarm its timer, then remove it from
    /// whichever container holds it. `None` means it has already settled.
    fn take(&mut self, job_id: JobId) -> Option<QueuedJob<T, E>> {
        self.timers.disarm(job_id);
        if let Some(job) = self.active.remove(&job_id) {
            return Some(job);
        }
        let position = self.waiting.iter().position(|job| job.record.id == job_id)?;
        self.waiting.remove(position)
    }

    /// Admit a job, or reject it if the queue is at capacity.
    fn admit(&mut self, submission: Submission<T, E>) -> Option<JobId> {
        let waiting_count = self.waiting.len();
        let in_progress_count = self.active.len();

        if waiting_count + in_progress_count >= self.config.max_task_count {
            self.broadcast(QueueEvent::QueueFull {
                waiting_count,
                in_progress_count,
            });
            let _ = submission.outcome_tx.send(Err(JobError::QueueFull {
                waiting_count,
                in_progress_count,
            }));
            return None;
        }

        let job_id = self.next_id.advance();
        self.waiting.push_back(QueuedJob {
            record: JobRecord::admitted(job_id),
            body: Some(submission.body),
            cancel_hook: submission.cancel_hook,
            outcome_tx: submission.outcome_tx,
            execution: None,
        });
        self.arm_timer(job_id, TimerKind::QueueWait);

        self.broadcast(QueueEvent::QueueNew {
            id: job_id,
            in_progress_count: self.active.len(),
            waiting_count: self.waiting.len(),
        });

        self.dispatch();
        Some(job_id)
    }

    /// Promote waiting jobs into the active set while there is capacity.
    fn dispatch(&mut self) {
        if self.dispatching {
            return;
        }
        self.dispatching = true;

        while self.active.len() < self.config.concurrency {
            let Some(job_id) = self.waiting.front().map(|job| job.record.id) else {
                break;
            };
            self.timers.disarm(job_id);
            let Some(mut job) = self.waiting.pop_front() else {
                break;
            };

            if !job.record.start() {
                tracing::warn!(
                    "Job {} left the wait queue in state {:?}",
                    job_id,
                    job.record.state
                );
            }
            let admitted_at = job.record.admitted_at;
            let body = job.body.take();
            self.active.insert(job_id, job);
            self.arm_timer(job_id, TimerKind::Execution);

            self.broadcast(QueueEvent::JobStarted {
                id: job_id,
                admitted_at,
            });

            let started = match body {
                Some(body) => execution::start(job_id, body, self.myself.clone()),
                None => Err("job body was already consumed".to_string()),
            };
            match started {
                Ok(handle) => {
                    if let Some(job) = self.active.get_mut(&job_id) {
                        job.execution = Some(handle);
                    }
                }
                Err(message) => {
                    tracing::warn!("Job {} failed to start: {}", job_id, message);
                    self.finish(job_id, BodyOutcome::Panicked(message));
                }
            }
        }

        self.dispatching = false;
    }

    /// Settle a dispatched job with its body's outcome.
    fn finish(&mut self, job_id: JobId, outcome: BodyOutcome<T, E>) {
        let Some(job) = self.take(job_id) else {
            tracing::debug!("Ignoring outcome of already settled job {}", job_id);
            return;
        };

        let admitted_at = job.record.admitted_at;
        let started_at = job.record.started_at.unwrap_or(admitted_at);

        match outcome {
            BodyOutcome::Returned(Ok(value)) => {
                self.broadcast(QueueEvent::JobSuccess {
                    id: job_id,
                    admitted_at,
                    started_at,
                });
                job.settle(Settlement::Succeeded, Ok(value));
            }
            BodyOutcome::Returned(Err(error)) => {
                self.broadcast(QueueEvent::JobFailure {
                    id: job_id,
                    admitted_at,
                    started_at,
                    error: error.to_string(),
                });
                job.settle(Settlement::Failed, Err(JobError::Failed(error)));
            }
            BodyOutcome::Panicked(message) => {
                self.broadcast(QueueEvent::JobFailure {
                    id: job_id,
                    admitted_at,
                    started_at,
                    error: message.clone(),
                });
                job.settle(Settlement::Failed, Err(JobError::Panicked(message)));
            }
        }

        self.dispatch();
    }

    /// Act on a fired timer unless it went stale.
    fn expire(&mut self, ticket: TimerTicket) {
        if !self.timers.claim(ticket) {
            tracing::debug!("Ignoring stale {:?} timer for job {}", ticket.kind, ticket.job_id);
            return;
        }
        let Some(mut job) = self.take(ticket.job_id) else {
            return;
        };

        let job_id = job.record.id;
        let admitted_at = job.record.admitted_at;

        match ticket.kind {
            TimerKind::QueueWait => {
                self.broadcast(QueueEvent::QueueTimeout {
                    id: job_id,
                    admitted_at,
                });
                job.settle(
                    Settlement::QueueTimeout,
                    Err(JobError::QueueTimeout { admitted_at }),
                );
            }
            TimerKind::Execution => {
                if let Some(execution) = job.execution.take() {
                    execution.abort();
                }
                run_cancel_hook(job_id, job.cancel_hook.take());
                self.broadcast(QueueEvent::JobTimeout {
                    id: job_id,
                    admitted_at,
                    started_at: job.record.started_at.unwrap_or(admitted_at),
                });
                job.settle(Settlement::JobTimeout, Err(JobError::JobTimeout));
            }
        }

        self.dispatch();
    }

    /// Cancel a job wherever it is. Settled or unknown jobs are left alone.
    fn cancel(&mut self, job_id: JobId) {
        let armed = self.timers.armed_kind(job_id);
        let Some(mut job) = self.take(job_id) else {
            tracing::debug!("Cancel of job {} ignored: not waiting or active", job_id);
            return;
        };
        tracing::debug!("Cancelling job {} ({:?} timer armed)", job_id, armed);

        if let Some(execution) = job.execution.take() {
            execution.abort();
        }
        run_cancel_hook(job_id, job.cancel_hook.take());

        self.broadcast(QueueEvent::JobCancelled {
            id: job_id,
            admitted_at: job.record.admitted_at,
        });
        job.settle(Settlement::Cancelled, Err(JobError::JobCancelled));

        self.dispatch();
    }

    /// Release every timer and job when the queue stops.
    ///
    /// Running bodies are aborted, so their cancel hooks run. Every unsettled
    /// handle resolves with [`JobError::QueueStopped`].
    fn drain(&mut self) {
        tracing::debug!(
            "Queue {} releasing {} timers, {} waiting and {} active jobs",
            self.queue_id,
            self.timers.len(),
            self.waiting.len(),
            self.active.len()
        );
        self.timers.clear();

        for (job_id, mut job) in self.active.drain() {
            if let Some(execution) = job.execution.take() {
                execution.abort();
            }
            run_cancel_hook(job_id, job.cancel_hook.take());
            let _ = job.outcome_tx.send(Err(JobError::QueueStopped));
        }
        for job in self.waiting.drain(..) {
            let _ = job.outcome_tx.send(Err(JobError::QueueStopped));
        }
    }
}

/// Queue actor that owns a single queue instance.
pub(crate) struct QueueActor<T, E> {
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E> QueueActor<T, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T, E> Default for QueueActor<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Actor for QueueActor<T, E>
where
    T: Send + 'static,
    E: Display + Send + 'static,
{
    type Msg = QueueMessage<T, E>;
    type State = QueueActorState<T, E>;
    type Arguments = QueueActorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting queue actor {} (concurrency {}, capacity {})",
            args.queue_id,
            args.config.concurrency,
            args.config.max_task_count
        );
        Ok(QueueActorState::new(args, myself))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Submit { job, reply } => {
                let admitted = state.admit(*job);
                let _ = reply.send(admitted);
            }

            QueueMessage::Cancel { job_id } => {
                state.cancel(job_id);
            }

            QueueMessage::TimerFired { ticket } => {
                state.expire(ticket);
            }

            QueueMessage::JobFinished { job_id, outcome } => {
                state.finish(job_id, outcome);
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.queue_id);
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.drain();
        tracing::info!("Queue actor {} stopped", state.queue_id);
        Ok(())
    }
}
