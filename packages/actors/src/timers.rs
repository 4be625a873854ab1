//! Per-job timer registry.
//!
//! A job owns at most one timer at a time: the queue-wait timer while it sits
//! in the wait queue, the execution timer while it runs, nothing once settled.
//! Each timer is a sleeping tokio task. When it wakes it hands a
//! [`TimerTicket`] to its fire callback; the owner checks the ticket with
//! [`TimerRegistry::claim`] before acting, so a timer that fired just as it
//! was being disarmed or replaced is recognised as stale and dropped.

use std::collections::HashMap;
use std::time::Duration;

use jobgate_core::JobId;
use tokio::task::JoinHandle;

/// Which of a job's two timeouts a timer enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    QueueWait,
    Execution,
}

/// Identifies one arming of one timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerTicket {
    pub job_id: JobId,
    pub kind: TimerKind,
    generation: u64,
}

struct ArmedTimer {
    ticket: TimerTicket,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct TimerRegistry {
    armed: HashMap<JobId, ArmedTimer>,
    generation: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer for `job_id`, replacing whatever timer it had.
    pub fn arm<F>(&mut self, job_id: JobId, kind: TimerKind, after: Duration, fire: F)
    where
        F: FnOnce(TimerTicket) + Send + 'static,
    {
        self.generation += 1;
        let ticket = TimerTicket {
            job_id,
            kind,
            generation: self.generation,
        };

        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            fire(ticket);
        });

        if let Some(previous) = self.armed.insert(job_id, ArmedTimer { ticket, handle }) {
            previous.handle.abort();
        }
    }

    /// Disarm the timer for `job_id`, returning the kind that was armed.
    pub fn disarm(&mut self, job_id: JobId) -> Option<TimerKind> {
        let timer = self.armed.remove(&job_id)?;
        timer.handle.abort();
        Some(timer.ticket.kind)
    }

    /// Accept a fired ticket if it is still the current timer for its job.
    ///
    /// A claimed timer is released; a second claim of the same ticket fails.
    pub fn claim(&mut self, ticket: TimerTicket) -> bool {
        match self.armed.get(&ticket.job_id) {
            Some(timer) if timer.ticket == ticket => {
                self.armed.remove(&ticket.job_id);
                true
            }
            _ => false,
        }
    }

    pub fn armed_kind(&self, job_id: JobId) -> Option<TimerKind> {
        self.armed.get(&job_id).map(|timer| timer.ticket.kind)
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// Abort every outstanding timer.
    pub fn clear(&mut self) {
        for (_, timer) in self.armed.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
