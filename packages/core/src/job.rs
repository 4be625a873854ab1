//! Job domain types for work admitted into a queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of an admitted job.
///
/// Ids are handed out in admission order by the owning queue and are never
/// reused for the lifetime of that queue. Rejected submissions consume no id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// The first id a fresh queue assigns.
    pub const FIRST: JobId = JobId(1);

    /// Return this id and advance the counter to the next one.
    pub fn advance(&mut self) -> JobId {
        let current = *self;
        self.0 += 1;
        current
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal path a job took out of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// The body returned a value.
    Succeeded,
    /// The body returned an error or panicked.
    Failed,
    /// The job was never dispatched before its queue-wait timer fired.
    QueueTimeout,
    /// The job ran past its execution timeout.
    JobTimeout,
    /// The job was cancelled by its holder.
    Cancelled,
}

impl Settlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Settlement::Succeeded => "succeeded",
            Settlement::Failed => "failed",
            Settlement::QueueTimeout => "queue_timeout",
            Settlement::JobTimeout => "job_timeout",
            Settlement::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Settlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "settlement", rename_all = "snake_case")]
pub enum JobState {
    /// Admitted and held in the wait queue.
    #[default]
    Waiting,
    /// Dispatched into the active set; its body is running.
    Active,
    /// Reached a terminal outcome.
    Settled(Settlement),
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Settled(_))
    }
}

/// Bookkeeping for one admitted job: identity, timestamps and state.
///
/// The record only moves forward: `Waiting -> Active -> Settled`, or straight
/// from `Waiting` to `Settled`. Transitions out of a terminal state are refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub admitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub state: JobState,
}

impl JobRecord {
    /// Create a record for a job admitted now.
    pub fn admitted(id: JobId) -> Self {
        Self {
            id,
            admitted_at: Utc::now(),
            started_at: None,
            state: JobState::Waiting,
        }
    }

    /// Move a waiting job into the active state, stamping its start time.
    ///
    /// Returns `false` and leaves the record untouched unless it was waiting.
    pub fn start(&mut self) -> bool {
        if self.state != JobState::Waiting {
            return false;
        }
        self.state = JobState::Active;
        self.started_at = Some(Utc::now());
        true
    }

    /// Mark the job settled. Returns `false` if it already was.
    pub fn settle(&mut self, settlement: Settlement) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = JobState::Settled(settlement);
        true
    }

    /// Time the job has been running, if it was dispatched.
    pub fn run_time(&self) -> Option<chrono::Duration> {
        self.started_at.map(|started| Utc::now() - started)
    }
}
