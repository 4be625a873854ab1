//! Queue domain types: identity, configuration and occupancy statistics.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a queue instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub Ulid);

impl QueueId {
    /// Create a new unique queue ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for QueueId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for queue behavior, fixed for the life of a queue instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How long an admitted job may wait for a free slot (milliseconds).
    pub queue_timeout_ms: u64,
    /// How long a dispatched job may run (milliseconds).
    pub execution_timeout_ms: u64,
    /// Maximum number of jobs running at once. Zero is allowed: nothing is
    /// ever dispatched and every job eventually times out in the wait queue.
    pub concurrency: usize,
    /// Maximum number of jobs held at once, waiting and running combined.
    pub max_task_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_timeout_ms: 500,
            execution_timeout_ms: 250,
            concurrency: 1,
            max_task_count: 1,
        }
    }
}

impl QueueConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_task_count(mut self, max_task_count: usize) -> Self {
        self.max_task_count = max_task_count;
        self
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

/// Job counts at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    /// Waiting plus in progress.
    pub total: usize,
    pub in_progress: usize,
    pub waiting: usize,
}

/// Occupancy snapshot of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub jobs: JobCounts,
    /// Whether the next submission would be rejected.
    pub full: bool,
}

impl QueueStats {
    /// Build a snapshot from the two container sizes and the capacity.
    pub fn snapshot(waiting: usize, in_progress: usize, max_task_count: usize) -> Self {
        let total = waiting + in_progress;
        Self {
            jobs: JobCounts {
                total,
                in_progress,
                waiting,
            },
            full: total >= max_task_count,
        }
    }
}
