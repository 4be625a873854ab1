#![allow(dead_code, clippy::disallowed_methods)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobgate_actors::{JobHandle, JobQueue};
use jobgate_core::{JobId, QueueConfig, QueueEvent};
use tokio::sync::broadcast;

pub type TestQueue = JobQueue<&'static str, String>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn config(concurrency: usize, max_task_count: usize) -> QueueConfig {
    QueueConfig::default()
        .with_concurrency(concurrency)
        .with_max_task_count(max_task_count)
}

pub async fn start_queue(config: QueueConfig) -> (TestQueue, broadcast::Receiver<QueueEvent>) {
    init_tracing();
    let queue = JobQueue::start(config).await.expect("queue should start");
    let events = queue.subscribe();
    (queue, events)
}

/// Records the order in which job bodies finish.
#[derive(Clone, Default)]
pub struct Completions(Arc<Mutex<Vec<&'static str>>>);

impl Completions {
    pub fn push(&self, name: &'static str) {
        self.0.lock().unwrap().push(name);
    }

    pub fn order(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// Counts calls of a cancel hook.
#[derive(Clone, Default)]
pub struct HookCounter(Arc<AtomicUsize>);

impl HookCounter {
    pub fn hook(&self) -> impl FnOnce() + Send + 'static {
        let calls = self.0.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn calls(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Submit a job that sleeps for `ms` and then records its name.
pub async fn submit_sleeper(
    queue: &TestQueue,
    name: &'static str,
    ms: u64,
    completions: &Completions,
) -> JobHandle<&'static str, String> {
    let completions = completions.clone();
    queue
        .submit(move || async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            completions.push(name);
            Ok(name)
        })
        .await
}

/// Like [`submit_sleeper`], with a cancel hook.
pub async fn submit_sleeper_with_hook(
    queue: &TestQueue,
    name: &'static str,
    ms: u64,
    completions: &Completions,
    hooks: &HookCounter,
) -> JobHandle<&'static str, String> {
    let completions = completions.clone();
    queue
        .submit_with_cancel_hook(
            move || async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                completions.push(name);
                Ok(name)
            },
            hooks.hook(),
        )
        .await
}

/// Everything broadcast so far.
pub fn drain(events: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Topics of the events about one job, in order.
pub fn topics_for(events: &[QueueEvent], id: JobId) -> Vec<&'static str> {
    events
        .iter()
        .filter(|event| event.job_id() == Some(id))
        .map(QueueEvent::topic)
        .collect()
}

pub fn count_topic(events: &[QueueEvent], topic: &str) -> usize {
    events.iter().filter(|event| event.topic() == topic).count()
}
