//! Runs a burst of jobs through a queue and prints what happened.
//!
//! Usage: `demo [config.json]`. The config file holds a JSON `QueueConfig`;
//! missing fields take their defaults. Without a file the demo uses room for
//! five jobs, two at a time.

use std::time::Duration;

use jobgate_actors::JobQueue;
use jobgate_core::{QueueConfig, QueueEvent};
use tokio::sync::broadcast::error::RecvError;

/// Simulated job durations in milliseconds. With the default config the
/// second job overruns the execution timeout and the sixth finds the queue full.
const DURATIONS_MS: [u64; 6] = [120, 400, 10, 80, 60, 40];

fn load_config() -> Result<QueueConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading queue config from {}", path);
            let json = std::fs::read_to_string(&path)?;
            Ok(QueueConfig::from_json(&json)?)
        }
        None => Ok(QueueConfig::default()
            .with_concurrency(2)
            .with_max_task_count(5)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = load_config()?;
    tracing::info!("Queue config: {}", serde_json::to_string(&config)?);

    let queue: JobQueue<String, String> = JobQueue::start(config).await?;

    let mut events = queue.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event printer fell behind by {} events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut handles = Vec::new();
    for (n, duration_ms) in DURATIONS_MS.into_iter().enumerate() {
        let name = format!("job-{}", n + 1);
        let hook_name = name.clone();
        let handle = queue
            .submit_with_cancel_hook(
                move || async move {
                    tokio::time::sleep(Duration::from_millis(duration_ms)).await;
                    Ok(format!("{} slept {}ms", name, duration_ms))
                },
                move || tracing::info!("Cleaning up after {}", hook_name),
            )
            .await;
        handles.push(handle);
    }

    let stats = queue.stats().await?;
    tracing::info!("Stats after submitting: {}", serde_json::to_string(&stats)?);

    for handle in handles {
        let id = handle.id();
        match handle.await {
            Ok(value) => tracing::info!("Job {:?} -> {}", id, value),
            Err(e) => tracing::info!("Job {:?} -> error: {}", id, e),
        }
    }

    let stats = queue.stats().await?;
    tracing::info!("Final stats: {}", serde_json::to_string(&stats)?);
    queue.shutdown().await?;
    printer.await?;
    Ok(())
}

fn print_event(event: &QueueEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!("Failed to serialize {} event: {}", event.topic(), e),
    }
}
