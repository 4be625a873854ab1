#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jobgate_actors::JobQueue;
use jobgate_core::{JobError, JobId, QueueEvent, topics};
use tokio::sync::broadcast::error::RecvError;

use common::{
    Completions, HookCounter, config, count_topic, drain, start_queue, submit_sleeper,
    submit_sleeper_with_hook, topics_for,
};

#[tokio::test(start_paused = true)]
async fn rejects_submissions_beyond_capacity() {
    let (queue, mut events) = start_queue(config(1, 2)).await;
    let done = Completions::default();

    let first = submit_sleeper(&queue, "one", 100, &done).await;
    let second = submit_sleeper(&queue, "two", 100, &done).await;
    let third = submit_sleeper(&queue, "three", 100, &done).await;

    assert_eq!(first.id(), Some(JobId(1)));
    assert_eq!(second.id(), Some(JobId(2)));
    assert_eq!(third.id(), None);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.jobs.total, 2);
    assert_eq!(stats.jobs.in_progress, 1);
    assert_eq!(stats.jobs.waiting, 1);
    assert!(stats.full);

    match third.await {
        Err(JobError::QueueFull {
            waiting_count: 1,
            in_progress_count: 1,
        }) => {}
        other => panic!("expected QueueFull, got {:?}", other),
    }

    assert_eq!(first.await.unwrap(), "one");
    assert_eq!(second.await.unwrap(), "two");
    assert_eq!(done.order(), vec!["one", "two"]);

    // Rejections consume no id.
    let fourth = submit_sleeper(&queue, "four", 10, &done).await;
    assert_eq!(fourth.id(), Some(JobId(3)));
    assert_eq!(fourth.await.unwrap(), "four");

    let events = drain(&mut events);
    assert_eq!(count_topic(&events, topics::QUEUE_FULL), 1);
    assert!(events.contains(&QueueEvent::QueueFull {
        waiting_count: 1,
        in_progress_count: 1,
    }));
    assert_eq!(count_topic(&events, topics::QUEUE_NEW), 3);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.jobs.total, 0);
    assert!(!stats.full);
}

#[tokio::test(start_paused = true)]
async fn never_runs_more_than_concurrency_jobs() {
    let (queue, mut events) = start_queue(
        config(3, 20).with_queue_timeout(Duration::from_secs(10)),
    )
    .await;

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let running = running.clone();
        let peak = peak.clone();
        let handle = queue
            .submit(move || async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50 + i * 7)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok("done")
            })
            .await;
        handles.push(handle);

        let stats = queue.stats().await.unwrap();
        assert!(stats.jobs.in_progress <= 3);
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "done");
    }
    assert_eq!(peak.load(Ordering::SeqCst), 3);

    // Replay the event stream and check the active count never exceeded 3.
    let mut active = 0usize;
    for event in drain(&mut events) {
        match event {
            QueueEvent::JobStarted { .. } => active += 1,
            QueueEvent::JobSuccess { .. } => active -= 1,
            _ => {}
        }
        assert!(active <= 3);
    }
    assert_eq!(active, 0);
}

#[tokio::test(start_paused = true)]
async fn waiting_job_times_out_in_queue() {
    let (queue, mut events) = start_queue(
        config(1, 5)
            .with_queue_timeout(Duration::from_millis(100))
            .with_execution_timeout(Duration::from_secs(1)),
    )
    .await;
    let done = Completions::default();

    let first = submit_sleeper(&queue, "one", 500, &done).await;
    let second = submit_sleeper(&queue, "two", 10, &done).await;

    match second.await {
        Err(JobError::QueueTimeout { .. }) => {}
        other => panic!("expected QueueTimeout, got {:?}", other),
    }
    // The dispatched job outlives the queue timeout without being affected.
    assert_eq!(first.await.unwrap(), "one");
    assert_eq!(done.order(), vec!["one"]);

    let events = drain(&mut events);
    assert_eq!(
        topics_for(&events, JobId(1)),
        vec![topics::QUEUE_NEW, topics::JOB_STARTED, topics::JOB_SUCCESS]
    );
    assert_eq!(
        topics_for(&events, JobId(2)),
        vec![topics::QUEUE_NEW, topics::QUEUE_TIMEOUT]
    );
}

#[tokio::test(start_paused = true)]
async fn running_job_times_out_and_frees_its_slot() {
    let (queue, mut events) = start_queue(
        config(1, 5)
            .with_queue_timeout(Duration::from_secs(10))
            .with_execution_timeout(Duration::from_millis(100)),
    )
    .await;
    let done = Completions::default();
    let hooks = HookCounter::default();

    let slow = submit_sleeper_with_hook(&queue, "slow", 1_000, &done, &hooks).await;
    let quick = submit_sleeper(&queue, "quick", 10, &done).await;

    match slow.await {
        Err(JobError::JobTimeout) => {}
        other => panic!("expected JobTimeout, got {:?}", other),
    }
    assert_eq!(hooks.calls(), 1);
    assert_eq!(quick.await.unwrap(), "quick");

    // The timed-out body was dropped, so it never finishes.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(done.order(), vec!["quick"]);
    assert_eq!(hooks.calls(), 1);

    let events = drain(&mut events);
    assert_eq!(
        topics_for(&events, JobId(1)),
        vec![topics::QUEUE_NEW, topics::JOB_STARTED, topics::JOB_TIMEOUT]
    );
    let timed_out = events
        .iter()
        .position(|e| matches!(e, QueueEvent::JobTimeout { id, .. } if *id == JobId(1)));
    let backfilled = events
        .iter()
        .position(|e| matches!(e, QueueEvent::JobStarted { id, .. } if *id == JobId(2)));
    assert!(timed_out.is_some() && backfilled.is_some());
    assert!(timed_out < backfilled);
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_waiting_job_removes_it_before_dispatch() {
    let (queue, mut events) = start_queue(config(1, 5)).await;
    let done = Completions::default();
    let hooks = HookCounter::default();

    let first = submit_sleeper(&queue, "one", 200, &done).await;
    let second = submit_sleeper_with_hook(&queue, "two", 10, &done, &hooks).await;

    second.cancel();
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.jobs.waiting, 0);
    assert_eq!(stats.jobs.in_progress, 1);

    match second.await {
        Err(JobError::JobCancelled) => {}
        other => panic!("expected JobCancelled, got {:?}", other),
    }
    assert_eq!(hooks.calls(), 1);
    assert_eq!(first.await.unwrap(), "one");
    assert_eq!(done.order(), vec!["one"]);

    let events = drain(&mut events);
    assert_eq!(
        topics_for(&events, JobId(2)),
        vec![topics::QUEUE_NEW, topics::JOB_CANCEL]
    );
}

#[tokio::test(start_paused = true)]
async fn cancelling_an_active_job_runs_its_hook_and_frees_the_slot() {
    let (queue, mut events) = start_queue(
        config(1, 5).with_execution_timeout(Duration::from_secs(5)),
    )
    .await;
    let done = Completions::default();
    let hooks = HookCounter::default();

    let first = submit_sleeper_with_hook(&queue, "one", 1_000, &done, &hooks).await;
    let second = submit_sleeper(&queue, "two", 10, &done).await;
    let cancel_first = first.canceller();

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel_first.cancel();

    match first.await {
        Err(JobError::JobCancelled) => {}
        other => panic!("expected JobCancelled, got {:?}", other),
    }
    assert_eq!(hooks.calls(), 1);
    assert_eq!(second.await.unwrap(), "two");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(done.order(), vec!["two"]);

    let events = drain(&mut events);
    assert_eq!(
        topics_for(&events, JobId(1)),
        vec![topics::QUEUE_NEW, topics::JOB_STARTED, topics::JOB_CANCEL]
    );
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let (queue, mut events) = start_queue(config(1, 5)).await;
    let done = Completions::default();
    let cancelled_hooks = HookCounter::default();
    let finished_hooks = HookCounter::default();

    let first = submit_sleeper_with_hook(&queue, "one", 100, &done, &cancelled_hooks).await;
    let cancel_first = first.canceller();
    first.cancel();
    cancel_first.cancel();
    cancel_first.cancel();
    assert!(matches!(first.await, Err(JobError::JobCancelled)));

    let second = submit_sleeper_with_hook(&queue, "two", 10, &done, &finished_hooks).await;
    let cancel_second = second.canceller();
    assert_eq!(second.await.unwrap(), "two");
    cancel_second.cancel();
    cancel_second.cancel();

    // Cancelling a rejected submission is a no-op too.
    let filler = submit_sleeper(&queue, "three", 100, &done).await;
    let _ = submit_sleeper(&queue, "four", 100, &done).await;
    let _ = submit_sleeper(&queue, "five", 100, &done).await;
    let _ = submit_sleeper(&queue, "six", 100, &done).await;
    let _ = submit_sleeper(&queue, "seven", 100, &done).await;
    let rejected = submit_sleeper(&queue, "eight", 100, &done).await;
    assert_eq!(rejected.id(), None);
    rejected.cancel();
    assert!(matches!(rejected.await, Err(JobError::QueueFull { .. })));

    // Round-trip through the actor so every cancel above has been handled.
    queue.stats().await.unwrap();
    assert_eq!(cancelled_hooks.calls(), 1);
    assert_eq!(finished_hooks.calls(), 0);
    assert_eq!(filler.await.unwrap(), "three");

    let events = drain(&mut events);
    assert_eq!(count_topic(&events, topics::JOB_CANCEL), 1);
    assert_eq!(
        topics_for(&events, JobId(2)),
        vec![topics::QUEUE_NEW, topics::JOB_STARTED, topics::JOB_SUCCESS]
    );
}

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("disk {0} is full")]
struct DiskFull(&'static str);

#[tokio::test(start_paused = true)]
async fn body_errors_pass_through_untouched() {
    common::init_tracing();
    let queue: JobQueue<u32, DiskFull> = JobQueue::start(config(1, 2)).await.unwrap();
    let mut events = queue.subscribe();

    let handle = queue.submit(|| async { Err(DiskFull("sda1")) }).await;
    match handle.await {
        Err(JobError::Failed(error)) => assert_eq!(error, DiskFull("sda1")),
        other => panic!("expected Failed, got {:?}", other),
    }

    let events = drain(&mut events);
    match events.last() {
        Some(QueueEvent::JobFailure { id, error, .. }) => {
            assert_eq!(*id, JobId(1));
            assert_eq!(error, "disk sda1 is full");
        }
        other => panic!("expected job.failure, got {:?}", other),
    }

    let handle = queue.submit(|| async { Ok(7) }).await;
    assert_eq!(handle.await.unwrap(), 7);
}

async fn explode() -> Result<&'static str, String> {
    panic!("boom")
}

fn broken_setup() -> std::future::Ready<Result<&'static str, String>> {
    panic!("bad setup")
}

#[tokio::test(start_paused = true)]
async fn panicking_jobs_fail_without_stopping_the_queue() {
    let (queue, mut events) = start_queue(config(1, 5)).await;
    let done = Completions::default();

    let blocker = submit_sleeper(&queue, "blocker", 50, &done).await;
    let broken = queue.submit(broken_setup).await;
    let exploding = queue.submit(explode).await;
    let after = submit_sleeper(&queue, "after", 10, &done).await;

    assert_eq!(blocker.await.unwrap(), "blocker");
    match broken.await {
        Err(JobError::Panicked(message)) => assert_eq!(message, "bad setup"),
        other => panic!("expected Panicked, got {:?}", other),
    }
    match exploding.await {
        Err(JobError::Panicked(message)) => assert_eq!(message, "boom"),
        other => panic!("expected Panicked, got {:?}", other),
    }
    assert_eq!(after.await.unwrap(), "after");

    let events = drain(&mut events);
    for id in [JobId(2), JobId(3)] {
        assert_eq!(
            topics_for(&events, id),
            vec![topics::QUEUE_NEW, topics::JOB_STARTED, topics::JOB_FAILURE]
        );
    }

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.jobs.total, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_settles_unfinished_jobs() {
    let (queue, _events) = start_queue(
        config(1, 5).with_execution_timeout(Duration::from_secs(5)),
    )
    .await;
    let done = Completions::default();
    let hooks = HookCounter::default();

    let running = submit_sleeper_with_hook(&queue, "running", 1_000, &done, &hooks).await;
    let waiting = submit_sleeper(&queue, "waiting", 10, &done).await;
    let cancel_running = running.canceller();

    queue.shutdown().await.unwrap();

    assert!(matches!(running.await, Err(JobError::QueueStopped)));
    assert!(matches!(waiting.await, Err(JobError::QueueStopped)));
    assert_eq!(hooks.calls(), 1);

    // Cancelling against a stopped queue is harmless.
    cancel_running.cancel();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(done.order().is_empty());
}

#[tokio::test(start_paused = true)]
async fn completion_racing_the_execution_timer_settles_once() {
    let (queue, mut events) = start_queue(
        config(3, 3).with_execution_timeout(Duration::from_millis(100)),
    )
    .await;
    let done = Completions::default();
    let hooks = HookCounter::default();

    // Each body finishes on the same tick its execution timer fires.
    let mut handles = Vec::new();
    for name in ["one", "two", "three"] {
        handles.push(submit_sleeper_with_hook(&queue, name, 100, &done, &hooks).await);
    }

    let mut timeouts = 0;
    for handle in handles {
        match handle.await {
            Ok(_) => {}
            Err(JobError::JobTimeout) => timeouts += 1,
            other => panic!("expected success or JobTimeout, got {:?}", other),
        }
    }

    // Give any losing outcome time to reach the queue.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let events = drain(&mut events);
    for id in [JobId(1), JobId(2), JobId(3)] {
        let seen = topics_for(&events, id);
        assert_eq!(seen.len(), 3, "job {} saw {:?}", id, seen);
        assert_eq!(&seen[..2], &[topics::QUEUE_NEW, topics::JOB_STARTED]);
        assert!(seen[2] == topics::JOB_SUCCESS || seen[2] == topics::JOB_TIMEOUT);
    }
    assert_eq!(count_topic(&events, topics::JOB_TIMEOUT), timeouts);
    assert_eq!(count_topic(&events, topics::JOB_SUCCESS), 3 - timeouts);
    assert_eq!(hooks.calls(), timeouts);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.jobs.total, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_or_dropped_subscribers_do_not_hold_up_the_queue() {
    const JOBS: usize = 350;

    let (queue, _events) = start_queue(config(JOBS, JOBS)).await;

    drop(queue.subscribe());
    let mut lagging = queue.subscribe();
    let mut reader = queue.subscribe();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while seen.len() < JOBS * 3 {
            match reader.recv().await {
                Ok(event) => seen.push(event),
                Err(e) => panic!("reader fell behind: {}", e),
            }
        }
        seen
    });

    let mut handles = Vec::new();
    for _ in 0..JOBS {
        handles.push(queue.submit(|| async { Ok("ok") }).await);
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), "ok");
    }

    let seen = collector.await.unwrap();
    assert_eq!(count_topic(&seen, topics::QUEUE_NEW), JOBS);
    assert_eq!(count_topic(&seen, topics::JOB_SUCCESS), JOBS);

    // Three events per job overflow the unread receiver's buffer.
    match lagging.recv().await {
        Err(RecvError::Lagged(missed)) => assert!(missed > 0),
        other => panic!("expected Lagged, got {:?}", other),
    }

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.jobs.total, 0);
    assert!(!stats.full);
}
