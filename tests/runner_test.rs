//! Consume loop tests: exit policies, cancellation, handler failure.

use async_trait::async_trait;
use leaseq::config::LeaseOptions;
use leaseq::queue::{ExitPolicy, Handler, Producer, RunSummary, Worker};
use leaseq::store::{MemoryStore, QueueStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn test_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

fn fast_worker(store: &Arc<MemoryStore>) -> Worker {
    Worker::new(store.clone(), "jobs")
        .with_options(LeaseOptions::default().poll_timeout(Duration::from_millis(100)))
        .unwrap()
}

/// Handler that records every item it sees.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Handler for Recorder {
    async fn handle(&self, item: &str) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(item.to_string());
        Ok(())
    }
}

/// Handler that fails on one specific payload.
struct FailOn(&'static str);

#[async_trait]
impl Handler for FailOn {
    async fn handle(&self, item: &str) -> anyhow::Result<()> {
        if item == self.0 {
            anyhow::bail!("cannot process {item}");
        }
        Ok(())
    }
}

#[tokio::test]
async fn run_until_drained_processes_everything_in_order() {
    let store = test_store();
    Producer::new(store.clone(), "jobs")
        .enqueue_all(["bar-1", "bar-2", "bar-3"])
        .await
        .unwrap();

    let worker = fast_worker(&store);
    let recorder = Recorder::default();
    let summary = worker
        .run(&recorder, &CancellationToken::new(), ExitPolicy::WhenDrained)
        .await
        .unwrap();

    assert_eq!(
        summary,
        RunSummary {
            leased: 3,
            completed: 3,
            failed: 0,
            empty_polls: 0,
        }
    );
    assert_eq!(*recorder.seen.lock().unwrap(), vec!["bar-1", "bar-2", "bar-3"]);
    assert!(worker.is_empty().await.unwrap());
    assert!(!worker.is_leased("bar-1").await.unwrap());
}

#[tokio::test]
async fn run_on_drained_queue_exits_immediately() {
    let store = test_store();
    let worker = fast_worker(&store);

    let summary = worker
        .run(&Recorder::default(), &CancellationToken::new(), ExitPolicy::WhenDrained)
        .await
        .unwrap();
    assert_eq!(summary, RunSummary::default());
}

#[tokio::test]
async fn run_after_items_stops_at_count() {
    let store = test_store();
    Producer::new(store.clone(), "jobs")
        .enqueue_all(["a", "b", "c", "d"])
        .await
        .unwrap();

    let worker = fast_worker(&store);
    let summary = worker
        .run(&Recorder::default(), &CancellationToken::new(), ExitPolicy::AfterItems(2))
        .await
        .unwrap();

    assert_eq!(summary.leased, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(store.range("jobs").await.unwrap(), vec!["d", "c"]);
}

#[tokio::test]
async fn closures_are_handlers() {
    let store = test_store();
    Producer::new(store.clone(), "jobs").enqueue("x").await.unwrap();

    let count = Arc::new(Mutex::new(0u32));
    let handler = {
        let count = count.clone();
        move |_item: String| {
            let count = count.clone();
            async move {
                *count.lock().unwrap() += 1;
                Ok::<_, anyhow::Error>(())
            }
        }
    };

    fast_worker(&store)
        .run(&handler, &CancellationToken::new(), ExitPolicy::WhenDrained)
        .await
        .unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn cancelled_token_stops_before_leasing() {
    let store = test_store();
    Producer::new(store.clone(), "jobs").enqueue("x").await.unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let summary = fast_worker(&store)
        .run(&Recorder::default(), &shutdown, ExitPolicy::UntilCancelled)
        .await
        .unwrap();
    assert_eq!(summary.leased, 0);
    assert_eq!(store.length("jobs").await.unwrap(), 1);
}

#[tokio::test]
async fn cancellation_mid_item_finishes_that_item() {
    let store = test_store();
    Producer::new(store.clone(), "jobs")
        .enqueue_all(["first", "second"])
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let handler = {
        let shutdown = shutdown.clone();
        move |_item: String| {
            let shutdown = shutdown.clone();
            async move {
                shutdown.cancel();
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, anyhow::Error>(())
            }
        }
    };

    let worker = fast_worker(&store);
    let summary = worker
        .run(&handler, &shutdown, ExitPolicy::UntilCancelled)
        .await
        .unwrap();

    assert_eq!(summary.leased, 1);
    assert_eq!(summary.completed, 1);
    // The in-flight item was completed, not stranded.
    assert_eq!(store.length("jobs:processing").await.unwrap(), 0);
    assert_eq!(store.range("jobs").await.unwrap(), vec!["second"]);
}

#[tokio::test(start_paused = true)]
async fn run_until_cancelled_keeps_polling_an_empty_queue() {
    let store = test_store();
    let worker = fast_worker(&store);
    let shutdown = CancellationToken::new();

    let canceller = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            shutdown.cancel();
        })
    };

    let summary = worker
        .run(&Recorder::default(), &shutdown, ExitPolicy::UntilCancelled)
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(summary.leased, 0);
    assert!(summary.empty_polls >= 4, "got {summary:?}");
}

#[tokio::test(start_paused = true)]
async fn non_blocking_worker_pauses_between_empty_polls() {
    let store = test_store();
    let worker = Worker::new(store.clone(), "jobs")
        .with_options(
            LeaseOptions::default()
                .blocking(false)
                .poll_timeout(Duration::from_millis(100)),
        )
        .unwrap();
    let shutdown = CancellationToken::new();

    let canceller = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(450)).await;
            shutdown.cancel();
        })
    };

    let started = tokio::time::Instant::now();
    let summary = worker
        .run(&Recorder::default(), &shutdown, ExitPolicy::UntilCancelled)
        .await
        .unwrap();
    canceller.await.unwrap();

    // One poll per 100ms pause, and cancellation cuts the last pause short.
    assert_eq!(summary.empty_polls, 5, "got {summary:?}");
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn non_blocking_worker_picks_up_items_after_a_pause() {
    let store = test_store();
    let worker = Worker::new(store.clone(), "jobs")
        .with_options(
            LeaseOptions::default()
                .blocking(false)
                .poll_timeout(Duration::from_millis(100)),
        )
        .unwrap();

    let producer = Producer::new(store.clone(), "jobs");
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        producer.enqueue("late").await.unwrap();
    });

    let summary = worker
        .run(&Recorder::default(), &CancellationToken::new(), ExitPolicy::AfterItems(1))
        .await
        .unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.empty_polls, 3);
}

#[tokio::test]
async fn handler_failure_leaves_item_parked() {
    let store = test_store();
    Producer::new(store.clone(), "jobs")
        .enqueue_all(["good", "bad"])
        .await
        .unwrap();

    let worker = fast_worker(&store);
    let summary = worker
        .run(&FailOn("bad"), &CancellationToken::new(), ExitPolicy::AfterItems(2))
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(store.range("jobs:processing").await.unwrap(), vec!["bad"]);
    assert!(worker.is_leased("bad").await.unwrap());
    assert!(!worker.is_empty().await.unwrap());
}

#[tokio::test]
async fn store_failure_ends_the_run() {
    let store = test_store();
    store.disconnect();

    let err = fast_worker(&store)
        .run(&Recorder::default(), &CancellationToken::new(), ExitPolicy::UntilCancelled)
        .await
        .unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn two_workers_drain_a_shared_queue() {
    let store = test_store();
    let items: Vec<String> = (1..=50).map(|i| format!("bar-{i}")).collect();
    Producer::new(store.clone(), "jobs")
        .enqueue_all(&items)
        .await
        .unwrap();

    let recorder = Arc::new(Recorder::default());
    let mut handles = Vec::new();
    for _ in 0..2 {
        let worker = fast_worker(&store);
        let recorder = recorder.clone();
        handles.push(tokio::spawn(async move {
            worker
                .run(recorder.as_ref(), &CancellationToken::new(), ExitPolicy::WhenDrained)
                .await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        completed += handle.await.unwrap().unwrap().completed;
    }
    assert_eq!(completed, 50);

    let mut seen = recorder.seen.lock().unwrap().clone();
    seen.sort();
    let mut expected = items;
    expected.sort();
    assert_eq!(seen, expected);
}
