//! Replay worker against the file retry store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use mailwire_core::RetryStore;
use mailwire_domain::MailwireError;
use mailwire_infra::{ReplayWorker, ReplayWorkerConfig, WorkerError};
use support::{contact_unit, FileHarness};

fn fast_config() -> ReplayWorkerConfig {
    ReplayWorkerConfig {
        interval: Duration::from_millis(20),
        pass_timeout: Duration::from_secs(5),
        join_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn worker_drains_store_in_background() {
    let h = FileHarness::new().await;
    h.store.store(&contact_unit(&["a@x.com"])).await.unwrap();
    h.store.store(&contact_unit(&["b@x.com", "c@x.com"])).await.unwrap();

    let mut worker = ReplayWorker::new(Arc::new(h.client.replayer().unwrap()), fast_config());
    let mut summaries = worker.subscribe();
    worker.start().unwrap();

    let summary = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            summaries.changed().await.unwrap();
            if let Some(summary) = *summaries.borrow_and_update() {
                return summary;
            }
        }
    })
    .await
    .expect("a replay pass should finish");

    worker.stop().await.unwrap();

    assert_eq!(summary.scanned, 2);
    assert_eq!(summary.delivered, 2);
    assert!(h.files().is_empty());
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test]
async fn worker_keeps_deferring_while_offline() {
    let h = FileHarness::with_retry_limit(2).await;
    h.store.store(&contact_unit(&["a@x.com"])).await.unwrap();
    h.transport.always_fail(MailwireError::Transport("offline".to_string()));

    let mut worker = ReplayWorker::new(Arc::new(h.client.replayer().unwrap()), fast_config());
    let mut summaries = worker.subscribe();
    worker.start().unwrap();

    let exhausted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            summaries.changed().await.unwrap();
            if let Some(summary) = *summaries.borrow_and_update() {
                if summary.exhausted == 1 {
                    return summary;
                }
            }
        }
    })
    .await
    .expect("the unit should reach the retry limit");

    worker.stop().await.unwrap();

    assert_eq!(exhausted.delivered, 0);
    let files = h.files();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("_2.json"));
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test]
async fn stopped_worker_rejects_second_stop() {
    let h = FileHarness::new().await;
    let mut worker = ReplayWorker::new(Arc::new(h.client.replayer().unwrap()), fast_config());

    worker.start().unwrap();
    assert!(worker.is_running());
    worker.stop().await.unwrap();

    assert_eq!(worker.stop().await, Err(WorkerError::NotRunning));
}
