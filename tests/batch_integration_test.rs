//! End-to-end tests of the batching task inside a running pipeline: size
//! flushes, interval flushes, drain on cancellation, and error fan-back.

use std::{sync::atomic::Ordering, time::Duration};

use aqueduct::batch::Batch;
use aqueduct::engine::Prototype;
use aqueduct::source::mem::InmemSource;
use tokio::time::timeout;

use crate::common::{counter_task, drain_errors, failing_task, get_id, init, save_ids_task, string_messages};

mod common;

const DONE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn flushes_on_size_with_a_joined_batch_id() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");
    let (ids, ids_task) = save_ids_task("save-ids");

    let runner = Prototype::new("batch-test")
        .from(source.clone(), get_id)
        .then(Batch::new("batch", 10, Duration::from_secs(10)))
        .then(count_task)
        .after("batch", ids_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 1);

    let expected = string_messages().join("|");
    assert_eq!(ids.lock().unwrap().clone(), vec![expected]);
}

#[tokio::test]
async fn flushes_on_interval_before_the_size_threshold() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("interval-test")
        .from(source.clone(), get_id)
        .then(Batch::new("batch", 100, Duration::from_millis(200)))
        .then(count_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn drains_the_remainder_on_cancellation() {
    init();
    let source = InmemSource::hold_open(string_messages());
    let (count, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("drain-test")
        .from(source.clone(), get_id)
        .then(Batch::new("batch", 100, Duration::from_secs(60)))
        .then(count_task)
        .start()
        .await
        .unwrap();

    // Let every message reach the batch buffer, then cancel the run.
    tokio::time::sleep(Duration::from_millis(200)).await;
    runner.shutdown();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_flush_nacks_every_contributor() {
    init();
    let source = InmemSource::with_messages(string_messages());

    let runner = Prototype::new("batch-error-test")
        .from(source.clone(), get_id)
        .then(Batch::new("batch", 10, Duration::from_secs(10)))
        .then(failing_task("error"))
        .start()
        .await
        .unwrap();
    let errors = runner.errors();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 0);
    assert_eq!(source.nacks().len(), 10);
    assert_eq!(drain_errors(errors).await.len(), 10);
}
