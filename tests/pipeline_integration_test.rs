//! End-to-end pipeline tests over the in-memory source: acknowledgement
//! accounting, DAG shapes, the error channel, and fatal terminations.

use std::{sync::atomic::Ordering, time::Duration};

use aqueduct::engine::{Error, Prototype, INPUT};
use aqueduct::source::mem::InmemSource;
use aqueduct::source::Error as SourceError;
use aqueduct::task::{filter, output, select, Error as TaskError, Payload};
use tokio::time::timeout;

use crate::common::{
    counter_task, drain_errors, failing_task, get_id, init, save_messages_task, string_messages,
};

mod common;

const DONE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn pass_through_counts_every_message() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("pass-through-test")
        .from(source.clone(), get_id)
        .then(count_task)
        .start()
        .await
        .unwrap();
    let errors = runner.errors();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(source.nacks().len(), 0);
    assert_eq!(count.load(Ordering::SeqCst), 10);
    assert!(drain_errors(errors).await.is_empty());
}

#[tokio::test]
async fn empty_dag_acks_every_message() {
    init();
    let source = InmemSource::with_messages(string_messages());

    let runner = Prototype::<String>::new("empty-test")
        .from(source.clone(), get_id)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(source.nacks().len(), 0);
}

#[tokio::test]
async fn source_with_no_messages_completes_promptly() {
    init();
    let source = InmemSource::<String>::with_messages(vec![]);

    let runner = Prototype::new("zero-test")
        .from(source.clone(), get_id)
        .start()
        .await
        .unwrap();

    timeout(Duration::from_secs(1), runner.done()).await.unwrap().unwrap();
    assert_eq!(source.acks().len(), 0);
    assert_eq!(source.nacks().len(), 0);
}

#[tokio::test]
async fn failing_task_nacks_and_reports() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("error-test")
        .from(source.clone(), get_id)
        .then(failing_task("error"))
        .then(count_task)
        .start()
        .await
        .unwrap();
    let errors = runner.errors();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 0);
    assert_eq!(source.nacks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let received = drain_errors(errors).await;
    assert_eq!(received.len(), 10);
    for error in &received {
        assert_eq!(error.failure_count(), 1);
    }
}

#[tokio::test]
async fn after_input_runs_parallel_roots() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (saved, save_task) = save_messages_task("save-msgs");
    let (count, count_task) = counter_task("count-msgs");
    let (count2, count2_task) = counter_task("count2-msgs");

    let runner = Prototype::new("after-test")
        .from(source.clone(), get_id)
        .then(save_task)
        .then(count_task)
        .after(INPUT, count2_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(saved.lock().unwrap().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 10);
    assert_eq!(count2.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn fan_out_after_named_task() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");
    let (count2, count2_task) = counter_task("count2-msgs");

    let runner = Prototype::new("fan-out-test")
        .from(source.clone(), get_id)
        .then(count_task)
        .after("count-msgs", count2_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 10);
    assert_eq!(count2.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn two_subscribers_observe_identical_errors() {
    init();
    let source = InmemSource::with_messages(string_messages());

    let runner = Prototype::new("subscribers-test")
        .from(source.clone(), get_id)
        .then(failing_task("error"))
        .start()
        .await
        .unwrap();
    let first = runner.errors();
    let second = runner.errors();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    let first = drain_errors(first).await;
    let second = drain_errors(second).await;
    assert_eq!(first.len(), 10);
    assert_eq!(second.len(), 10);
}

#[tokio::test]
async fn late_subscriber_gets_a_closed_channel() {
    init();
    let source = InmemSource::with_messages(string_messages());

    let runner = Prototype::new("late-subscriber-test")
        .from(source.clone(), get_id)
        .then(failing_task("error"))
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    let late = runner.errors();
    assert!(late.recv_async().await.is_err());
}

#[tokio::test]
async fn max_errors_budget_terminates_the_pipeline() {
    init();
    // Held open: without the budget the pipeline would never terminate.
    let source = InmemSource::hold_open(string_messages());

    let runner = Prototype::new("budget-test")
        .from(source.clone(), get_id)
        .then(failing_task("error"))
        .max_errors(0)
        .start()
        .await
        .unwrap();

    let result = timeout(DONE_TIMEOUT, runner.done()).await.unwrap();
    match result {
        Err(Error::MaxErrorsExceeded { count, max, .. }) => {
            assert!(count > max);
        }
        other => panic!("expected a max errors termination, got {other:?}"),
    }
}

#[tokio::test]
async fn settings_driven_pipeline_honors_the_error_budget() {
    init();
    let source = InmemSource::hold_open(string_messages());
    let settings = aqueduct::config::PipelineSettings::from_yaml("name: budget-from-config\nmax_errors: 0\n").unwrap();

    let runner = settings
        .prototype::<String>()
        .from(source.clone(), get_id)
        .then(failing_task("error"))
        .start()
        .await
        .unwrap();

    let result = timeout(DONE_TIMEOUT, runner.done()).await.unwrap();
    assert!(matches!(result, Err(Error::MaxErrorsExceeded { .. })));
    assert_eq!(runner.name(), "budget-from-config");
}

#[tokio::test]
async fn ack_failure_is_fatal() {
    init();
    let source = InmemSource::with_messages(string_messages());
    source.fail_ack("message-5", "broker connection lost");
    let (_, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("ack-failure-test")
        .from(source.clone(), get_id)
        .then(count_task)
        .start()
        .await
        .unwrap();

    let result = timeout(DONE_TIMEOUT, runner.done()).await.unwrap();
    match result {
        Err(Error::Source {
            error: SourceError::Ack { id, .. },
            ..
        }) => assert_eq!(id, "message-5"),
        other => panic!("expected an ack failure termination, got {other:?}"),
    }
}

#[tokio::test]
async fn nack_failure_is_fatal() {
    init();
    let source = InmemSource::with_messages(string_messages());
    source.fail_nack("message-5", "broker connection lost");

    let runner = Prototype::new("nack-failure-test")
        .from(source.clone(), get_id)
        .then(failing_task("error"))
        .start()
        .await
        .unwrap();

    let result = timeout(DONE_TIMEOUT, runner.done()).await.unwrap();
    match result {
        Err(Error::Source {
            error: SourceError::Nack { id, .. },
            ..
        }) => assert_eq!(id, "message-5"),
        other => panic!("expected a nack failure termination, got {other:?}"),
    }
}

#[tokio::test]
async fn read_failure_is_fatal() {
    init();
    let source = InmemSource::with_messages(string_messages());
    source.fail_read_after(5, "connection reset");
    let (count, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("read-failure-test")
        .from(source.clone(), get_id)
        .then(count_task)
        .start()
        .await
        .unwrap();

    let result = timeout(DONE_TIMEOUT, runner.done()).await.unwrap();
    assert!(matches!(
        result,
        Err(Error::Source {
            error: SourceError::Read { .. },
            ..
        })
    ));
    assert_eq!(source.acks().len(), 5);
    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn cancellation_before_first_read_completes_promptly() {
    init();
    let source = InmemSource::<String>::hold_open(vec![]);

    let runner = Prototype::new("cancel-test")
        .from(source.clone(), get_id)
        .start()
        .await
        .unwrap();

    runner.shutdown();
    timeout(Duration::from_secs(1), runner.done()).await.unwrap().unwrap();
    assert_eq!(source.acks().len(), 0);
    assert_eq!(source.nacks().len(), 0);
}

#[tokio::test]
async fn filter_drops_matched_messages() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");

    let gate = filter("filter-message-0", |_ctx, payload: &Payload<String>| {
        matches!(payload, Payload::One(data) if data == "message-0")
    });

    let runner = Prototype::new("filter-test")
        .from(source.clone(), get_id)
        .then(gate)
        .then(count_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 9);
}

#[tokio::test]
async fn select_keeps_only_matched_messages() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let (count, count_task) = counter_task("count-msgs");

    let gate = select("select-message-0", |_ctx, payload: &Payload<String>| {
        matches!(payload, Payload::One(data) if data == "message-0")
    });

    let runner = Prototype::new("select-test")
        .from(source.clone(), get_id)
        .then(gate)
        .then(count_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn output_publishes_and_tees() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let sink = InmemSource::<String>::with_messages(vec![]);
    let (count, count_task) = counter_task("count-msgs");

    let runner = Prototype::new("output-test")
        .from(source.clone(), get_id)
        .then(output("out", sink.clone()))
        .then(count_task)
        .start()
        .await
        .unwrap();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 10);
    assert_eq!(sink.published().len(), 10);
    assert_eq!(count.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn publish_failure_nacks_without_terminating() {
    init();
    let source = InmemSource::with_messages(string_messages());
    let sink = InmemSource::<String>::with_messages(vec![]);
    sink.fail_publish("sink unavailable");

    let runner = Prototype::new("publish-failure-test")
        .from(source.clone(), get_id)
        .then(output("out", sink.clone()))
        .start()
        .await
        .unwrap();
    let errors = runner.errors();

    timeout(DONE_TIMEOUT, runner.done()).await.unwrap().unwrap();

    assert_eq!(source.acks().len(), 0);
    assert_eq!(source.nacks().len(), 10);
    assert!(sink.published().is_empty());

    let received = drain_errors(errors).await;
    assert_eq!(received.len(), 10);
    assert!(received.iter().all(|error| matches!(
        error,
        TaskError::Continuation { .. } | TaskError::Task { .. }
    )));
}
