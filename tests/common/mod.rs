//! Shared fixtures for the pipeline integration tests.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

use aqueduct::task::{from_fn, Payload, Task};
use tracing::Level;

/// Initializes logs and error reports. Safe to call from every test.
#[allow(dead_code)]
pub fn init() {
    let _ = color_eyre::install();
    let _ = tracing_subscriber::fmt().with_max_level(Level::ERROR).try_init();
}

/// The canonical 10-message test stream: `message-0` … `message-9`.
#[allow(dead_code)]
pub fn string_messages() -> Vec<String> {
    (0..10).map(|index| format!("message-{index}")).collect()
}

/// Identity function used by every test pipeline.
#[allow(dead_code)]
pub fn get_id(message: &String) -> String {
    message.clone()
}

/// A task counting its invocations. One batch flush counts as one call.
#[allow(dead_code)]
pub fn counter_task(name: &str) -> (Arc<AtomicU32>, Arc<dyn Task<String>>) {
    let count = Arc::new(AtomicU32::new(0));
    let seen = count.clone();
    let task = from_fn(name, move |_ctx, payload: Payload<String>| {
        let _ = seen.fetch_add(1, Ordering::SeqCst);
        Ok(payload)
    });
    (count, task)
}

/// A task recording every message datum it sees.
#[allow(dead_code)]
pub fn save_messages_task(name: &str) -> (Arc<Mutex<Vec<String>>>, Arc<dyn Task<String>>) {
    let messages: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
    let sink = messages.clone();
    let task = from_fn(name, move |_ctx, payload: Payload<String>| {
        sink.lock().unwrap().extend(payload.clone().into_vec());
        Ok(payload)
    });
    (messages, task)
}

/// A task recording the context id of every invocation.
#[allow(dead_code)]
pub fn save_ids_task(name: &str) -> (Arc<Mutex<Vec<String>>>, Arc<dyn Task<String>>) {
    let ids: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
    let sink = ids.clone();
    let task = from_fn(name, move |ctx, payload: Payload<String>| {
        sink.lock().unwrap().push(ctx.id().unwrap_or_default());
        Ok(payload)
    });
    (ids, task)
}

/// A task that always fails.
#[allow(dead_code)]
pub fn failing_task(name: &str) -> Arc<dyn Task<String>> {
    from_fn(name, |_ctx, _payload: Payload<String>| Err("expected failure".into()))
}

/// Drains an error subscription until its channel closes.
#[allow(dead_code)]
pub async fn drain_errors(errors: flume::Receiver<aqueduct::task::Error>) -> Vec<aqueduct::task::Error> {
    let mut received = vec![];
    while let Ok(error) = errors.recv_async().await {
        received.push(error);
    }
    received
}
