#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! A batching task: coalesces a bursty single-message stream into batches
//! flushed on either a count threshold or a periodic interval.
//!
//! Every call to the batcher's `execute` blocks until the batch containing
//! that payload has been flushed downstream, then returns the flush result —
//! the identical value for every caller in the same batch. All buffer state
//! is owned by a single background worker started when the task is bound to
//! a pipeline; callers communicate with it by channel only.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use context::{Context, Value, ID_KEY};
use signal::{Signal, SignalReceiver};
use task::{exec_tasks, EngineHandler, Error, Payload, Successors, Task};

/// A buffered input awaiting a flush.
struct Entry<Msg> {
    ctx: Context,
    payload: Payload<Msg>,
    reply: tokio::sync::oneshot::Sender<Result<(), Error>>,
}

/// The batching task.
pub struct Batch<Msg: 'static + Clone + Send> {
    name: String,
    size: usize,
    interval: Duration,
    successors: Successors<Msg>,
    input: flume::Sender<Entry<Msg>>,
    worker_input: Mutex<Option<flume::Receiver<Entry<Msg>>>>,
}

impl<Msg> Batch<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    /// Creates a batching task flushing every `size` inputs or every
    /// `interval`, whichever comes first.
    ///
    /// The flush timer is free-running: it ticks at a fixed period from the
    /// moment the task is bound, it is not reset by flushes.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or `interval` is zero — both are programmer
    /// errors in the pipeline definition.
    pub fn new(name: &str, size: usize, interval: Duration) -> Arc<dyn Task<Msg>> {
        assert!(size >= 1, "batch size must be at least 1 (task: {name})");
        assert!(
            interval > Duration::ZERO,
            "batch interval must be positive (task: {name})"
        );

        // Rendezvous channel: callers hand entries directly to the worker.
        let (input, worker_input) = flume::bounded(0);
        Arc::new(Self {
            name: name.to_string(),
            size,
            interval,
            successors: Successors::new(),
            input,
            worker_input: Mutex::new(Some(worker_input)),
        })
    }
}

#[async_trait]
impl<Msg> Task<Msg> for Batch<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn add_successor(&self, task: Arc<dyn Task<Msg>>) {
        self.successors.add(task);
    }

    async fn execute(&self, ctx: &Context, payload: Payload<Msg>) -> Result<(), Error> {
        let (reply, result) = tokio::sync::oneshot::channel();
        self.input
            .send_async(Entry {
                ctx: ctx.clone(),
                payload,
                reply,
            })
            .await
            .map_err(|_| Error::Task {
                task: self.name.clone(),
                error: "batch worker is not running".to_string(),
            })?;

        match result.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Task {
                task: self.name.clone(),
                error: "batch worker stopped before flushing".to_string(),
            }),
        }
    }

    async fn bind(&self, handler: EngineHandler) -> Result<(), Error> {
        let input = self
            .worker_input
            .lock()
            .expect("worker input lock poisoned")
            .take()
            .ok_or_else(|| Error::Task {
                task: self.name.clone(),
                error: "batch task is already bound".to_string(),
            })?;

        let context = handler.context().clone();
        let signals = SignalReceiver::with_receiver_timer(input, self.interval, context.shutdown().clone());
        let worker = Worker {
            name: self.name.clone(),
            size: self.size,
            context,
            successors: self.successors.clone(),
            buffer: Vec::with_capacity(self.size),
        };

        drop(tokio::spawn(worker.run(signals)));
        Ok(())
    }
}

/// The single owner of all batch state.
struct Worker<Msg: 'static + Clone + Send> {
    name: String,
    size: usize,
    context: Context,
    successors: Successors<Msg>,
    buffer: Vec<Entry<Msg>>,
}

impl<Msg> Worker<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    async fn run(mut self, mut signals: SignalReceiver<Entry<Msg>>) {
        tracing::debug!(task = %self.name, size = %self.size, "batch worker started");

        loop {
            match signals.recv().await {
                Signal::Item(entry) => {
                    self.buffer.push(entry);
                    if self.buffer.len() >= self.size {
                        self.flush().await;
                    }
                }
                Signal::FlushTick { .. } => self.flush().await,
                Signal::Stop => {
                    // Final drain.
                    self.flush().await;
                    break;
                }
                _ => unreachable!(),
            }
        }

        tracing::debug!(task = %self.name, "batch worker stopped");
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let entries = std::mem::take(&mut self.buffer);
        let batch_id = entries
            .iter()
            .filter_map(|entry| entry.ctx.id())
            .collect::<Vec<_>>()
            .join("|");

        let mut data = Vec::with_capacity(entries.len());
        let mut replies = Vec::with_capacity(entries.len());
        for entry in entries {
            data.extend(entry.payload.into_vec());
            replies.push(entry.reply);
        }

        let ctx = self.context.with_value(ID_KEY, Value::String(batch_id.clone()));
        let result = exec_tasks(&ctx, &self.successors.snapshot(), Payload::Batch(data)).await;

        tracing::debug!(
            task = %self.name,
            batch = %batch_id,
            entries = %replies.len(),
            success = %result.is_ok(),
            "batch flushed"
        );

        for reply in replies {
            if reply.send(result.clone()).is_err() {
                tracing::trace!(task = %self.name, "batch caller went away before the flush result was delivered");
            }
        }
    }
}
