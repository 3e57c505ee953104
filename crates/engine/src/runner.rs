//! Live execution of a pipeline.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use context::{Context, Value, ID_KEY, NAME_KEY};
use futures::{future::join_all, StreamExt};
use signal::ShutdownController;
use source::{Consumer, Payload};
use task::{exec_tasks, Task};
use tokio::sync::watch;

use crate::{workers::WorkerGroup, Error};

/// Function mapping a payload to the string identity attached to its context.
pub(crate) type GetId<Msg> = Arc<dyn Fn(&Msg) -> String + Send + Sync>;

type Termination = Option<Result<(), Error>>;

/// A live pipeline execution.
///
/// Owns the message iteration and the ack/nack reporting. Dropping the runner
/// does not stop the pipeline; use [`Runner::shutdown`] to cancel it and
/// [`Runner::done`] to wait for termination.
pub struct Runner {
    name: String,
    controller: Arc<ShutdownController>,
    done: watch::Receiver<Termination>,
    hub: Arc<ErrorHub>,
}

impl Runner {
    /// The pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the pipeline run.
    ///
    /// The main loop stops reading, in-flight workers run to completion, and
    /// stateful tasks drain.
    pub fn shutdown(&self) {
        self.controller.cancel();
    }

    /// Waits for the pipeline to terminate.
    ///
    /// Resolves `Ok(())` when the source stream closed or the run was
    /// cancelled, and `Err` when a fatal boundary error or an exceeded error
    /// budget terminated the run. Any number of callers may wait; each
    /// observes the same result.
    pub async fn done(&self) -> Result<(), Error> {
        let mut receiver = self.done.clone();
        let result = match receiver.wait_for(|termination| termination.is_some()).await {
            Ok(termination) => termination.clone().unwrap_or(Ok(())),
            // The supervisor always publishes a result before exiting; a
            // closed channel without one means the runtime is shutting down.
            Err(_) => Ok(()),
        };
        result
    }

    /// Returns a freshly created subscriber channel carrying every task
    /// execution error of this run.
    ///
    /// Each subscriber receives every error; all subscriber channels are
    /// closed on termination. Subscribing after termination yields an
    /// immediately-closed channel.
    pub fn errors(&self) -> flume::Receiver<task::Error> {
        self.hub.subscribe()
    }

    /// Spawns the runner over an already-bound DAG.
    pub(crate) fn spawn<Msg>(
        name: String,
        consumer: Arc<dyn Consumer<Msg>>,
        get_id: GetId<Msg>,
        first: Vec<Arc<dyn Task<Msg>>>,
        max_errors: Option<usize>,
        controller: Arc<ShutdownController>,
    ) -> Runner
    where
        Msg: 'static + Clone + Send + Sync,
    {
        let hub = Arc::new(ErrorHub::default());
        let (done_sender, done) = watch::channel(None);
        let (error_sender, error_receiver) = flume::unbounded();

        let dispatcher = tokio::spawn(dispatch_errors(error_receiver, hub.clone()));

        let shared = Arc::new(Shared {
            pipeline: name.clone(),
            consumer,
            first,
            max_errors,
            error_count: AtomicUsize::new(0),
            cause: Mutex::new(None),
            controller: controller.clone(),
        });

        drop(tokio::spawn(supervise(
            shared,
            get_id,
            error_sender,
            dispatcher,
            done_sender,
        )));

        Runner {
            name,
            controller,
            done,
            hub,
        }
    }
}

/// State shared between the main loop and the per-message workers.
struct Shared<Msg: 'static + Clone + Send> {
    pipeline: String,
    consumer: Arc<dyn Consumer<Msg>>,
    first: Vec<Arc<dyn Task<Msg>>>,
    max_errors: Option<usize>,
    error_count: AtomicUsize,
    cause: Mutex<Option<Error>>,
    controller: Arc<ShutdownController>,
}

impl<Msg> Shared<Msg>
where
    Msg: 'static + Clone + Send,
{
    /// Records the first fatal cause and cancels the run. Later causes are
    /// dropped: the first failure wins.
    fn fail(&self, error: Error) {
        {
            let mut cause = self.cause.lock().expect("cause lock poisoned");
            if cause.is_none() {
                tracing::error!(pipeline = %self.pipeline, %error, "pipeline terminating");
                *cause = Some(error);
            }
        }
        self.controller.cancel();
    }
}

/// Runs the main loop, then drives the termination sequence in its strict
/// order: loop exit, worker drain, error fan-in close, dispatcher drain,
/// done signal, stateful task shutdown.
async fn supervise<Msg>(
    shared: Arc<Shared<Msg>>,
    get_id: GetId<Msg>,
    error_sender: flume::Sender<task::Error>,
    dispatcher: tokio::task::JoinHandle<()>,
    done: watch::Sender<Termination>,
) where
    Msg: 'static + Clone + Send + Sync,
{
    let mut workers = WorkerGroup::default();
    main_loop(&shared, &get_id, &error_sender, &mut workers).await;

    tracing::debug!(
        pipeline = %shared.pipeline,
        workers = %workers.len(),
        "main loop exited, draining workers"
    );
    workers.join().await;

    // The loop and every worker have exited: this drops the last sender and
    // closes the error fan-in, letting the dispatcher drain and stop.
    drop(error_sender);
    if let Err(error) = dispatcher.await {
        tracing::error!(pipeline = %shared.pipeline, %error, "error dispatcher join error");
    }

    let result = match shared.cause.lock().expect("cause lock poisoned").take() {
        Some(error) => Err(error),
        None => Ok(()),
    };
    tracing::info!(pipeline = %shared.pipeline, success = %result.is_ok(), "pipeline terminated");
    let _ = done.send(Some(result));

    // The run is over: stop the background workers of stateful tasks. No
    // caller can still be blocked on them, every worker has been joined.
    shared.controller.cancel();
}

async fn main_loop<Msg>(
    shared: &Arc<Shared<Msg>>,
    get_id: &GetId<Msg>,
    error_sender: &flume::Sender<task::Error>,
    workers: &mut WorkerGroup,
) where
    Msg: 'static + Clone + Send + Sync,
{
    let shutdown = shared.controller.subscribe();
    let mut messages = shared.consumer.messages();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(pipeline = %shared.pipeline, "pipeline run cancelled");
                break;
            }
            message = messages.next() => match message {
                None => {
                    tracing::debug!(pipeline = %shared.pipeline, "source stream closed");
                    break;
                }
                Some(Err(error)) => {
                    shared.fail(Error::Source {
                        pipeline: shared.pipeline.clone(),
                        error,
                    });
                    break;
                }
                Some(Ok(envelope)) => {
                    let id = (get_id)(&envelope.data);
                    let ctx = envelope
                        .context
                        .with_value(NAME_KEY, Value::String(shared.pipeline.clone()))
                        .with_value(ID_KEY, Value::String(id))
                        .with_shutdown(shutdown.clone());
                    workers.register(tokio::spawn(handle_message(
                        shared.clone(),
                        ctx,
                        envelope.data,
                        error_sender.clone(),
                    )));
                }
            }
        }
    }
}

async fn handle_message<Msg>(shared: Arc<Shared<Msg>>, ctx: Context, data: Msg, errors: flume::Sender<task::Error>)
where
    Msg: 'static + Clone + Send + Sync,
{
    // An empty DAG acknowledges unconditionally.
    let result = if shared.first.is_empty() {
        Ok(())
    } else {
        exec_tasks(&ctx, &shared.first, Payload::One(data)).await
    };

    match result {
        Ok(()) => {
            if let Err(error) = shared.consumer.ack(&ctx).await {
                shared.fail(Error::Source {
                    pipeline: shared.pipeline.clone(),
                    error,
                });
            }
        }
        Err(task_error) => {
            tracing::debug!(
                pipeline = %shared.pipeline,
                id = %ctx.id().unwrap_or_default(),
                error = %task_error,
                "message processing failed"
            );
            if let Err(error) = shared.consumer.nack(&ctx).await {
                shared.fail(Error::Source {
                    pipeline: shared.pipeline.clone(),
                    error,
                });
            }
            if errors.send(task_error).is_err() {
                tracing::trace!(pipeline = %shared.pipeline, "error dispatcher already stopped");
            }

            let count = shared.error_count.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(max) = shared.max_errors {
                if count > max {
                    shared.fail(Error::MaxErrorsExceeded {
                        pipeline: shared.pipeline.clone(),
                        count,
                        max,
                    });
                }
            }
        }
    }
}

/// Subscriber registry for the multicast error channel.
#[derive(Default)]
struct ErrorHub {
    state: Mutex<HubState>,
}

#[derive(Default)]
struct HubState {
    subscribers: Vec<flume::Sender<task::Error>>,
    closed: bool,
}

impl ErrorHub {
    fn subscribe(&self) -> flume::Receiver<task::Error> {
        let mut state = self.state.lock().expect("error hub lock poisoned");
        let (sender, receiver) = flume::unbounded();
        if !state.closed {
            state.subscribers.push(sender);
        }
        // In the closed case the sender is dropped here and the caller gets
        // an immediately-closed channel instead of a hang.
        receiver
    }

    fn snapshot(&self) -> Vec<flume::Sender<task::Error>> {
        self.state.lock().expect("error hub lock poisoned").subscribers.clone()
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("error hub lock poisoned");
        state.closed = true;
        state.subscribers.clear();
    }
}

/// Relays every fan-in error to all subscribers, then closes them.
async fn dispatch_errors(receiver: flume::Receiver<task::Error>, hub: Arc<ErrorHub>) {
    while let Ok(error) = receiver.recv_async().await {
        let subscribers = hub.snapshot();
        for delivery in join_all(subscribers.iter().map(|s| s.send_async(error.clone()))).await {
            if delivery.is_err() {
                tracing::trace!("error subscriber dropped its channel");
            }
        }
    }
    hub.close();
}
