//! Sink task: publishes the payload to a bound sink, then tees it to any
//! successors.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use context::Context;
use source::{Payload, Producer, Source};

use crate::{exec_tasks, EngineHandler, Error, Successors, Task};

/// Creates a task that publishes every payload to `sink`.
///
/// The producer handle is acquired at bind time, using the task name as the
/// logical producer identifier. Successors (if any) run only after a
/// successful publish, with the original payload; a publish failure is an
/// ordinary task error.
pub fn output<Msg>(name: &str, sink: Arc<dyn Source<Msg>>) -> Arc<dyn Task<Msg>>
where
    Msg: 'static + Clone + Send + Sync,
{
    Arc::new(OutputTask {
        name: name.to_string(),
        sink,
        producer: RwLock::new(None),
        successors: Successors::new(),
    })
}

struct OutputTask<Msg: 'static + Clone + Send> {
    name: String,
    sink: Arc<dyn Source<Msg>>,
    producer: RwLock<Option<Arc<dyn Producer<Msg>>>>,
    successors: Successors<Msg>,
}

#[async_trait]
impl<Msg> Task<Msg> for OutputTask<Msg>
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
        let producer = self
            .producer
            .read()
            .expect("producer lock poisoned")
            .clone()
            .ok_or_else(|| Error::Task {
                task: self.name.clone(),
                error: "output task is not bound to a pipeline".to_string(),
            })?;

        producer
            .publish(ctx, payload.clone())
            .await
            .map_err(|error| Error::Task {
                task: self.name.clone(),
                error: error.to_string(),
            })?;

        exec_tasks(ctx, &self.successors.snapshot(), payload).await
    }

    async fn bind(&self, handler: EngineHandler) -> Result<(), Error> {
        let producer = self
            .sink
            .producer(handler.context(), &self.name)
            .await
            .map_err(|error| Error::Task {
                task: self.name.clone(),
                error: error.to_string(),
            })?;

        *self.producer.write().expect("producer lock poisoned") = Some(producer);
        tracing::debug!(task = %self.name, "output task bound to its sink");
        Ok(())
    }
}
