//! Predicate gates: `filter` drops matched payloads, `select` drops
//! unmatched ones.

use std::sync::Arc;

use async_trait::async_trait;
use context::Context;
use source::Payload;

use crate::{exec_tasks, Error, Successors, Task};

/// Creates a task that drops payloads matched by `predicate`.
///
/// A drop is a normal success for the upstream: the message is acknowledged
/// and never forwarded.
pub fn filter<Msg, F>(name: &str, predicate: F) -> Arc<dyn Task<Msg>>
where
    Msg: 'static + Clone + Send + Sync,
    F: Fn(&Context, &Payload<Msg>) -> bool + Send + Sync + 'static,
{
    Arc::new(Gate {
        name: name.to_string(),
        predicate,
        drop_on_match: true,
        successors: Successors::new(),
    })
}

/// Creates a task that drops payloads *not* matched by `predicate`.
pub fn select<Msg, F>(name: &str, predicate: F) -> Arc<dyn Task<Msg>>
where
    Msg: 'static + Clone + Send + Sync,
    F: Fn(&Context, &Payload<Msg>) -> bool + Send + Sync + 'static,
{
    Arc::new(Gate {
        name: name.to_string(),
        predicate,
        drop_on_match: false,
        successors: Successors::new(),
    })
}

struct Gate<Msg, F>
where
    Msg: 'static + Clone + Send,
{
    name: String,
    predicate: F,
    drop_on_match: bool,
    successors: Successors<Msg>,
}

#[async_trait]
impl<Msg, F> Task<Msg> for Gate<Msg, F>
where
    Msg: 'static + Clone + Send + Sync,
    F: Fn(&Context, &Payload<Msg>) -> bool + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn add_successor(&self, task: Arc<dyn Task<Msg>>) {
        self.successors.add(task);
    }

    async fn execute(&self, ctx: &Context, payload: Payload<Msg>) -> Result<(), Error> {
        let matched = (self.predicate)(ctx, &payload);

        if matched == self.drop_on_match {
            tracing::trace!(task = %self.name, "payload dropped");
            return Ok(());
        }

        exec_tasks(ctx, &self.successors.snapshot(), payload).await
    }
}
