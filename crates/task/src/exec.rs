//! The fan-out executor: runs a set of tasks concurrently on one payload and
//! aggregates their failures.

use std::sync::Arc;

use context::Context;
use futures::future::join_all;
use source::Payload;

use crate::{Error, Task};

/// Executes every task in `tasks` concurrently against `payload`.
///
/// Waits for every task to complete regardless of individual failures, so
/// that side effects already dispatched run to completion. Returns
/// [`Error::Continuation`] carrying every child failure if any task failed.
/// An empty task set is a success.
pub async fn exec_tasks<Msg>(ctx: &Context, tasks: &[Arc<dyn Task<Msg>>], payload: Payload<Msg>) -> Result<(), Error>
where
    Msg: 'static + Clone + Send,
{
    if tasks.is_empty() {
        return Ok(());
    }

    let executions = tasks.iter().map(|task| task.execute(ctx, payload.clone()));
    let errors: Vec<Error> = join_all(executions)
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        tracing::debug!(failures = %errors.len(), tasks = %tasks.len(), "continuation tasks failed");
        Err(Error::Continuation { errors })
    }
}
