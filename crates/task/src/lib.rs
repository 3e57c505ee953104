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

//! Definition of the `Task` trait and the built-in stateless tasks.
//!
//! A task is a named node in a pipeline DAG. Executing a task may run its own
//! logic and then dispatch a payload to its successor set through the fan-out
//! executor ([`exec_tasks`]), which runs every successor concurrently and
//! aggregates their failures.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use context::Context;

pub use crate::exec::exec_tasks;
pub use crate::filter::{filter, select};
pub use crate::from_fn::from_fn;
pub use crate::output::output;
pub use source::Payload;

pub mod exec;
pub mod filter;
pub mod from_fn;
pub mod output;

/// Boxed error type returned by user-supplied transforms and predicates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All the errors that can occur while executing a task tree.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The task's own body failed.
    #[error("task failed (task: {task}, reason: {error})")]
    Task {
        /// The name of the failed task.
        task: String,
        /// The error message.
        error: String,
    },

    /// At least one continuation task failed; carries every child failure.
    #[error("continuation tasks failed (failures: [{}])", join_errors(.errors))]
    Continuation {
        /// The failures of the continuation tasks, in no particular order.
        errors: Vec<Error>,
    },
}

impl Error {
    /// Flat count of task failures carried by this error.
    pub fn failure_count(&self) -> usize {
        match self {
            Error::Task { .. } => 1,
            Error::Continuation { errors } => errors.iter().map(Error::failure_count).sum(),
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// A handler passed to [`Task::bind`] when a pipeline starts, through which a
/// stateful task can tie background work to the lifetime of the run.
#[derive(Clone)]
pub struct EngineHandler {
    /// The runner's bound context: carries the pipeline name and the
    /// cancellation signal of the run.
    context: Context,
}

impl EngineHandler {
    /// Creates a new `EngineHandler`.
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Returns the runner's bound context.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

/// The task trait.
///
/// Execution fails with [`Error::Task`] when the task's own logic fails and
/// with [`Error::Continuation`] when any descendant fails.
#[async_trait]
pub trait Task<Msg: 'static + Clone + Send>: Send + Sync {
    /// The task name, unique within a pipeline.
    fn name(&self) -> &str;

    /// Adds a successor task. Used only while the DAG is under construction.
    fn add_successor(&self, task: Arc<dyn Task<Msg>>);

    /// Executes the task against a payload.
    async fn execute(&self, ctx: &Context, payload: Payload<Msg>) -> Result<(), Error>;

    // Optional method
    /// Called exactly once when the pipeline starts. Stateful tasks launch
    /// their background workers here.
    async fn bind(&self, _handler: EngineHandler) -> Result<(), Error> {
        Ok(())
    }
}

/// The successor set of a task node.
///
/// Mutated only during DAG construction; cloned handles observe the same set,
/// which lets a stateful task hand the set to its background worker.
pub struct Successors<Msg: 'static + Clone + Send> {
    tasks: Arc<RwLock<Vec<Arc<dyn Task<Msg>>>>>,
}

impl<Msg> Successors<Msg>
where
    Msg: 'static + Clone + Send,
{
    /// Creates an empty successor set.
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Adds a task to the set.
    pub fn add(&self, task: Arc<dyn Task<Msg>>) {
        self.tasks.write().expect("successors lock poisoned").push(task);
    }

    /// Returns the current set, for dispatch.
    pub fn snapshot(&self) -> Vec<Arc<dyn Task<Msg>>> {
        self.tasks.read().expect("successors lock poisoned").clone()
    }
}

impl<Msg> Default for Successors<Msg>
where
    Msg: 'static + Clone + Send,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Msg> Clone for Successors<Msg>
where
    Msg: 'static + Clone + Send,
{
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}
