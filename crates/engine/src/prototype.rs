//! Pipeline builder.

use std::{collections::HashMap, sync::Arc};

use context::{Context, Value, NAME_KEY};
use signal::ShutdownController;
use source::Source;
use task::{EngineHandler, Task};

use crate::{runner::GetId, Error, Runner, INPUT};

/// An in-construction pipeline DAG.
///
/// The builder consumes and returns itself, so the DAG is exclusively owned
/// while it is assembled; [`Prototype::start`] hands the finished DAG to the
/// [`Runner`], after which it is read-only.
///
/// Malformed pipeline definitions — duplicate task names, an unknown
/// [`Prototype::after`] target — are programmer errors and panic at build
/// time.
pub struct Prototype<Msg: 'static + Clone + Send> {
    name: String,
    source: Option<Arc<dyn Source<Msg>>>,
    get_id: Option<GetId<Msg>>,
    tasks: HashMap<String, Arc<dyn Task<Msg>>>,
    first: Vec<Arc<dyn Task<Msg>>>,
    last: Option<Arc<dyn Task<Msg>>>,
    max_errors: Option<usize>,
}

impl<Msg> Prototype<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    /// Starts constructing a new pipeline.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: None,
            get_id: None,
            tasks: HashMap::new(),
            first: vec![],
            last: None,
            max_errors: None,
        }
    }

    /// Binds the source and the payload-to-identity function. Required
    /// before [`Prototype::start`].
    #[must_use]
    pub fn from<F>(mut self, source: Arc<dyn Source<Msg>>, get_id: F) -> Self
    where
        F: Fn(&Msg) -> String + Send + Sync + 'static,
    {
        self.source = Some(source);
        self.get_id = Some(Arc::new(get_id));
        self
    }

    /// Sets the maximum number of task failures tolerated before the
    /// pipeline terminates with [`Error::MaxErrorsExceeded`]. A budget of 0
    /// terminates on the first failure. Unbounded by default.
    #[must_use]
    pub fn max_errors(mut self, budget: usize) -> Self {
        self.max_errors = Some(budget);
        self
    }

    /// Appends `task` to the DAG.
    ///
    /// The first appended task becomes a root; otherwise an edge is added
    /// from the most recently appended task. `task` becomes the attachment
    /// point for the next call.
    #[must_use]
    pub fn then(mut self, task: Arc<dyn Task<Msg>>) -> Self {
        self.register(&task);

        if self.first.is_empty() {
            self.first.push(task.clone());
        }
        if let Some(last) = &self.last {
            last.add_successor(task.clone());
        }
        self.last = Some(task);
        self
    }

    /// Appends `task` after the previously registered task named `name`.
    ///
    /// The sentinel name [`INPUT`] attaches `task` as an additional root.
    /// `task` becomes the attachment point for the next [`Prototype::then`].
    #[must_use]
    pub fn after(mut self, name: &str, task: Arc<dyn Task<Msg>>) -> Self {
        let predecessor = if name == INPUT {
            None
        } else {
            match self.tasks.get(name) {
                Some(predecessor) => Some(predecessor.clone()),
                None => panic!("unknown task '{}' in pipeline '{}'", name, self.name),
            }
        };

        self.register(&task);
        match predecessor {
            Some(predecessor) => predecessor.add_successor(task.clone()),
            None => self.first.push(task.clone()),
        }
        self.last = Some(task);
        self
    }

    /// Finalizes the DAG, binds every task, and launches the runner.
    pub async fn start(self) -> Result<Runner, Error> {
        let source = self.source.ok_or_else(|| Error::Build {
            pipeline: self.name.clone(),
            reason: "no source bound, call from() before start()".to_string(),
        })?;
        let get_id = self.get_id.ok_or_else(|| Error::Build {
            pipeline: self.name.clone(),
            reason: "no identity function bound, call from() before start()".to_string(),
        })?;

        let controller = Arc::new(ShutdownController::new());
        let bound_ctx = Context::new()
            .with_value(NAME_KEY, Value::String(self.name.clone()))
            .with_shutdown(controller.subscribe());

        let consumer = source
            .consumer(&bound_ctx, &self.name)
            .await
            .map_err(|error| Error::Source {
                pipeline: self.name.clone(),
                error,
            })?;

        let handler = EngineHandler::new(bound_ctx);
        for (task_name, task) in &self.tasks {
            task.bind(handler.clone()).await.map_err(|error| Error::Bind {
                pipeline: self.name.clone(),
                task: task_name.clone(),
                reason: error.to_string(),
            })?;
            tracing::debug!(pipeline = %self.name, task = %task_name, "task bound");
        }

        tracing::info!(
            pipeline = %self.name,
            tasks = %self.tasks.len(),
            roots = %self.first.len(),
            "pipeline starting"
        );
        Ok(Runner::spawn(
            self.name,
            consumer,
            get_id,
            self.first,
            self.max_errors,
            controller,
        ))
    }

    fn register(&mut self, task: &Arc<dyn Task<Msg>>) {
        let name = task.name().to_string();
        if self.tasks.insert(name.clone(), task.clone()).is_some() {
            panic!("duplicate task name '{}' in pipeline '{}'", name, self.name);
        }
    }
}

#[cfg(test)]
mod test {
    use task::from_fn;

    use super::*;

    fn noop(name: &str) -> Arc<dyn Task<String>> {
        from_fn(name, |_ctx, payload| Ok(payload))
    }

    #[test]
    fn chains_tasks() {
        let prototype = Prototype::<String>::new("test")
            .then(noop("first"))
            .then(noop("second"))
            .after(INPUT, noop("third"))
            .after("first", noop("fourth"));

        assert_eq!(prototype.tasks.len(), 4);
        assert_eq!(prototype.first.len(), 2);
    }

    #[test]
    #[should_panic(expected = "duplicate task name 'first'")]
    fn duplicate_name_is_a_programmer_error() {
        let _ = Prototype::<String>::new("test").then(noop("first")).then(noop("first"));
    }

    #[test]
    #[should_panic(expected = "unknown task 'missing'")]
    fn unknown_after_target_is_a_programmer_error() {
        let _ = Prototype::<String>::new("test")
            .then(noop("first"))
            .after("missing", noop("second"));
    }

    #[tokio::test]
    async fn start_without_source_fails() {
        let result = Prototype::<String>::new("test").then(noop("first")).start().await;
        assert!(matches!(result, Err(Error::Build { .. })));
    }
}
