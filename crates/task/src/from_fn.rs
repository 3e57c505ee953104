//! Adapter turning a user transform into a chainable task.

use std::sync::Arc;

use async_trait::async_trait;
use context::Context;
use source::Payload;

use crate::{exec_tasks, BoxError, Error, Successors, Task};

/// Creates a task from a transform function.
///
/// On success the *produced* payload, not the original input, is dispatched
/// to the successor set. On failure the error is returned as this task's own
/// failure and no successor runs.
pub fn from_fn<Msg, F>(name: &str, f: F) -> Arc<dyn Task<Msg>>
where
    Msg: 'static + Clone + Send + Sync,
    F: Fn(&Context, Payload<Msg>) -> Result<Payload<Msg>, BoxError> + Send + Sync + 'static,
{
    Arc::new(FnTask {
        name: name.to_string(),
        transform: f,
        successors: Successors::new(),
    })
}

struct FnTask<Msg, F>
where
    Msg: 'static + Clone + Send,
{
    name: String,
    transform: F,
    successors: Successors<Msg>,
}

#[async_trait]
impl<Msg, F> Task<Msg> for FnTask<Msg, F>
where
    Msg: 'static + Clone + Send + Sync,
    F: Fn(&Context, Payload<Msg>) -> Result<Payload<Msg>, BoxError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn add_successor(&self, task: Arc<dyn Task<Msg>>) {
        self.successors.add(task);
    }

    async fn execute(&self, ctx: &Context, payload: Payload<Msg>) -> Result<(), Error> {
        let produced = (self.transform)(ctx, payload).map_err(|error| Error::Task {
            task: self.name.clone(),
            error: error.to_string(),
        })?;

        exec_tasks(ctx, &self.successors.snapshot(), produced).await
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn forwards_the_produced_payload() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let save = from_fn("save", move |_ctx, payload: Payload<String>| {
            sink.lock().unwrap().extend(payload.clone().into_vec());
            Ok(payload)
        });

        let upper = from_fn("upper", |_ctx, payload: Payload<String>| match payload {
            Payload::One(data) => Ok(Payload::One(data.to_uppercase())),
            batch => Ok(batch),
        });
        upper.add_successor(save);

        upper
            .execute(&Context::new(), Payload::One("message-0".to_string()))
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().clone(), vec!["MESSAGE-0".to_string()]);
    }

    #[tokio::test]
    async fn failure_skips_successors() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let save = from_fn("save", move |_ctx, payload: Payload<String>| {
            sink.lock().unwrap().extend(payload.clone().into_vec());
            Ok(payload)
        });

        let failing = from_fn("fail", |_ctx, _payload: Payload<String>| Err("expected failure".into()));
        failing.add_successor(save);

        let error = failing
            .execute(&Context::new(), Payload::One("message-0".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(error, Error::Task { task, .. } if task == "fail"));
        assert!(seen.lock().unwrap().is_empty());
    }
}
