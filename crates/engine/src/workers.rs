//! Tracker for the per-message worker tasks of a runner.

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::task::JoinHandle;

/// Tracks every spawned per-message worker so the runner can wait for all of
/// them to exit before terminating.
///
/// Owned by the runner's main loop: workers are only registered there, and
/// joined once the loop has exited.
#[derive(Default)]
pub(crate) struct WorkerGroup {
    registered: FuturesUnordered<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Registers a worker.
    pub(crate) fn register(&mut self, handle: JoinHandle<()>) {
        self.registered.push(handle);
    }

    /// Number of workers still tracked.
    pub(crate) fn len(&self) -> usize {
        self.registered.len()
    }

    /// Waits for every registered worker to exit.
    pub(crate) async fn join(&mut self) {
        while let Some(exited) = self.registered.next().await {
            if let Err(error) = exited {
                tracing::error!(%error, "worker join error");
            }
        }
    }
}
