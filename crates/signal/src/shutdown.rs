//! Cooperative cancellation signal shared by a runner, its workers, and the
//! background workers of stateful tasks.

use tokio::sync::watch;

/// Owner side of a shutdown signal.
///
/// Dropping the controller without calling [`ShutdownController::cancel`] is
/// equivalent to cancelling: subscribers observe the closed channel and report
/// themselves cancelled.
#[derive(Debug)]
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Creates a new controller.
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender }
    }

    /// Returns a new subscriber observing this controller.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            receiver: self.sender.subscribe(),
            keepalive: None,
        }
    }

    /// Cancels the signal. Idempotent.
    pub fn cancel(&self) {
        if self.sender.send(true).is_err() {
            tracing::trace!("shutdown cancelled with no remaining subscribers");
        }
    }

    /// Returns true once [`ShutdownController::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber side of a shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
    // Keeps the sender of a detached signal alive, otherwise the closed
    // channel would read as a cancellation.
    keepalive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl Shutdown {
    /// Returns a signal that is never cancelled.
    ///
    /// Used by contexts that are not bound to a running pipeline, e.g. in
    /// tests or before a prototype is started.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            keepalive: Some(std::sync::Arc::new(sender)),
        }
    }

    /// Returns true if the signal has been cancelled or its controller
    /// dropped.
    pub fn is_cancelled(&self) -> bool {
        if *self.receiver.borrow() {
            return true;
        }
        self.receiver.has_changed().is_err()
    }

    /// Completes once the signal is cancelled or its controller dropped.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if *receiver.borrow() {
            return;
        }
        loop {
            match receiver.changed().await {
                Ok(()) => {
                    if *receiver.borrow() {
                        return;
                    }
                }
                // Controller dropped.
                Err(_) => return,
            }
        }
    }
}
