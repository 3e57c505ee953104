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

//! A signal is either an item received from an input channel, a tick of a
//! free-running flush timer, or a stop notification. A `SignalReceiver` is
//! the interface through which a background worker (e.g. a batching task)
//! receives its next signal, and a `Shutdown` is the cancellation signal
//! shared by every worker of a running pipeline.

use std::{
    fmt::{Display, Formatter},
    time::{Duration, Instant},
};

pub use crate::shutdown::{Shutdown, ShutdownController};

pub mod shutdown;

/// Worker signal received from an input channel or a timer.
#[derive(Debug)]
#[non_exhaustive]
pub enum Signal<T> {
    /// Signal variant carrying one item from the input channel.
    Item(
        /// The item received.
        T,
    ),
    /// Signal variant triggered by the flush timer.
    FlushTick {
        /// Timestamp of the tick.
        instant: Instant,
    },
    /// Signal variant received when the worker must stop.
    Stop,
}

impl<T> Signal<T> {
    /// Returns the name of this signal.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Item(_) => "Item",
            Signal::FlushTick { .. } => "FlushTick",
            Signal::Stop => "Stop",
        }
    }
}

impl<T> Display for Signal<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A receiver multiplexing an input channel, an optional flush timer, and a
/// shutdown signal into a single stream of [`Signal`]s.
pub struct SignalReceiver<T> {
    receiver: flume::Receiver<T>,
    interval: Option<tokio::time::Interval>,
    shutdown: Shutdown,
}

impl<T> SignalReceiver<T> {
    /// Creates a receiver without a flush timer.
    pub fn with_receiver(receiver: flume::Receiver<T>, shutdown: Shutdown) -> Self {
        Self {
            receiver,
            interval: None,
            shutdown,
        }
    }

    /// Creates a receiver that also yields a [`Signal::FlushTick`] every
    /// `period`.
    ///
    /// The timer is free-running: it ticks at a fixed period from creation,
    /// it is not reset by the items flowing through the receiver. The first
    /// tick fires one full period after creation.
    pub fn with_receiver_timer(receiver: flume::Receiver<T>, period: Duration, shutdown: Shutdown) -> Self {
        let start = tokio::time::Instant::now() + period;
        Self {
            receiver,
            interval: Some(tokio::time::interval_at(start, period)),
            shutdown,
        }
    }

    /// Returns the next signal to process.
    ///
    /// Yields [`Signal::Stop`] when the shutdown signal is cancelled or when
    /// every sender of the input channel has been dropped.
    pub async fn recv(&mut self) -> Signal<T> {
        let Self {
            receiver,
            interval,
            shutdown,
        } = self;

        match interval {
            Some(interval) => tokio::select! {
                _ = shutdown.cancelled() => Signal::Stop,
                instant = interval.tick() => Signal::FlushTick {
                    instant: instant.into_std(),
                },
                item = receiver.recv_async() => match item {
                    Ok(item) => Signal::Item(item),
                    Err(error) => {
                        tracing::warn!(%error, "input channel closed");
                        Signal::Stop
                    }
                },
            },
            None => tokio::select! {
                _ = shutdown.cancelled() => Signal::Stop,
                item = receiver.recv_async() => match item {
                    Ok(item) => Signal::Item(item),
                    Err(error) => {
                        tracing::warn!(%error, "input channel closed");
                        Signal::Stop
                    }
                },
            },
        }
    }
}
