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

//! Definition of the source and sink traits consumed by a pipeline.
//!
//! A [`Source`] hands out [`Consumer`]s (a lazy stream of acknowledged
//! message envelopes) and [`Producer`]s (a publish handle). The pipeline
//! acknowledges every message it reads: [`Consumer::ack`] on success,
//! [`Consumer::nack`] on failure, correlated with the message through the
//! `ID` key of the context passed to either call.

use std::sync::Arc;

use async_trait::async_trait;
use context::Context;
use futures::stream::BoxStream;

pub mod mem;

/// All the errors that can occur at the source or sink boundary.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The consumer could not be acquired from the source.
    #[error("consumer acquisition failed (consumer: {name}, reason: {error})")]
    Consumer {
        /// The logical consumer name (usually the pipeline name).
        name: String,
        /// The error message.
        error: String,
    },

    /// The producer could not be acquired from the sink.
    #[error("producer acquisition failed (producer: {name}, reason: {error})")]
    Producer {
        /// The logical producer name (usually the task name).
        name: String,
        /// The error message.
        error: String,
    },

    /// The source failed to acknowledge a message.
    #[error("failed to ack message (id: {id}, reason: {error})")]
    Ack {
        /// The id of the message being acknowledged.
        id: String,
        /// The error message.
        error: String,
    },

    /// The source failed to negatively acknowledge a message.
    #[error("failed to nack message (id: {id}, reason: {error})")]
    Nack {
        /// The id of the message being acknowledged.
        id: String,
        /// The error message.
        error: String,
    },

    /// The source failed while reading messages.
    #[error("failed to read message (reason: {error})")]
    Read {
        /// The error message.
        error: String,
    },

    /// The sink failed to publish a payload.
    #[error("failed to publish message (producer: {producer}, reason: {error})")]
    Publish {
        /// The logical producer name.
        producer: String,
        /// The error message.
        error: String,
    },
}

/// A payload travelling through a pipeline: either a single message datum or
/// a batch of them coalesced by a batching task.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<Msg> {
    /// A single message datum.
    One(Msg),
    /// A batch of message data flushed together.
    Batch(Vec<Msg>),
}

impl<Msg> Payload<Msg> {
    /// Number of message data carried by this payload.
    pub fn len(&self) -> usize {
        match self {
            Payload::One(_) => 1,
            Payload::Batch(batch) => batch.len(),
        }
    }

    /// Returns true if this payload carries no message data.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::One(_) => false,
            Payload::Batch(batch) => batch.is_empty(),
        }
    }

    /// Consumes the payload into the flat list of message data it carries.
    pub fn into_vec(self) -> Vec<Msg> {
        match self {
            Payload::One(data) => vec![data],
            Payload::Batch(batch) => batch,
        }
    }
}

/// A message envelope read from a source: an opaque datum plus the context
/// it was received under.
#[derive(Debug, Clone)]
pub struct Message<Msg> {
    /// The opaque payload. The pipeline never interprets it.
    pub data: Msg,
    /// The parent context, enriched by the runner before dispatch.
    pub context: Context,
}

/// A lazy stream of message envelopes. The end of the stream signals
/// end-of-input; an [`Error::Read`] item signals a broken source.
pub type MessageStream<Msg> = BoxStream<'static, Result<Message<Msg>, Error>>;

/// A consumer handle on a source.
#[async_trait]
pub trait Consumer<Msg: 'static + Clone + Send>: Send + Sync {
    /// Returns the stream of message envelopes.
    fn messages(&self) -> MessageStream<Msg>;

    /// Acknowledges the message correlated with `ctx` (via its `ID` key).
    async fn ack(&self, ctx: &Context) -> Result<(), Error>;

    /// Negatively acknowledges the message correlated with `ctx`, making it
    /// available for redelivery according to the source's semantics.
    async fn nack(&self, ctx: &Context) -> Result<(), Error>;
}

/// A producer handle on a sink.
#[async_trait]
pub trait Producer<Msg: 'static + Clone + Send>: Send + Sync {
    /// Publishes a payload. Fails or succeeds as a whole.
    async fn publish(&self, ctx: &Context, payload: Payload<Msg>) -> Result<(), Error>;
}

/// A stream of messages that can be consumed from and published to.
#[async_trait]
pub trait Source<Msg: 'static + Clone + Send>: Send + Sync {
    /// Returns a consumer handle identified by `name`.
    async fn consumer(&self, ctx: &Context, name: &str) -> Result<Arc<dyn Consumer<Msg>>, Error>;

    /// Returns a producer handle identified by `name`.
    async fn producer(&self, ctx: &Context, name: &str) -> Result<Arc<dyn Producer<Msg>>, Error>;
}

#[cfg(test)]
mod test {
    use crate::Payload;

    #[test]
    fn payload_len() {
        assert_eq!(Payload::One("a").len(), 1);
        assert!(!Payload::One("a").is_empty());

        let batch = Payload::Batch(vec!["a", "b", "c"]);
        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());

        assert!(Payload::<&str>::Batch(vec![]).is_empty());
    }

    #[test]
    fn payload_into_vec_flattens() {
        assert_eq!(Payload::One(1).into_vec(), vec![1]);
        assert_eq!(Payload::Batch(vec![1, 2]).into_vec(), vec![1, 2]);
    }
}
