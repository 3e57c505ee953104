//! An in-process source and sink backed by in-memory queues.
//!
//! Used by tests and demos: it records every ack, nack, and published
//! payload, and can be configured to fail specific acknowledgements, fail
//! reads, or fail all publishes to exercise boundary error handling.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use context::Context;
use futures::{stream, StreamExt};

use crate::{Consumer, Error, Message, MessageStream, Payload, Producer, Source};

/// An in-memory [`Source`] pre-loaded with a fixed set of messages.
///
/// By default the message stream closes once the pre-loaded messages have
/// been read. [`InmemSource::hold_open`] keeps it open instead, so that the
/// pipeline only terminates through cancellation — the behavior of a live
/// subscription with no pending messages.
pub struct InmemSource<Msg> {
    messages: Mutex<Vec<Msg>>,
    keep_stream_open: bool,
    state: Arc<State<Msg>>,
}

struct State<Msg> {
    acks: Mutex<Vec<String>>,
    nacks: Mutex<Vec<String>>,
    published: Mutex<Vec<Msg>>,
    ack_failures: Mutex<HashMap<String, String>>,
    nack_failures: Mutex<HashMap<String, String>>,
    publish_failure: Mutex<Option<String>>,
    read_failure: Mutex<Option<(usize, String)>>,
}

impl<Msg> Default for State<Msg> {
    fn default() -> Self {
        Self {
            acks: Mutex::new(vec![]),
            nacks: Mutex::new(vec![]),
            published: Mutex::new(vec![]),
            ack_failures: Mutex::new(HashMap::new()),
            nack_failures: Mutex::new(HashMap::new()),
            publish_failure: Mutex::new(None),
            read_failure: Mutex::new(None),
        }
    }
}

impl<Msg> InmemSource<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    /// Creates a source whose stream closes after `messages` have been read.
    pub fn with_messages(messages: Vec<Msg>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(messages),
            keep_stream_open: false,
            state: Arc::new(State::default()),
        })
    }

    /// Creates a source whose stream stays open after `messages` have been
    /// read.
    pub fn hold_open(messages: Vec<Msg>) -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(messages),
            keep_stream_open: true,
            state: Arc::new(State::default()),
        })
    }

    /// Makes acknowledging the message with the given id fail.
    pub fn fail_ack(&self, id: &str, reason: &str) {
        let _ = self
            .state
            .ack_failures
            .lock()
            .expect("ack_failures lock poisoned")
            .insert(id.to_string(), reason.to_string());
    }

    /// Makes negatively acknowledging the message with the given id fail.
    pub fn fail_nack(&self, id: &str, reason: &str) {
        let _ = self
            .state
            .nack_failures
            .lock()
            .expect("nack_failures lock poisoned")
            .insert(id.to_string(), reason.to_string());
    }

    /// Makes every publish fail.
    pub fn fail_publish(&self, reason: &str) {
        *self
            .state
            .publish_failure
            .lock()
            .expect("publish_failure lock poisoned") = Some(reason.to_string());
    }

    /// Makes the message stream yield a read error after `n` messages.
    pub fn fail_read_after(&self, n: usize, reason: &str) {
        *self.state.read_failure.lock().expect("read_failure lock poisoned") = Some((n, reason.to_string()));
    }

    /// Ids of the messages acknowledged so far.
    pub fn acks(&self) -> Vec<String> {
        self.state.acks.lock().expect("acks lock poisoned").clone()
    }

    /// Ids of the messages negatively acknowledged so far.
    pub fn nacks(&self) -> Vec<String> {
        self.state.nacks.lock().expect("nacks lock poisoned").clone()
    }

    /// Message data published to this sink so far.
    pub fn published(&self) -> Vec<Msg> {
        self.state.published.lock().expect("published lock poisoned").clone()
    }
}

#[async_trait]
impl<Msg> Source<Msg> for InmemSource<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    async fn consumer(&self, _ctx: &Context, name: &str) -> Result<Arc<dyn Consumer<Msg>>, Error> {
        let pending = std::mem::take(&mut *self.messages.lock().expect("messages lock poisoned"));

        let mut items: Vec<Result<Message<Msg>, Error>> = pending
            .into_iter()
            .map(|data| {
                Ok(Message {
                    data,
                    context: Context::new(),
                })
            })
            .collect();

        if let Some((after, reason)) = self
            .state
            .read_failure
            .lock()
            .expect("read_failure lock poisoned")
            .clone()
        {
            items.truncate(after);
            items.push(Err(Error::Read { error: reason }));
        }

        tracing::debug!(consumer = %name, messages = %items.len(), "in-memory consumer acquired");
        Ok(Arc::new(InmemConsumer {
            items: Mutex::new(Some(items)),
            keep_stream_open: self.keep_stream_open,
            state: self.state.clone(),
        }))
    }

    async fn producer(&self, _ctx: &Context, name: &str) -> Result<Arc<dyn Producer<Msg>>, Error> {
        tracing::debug!(producer = %name, "in-memory producer acquired");
        Ok(Arc::new(InmemProducer {
            name: name.to_string(),
            state: self.state.clone(),
        }))
    }
}

struct InmemConsumer<Msg> {
    items: Mutex<Option<Vec<Result<Message<Msg>, Error>>>>,
    keep_stream_open: bool,
    state: Arc<State<Msg>>,
}

#[async_trait]
impl<Msg> Consumer<Msg> for InmemConsumer<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    fn messages(&self) -> MessageStream<Msg> {
        let items = self
            .items
            .lock()
            .expect("items lock poisoned")
            .take()
            .unwrap_or_default();

        if self.keep_stream_open {
            stream::iter(items).chain(stream::pending()).boxed()
        } else {
            stream::iter(items).boxed()
        }
    }

    async fn ack(&self, ctx: &Context) -> Result<(), Error> {
        let id = ctx.id().unwrap_or_default();
        if let Some(reason) = self
            .state
            .ack_failures
            .lock()
            .expect("ack_failures lock poisoned")
            .get(&id)
        {
            return Err(Error::Ack {
                id,
                error: reason.clone(),
            });
        }
        self.state.acks.lock().expect("acks lock poisoned").push(id);
        Ok(())
    }

    async fn nack(&self, ctx: &Context) -> Result<(), Error> {
        let id = ctx.id().unwrap_or_default();
        if let Some(reason) = self
            .state
            .nack_failures
            .lock()
            .expect("nack_failures lock poisoned")
            .get(&id)
        {
            return Err(Error::Nack {
                id,
                error: reason.clone(),
            });
        }
        self.state.nacks.lock().expect("nacks lock poisoned").push(id);
        Ok(())
    }
}

struct InmemProducer<Msg> {
    name: String,
    state: Arc<State<Msg>>,
}

#[async_trait]
impl<Msg> Producer<Msg> for InmemProducer<Msg>
where
    Msg: 'static + Clone + Send + Sync,
{
    async fn publish(&self, _ctx: &Context, payload: Payload<Msg>) -> Result<(), Error> {
        if let Some(reason) = self
            .state
            .publish_failure
            .lock()
            .expect("publish_failure lock poisoned")
            .clone()
        {
            return Err(Error::Publish {
                producer: self.name.clone(),
                error: reason,
            });
        }
        self.state
            .published
            .lock()
            .expect("published lock poisoned")
            .extend(payload.into_vec());
        Ok(())
    }
}
