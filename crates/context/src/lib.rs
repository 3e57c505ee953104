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

//! A context is a container for a set of key-value pairs attached to a
//! message while it travels through a pipeline, plus the cancellation signal
//! of the pipeline run it belongs to.
//!
//! Contexts are derived, never mutated in place: [`Context::with_value`]
//! returns a copy carrying the additional pair, so concurrent holders of the
//! parent context never observe the change.

use std::collections::HashMap;

use signal::Shutdown;

/// Context key carrying the per-message or per-batch identity.
///
/// For a batch, the value is the pipe-joined concatenation of the ids of the
/// contributing messages.
pub const ID_KEY: &str = "ID";

/// Context key carrying the pipeline name.
pub const NAME_KEY: &str = "NAME";

/// Values that can be used as the `value` field of a `Context`.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// A boolean value
    Bool(bool),
    /// A u64 value
    U64(u64),
    /// A i64 value
    I64(i64),
    /// A f64 value
    F64(f64),
    /// A string value
    String(String),
}

/// A set of key-value pairs and a cancellation signal, attached to a message.
#[derive(Debug, Clone)]
pub struct Context {
    values: HashMap<String, Value>,
    shutdown: Shutdown,
}

impl Context {
    /// Creates a new empty context, not bound to any pipeline run.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a new value to the context.
    pub fn set(&mut self, key: &str, value: Value) {
        let _ = self.values.insert(key.to_string(), value);
    }

    /// Returns a derived context carrying the additional key-value pair.
    #[must_use]
    pub fn with_value(&self, key: &str, value: Value) -> Self {
        let mut derived = self.clone();
        derived.set(key, value);
        derived
    }

    /// Returns a derived context bound to the given cancellation signal.
    #[must_use]
    pub fn with_shutdown(&self, shutdown: Shutdown) -> Self {
        Self {
            values: self.values.clone(),
            shutdown,
        }
    }

    /// Gets a value from the context.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Gets a value from the context or returns a default value if the key is
    /// not present.
    pub fn get_value<V: TryFrom<Value>>(&self, key: &str, default: V) -> V {
        match self.get(key) {
            Some(v) => V::try_from(v.clone()).unwrap_or(default),
            None => default,
        }
    }

    /// Returns the message or batch identity attached under [`ID_KEY`].
    pub fn id(&self) -> Option<String> {
        match self.get(ID_KEY) {
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        }
    }

    /// Returns the pipeline name attached under [`NAME_KEY`].
    pub fn pipeline_name(&self) -> Option<String> {
        match self.get(NAME_KEY) {
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        }
    }

    /// Returns the cancellation signal of the pipeline run this context
    /// belongs to.
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Returns true once the pipeline run this context belongs to has been
    /// cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completes once the pipeline run this context belongs to is cancelled.
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }
}

impl Default for Context {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            shutdown: Shutdown::never(),
        }
    }
}

/// A generic error for all the following TryFrom implementations.
pub struct TryFromError {}

impl TryFrom<Value> for u64 {
    type Error = TryFromError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::U64(v) => Ok(v),
            Value::I64(v) => u64::try_from(v).map_err(|_| TryFromError {}),
            _ => Err(TryFromError {}),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = TryFromError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::U64(v) => i64::try_from(v).map_err(|_| TryFromError {}),
            Value::I64(v) => Ok(v),
            _ => Err(TryFromError {}),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = TryFromError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::U64(v) => Ok(v as f64),
            Value::I64(v) => Ok(v as f64),
            Value::F64(v) => Ok(v),
            _ => Err(TryFromError {}),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = TryFromError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bool(v) => Ok(v),
            _ => Err(TryFromError {}),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = TryFromError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::U64(v) => Ok(v.to_string()),
            Value::I64(v) => Ok(v.to_string()),
            Value::F64(v) => Ok(v.to_string()),
            Value::Bool(v) => Ok(v.to_string()),
            Value::String(v) => Ok(v),
        }
    }
}
