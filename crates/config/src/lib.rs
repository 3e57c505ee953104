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

//! Configuration objects for pipelines.
//!
//! Tasks themselves are composed programmatically (transforms and predicates
//! are closures), so configuration covers the declarative part: the pipeline
//! identity and error budget, and the tuning of batching tasks.

use std::{sync::Arc, time::Duration};

use batch::Batch;
use engine::Prototype;
use serde::{Deserialize, Serialize};
use task::Task;
use validator::Validate;

/// Errors for the config module.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configuration could not be parsed or validated.
    #[error("invalid configuration (reason: {message}, line: {line:?}, column: {column:?})")]
    InvalidConfig {
        /// The error message.
        message: String,
        /// The line number in the configuration document.
        line: Option<usize>,
        /// The column number in the configuration document.
        column: Option<usize>,
    },
}

/// Settings of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct PipelineSettings {
    /// The pipeline name.
    #[validate(length(min = 1))]
    pub name: String,

    /// Maximum number of task failures tolerated before the pipeline
    /// terminates. Negative means unbounded (the default).
    #[serde(default = "default_max_errors")]
    pub max_errors: i64,
}

fn default_max_errors() -> i64 {
    -1
}

impl PipelineSettings {
    /// Parses and validates pipeline settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        parse_validated(yaml)
    }

    /// Builds a [`Prototype`] configured with these settings.
    pub fn prototype<Msg>(&self) -> Prototype<Msg>
    where
        Msg: 'static + Clone + Send + Sync,
    {
        let mut prototype = Prototype::new(&self.name);
        if self.max_errors >= 0 {
            prototype = prototype.max_errors(self.max_errors as usize);
        }
        prototype
    }
}

/// Settings of a batching task.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct BatchSettings {
    /// The task name.
    #[validate(length(min = 1))]
    pub name: String,

    /// Batch size threshold.
    #[validate(range(min = 1))]
    pub size: u64,

    /// Flush interval, in milliseconds.
    #[validate(range(min = 1))]
    pub interval_ms: u64,
}

impl BatchSettings {
    /// Parses and validates batch settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        parse_validated(yaml)
    }

    /// Builds the batching task described by these settings.
    pub fn to_task<Msg>(&self) -> Arc<dyn Task<Msg>>
    where
        Msg: 'static + Clone + Send + Sync,
    {
        Batch::new(&self.name, self.size as usize, Duration::from_millis(self.interval_ms))
    }
}

fn parse_validated<T>(yaml: &str) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned + Validate,
{
    let settings: T = serde_yaml::from_str(yaml).map_err(|error| Error::InvalidConfig {
        message: error.to_string(),
        line: error.location().map(|location| location.line()),
        column: error.location().map(|location| location.column()),
    })?;

    settings.validate().map_err(|error| Error::InvalidConfig {
        message: error.to_string(),
        line: None,
        column: None,
    })?;

    tracing::debug!("configuration parsed and validated");
    Ok(settings)
}
