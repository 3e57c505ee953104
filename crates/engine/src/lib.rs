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

//! Pipeline construction and execution.
//!
//! A [`Prototype`] assembles a DAG of named tasks: [`Prototype::then`] chains
//! a task after the most recently appended one, [`Prototype::after`] attaches
//! a task to any previously named node (or to the entry fan-out through the
//! [`INPUT`] sentinel). [`Prototype::start`] binds every task and hands the
//! finished DAG to a [`Runner`], which pulls messages from the source, runs
//! each through the DAG concurrently, and acks or nacks the source per
//! message.

pub use crate::prototype::Prototype;
pub use crate::runner::Runner;

mod prototype;
mod runner;
mod workers;

/// Sentinel task name accepted by [`Prototype::after`] meaning "attach as an
/// additional root of the DAG".
pub const INPUT: &str = "input";

/// All the errors that can terminate a pipeline.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The prototype is not fully configured.
    #[error("pipeline is not fully configured (pipeline: {pipeline}, reason: {reason})")]
    Build {
        /// The pipeline name.
        pipeline: String,
        /// The reason the pipeline could not be built.
        reason: String,
    },

    /// A task failed to bind to the pipeline at start.
    #[error("task failed to bind (pipeline: {pipeline}, task: {task}, reason: {reason})")]
    Bind {
        /// The pipeline name.
        pipeline: String,
        /// The task name.
        task: String,
        /// The reason the bind failed.
        reason: String,
    },

    /// The source or sink boundary failed; the pipeline terminates with the
    /// underlying cause (read, ack, or nack failure).
    #[error("source boundary failure (pipeline: {pipeline}, reason: {error})")]
    Source {
        /// The pipeline name.
        pipeline: String,
        /// The boundary failure.
        #[source]
        error: source::Error,
    },

    /// More task failures were observed than the configured budget allows.
    #[error("max errors allowed exceeded (pipeline: {pipeline}, count: {count}, max: {max})")]
    MaxErrorsExceeded {
        /// The pipeline name.
        pipeline: String,
        /// The number of failures observed.
        count: usize,
        /// The configured budget.
        max: usize,
    },
}
