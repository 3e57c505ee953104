#![doc = include_str!("../README.md")]
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

//! Aqueduct is a library to build **acknowledged pipelines** combining a
//! message **source**, a DAG of **tasks**, and optional **sinks**. The
//! runner pulls messages concurrently from the source, executes the DAG for
//! each message, and translates the outcome into an ack or a nack plus a
//! multicast error channel.
//!
//! Tasks are composed programmatically with a prototype builder; stateful
//! tasks (such as the batcher) tie background workers to the lifetime of the
//! run through a bind hook and the run's cancellation signal.

pub use batch;
pub use config;
pub use context;
pub use engine;
pub use signal;
pub use source;
pub use task;
