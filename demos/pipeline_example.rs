//! End-to-end pipeline demo: reads a burst of messages from an in-memory
//! source, drops one of them, coalesces the rest into a single batch, and
//! publishes the batch to an in-memory sink.
//!
//! Run with: `cargo run --example pipeline_example`

use aqueduct::config::{BatchSettings, PipelineSettings};
use aqueduct::source::mem::InmemSource;
use aqueduct::task::{filter, from_fn, output, Payload};
use color_eyre::eyre::Result;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

const PIPELINE_CONFIG: &str = "name: demo\n";
const BATCH_CONFIG: &str = "name: coalesce\nsize: 9\ninterval_ms: 5000\n";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let messages: Vec<String> = (0..10).map(|index| format!("message-{index}")).collect();
    let source = InmemSource::with_messages(messages);
    let sink = InmemSource::<String>::with_messages(vec![]);

    let pipeline_settings = PipelineSettings::from_yaml(PIPELINE_CONFIG)?;
    let batch_settings = BatchSettings::from_yaml(BATCH_CONFIG)?;

    let runner = pipeline_settings
        .prototype::<String>()
        .from(source.clone(), |message: &String| message.clone())
        .then(filter("drop-message-0", |_ctx, payload: &Payload<String>| {
            matches!(payload, Payload::One(data) if data == "message-0")
        }))
        .then(from_fn("uppercase", |_ctx, payload: Payload<String>| match payload {
            Payload::One(data) => Ok(Payload::One(data.to_uppercase())),
            batch => Ok(batch),
        }))
        .then(batch_settings.to_task())
        .then(output("store", sink.clone()))
        .start()
        .await?;

    runner.done().await?;

    tracing::info!(
        acked = source.acks().len(),
        published = sink.published().len(),
        "pipeline finished"
    );
    for message in sink.published() {
        println!("{message}");
    }

    Ok(())
}
