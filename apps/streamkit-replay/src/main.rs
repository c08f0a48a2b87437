use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use streamkit_engine::{ConnectionParams, StreamingEngine};
use streamkit_events::{BroadcastConnection, ChunkHub, SubscriptionFilter};
use streamkit_protocol::ThreadId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "streamkit-replay")]
#[command(about = "Replay captured realtime chunks and print the resulting state")]
struct Cli {
    /// JSONL capture: one chunk object or one array of chunks per line.
    #[arg(long)]
    input: PathBuf,
    /// Focus on one thread: it becomes current, other threads are filtered
    /// out, and only its state is printed.
    #[arg(long)]
    thread: Option<String>,
    #[arg(long, default_value = "replay")]
    channel: String,
    /// Fallback filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    json_logs: bool,
    #[arg(long)]
    pretty: bool,
    /// Enable per-event sequencing diagnostics.
    #[arg(long)]
    debug: bool,
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.compact().init();
    }
}

/// Split a capture into delivery batches, one per non-empty line.
fn parse_capture(raw: &str) -> Result<Vec<Vec<Value>>> {
    let mut batches = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("line {} is not valid JSON", index + 1))?;
        match value {
            Value::Array(chunks) => batches.push(chunks),
            Value::Object(_) => batches.push(vec![value]),
            other => bail!("line {} holds neither a chunk nor a batch: {other}", index + 1),
        }
    }
    Ok(batches)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let raw = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("failed reading capture {:?}", cli.input))?;
    let batches = parse_capture(&raw)?;
    let total: usize = batches.iter().map(Vec::len).sum();
    info!(batches = batches.len(), chunks = total, "capture loaded");

    let mut builder = StreamingEngine::builder()
        .debug(cli.debug)
        .state_channel_label("replay");
    if let Some(thread) = &cli.thread {
        builder = builder.current_thread(thread.as_str());
    }
    let engine = Arc::new(builder.build());

    let hub = ChunkHub::new(batches.len() + 1);
    let connection = BroadcastConnection::new(hub.clone());
    let filter = SubscriptionFilter {
        thread_id: cli.thread.as_deref().map(ThreadId::from),
        user_id: None,
    };
    let mut states = engine.watch_state();
    engine.subscribe_with_connection(
        &connection,
        ConnectionParams::new(&cli.channel)
            .debug(cli.debug)
            .filter(filter),
    )?;

    for batch in batches {
        hub.publish(&cli.channel, batch);
    }
    tokio::time::timeout(
        Duration::from_secs(cli.timeout_secs),
        states.wait_for(|state| state.last_processed_index >= total),
    )
    .await
    .context("replay did not drain before the timeout")??;
    engine.teardown();

    let state = engine.state();
    info!(
        threads = state.threads.len(),
        processed = state.last_processed_index,
        "replay complete"
    );

    let output = match &cli.thread {
        Some(thread) => {
            let Some(thread_state) = state.thread(&ThreadId::from(thread.as_str())) else {
                warn!(thread = %thread, "thread not present in capture");
                bail!("thread {thread} not found in capture");
            };
            serde_json::to_value(thread_state)?
        }
        None => serde_json::to_value(&*state)?,
    };
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");
    Ok(())
}
