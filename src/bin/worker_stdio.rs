//! Patient Worker Binary
//!
//! Runs the background worker over stdin/stdout. Each input line is one JSON
//! inbound envelope; each output line is one JSON result message. Results are
//! written in the order the worker produces them.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use patient_worker::config::WorkerConfig;
use patient_worker::execution::BackgroundWorker;
use patient_worker::logging::{init_structured_logging, log_error};
use patient_worker::messaging::InboundEnvelope;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    init_structured_logging(config.log_level.as_deref());

    info!(
        cache_ttl_ms = config.cache_ttl_ms,
        inbound_capacity = config.inbound_capacity,
        "Starting patient worker on stdio"
    );

    let (mut handle, _dataset) = BackgroundWorker::spawn_default(&config);
    let sender = handle.sender()?;
    handle.close_inbound();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut line_number = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }

            match InboundEnvelope::from_json(&line) {
                Ok(envelope) => {
                    if sender.send(envelope).await.is_err() {
                        warn!("Worker stopped accepting input");
                        break;
                    }
                }
                Err(e) => log_error(
                    "stdin",
                    "parse_envelope",
                    &e.to_string(),
                    Some(&format!("line {line_number}")),
                ),
            }
        }

        anyhow::Ok(line_number)
    });

    let mut stdout = tokio::io::stdout();
    while let Some(result) = handle.recv().await {
        let mut line = serde_json::to_vec(&result)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }

    let lines_read = reader.await.context("stdin reader task panicked")??;
    info!(lines_read = lines_read, "Input exhausted and queue drained");

    let summary = handle.shutdown().await?;
    info!(
        processed = summary.stats.processed,
        failed = summary.stats.failed,
        discarded = summary.stats.discarded,
        rejected = summary.stats.rejected,
        "Patient worker stopped"
    );

    Ok(())
}
