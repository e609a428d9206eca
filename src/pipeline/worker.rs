//! Background consumption task.
//!
//! Drives a [`ConsumptionPipeline`] in its own tokio task and forwards every
//! emitted message to a channel. This is the in-process entry point for the
//! job layer that owns consumer lifecycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::error::Error;
use crate::pipeline::consumer::ConsumptionPipeline;
use crate::pipeline::types::Message;

/// Poll bounds and back-off for a worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_timeout: Duration,
    pub max_records: usize,
    /// Sleep after a broker failure before polling again.
    pub retry_backoff: Duration,
}

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

impl WorkerSettings {
    /// Poll bounds from `poll_timeout_ms` / `poll_max_records`.
    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout(),
            max_records: config.poll_max_records,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&ConsumerConfig::default())
    }
}

/// Spawn a task that polls `pipeline` until shut down.
///
/// The pipeline must already be subscribed. Returns a `JoinHandle` resolving
/// to the closed pipeline, and a shutdown flag. Set the flag to stop polling;
/// the task also stops when the receiving side of `sink` is dropped.
pub fn spawn_pipeline(
    mut pipeline: ConsumptionPipeline,
    settings: WorkerSettings,
    sink: mpsc::Sender<Message>,
) -> (JoinHandle<ConsumptionPipeline>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            topic = pipeline.reader().topic().unwrap_or_default(),
            "Consumer worker started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            match pipeline
                .poll(settings.poll_timeout, settings.max_records)
                .await
            {
                Ok(batch) => {
                    let messages = batch.into_values().flatten().flat_map(|p| p.messages);
                    for message in messages {
                        if sink.send(message).await.is_err() {
                            debug!("Message sink closed, stopping worker");
                            shutdown.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                }
                Err(Error::Broker(e)) => {
                    warn!(error = %e, backoff = ?settings.retry_backoff, "Broker poll failed");
                    tokio::time::sleep(settings.retry_backoff).await;
                }
                Err(e) => {
                    error!(error = %e, "Consumer worker stopping");
                    break;
                }
            }
        }

        if let Err(e) = pipeline.close().await {
            warn!(error = %e, "Failed to close pipeline cleanly");
        }
        info!("Consumer worker shut down");
        pipeline
    });

    (handle, shutdown_flag)
}
