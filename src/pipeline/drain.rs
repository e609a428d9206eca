//! Poll loops that run until a set of expected message ids has been seen.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ConsumerConfig;
use crate::error::Error;
use crate::pipeline::consumer::ConsumptionPipeline;
use crate::pipeline::types::{Message, message_id};

/// Bounds for a drain loop.
#[derive(Debug, Clone, Copy)]
pub struct DrainLimits {
    pub timeout: Duration,
    pub max_records: usize,
    /// Maximum number of polls before giving up.
    pub max_attempts: usize,
}

/// Polls a drain makes before giving up, unless overridden.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

impl DrainLimits {
    /// Poll bounds from `poll_timeout_ms` / `poll_max_records`.
    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self {
            timeout: config.poll_timeout(),
            max_records: config.poll_max_records,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for DrainLimits {
    fn default() -> Self {
        Self::from_config(&ConsumerConfig::default())
    }
}

/// Result of a drain loop.
#[derive(Debug, Clone, Default)]
pub struct DrainOutcome {
    /// Every emitted message, in poll order.
    pub messages: Vec<Message>,
    /// Expected ids never observed.
    pub missing: BTreeSet<String>,
    /// Polls performed.
    pub attempts: usize,
}

impl DrainOutcome {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Poll until every id in `expected` has been emitted or the attempt
/// budget runs out. Messages with other ids are collected too.
pub async fn drain_ids<I, S>(
    pipeline: &mut ConsumptionPipeline,
    expected: I,
    limits: DrainLimits,
) -> Result<DrainOutcome, Error>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut outcome = DrainOutcome {
        missing: expected.into_iter().map(Into::into).collect(),
        ..Default::default()
    };

    while !outcome.missing.is_empty() && outcome.attempts < limits.max_attempts {
        outcome.attempts += 1;
        let batch = pipeline.poll(limits.timeout, limits.max_records).await?;

        for package in batch.into_values().flatten() {
            for message in package.messages {
                if let Some(id) = message_id(&message) {
                    outcome.missing.remove(&id);
                }
                outcome.messages.push(message);
            }
        }

        debug!(
            attempt = outcome.attempts,
            collected = outcome.messages.len(),
            missing = outcome.missing.len(),
            "Drain poll complete"
        );
    }

    if outcome.is_complete() {
        info!(
            attempts = outcome.attempts,
            collected = outcome.messages.len(),
            "Drain complete"
        );
    } else {
        warn!(
            attempts = outcome.attempts,
            missing = outcome.missing.len(),
            "Drain gave up before all ids were seen"
        );
    }
    Ok(outcome)
}

/// Poll until `max_attempts` polls in a row return nothing, collecting
/// every emitted message. For topics whose contents are not known upfront.
pub async fn drain_until_idle(
    pipeline: &mut ConsumptionPipeline,
    limits: DrainLimits,
) -> Result<DrainOutcome, Error> {
    let mut outcome = DrainOutcome::default();
    let mut idle = 0;

    while idle < limits.max_attempts {
        outcome.attempts += 1;
        let batch = pipeline.poll(limits.timeout, limits.max_records).await?;
        if batch.is_empty() {
            idle += 1;
            continue;
        }
        idle = 0;
        outcome
            .messages
            .extend(batch.into_values().flatten().flat_map(|p| p.messages));
    }

    Ok(outcome)
}
