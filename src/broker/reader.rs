//! Partitioned reader — subscription lifecycle plus batched poll-and-decode.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::decode::decode_record;
use crate::broker::types::BrokerClient;
use crate::config::DEFAULT_EXCLUDED_TOPICS;
use crate::error::{Error, StateError};
use crate::pipeline::types::PartitionBatch;

/// Extra time granted to a client beyond the poll timeout before the
/// reader gives up on it and reports an empty batch.
const POLL_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Idle,
    Subscribed,
    Closed,
}

/// Owns one broker session and decodes what it reads.
///
/// Not safe for concurrent use: every lifecycle call takes `&mut self`.
pub struct PartitionedReader {
    client: Box<dyn BrokerClient>,
    state: ReaderState,
    topic: Option<String>,
    partitions: Vec<i32>,
    excluded_topics: Vec<String>,
}

impl PartitionedReader {
    pub fn new(client: Box<dyn BrokerClient>) -> Self {
        Self {
            client,
            state: ReaderState::Idle,
            topic: None,
            partitions: Vec::new(),
            excluded_topics: DEFAULT_EXCLUDED_TOPICS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replace the list of topics hidden from [`list_topics`](Self::list_topics).
    pub fn with_excluded_topics(mut self, topics: Vec<String>) -> Self {
        self.excluded_topics = topics;
        self
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn partitions(&self) -> &[i32] {
        &self.partitions
    }

    pub fn is_closed(&self) -> bool {
        self.state == ReaderState::Closed
    }

    /// Topics available for subscription, minus excluded internal topics.
    pub async fn list_topics(&self) -> Result<Vec<String>, Error> {
        self.ensure_open("list topics")?;
        let topics = self.client.list_topics().await?;
        Ok(topics
            .into_iter()
            .filter(|t| !self.excluded_topics.contains(t))
            .collect())
    }

    /// Bind to `topic`, replacing any previous subscription.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.ensure_open("subscribe")?;
        let partitions = self.client.subscribe(topic).await?;

        if let Some(previous) = self.topic.as_deref().filter(|t| *t != topic) {
            info!(from = %previous, to = %topic, "Replacing subscription");
        }
        self.topic = Some(topic.to_string());
        self.partitions = partitions;
        self.state = ReaderState::Subscribed;
        Ok(())
    }

    /// Rewind every assigned partition to its earliest offset.
    pub async fn seek_to_beginning(&mut self) -> Result<(), Error> {
        self.ensure_subscribed("seek to beginning")?;
        self.client.seek_to_beginning(&self.partitions).await?;
        debug!(
            topic = self.topic.as_deref().unwrap_or_default(),
            partitions = ?self.partitions,
            "Reset cursors to earliest offset"
        );
        Ok(())
    }

    /// Perform one bounded poll and decode the records, grouped by partition.
    ///
    /// An empty map means nothing arrived within `timeout`. Records that
    /// fail to decode are logged and skipped.
    pub async fn poll_and_decode(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<PartitionBatch, Error> {
        self.ensure_subscribed("poll")?;

        let mut batch = PartitionBatch::new();
        if max_records == 0 {
            return Ok(batch);
        }

        let records = match tokio::time::timeout(
            timeout.saturating_add(POLL_GRACE),
            self.client.poll(timeout, max_records),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(?timeout, "Broker client overran poll timeout");
                return Ok(batch);
            }
        };

        let fetched = records.len();
        let mut skipped = 0usize;
        for record in records {
            match decode_record(record) {
                Ok(package) => batch.entry(package.partition).or_default().push(package),
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "Skipping undecodable record");
                }
            }
        }

        if fetched > 0 {
            debug!(
                fetched,
                skipped,
                partitions = batch.len(),
                "Decoded poll batch"
            );
        }
        Ok(batch)
    }

    /// Release the broker session. Calling it again is a no-op.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.state == ReaderState::Closed {
            return Ok(());
        }
        self.state = ReaderState::Closed;
        self.partitions.clear();
        self.client.close().await?;
        info!(topic = self.topic.as_deref().unwrap_or_default(), "Reader closed");
        Ok(())
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), StateError> {
        match self.state {
            ReaderState::Closed => Err(StateError::Closed { operation }),
            _ => Ok(()),
        }
    }

    fn ensure_subscribed(&self, operation: &'static str) -> Result<(), StateError> {
        match self.state {
            ReaderState::Subscribed => Ok(()),
            ReaderState::Idle => Err(StateError::NotSubscribed { operation }),
            ReaderState::Closed => Err(StateError::Closed { operation }),
        }
    }
}
