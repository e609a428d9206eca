//! Broker records and the client trait.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BrokerError;

/// One raw record as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ── Client trait ────────────────────────────────────────────────────

/// Trait for broker client sessions — pure I/O, no decoding or policy.
///
/// One value is one broker session. Methods take `&mut self`, so a session
/// can never be polled, sought or closed concurrently.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Names of all topics visible to this session.
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError>;

    /// Bind the session to `topic`, replacing any previous binding.
    ///
    /// Returns the partitions assigned to this session.
    async fn subscribe(&mut self, topic: &str) -> Result<Vec<i32>, BrokerError>;

    /// Move the read cursors of `partitions` to the earliest offset.
    async fn seek_to_beginning(&mut self, partitions: &[i32]) -> Result<(), BrokerError>;

    /// Fetch at most `max_records`, waiting no longer than `timeout`.
    ///
    /// Returns an empty vector when nothing arrived in time.
    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<Record>, BrokerError>;

    /// Release the session. Must be idempotent.
    async fn close(&mut self) -> Result<(), BrokerError>;
}
