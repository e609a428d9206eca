//! In-memory partitioned broker.
//!
//! Topics are fixed-size vectors of append-only partitions. Every
//! [`MemoryClient`] keeps its own cursors, so several readers can replay the
//! same topic independently. Used for tests and in-process replays.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::types::{BrokerClient, Record};
use crate::error::BrokerError;

/// Deadline used when `now + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Default)]
struct Shared {
    topics: RwLock<HashMap<String, Vec<Vec<Record>>>>,
    appended: Notify,
    unavailable: AtomicBool,
}

/// Handle to an in-memory broker. Clones share the same topics.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `topic` with `partitions` empty partitions. Existing topics are kept.
    pub async fn create_topic(&self, topic: &str, partitions: usize) {
        let mut topics = self.shared.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1)]);
    }

    /// Append a record; returns its offset.
    pub async fn produce(
        &self,
        topic: &str,
        partition: i32,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
    ) -> Result<i64, BrokerError> {
        self.check_available()?;

        let offset = {
            let mut topics = self.shared.topics.write().await;
            let log = topics
                .get_mut(topic)
                .ok_or_else(|| BrokerError::UnknownTopic {
                    topic: topic.to_string(),
                })?
                .get_mut(partition_index(partition)?)
                .ok_or_else(|| BrokerError::Connection {
                    reason: format!("topic {topic} has no partition {partition}"),
                })?;

            let offset = log.len() as i64;
            log.push(Record {
                topic: topic.to_string(),
                partition,
                offset,
                key,
                payload,
                timestamp: Some(Utc::now()),
            });
            offset
        };

        self.shared.appended.notify_waiters();
        Ok(offset)
    }

    /// Append a JSON document as the record payload.
    pub async fn produce_json(
        &self,
        topic: &str,
        partition: i32,
        payload: &Value,
    ) -> Result<i64, BrokerError> {
        self.produce(topic, partition, None, payload.to_string().into_bytes())
            .await
    }

    /// Number of records currently stored in `topic`.
    pub async fn topic_len(&self, topic: &str) -> usize {
        let topics = self.shared.topics.read().await;
        topics
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Simulate a lost connection: every call fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.shared.unavailable.store(!available, Ordering::Relaxed);
        if available {
            self.shared.appended.notify_waiters();
        }
    }

    /// Open a new client session.
    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            shared: Arc::clone(&self.shared),
            session: Uuid::new_v4(),
            topic: None,
            cursors: BTreeMap::new(),
            next_partition: 0,
            closed: false,
        }
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        check_available(&self.shared)
    }
}

fn check_available(shared: &Shared) -> Result<(), BrokerError> {
    if shared.unavailable.load(Ordering::Relaxed) {
        Err(BrokerError::Connection {
            reason: "broker unavailable".into(),
        })
    } else {
        Ok(())
    }
}

fn partition_index(partition: i32) -> Result<usize, BrokerError> {
    usize::try_from(partition).map_err(|_| BrokerError::Connection {
        reason: format!("invalid partition {partition}"),
    })
}

/// One session against a [`MemoryBroker`].
///
/// New subscriptions start at the end of each partition; call
/// `seek_to_beginning` to replay.
pub struct MemoryClient {
    shared: Arc<Shared>,
    session: Uuid,
    topic: Option<String>,
    cursors: BTreeMap<i32, i64>,
    /// Round-robin start point so one busy partition cannot starve the rest.
    next_partition: usize,
    closed: bool,
}

impl MemoryClient {
    pub fn session_id(&self) -> Uuid {
        self.session
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::Connection {
                reason: format!("session {} is closed", self.session),
            });
        }
        check_available(&self.shared)
    }

    /// Take up to `max_records` available records, interleaving partitions.
    async fn take_available(&mut self, max_records: usize) -> Vec<Record> {
        let Some(topic) = self.topic.as_deref() else {
            return Vec::new();
        };
        let topics = self.shared.topics.read().await;
        let Some(partitions) = topics.get(topic) else {
            return Vec::new();
        };

        let ids: Vec<i32> = self.cursors.keys().copied().collect();
        if ids.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        let start = self.next_partition % ids.len();
        let mut progressed = true;
        while out.len() < max_records && progressed {
            progressed = false;
            for i in 0..ids.len() {
                if out.len() >= max_records {
                    break;
                }
                let id = ids[(start + i) % ids.len()];
                let Some(log) = usize::try_from(id).ok().and_then(|idx| partitions.get(idx))
                else {
                    continue;
                };
                let Some(cursor) = self.cursors.get_mut(&id) else {
                    continue;
                };
                if let Some(record) = usize::try_from(*cursor).ok().and_then(|c| log.get(c)) {
                    out.push(record.clone());
                    *cursor += 1;
                    progressed = true;
                }
            }
        }
        self.next_partition = (start + 1) % ids.len();
        out
    }
}

#[async_trait]
impl BrokerClient for MemoryClient {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        self.ensure_open()?;
        let topics = self.shared.topics.read().await;
        let mut names: Vec<String> = topics.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<Vec<i32>, BrokerError> {
        self.ensure_open()?;
        let topics = self.shared.topics.read().await;
        let partitions = topics.get(topic).ok_or_else(|| BrokerError::UnknownTopic {
            topic: topic.to_string(),
        })?;

        self.cursors = partitions
            .iter()
            .enumerate()
            .map(|(idx, log)| (idx as i32, log.len() as i64))
            .collect();
        self.topic = Some(topic.to_string());
        self.next_partition = 0;

        info!(
            session = %self.session,
            topic = %topic,
            partitions = self.cursors.len(),
            "Subscribed"
        );
        Ok(self.cursors.keys().copied().collect())
    }

    async fn seek_to_beginning(&mut self, partitions: &[i32]) -> Result<(), BrokerError> {
        self.ensure_open()?;
        for partition in partitions {
            if let Some(cursor) = self.cursors.get_mut(partition) {
                *cursor = 0;
            }
        }
        debug!(session = %self.session, ?partitions, "Seeked to beginning");
        Ok(())
    }

    async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<Vec<Record>, BrokerError> {
        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let shared = Arc::clone(&self.shared);

        loop {
            self.ensure_open()?;

            // Register for wakeups before looking, so an append in between is not lost.
            let appended = shared.appended.notified();
            tokio::pin!(appended);
            appended.as_mut().enable();

            let records = self.take_available(max_records).await;
            if !records.is_empty() || max_records == 0 {
                return Ok(records);
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if !self.closed {
            self.closed = true;
            self.cursors.clear();
            self.topic = None;
            debug!(session = %self.session, "Session closed");
        }
        Ok(())
    }
}
