//! Consumption pipeline — reader output through approval and masking.
//!
//! Flow per poll:
//! 1. `PartitionedReader::poll_and_decode()` — bounded fetch + decode
//! 2. `ApprovalFn::approves()` — on the unmasked message
//! 3. `MaskFn::apply()` — only for approved messages
//!
//! Rejected messages are dropped silently; absence from the output is the
//! signal. Nothing is buffered between polls.

use std::time::Duration;

use tracing::{debug, info};

use crate::broker::{BrokerClient, PartitionedReader};
use crate::config::ConsumerConfig;
use crate::error::{Error, StateError};
use crate::masking::Schema;
use crate::pipeline::policy::{PackageStats, PolicySet};
use crate::pipeline::types::PartitionBatch;

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// No topic bound yet.
    Unconfigured,
    /// Bound to a topic, not polled yet.
    Subscribed,
    /// At least one poll has run on the current subscription.
    Polling,
    /// Reader released; terminal.
    Closed,
}

impl PipelineState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, target),
            (Unconfigured, Subscribed)
                | (Subscribed, Subscribed)
                | (Subscribed, Polling)
                | (Polling, Polling)
                | (Polling, Subscribed)
                | (_, Closed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unconfigured => "unconfigured",
            Self::Subscribed => "subscribed",
            Self::Polling => "polling",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Owns one reader and the policies applied to what it reads.
pub struct ConsumptionPipeline {
    reader: PartitionedReader,
    policies: PolicySet,
    state: PipelineState,
}

impl ConsumptionPipeline {
    pub fn new(reader: PartitionedReader, policies: PolicySet) -> Self {
        Self {
            reader,
            policies,
            state: PipelineState::Unconfigured,
        }
    }

    /// Build a pipeline from configuration, failing before any I/O if the
    /// masking or approval settings are invalid.
    pub fn from_config(
        client: Box<dyn BrokerClient>,
        config: &ConsumerConfig,
        default_schema: Option<&Schema>,
    ) -> Result<Self, Error> {
        let mut policies = PolicySet::from_config(config)?;
        if let Some(schema) = default_schema {
            policies = policies.with_default_schema(schema);
        }
        let reader =
            PartitionedReader::new(client).with_excluded_topics(config.excluded_topics.clone());
        Ok(Self::new(reader, policies))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn reader(&self) -> &PartitionedReader {
        &self.reader
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Swap in new policies for the next run.
    pub fn configure(&mut self, policies: PolicySet) -> Result<(), Error> {
        self.ensure_not_closed("configure")?;
        self.policies = policies;
        debug!(emit_level = %self.policies.mask_builder().emit_level(), "Pipeline reconfigured");
        Ok(())
    }

    /// Compile new policies from configuration, then swap them in.
    ///
    /// A failed compile leaves the current policies untouched.
    pub fn reconfigure(&mut self, config: &ConsumerConfig) -> Result<(), Error> {
        let policies = PolicySet::from_config(config)?;
        self.configure(policies)
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        self.reader.subscribe(topic).await?;
        self.transition(PipelineState::Subscribed);
        Ok(())
    }

    pub async fn seek_to_beginning(&mut self) -> Result<(), Error> {
        self.reader.seek_to_beginning().await
    }

    /// One bounded poll: fetch, decode, approve, mask.
    pub async fn poll(
        &mut self,
        timeout: Duration,
        max_records: usize,
    ) -> Result<PartitionBatch, Error> {
        let mut batch = self.reader.poll_and_decode(timeout, max_records).await?;
        self.transition(PipelineState::Polling);

        let mut totals = PackageStats::default();
        for package in batch.values_mut().flat_map(|packages| packages.iter_mut()) {
            let stats = self.policies.apply_package(package);
            totals.emitted += stats.emitted;
            totals.rejected += stats.rejected;
        }

        if totals.emitted + totals.rejected > 0 {
            debug!(
                topic = self.reader.topic().unwrap_or_default(),
                emitted = totals.emitted,
                rejected = totals.rejected,
                "Poll cycle complete"
            );
        }
        Ok(batch)
    }

    /// Release the reader. Idempotent; later polls fail with a state error.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.transition(PipelineState::Closed);
        self.reader.close().await?;
        info!("Pipeline closed");
        Ok(())
    }

    fn transition(&mut self, target: PipelineState) {
        if self.state != target && self.state.can_transition_to(target) {
            debug!(from = %self.state, to = %target, "Pipeline state change");
            self.state = target;
        }
    }

    fn ensure_not_closed(&self, operation: &'static str) -> Result<(), StateError> {
        if self.state.is_terminal() {
            Err(StateError::Closed { operation })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::pipeline::types::count_messages;
    use serde_json::json;

    const SHORT: Duration = Duration::from_millis(50);

    async fn pipeline(overrides: serde_json::Value) -> (MemoryBroker, ConsumptionPipeline) {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 2).await;
        let mut config = ConsumerConfig::default();
        config.merge(&overrides).unwrap();
        let pipeline =
            ConsumptionPipeline::from_config(Box::new(broker.client()), &config, None).unwrap();
        (broker, pipeline)
    }

    #[test]
    fn state_transitions() {
        use PipelineState::*;
        assert!(Unconfigured.can_transition_to(Subscribed));
        assert!(!Unconfigured.can_transition_to(Polling));
        assert!(Subscribed.can_transition_to(Polling));
        assert!(Polling.can_transition_to(Subscribed));
        assert!(Polling.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Polling));
        assert!(Closed.is_terminal());
        assert_eq!(Polling.to_string(), "polling");
    }

    #[tokio::test]
    async fn lifecycle_follows_state_machine() {
        let (_broker, mut p) = pipeline(json!({})).await;
        assert_eq!(p.state(), PipelineState::Unconfigured);
        assert!(matches!(
            p.poll(SHORT, 1).await,
            Err(Error::State(StateError::NotSubscribed { .. }))
        ));

        p.subscribe("t").await.unwrap();
        assert_eq!(p.state(), PipelineState::Subscribed);
        p.seek_to_beginning().await.unwrap();

        p.poll(SHORT, 1).await.unwrap();
        assert_eq!(p.state(), PipelineState::Polling);

        p.close().await.unwrap();
        p.close().await.unwrap();
        assert_eq!(p.state(), PipelineState::Closed);
        assert!(matches!(
            p.poll(SHORT, 1).await,
            Err(Error::State(StateError::Closed { .. }))
        ));
        assert!(p.reconfigure(&ConsumerConfig::default()).is_err());
    }

    #[tokio::test]
    async fn filters_then_masks() {
        let (broker, mut p) = pipeline(json!({"masking_emit_level": 1})).await;
        let schema = json!({"fields": [
            {"name": "id"},
            {"name": "approved", "sensitivity_level": 4},
            {"name": "name", "sensitivity_level": 1},
            {"name": "dob", "sensitivity_level": 2}
        ]});
        broker
            .produce_json("t", 0, &json!({
                "schema": schema,
                "messages": [
                    {"id": "a", "approved": true, "name": "Ada", "dob": "1815"},
                    {"id": "b", "approved": false, "name": "Bob", "dob": "1900"}
                ]
            }))
            .await
            .unwrap();

        p.subscribe("t").await.unwrap();
        p.seek_to_beginning().await.unwrap();
        let batch = p.poll(SHORT, 10).await.unwrap();

        assert_eq!(count_messages(&batch), 1);
        let out = &batch[&0][0].messages[0];
        assert_eq!(out["id"], json!("a"));
        assert_eq!(out["name"], json!("Ada"));
        assert!(!out.contains_key("approved"));
        assert!(!out.contains_key("dob"));
    }

    #[tokio::test]
    async fn reconfigure_applies_to_next_poll_only_when_valid() {
        let (broker, mut p) = pipeline(json!({"approval_required": false})).await;
        p.subscribe("t").await.unwrap();

        let mut bad = ConsumerConfig::default();
        bad.approval_values = json!([]);
        assert!(p.reconfigure(&bad).is_err());

        broker.produce_json("t", 1, &json!({"id": 1})).await.unwrap();
        assert_eq!(count_messages(&p.poll(SHORT, 10).await.unwrap()), 1);

        p.reconfigure(&ConsumerConfig::default()).unwrap();
        broker.produce_json("t", 1, &json!({"id": 2})).await.unwrap();
        assert_eq!(count_messages(&p.poll(SHORT, 10).await.unwrap()), 0);
    }

    #[tokio::test]
    async fn default_schema_masks_plain_messages() {
        let broker = MemoryBroker::new();
        broker.create_topic("t", 1).await;
        let schema = Schema::from_value(&json!({"fields": [
            {"name": "id"}, {"name": "secret", "sensitivity_level": 3}
        ]}))
        .unwrap();
        let mut config = ConsumerConfig::default();
        config.approval_required = false;

        let mut p =
            ConsumptionPipeline::from_config(Box::new(broker.client()), &config, Some(&schema))
                .unwrap();
        p.subscribe("t").await.unwrap();
        broker
            .produce_json("t", 0, &json!({"id": 1, "secret": "s"}))
            .await
            .unwrap();

        let batch = p.poll(SHORT, 10).await.unwrap();
        assert_eq!(batch[&0][0].messages[0].len(), 1);
    }

    #[tokio::test]
    async fn invalid_config_fails_construction() {
        let broker = MemoryBroker::new();
        let mut config = ConsumerConfig::default();
        config.masking_emit_level = json!(true);
        assert!(matches!(
            ConsumptionPipeline::from_config(Box::new(broker.client()), &config, None),
            Err(Error::Config(_))
        ));
    }
}
