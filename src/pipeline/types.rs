//! Shared types for the consumption pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::masking::Schema;

/// A decoded domain message: a JSON object keyed by field name.
pub type Message = serde_json::Map<String, Value>;

/// Partition id → packages in offset order.
pub type PartitionBatch = BTreeMap<i32, Vec<Package>>;

// ── Package ─────────────────────────────────────────────────────────

/// Decode unit for one broker record.
///
/// The broker metadata is opaque to masking and filtering; only `messages`
/// is rewritten by the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Record key, if the producer set one.
    pub key: Option<Vec<u8>>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Schema embedded in the record envelope, if any.
    #[serde(skip)]
    pub schema: Option<Arc<Schema>>,
    pub messages: Vec<Message>,
}

impl Package {
    /// Ids of all messages in this package, stringified.
    pub fn message_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.messages.iter().filter_map(message_id)
    }
}

/// The correlation id of a message, if present.
///
/// String ids are returned as-is; numeric ids are stringified.
pub fn message_id(message: &Message) -> Option<String> {
    match message.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Total number of messages across a batch.
pub fn count_messages(batch: &PartitionBatch) -> usize {
    batch
        .values()
        .flat_map(|packages| packages.iter())
        .map(|p| p.messages.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn package(partition: i32, messages: Vec<Value>) -> Package {
        Package {
            topic: "t".into(),
            partition,
            offset: 0,
            key: None,
            timestamp: None,
            schema: None,
            messages: messages
                .into_iter()
                .map(|m| m.as_object().cloned().unwrap())
                .collect(),
        }
    }

    #[test]
    fn ids_are_stringified() {
        let p = package(0, vec![json!({"id": "a"}), json!({"id": 7}), json!({"id": null}), json!({})]);
        assert_eq!(p.message_ids().collect::<Vec<_>>(), vec!["a", "7"]);
    }

    #[test]
    fn counts_across_partitions() {
        let mut batch = PartitionBatch::new();
        batch.insert(0, vec![package(0, vec![json!({"id": 1}), json!({"id": 2})])]);
        batch.insert(3, vec![package(3, vec![]), package(3, vec![json!({"id": 3})])]);
        assert_eq!(count_messages(&batch), 3);
    }

    #[test]
    fn package_serializes_without_schema() {
        let json = serde_json::to_value(package(1, vec![json!({"id": 1})])).unwrap();
        assert_eq!(json["partition"], 1);
        assert!(json.get("schema").is_none());
        assert_eq!(json["messages"][0]["id"], 1);
    }
}
