//! Record payload decoding.
//!
//! Payloads are UTF-8 JSON in one of three shapes:
//! - `{"schema": {...}, "messages": [...]}`: an envelope (schema optional)
//! - `[{...}, ...]`: a plain batch
//! - `{...}`: a single plain message

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::broker::types::Record;
use crate::error::DecodeError;
use crate::masking::Schema;
use crate::pipeline::types::{Message, Package};

/// Decode one record into a package.
pub fn decode_record(record: Record) -> Result<Package, DecodeError> {
    let Record {
        topic,
        partition,
        offset,
        key,
        payload,
        timestamp,
    } = record;

    let value: Value =
        serde_json::from_slice(&payload).map_err(|source| DecodeError::InvalidJson {
            partition,
            offset,
            source,
        })?;

    let (schema, messages) = match value {
        Value::Object(mut obj) if obj.contains_key("messages") => {
            let schema = match obj.remove("schema") {
                None | Some(Value::Null) => None,
                Some(doc) => Some(Arc::new(Schema::from_value(&doc).map_err(|source| {
                    DecodeError::InvalidSchema {
                        partition,
                        offset,
                        source,
                    }
                })?)),
            };
            let Some(Value::Array(items)) = obj.remove("messages") else {
                return Err(DecodeError::UnsupportedShape {
                    partition,
                    offset,
                    shape: "envelope with non-array messages",
                });
            };
            (schema, collect_objects(items, partition, offset))
        }
        Value::Object(obj) => (None, vec![obj]),
        Value::Array(items) => (None, collect_objects(items, partition, offset)),
        _ => {
            return Err(DecodeError::UnsupportedShape {
                partition,
                offset,
                shape: "scalar",
            });
        }
    };

    Ok(Package {
        topic,
        partition,
        offset,
        key,
        timestamp,
        schema,
        messages,
    })
}

fn collect_objects(items: Vec<Value>, partition: i32, offset: i64) -> Vec<Message> {
    let total = items.len();
    let messages: Vec<Message> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(obj) => Some(obj),
            _ => None,
        })
        .collect();

    if messages.len() != total {
        warn!(
            partition,
            offset,
            skipped = total - messages.len(),
            "Skipped non-object messages in record"
        );
    }
    messages
}
