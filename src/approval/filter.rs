//! Approval filtering: decides whether a decoded message is emitted at all.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::approval::path::FieldPath;
use crate::error::ConfigError;
use crate::pipeline::types::Message;

/// Default locator of the approval flag.
pub const DEFAULT_FIELD_PATH: &str = "$.approved";

/// Approval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// When false every message passes and the other settings are ignored.
    pub required: bool,
    /// Locator of the value to inspect.
    pub field_path: String,
    /// A single scalar or a list of scalars.
    pub accepted_values: Value,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            required: true,
            field_path: DEFAULT_FIELD_PATH.to_string(),
            accepted_values: Value::Array(vec![Value::Bool(true)]),
        }
    }
}

/// A compiled approval predicate. Cheap to clone and safe to share.
#[derive(Debug, Clone)]
pub enum ApprovalFn {
    /// Filtering disabled.
    PassAll,
    Match {
        path: Arc<FieldPath>,
        accepted: Arc<Vec<Value>>,
    },
}

impl ApprovalFn {
    /// Whether `message` may be emitted. Missing fields are never approved.
    ///
    /// Numbers compare by numeric value, so `1` accepts `1.0`.
    pub fn approves(&self, message: &Message) -> bool {
        match self {
            Self::PassAll => true,
            Self::Match { path, accepted } => path.select(message).into_iter().any(|value| {
                accepted
                    .iter()
                    .any(|candidate| scalar_eq(candidate, value))
            }),
        }
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Compiles [`ApprovalConfig`]s into [`ApprovalFn`]s.
pub struct ApprovalBuilder;

impl ApprovalBuilder {
    pub fn compile(config: &ApprovalConfig) -> Result<ApprovalFn, ConfigError> {
        if !config.required {
            debug!("Approval filtering disabled");
            return Ok(ApprovalFn::PassAll);
        }

        let path = FieldPath::parse(&config.field_path)?;
        let accepted = accepted_set(&config.accepted_values)?;

        debug!(
            path = %path,
            accepted = ?accepted,
            "Compiled approval filter"
        );

        Ok(ApprovalFn::Match {
            path: Arc::new(path),
            accepted: Arc::new(accepted),
        })
    }
}

/// Coerce a scalar or a list of scalars into a membership set.
fn accepted_set(values: &Value) -> Result<Vec<Value>, ConfigError> {
    let items = match values {
        Value::Array(items) => items.clone(),
        scalar => vec![scalar.clone()],
    };

    if items.is_empty() {
        return Err(ConfigError::invalid(
            "approval_values",
            "at least one accepted value is required",
        ));
    }

    let mut set: Vec<Value> = Vec::with_capacity(items.len());
    for item in items {
        if item.is_array() || item.is_object() {
            return Err(ConfigError::invalid(
                "approval_values",
                format!("accepted values must be scalars, got {item}"),
            ));
        }
        if !set.contains(&item) {
            set.push(item);
        }
    }
    Ok(set)
}
