//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::ApprovalConfig;
use crate::approval::filter::DEFAULT_FIELD_PATH;
use crate::error::ConfigError;
use crate::masking::Taxonomy;

/// Topics never offered by `list_topics`.
pub const DEFAULT_EXCLUDED_TOPICS: &[&str] = &["__confluent.support.metrics"];

/// Environment variable prefix for [`ConsumerConfig::from_env`].
const ENV_PREFIX: &str = "CONSUMER_";

/// Consumer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Maximum sensitivity emitted unmasked: an integer or a category label.
    pub masking_emit_level: Value,
    /// Ordered category labels; empty selects numeric masking.
    pub masking_taxonomy: Vec<String>,
    /// Whether messages must carry an accepted approval value.
    pub approval_required: bool,
    /// Locator of the approval value.
    pub approval_field_path: String,
    /// Accepted approval value(s): a scalar or a list.
    pub approval_values: Value,
    /// Per-poll wait bound.
    pub poll_timeout_ms: u64,
    /// Per-poll record cap.
    pub poll_max_records: usize,
    /// Topics hidden from topic listings.
    pub excluded_topics: Vec<String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        let approval = ApprovalConfig::default();
        Self {
            masking_emit_level: Value::from(0),
            masking_taxonomy: Vec::new(),
            approval_required: approval.required,
            approval_field_path: approval.field_path,
            approval_values: approval.accepted_values,
            poll_timeout_ms: 10_000,
            poll_max_records: 1_000,
            excluded_topics: DEFAULT_EXCLUDED_TOPICS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ConsumerConfig {
    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Read `CONSUMER_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(level) = var("MASKING_EMIT_LEVEL") {
            config.masking_emit_level = match level.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(_) => Value::String(level),
            };
        }
        if let Some(taxonomy) = var("MASKING_TAXONOMY") {
            config.masking_taxonomy = taxonomy
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(required) = var("APPROVAL_REQUIRED") {
            config.approval_required = parse_bool("APPROVAL_REQUIRED", &required)?;
        }
        if let Some(path) = var("APPROVAL_FIELD_PATH") {
            config.approval_field_path = path;
        }
        if let Some(values) = var("APPROVAL_VALUES") {
            // Bare words such as `yes` are taken as strings.
            config.approval_values =
                serde_json::from_str(&values).unwrap_or(Value::String(values));
        }
        if let Some(timeout) = var("POLL_TIMEOUT_MS") {
            config.poll_timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("POLL_TIMEOUT_MS", "expected milliseconds"))?;
        }
        if let Some(max) = var("POLL_MAX_RECORDS") {
            config.poll_max_records = max
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("POLL_MAX_RECORDS", "expected a count"))?;
        }

        Ok(config)
    }

    /// Overlay the keys of a JSON object onto this configuration.
    pub fn merge(&mut self, overrides: &Value) -> Result<(), ConfigError> {
        let Value::Object(overrides) = overrides else {
            return Err(ConfigError::ParseError(
                "configuration overrides must be a JSON object".into(),
            ));
        };

        let mut current =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        if let Value::Object(map) = &mut current {
            for (key, value) in overrides {
                map.insert(key.clone(), value.clone());
            }
        }
        *self = serde_json::from_value(current).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(())
    }

    pub fn taxonomy(&self) -> Taxonomy {
        Taxonomy::new(self.masking_taxonomy.iter().cloned())
    }

    pub fn approval(&self) -> ApprovalConfig {
        ApprovalConfig {
            required: self.approval_required,
            field_path: if self.approval_field_path.trim().is_empty() {
                DEFAULT_FIELD_PATH.to_string()
            } else {
                self.approval_field_path.clone()
            },
            accepted_values: self.approval_values.clone(),
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(
            key,
            format!("expected a boolean, got {other:?}"),
        )),
    }
}
