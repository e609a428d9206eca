//! Error types for the stream consumer.

/// Top-level error type for the consumer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Malformed or unresolvable sensitivity annotations.
///
/// Raised while a schema is parsed or a mask is compiled, never per message.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Field {field}: sensitivity_level must be a non-negative integer, got {found}")]
    InvalidLevel { field: String, found: String },

    #[error("Field {field}: sensitivity_category must be a string, got {found}")]
    InvalidCategory { field: String, found: String },

    #[error("Field at {path} is missing a name")]
    MissingName { path: String },

    #[error("Duplicate field {field} at {path}")]
    DuplicateField { path: String, field: String },

    #[error("Invalid schema document: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid field path {path:?}: {message}")]
    InvalidFieldPath { path: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Lifecycle violations on a reader or pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Cannot {operation}: not subscribed to a topic")]
    NotSubscribed { operation: &'static str },

    #[error("Cannot {operation}: reader is closed")]
    Closed { operation: &'static str },
}

/// Failures reported by the broker client.
///
/// A poll timeout is not an error; it yields an empty batch.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {reason}")]
    Connection { reason: String },

    #[error("Unknown topic: {topic}")]
    UnknownTopic { topic: String },
}

/// A single record that could not be decoded.
///
/// The reader logs and skips these; they never fail a batch.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Record {partition}:{offset} is not valid JSON: {source}")]
    InvalidJson {
        partition: i32,
        offset: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record {partition}:{offset} has unsupported payload shape: {shape}")]
    UnsupportedShape {
        partition: i32,
        offset: i64,
        shape: &'static str,
    },

    #[error("Record {partition}:{offset} carries an invalid schema: {source}")]
    InvalidSchema {
        partition: i32,
        offset: i64,
        #[source]
        source: SchemaError,
    },
}

/// Result type alias for the consumer.
pub type Result<T> = std::result::Result<T, Error>;
