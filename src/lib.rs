//! Stream consumer — partitioned topic reader with approval filtering and
//! schema-driven sensitivity masking.

pub mod approval;
pub mod broker;
pub mod config;
pub mod error;
pub mod masking;
pub mod pipeline;

pub use config::ConsumerConfig;
pub use error::{Error, Result};
pub use pipeline::{ConsumptionPipeline, Message, PartitionBatch};
