//! Message consumption pipeline.
//!
//! Every record read from the broker flows through:
//! 1. `PartitionedReader::poll_and_decode()` — bounded fetch, grouped by partition
//! 2. `ApprovalFn::approves()` — evaluated on the unmasked message
//! 3. `MaskFn::apply()` — sensitivity masking of approved messages only
//!
//! **No unapproved message is ever emitted**, masked or not.

pub mod consumer;
pub mod drain;
pub mod policy;
pub mod types;
pub mod worker;

pub use consumer::{ConsumptionPipeline, PipelineState};
pub use drain::{DrainLimits, DrainOutcome, drain_ids, drain_until_idle};
pub use policy::{PackageStats, PolicySet};
pub use types::{Message, Package, PartitionBatch};
pub use worker::{WorkerSettings, spawn_pipeline};
