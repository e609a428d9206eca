//! Broker access: client sessions, record decoding and the partitioned reader.

pub mod decode;
pub mod memory;
pub mod reader;
pub mod types;

pub use memory::{MemoryBroker, MemoryClient};
pub use reader::PartitionedReader;
pub use types::{BrokerClient, Record};
