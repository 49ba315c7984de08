//! Event Bus - durable, key-partitioned append log
//!
//! This crate is the transport between vote intake and the downstream
//! consumers:
//! - topics are split into a fixed number of partitions; a record's key
//!   picks its partition, so records sharing a key are totally ordered
//! - every record is appended to sled before publish returns
//! - consumer groups track their own committed offsets; anything past the
//!   committed offset is redelivered after a restart (at-least-once)

pub mod consumer;
pub mod error;
pub mod log;

pub use consumer::ConsumerGroup;
pub use error::BusError;
pub use log::{Delivery, EventBus};

/// Default number of partitions per topic
pub const DEFAULT_PARTITIONS: usize = 4;

/// Default maximum records returned by a single fetch
pub const DEFAULT_FETCH_MAX: usize = 64;

/// Event bus configuration
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Partitions per topic
    pub partitions: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
        }
    }
}
