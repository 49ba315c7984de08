//! Event bus errors

use thiserror::Error;

/// Errors surfaced by the event bus
#[derive(Error, Debug)]
pub enum BusError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("partition {partition} out of range for topic {topic}")]
    PartitionOutOfRange { topic: String, partition: usize },
}
