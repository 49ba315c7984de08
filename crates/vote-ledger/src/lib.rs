//! Vote Ledger - durable, idempotent record of every vote
//!
//! An independent consumer of the votes topic. Records are keyed by vote
//! id, so redelivered events collide with the existing key and are
//! discarded instead of written twice. This is the one exactly-once point
//! in the system and what a recount would read to correct aggregator
//! overcounts.

pub mod consumer;
pub mod store;

pub use consumer::{LedgerWriter, LedgerWriterError};
pub use store::{LedgerError, LedgerStore, VoteRecord};

/// Consumer group name for the ledger
pub const LEDGER_GROUP: &str = "ledger-service";
