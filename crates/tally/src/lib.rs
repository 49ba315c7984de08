//! Tally Aggregator - live vote counting
//!
//! Consumes vote events from the bus under its own consumer group,
//! maintains atomic per-option and per-poll counters, and emits a
//! [`vote_events::TallyUpdate`] after every increment for the broadcast
//! hub to fan out.

pub mod aggregator;
pub mod counters;

pub use aggregator::{TallyAggregator, TallyAggregatorConfig};
pub use counters::{option_key, total_key, CounterStore};

/// Consumer group name for the aggregator
pub const TALLY_GROUP: &str = "tally-service";
