//! Consumer groups with explicit offset control
//!
//! A consumer group is an independent cursor over a topic: groups never
//! affect each other's progress. Fetch never moves the cursor; the caller
//! decides when to commit. An uncommitted batch is fetched again, which is
//! what makes delivery at-least-once.

use crate::{error::BusError, log::Delivery, EventBus};
use std::sync::Arc;

/// Cursor over the bus for one named group
#[derive(Clone)]
pub struct ConsumerGroup {
    bus: Arc<EventBus>,
    group: String,
}

impl ConsumerGroup {
    pub fn new(bus: Arc<EventBus>, group: &str) -> Self {
        Self {
            bus,
            group: group.to_string(),
        }
    }

    /// Group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Fetch up to `max` uncommitted records from one partition
    ///
    /// Repeated fetches without an intervening commit return the same
    /// records.
    pub fn fetch(&self, topic: &str, partition: usize, max: usize) -> Result<Vec<Delivery>, BusError> {
        let from = self.bus.committed_next(&self.group, topic, partition)?;
        self.bus.read_from(topic, partition, from, max)
    }

    /// Mark everything up to and including `offset` as processed
    pub fn commit(&self, topic: &str, partition: usize, offset: u64) -> Result<(), BusError> {
        self.bus.set_committed(&self.group, topic, partition, offset)
    }

    /// Next offset this group will read (0 before the first commit)
    pub fn position(&self, topic: &str, partition: usize) -> Result<u64, BusError> {
        self.bus.committed_next(&self.group, topic, partition)
    }

    /// Wait until at least one uncommitted record exists in the partition
    pub async fn wait_for_records(&self, topic: &str, partition: usize) -> Result<(), BusError> {
        loop {
            let notify = self.bus.partition_notify(topic, partition)?;
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking, so a publish landing
            // in between is not missed.
            notified.as_mut().enable();

            let from = self.bus.committed_next(&self.group, topic, partition)?;
            if self.bus.has_records_from(topic, partition, from)? {
                return Ok(());
            }
            notified.await;
        }
    }
}
