//! Ledger consumer loop
//!
//! Same worker-per-partition shape as the tally aggregator, but under its
//! own consumer group: the ledger's progress and the aggregator's progress
//! never affect each other.

use crate::{store::VoteRecord, LedgerError, LedgerStore, LEDGER_GROUP};
use event_bus::{ConsumerGroup, EventBus};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use vote_events::{VoteEvent, VOTES_TOPIC};

#[derive(Error, Debug)]
pub enum LedgerWriterError {
    #[error(transparent)]
    Bus(#[from] event_bus::BusError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Writes every vote event into the durable ledger
pub struct LedgerWriter {
    consumer: ConsumerGroup,
    store: Arc<LedgerStore>,
    fetch_max: usize,
}

impl LedgerWriter {
    pub fn new(bus: Arc<EventBus>, store: Arc<LedgerStore>) -> Self {
        Self {
            consumer: ConsumerGroup::new(bus, LEDGER_GROUP),
            store,
            fetch_max: event_bus::DEFAULT_FETCH_MAX,
        }
    }

    /// The underlying ledger store
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Spawn one consumer worker per partition
    pub fn spawn_workers(self: Arc<Self>, partitions: usize) -> Vec<JoinHandle<()>> {
        (0..partitions)
            .map(|partition| {
                let writer = self.clone();
                tokio::spawn(async move {
                    writer.run_partition(partition).await;
                })
            })
            .collect()
    }

    async fn run_partition(&self, partition: usize) {
        tracing::info!("Ledger worker started for votes partition {}", partition);
        loop {
            if let Err(e) = self.poll_once(partition).await {
                tracing::error!("Ledger worker error on partition {}: {}", partition, e);
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        }
    }

    /// Wait for records, write one batch, commit
    ///
    /// A storage failure returns before the commit, so the batch is
    /// redelivered; keyed inserts make the retry idempotent.
    pub async fn poll_once(&self, partition: usize) -> Result<usize, LedgerWriterError> {
        self.consumer.wait_for_records(VOTES_TOPIC, partition).await?;
        let batch = self.consumer.fetch(VOTES_TOPIC, partition, self.fetch_max)?;

        let mut written = 0;
        let mut last_offset = None;
        for delivery in &batch {
            match VoteEvent::from_bytes(&delivery.payload) {
                Ok(event) => {
                    if self.store.insert(&VoteRecord::from(&event))? {
                        written += 1;
                    } else {
                        tracing::debug!("Duplicate vote {} discarded", event.vote_id);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        "Skipping undecodable record at votes[{}] offset {}: {}",
                        partition,
                        delivery.offset,
                        e
                    );
                }
            }
            last_offset = Some(delivery.offset);
        }

        if let Some(offset) = last_offset {
            self.consumer.commit(VOTES_TOPIC, partition, offset)?;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::BusConfig;
    use uuid::Uuid;

    fn writer(dir: &tempfile::TempDir) -> (Arc<EventBus>, LedgerWriter) {
        let bus = Arc::new(EventBus::open(dir.path().join("bus"), BusConfig::default()).unwrap());
        let store = Arc::new(LedgerStore::open(dir.path().join("ledger")).unwrap());
        (bus.clone(), LedgerWriter::new(bus, store))
    }

    #[tokio::test]
    async fn test_writes_one_record_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, writer) = writer(&dir);
        let poll = Uuid::new_v4();
        let key = poll.to_string();
        let partition = bus.partition_for_key(&key);

        for _ in 0..3 {
            let event = VoteEvent::new(poll, Uuid::new_v4(), Uuid::new_v4());
            bus.publish(VOTES_TOPIC, &key, event.to_bytes()).unwrap();
        }

        let written = writer.poll_once(partition).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(writer.store().len(), 3);
    }

    #[tokio::test]
    async fn test_redelivered_event_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, writer) = writer(&dir);
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let key = event.poll_id.to_string();
        let partition = bus.partition_for_key(&key);

        // The same event lands on the log twice, as it would after a
        // producer retry or a consumer rebalance.
        bus.publish(VOTES_TOPIC, &key, event.to_bytes()).unwrap();
        bus.publish(VOTES_TOPIC, &key, event.to_bytes()).unwrap();

        let written = writer.poll_once(partition).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(writer.store().len(), 1);
    }
}
