//! Tally aggregator consumer loop
//!
//! One worker task per partition; within a partition records are handled
//! strictly in order, which preserves per-poll increment ordering. No
//! voteId deduplication happens here: a redelivered event increments
//! twice, and the durable ledger is the record set a recount would use to
//! correct that.

use crate::{
    counters::{option_key, total_key},
    CounterStore, TALLY_GROUP,
};
use event_bus::{BusError, ConsumerGroup, EventBus};
use std::sync::Arc;
use tokio::{sync::broadcast, task::JoinHandle};
use vote_events::{TallyUpdate, VoteEvent, VOTES_TOPIC};

/// Aggregator configuration
#[derive(Clone, Debug)]
pub struct TallyAggregatorConfig {
    /// Maximum records fetched per batch
    pub fetch_max: usize,
    /// Capacity of the tally-update broadcast channel
    pub update_channel_capacity: usize,
}

impl Default for TallyAggregatorConfig {
    fn default() -> Self {
        Self {
            fetch_max: event_bus::DEFAULT_FETCH_MAX,
            update_channel_capacity: 1024,
        }
    }
}

/// Live vote tally aggregator
pub struct TallyAggregator {
    consumer: ConsumerGroup,
    counters: CounterStore,
    update_sender: broadcast::Sender<TallyUpdate>,
    config: TallyAggregatorConfig,
}

impl TallyAggregator {
    /// Create an aggregator reading the votes topic under the tally group
    pub fn new(bus: Arc<EventBus>, counters: CounterStore, config: TallyAggregatorConfig) -> Self {
        let (update_sender, _) = broadcast::channel(config.update_channel_capacity);
        Self {
            consumer: ConsumerGroup::new(bus, TALLY_GROUP),
            counters,
            update_sender,
            config,
        }
    }

    /// Subscribe to tally updates emitted after each increment
    pub fn subscribe(&self) -> broadcast::Receiver<TallyUpdate> {
        self.update_sender.subscribe()
    }

    /// The counter store this aggregator writes to
    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    /// Count one vote event and emit the resulting update
    ///
    /// The emit is fire-and-forget: a missing or slow hub never blocks the
    /// increment path.
    pub fn record(&self, event: &VoteEvent) -> TallyUpdate {
        self.counters.increment(&total_key(&event.poll_id));
        let option_count = self
            .counters
            .increment(&option_key(&event.poll_id, &event.option_id));

        let update = TallyUpdate {
            poll_id: event.poll_id,
            option_id: event.option_id,
            option_count,
        };

        // Ignore send errors (no hub attached yet, or no subscribers).
        let _ = self.update_sender.send(update.clone());
        update
    }

    /// Spawn one consumer worker per partition
    pub fn spawn_workers(self: Arc<Self>, partitions: usize) -> Vec<JoinHandle<()>> {
        (0..partitions)
            .map(|partition| {
                let aggregator = self.clone();
                tokio::spawn(async move {
                    aggregator.run_partition(partition).await;
                })
            })
            .collect()
    }

    /// Consume one partition forever
    async fn run_partition(&self, partition: usize) {
        tracing::info!("Tally worker started for votes partition {}", partition);
        loop {
            if let Err(e) = self.poll_once(partition).await {
                tracing::error!("Tally worker error on partition {}: {}", partition, e);
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
        }
    }

    /// Wait for records, process one batch, commit
    ///
    /// Undecodable records are logged and skipped, then committed past, so
    /// a poison record cannot wedge the partition. A crash before the
    /// commit redelivers the whole batch (at-least-once), which can
    /// double-count.
    pub async fn poll_once(&self, partition: usize) -> Result<usize, BusError> {
        self.consumer.wait_for_records(VOTES_TOPIC, partition).await?;
        let batch = self.consumer.fetch(VOTES_TOPIC, partition, self.config.fetch_max)?;

        let mut processed = 0;
        let mut last_offset = None;
        for delivery in &batch {
            match VoteEvent::from_bytes(&delivery.payload) {
                Ok(event) => {
                    let update = self.record(&event);
                    tracing::debug!(
                        "Counted vote {} for poll {} option {} (count {})",
                        event.vote_id,
                        event.poll_id,
                        event.option_id,
                        update.option_count
                    );
                    processed += 1;
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
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::BusConfig;
    use uuid::Uuid;

    fn aggregator(dir: &tempfile::TempDir) -> (Arc<EventBus>, TallyAggregator) {
        let bus = Arc::new(EventBus::open(dir.path(), BusConfig::default()).unwrap());
        let agg = TallyAggregator::new(
            bus.clone(),
            CounterStore::new(),
            TallyAggregatorConfig::default(),
        );
        (bus, agg)
    }

    #[test]
    fn test_n_events_give_count_n() {
        let dir = tempfile::tempdir().unwrap();
        let (_bus, agg) = aggregator(&dir);
        let poll = Uuid::new_v4();
        let option = Uuid::new_v4();

        for _ in 0..5 {
            agg.record(&VoteEvent::new(poll, option, Uuid::new_v4()));
        }

        assert_eq!(agg.counters().get(&option_key(&poll, &option)), 5);
        assert_eq!(agg.counters().get(&total_key(&poll)), 5);
    }

    #[test]
    fn test_duplicate_delivery_double_counts() {
        // Documents the accepted overcount: the aggregator does not dedup
        // by vote id, so the same event delivered twice counts twice.
        let dir = tempfile::tempdir().unwrap();
        let (_bus, agg) = aggregator(&dir);
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        agg.record(&event);
        agg.record(&event);

        assert_eq!(
            agg.counters().get(&option_key(&event.poll_id, &event.option_id)),
            2
        );
    }

    #[tokio::test]
    async fn test_update_emitted_per_increment() {
        let dir = tempfile::tempdir().unwrap();
        let (_bus, agg) = aggregator(&dir);
        let poll = Uuid::new_v4();
        let option = Uuid::new_v4();

        let mut updates = agg.subscribe();
        agg.record(&VoteEvent::new(poll, option, Uuid::new_v4()));
        agg.record(&VoteEvent::new(poll, option, Uuid::new_v4()));

        assert_eq!(updates.recv().await.unwrap().option_count, 1);
        let second = updates.recv().await.unwrap();
        assert_eq!(second.option_count, 2);
        assert_eq!(second.poll_id, poll);
        assert_eq!(second.option_id, option);
    }

    #[tokio::test]
    async fn test_poll_once_consumes_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, agg) = aggregator(&dir);
        let poll = Uuid::new_v4();
        let option = Uuid::new_v4();

        let event = VoteEvent::new(poll, option, Uuid::new_v4());
        bus.publish(VOTES_TOPIC, &poll.to_string(), event.to_bytes())
            .unwrap();
        let partition = bus.partition_for_key(&poll.to_string());

        let processed = agg.poll_once(partition).await.unwrap();
        assert_eq!(processed, 1);
        assert_eq!(agg.counters().get(&option_key(&poll, &option)), 1);

        // Committed, so a second fetch sees nothing new.
        let consumer = ConsumerGroup::new(bus.clone(), TALLY_GROUP);
        assert!(consumer.fetch(VOTES_TOPIC, partition, 64).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poison_record_skipped_and_committed_past() {
        let dir = tempfile::tempdir().unwrap();
        let (bus, agg) = aggregator(&dir);
        let poll = Uuid::new_v4();
        let option = Uuid::new_v4();
        let key = poll.to_string();
        let partition = bus.partition_for_key(&key);

        bus.publish(VOTES_TOPIC, &key, b"not json".to_vec()).unwrap();
        bus.publish(
            VOTES_TOPIC,
            &key,
            VoteEvent::new(poll, option, Uuid::new_v4()).to_bytes(),
        )
        .unwrap();

        let processed = agg.poll_once(partition).await.unwrap();
        assert_eq!(processed, 1);
        assert_eq!(agg.counters().get(&option_key(&poll, &option)), 1);

        let consumer = ConsumerGroup::new(bus, TALLY_GROUP);
        assert!(consumer.fetch(VOTES_TOPIC, partition, 64).unwrap().is_empty());
    }
}
