//! Partitioned append log backed by sled
//!
//! One sled tree per (topic, partition). Record keys are big-endian offsets
//! so sled's byte ordering matches append order. Appends take a
//! per-partition lock to hand out contiguous offsets; reads are lock-free.

use crate::{error::BusError, BusConfig};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    path::Path,
    sync::Arc,
};
use tokio::sync::Notify;

/// Stored form of a published record
#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    payload: Vec<u8>,
}

/// A record handed to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    pub partition: usize,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

struct PartitionLog {
    tree: sled::Tree,
    /// Next offset to assign on append
    next_offset: Mutex<u64>,
    /// Woken whenever a record lands in this partition
    notify: Arc<Notify>,
}

struct TopicLog {
    partitions: Vec<PartitionLog>,
}

/// Durable, key-partitioned event bus
pub struct EventBus {
    db: sled::Db,
    /// Committed consumer-group offsets, key format `group/topic/partition`
    offsets: sled::Tree,
    partitions: usize,
    topics: DashMap<String, Arc<TopicLog>>,
}

impl EventBus {
    /// Open or create a bus at the given path
    pub fn open<P: AsRef<Path>>(path: P, config: BusConfig) -> Result<Self, BusError> {
        let db = sled::open(&path)?;
        let offsets = db.open_tree("offsets")?;

        tracing::info!(
            "Opened event bus at {:?} ({} partitions per topic)",
            path.as_ref(),
            config.partitions
        );

        Ok(Self {
            db,
            offsets,
            partitions: config.partitions,
            topics: DashMap::new(),
        })
    }

    /// Partitions per topic
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Partition a key maps to (stable across restarts)
    pub fn partition_for_key(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as usize
    }

    /// Append a record, keyed for partition selection
    ///
    /// Returns the (partition, offset) the record landed at. The record is
    /// in sled before this returns; waiting consumers are woken afterwards.
    pub fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(usize, u64), BusError> {
        let partition = self.partition_for_key(key);
        let topic_log = self.topic(topic)?;
        let part = &topic_log.partitions[partition];

        let record = Record {
            key: key.to_string(),
            payload,
        };
        let bytes = bincode::serialize(&record)?;

        let offset = {
            let mut next = part.next_offset.lock();
            let offset = *next;
            part.tree.insert(offset.to_be_bytes(), bytes)?;
            *next += 1;
            offset
        };

        part.notify.notify_waiters();
        tracing::trace!("Published to {}[{}] at offset {}", topic, partition, offset);

        Ok((partition, offset))
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), BusError> {
        self.db.flush()?;
        Ok(())
    }

    fn topic(&self, name: &str) -> Result<Arc<TopicLog>, BusError> {
        if let Some(topic) = self.topics.get(name) {
            return Ok(topic.clone());
        }

        let mut partitions = Vec::with_capacity(self.partitions);
        for i in 0..self.partitions {
            let tree = self.db.open_tree(format!("log:{}:{}", name, i))?;
            let next_offset = match tree.last()? {
                Some((key, _)) => decode_offset(&key) + 1,
                None => 0,
            };
            partitions.push(PartitionLog {
                tree,
                next_offset: Mutex::new(next_offset),
                notify: Arc::new(Notify::new()),
            });
        }

        let topic = Arc::new(TopicLog { partitions });
        // A concurrent caller may have inserted first; keep whichever won.
        Ok(self.topics.entry(name.to_string()).or_insert(topic).clone())
    }

    fn partition(&self, topic: &str, partition: usize) -> Result<(Arc<TopicLog>, usize), BusError> {
        let topic_log = self.topic(topic)?;
        if partition >= topic_log.partitions.len() {
            return Err(BusError::PartitionOutOfRange {
                topic: topic.to_string(),
                partition,
            });
        }
        Ok((topic_log, partition))
    }

    /// Read up to `max` records at or after `from`
    pub(crate) fn read_from(
        &self,
        topic: &str,
        partition: usize,
        from: u64,
        max: usize,
    ) -> Result<Vec<Delivery>, BusError> {
        let (topic_log, partition) = self.partition(topic, partition)?;
        let part = &topic_log.partitions[partition];

        let mut out = Vec::new();
        for item in part.tree.range(from.to_be_bytes().to_vec()..) {
            let (key, value) = item?;
            let record: Record = bincode::deserialize(&value)?;
            out.push(Delivery {
                partition,
                offset: decode_offset(&key),
                key: record.key,
                payload: record.payload,
            });
            if out.len() >= max {
                break;
            }
        }
        Ok(out)
    }

    /// Whether any record exists at or after `from`
    pub(crate) fn has_records_from(
        &self,
        topic: &str,
        partition: usize,
        from: u64,
    ) -> Result<bool, BusError> {
        let (topic_log, partition) = self.partition(topic, partition)?;
        let part = &topic_log.partitions[partition];
        Ok(part
            .tree
            .range(from.to_be_bytes().to_vec()..)
            .next()
            .transpose()?
            .is_some())
    }

    /// Wakeup handle for a partition
    pub(crate) fn partition_notify(
        &self,
        topic: &str,
        partition: usize,
    ) -> Result<Arc<Notify>, BusError> {
        let (topic_log, partition) = self.partition(topic, partition)?;
        Ok(topic_log.partitions[partition].notify.clone())
    }

    /// Next unread offset for a consumer group (0 if it never committed)
    pub(crate) fn committed_next(
        &self,
        group: &str,
        topic: &str,
        partition: usize,
    ) -> Result<u64, BusError> {
        let key = offset_key(group, topic, partition);
        Ok(match self.offsets.get(key)? {
            Some(bytes) => decode_offset(&bytes),
            None => 0,
        })
    }

    /// Record that a group has processed everything up to `offset`
    pub(crate) fn set_committed(
        &self,
        group: &str,
        topic: &str,
        partition: usize,
        offset: u64,
    ) -> Result<(), BusError> {
        let key = offset_key(group, topic, partition);
        self.offsets.insert(key, &(offset + 1).to_be_bytes())?;
        Ok(())
    }
}

fn offset_key(group: &str, topic: &str, partition: usize) -> Vec<u8> {
    format!("{}/{}/{}", group, topic, partition).into_bytes()
}

fn decode_offset(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
