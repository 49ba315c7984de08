//! Sled-backed vote record storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use thiserror::Error;
use uuid::Uuid;
use vote_events::{OptionId, PollId, UserId, VoteEvent, VoteId};

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Durable 1:1 copy of an accepted vote event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote_id: VoteId,
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

impl From<&VoteEvent> for VoteRecord {
    fn from(event: &VoteEvent) -> Self {
        Self {
            vote_id: event.vote_id,
            poll_id: event.poll_id,
            option_id: event.option_id,
            user_id: event.user_id,
            timestamp: event.timestamp,
        }
    }
}

/// Persistent vote ledger
pub struct LedgerStore {
    db: sled::Db,
    records: sled::Tree,
}

impl LedgerStore {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::open(&path)?;
        let records = db.open_tree("votes")?;
        tracing::info!(
            "Opened vote ledger at {:?} ({} records)",
            path.as_ref(),
            records.len()
        );
        Ok(Self { db, records })
    }

    /// Insert a record, keyed by vote id
    ///
    /// Returns false when a record with the same vote id already exists;
    /// the duplicate is discarded, never treated as an error.
    pub fn insert(&self, record: &VoteRecord) -> Result<bool, LedgerError> {
        let value = bincode::serialize(record)?;
        let outcome = self.records.compare_and_swap(
            record.vote_id.as_bytes(),
            None as Option<&[u8]>,
            Some(value),
        )?;
        Ok(outcome.is_ok())
    }

    /// Look up a record by vote id
    pub fn get(&self, vote_id: &VoteId) -> Result<Option<VoteRecord>, LedgerError> {
        match self.records.get(vote_id.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Total number of recorded votes
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Recount one poll from the ground-truth records
    ///
    /// Full scan; meant for audit and correction paths, not the hot path.
    pub fn recount(&self, poll_id: &PollId) -> Result<HashMap<Uuid, u64>, LedgerError> {
        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for item in self.records.iter() {
            let (_, value) = item?;
            let record: VoteRecord = bincode::deserialize(&value)?;
            if &record.poll_id == poll_id {
                *counts.entry(record.option_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::open(dir.path()).unwrap();
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(ledger.insert(&VoteRecord::from(&event)).unwrap());
        let record = ledger.get(&event.vote_id).unwrap().unwrap();
        assert_eq!(record.poll_id, event.poll_id);
        assert_eq!(record.option_id, event.option_id);
    }

    #[test]
    fn test_duplicate_vote_id_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::open(dir.path()).unwrap();
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let record = VoteRecord::from(&event);

        assert!(ledger.insert(&record).unwrap());
        assert!(!ledger.insert(&record).unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_recount_counts_per_option() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = LedgerStore::open(dir.path()).unwrap();
        let poll = Uuid::new_v4();
        let o1 = Uuid::new_v4();
        let o2 = Uuid::new_v4();

        for option in [o1, o1, o2] {
            let event = VoteEvent::new(poll, option, Uuid::new_v4());
            ledger.insert(&VoteRecord::from(&event)).unwrap();
        }
        // Another poll's votes stay out of the recount.
        let other = VoteEvent::new(Uuid::new_v4(), o1, Uuid::new_v4());
        ledger.insert(&VoteRecord::from(&other)).unwrap();

        let counts = ledger.recount(&poll).unwrap();
        assert_eq!(counts.get(&o1), Some(&2));
        assert_eq!(counts.get(&o2), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        {
            let ledger = LedgerStore::open(dir.path()).unwrap();
            ledger.insert(&VoteRecord::from(&event)).unwrap();
            ledger.flush().unwrap();
        }
        let ledger = LedgerStore::open(dir.path()).unwrap();
        assert!(ledger.get(&event.vote_id).unwrap().is_some());
    }
}
