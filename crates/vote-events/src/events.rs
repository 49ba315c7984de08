//! Wire events carried on the bus and pushed to subscribers
//!
//! Events are JSON on the wire. Field names are camelCase to match the
//! public payloads clients already consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OptionId, PollId, UserId, VoteId};

/// A single accepted vote, published once by the intake and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteEvent {
    /// Globally unique id for this vote submission
    pub vote_id: VoteId,
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub user_id: UserId,
    /// Server-assigned acceptance instant
    pub timestamp: DateTime<Utc>,
}

impl VoteEvent {
    /// Create an event with a fresh vote id and the current server time
    pub fn new(poll_id: PollId, option_id: OptionId, user_id: UserId) -> Self {
        Self {
            vote_id: VoteId::new_v4(),
            poll_id,
            option_id,
            user_id,
            timestamp: Utc::now(),
        }
    }

    /// Serialize for bus transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("VoteEvent serialization should not fail")
    }

    /// Deserialize from the bus
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Option summary embedded in a [`PollCreatedEvent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOptionInfo {
    pub option_id: OptionId,
    pub text: String,
}

/// Announcement of a newly created poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollCreatedEvent {
    pub poll_id: PollId,
    pub title: String,
    pub options: Vec<PollOptionInfo>,
}

impl PollCreatedEvent {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("PollCreatedEvent serialization should not fail")
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Single-option tally delta pushed to live subscribers
///
/// Carries the new count for one option only, not a full poll snapshot.
/// Transient: consumed by the broadcast hub and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyUpdate {
    pub poll_id: PollId,
    pub option_id: OptionId,
    /// Option count after the increment that produced this update
    pub option_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_vote_event_round_trip() {
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let decoded = VoteEvent::from_bytes(&event.to_bytes()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_vote_event_wire_field_names() {
        let event = VoteEvent::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let value: serde_json::Value = serde_json::from_slice(&event.to_bytes()).unwrap();
        assert!(value.get("voteId").is_some());
        assert!(value.get("pollId").is_some());
        assert!(value.get("optionId").is_some());
        assert!(value.get("userId").is_some());
        assert!(value.get("timestamp").is_some());
    }

    #[test]
    fn test_fresh_vote_ids_are_unique() {
        let poll = Uuid::new_v4();
        let option = Uuid::new_v4();
        let user = Uuid::new_v4();
        let a = VoteEvent::new(poll, option, user);
        let b = VoteEvent::new(poll, option, user);
        assert_ne!(a.vote_id, b.vote_id);
    }
}
