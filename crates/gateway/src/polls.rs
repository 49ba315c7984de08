//! In-memory poll registry
//!
//! Polls are authored here and announced on their own topic. Durable poll
//! storage belongs to an upstream service; this registry exists to mint
//! poll/option ids and serve lookups for the tally surfaces.

use crate::IntakeError;
use dashmap::DashMap;
use event_bus::EventBus;
use std::sync::Arc;
use vote_events::{Poll, PollId, POLLS_CREATED_TOPIC};

/// Concurrent poll registry
#[derive(Clone)]
pub struct PollRegistry {
    polls: Arc<DashMap<PollId, Poll>>,
    bus: Arc<EventBus>,
}

impl PollRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            polls: Arc::new(DashMap::new()),
            bus,
        }
    }

    /// Create a poll and announce it on the bus
    pub fn create(
        &self,
        title: String,
        option_texts: Vec<String>,
        created_by: String,
    ) -> Result<Poll, IntakeError> {
        let poll = Poll::new(title, option_texts, created_by);
        self.polls.insert(poll.id, poll.clone());

        let event = poll.created_event();
        self.bus
            .publish(POLLS_CREATED_TOPIC, &poll.id.to_string(), event.to_bytes())?;

        tracing::info!("Created poll {} with {} options", poll.id, poll.options.len());
        Ok(poll)
    }

    /// Look up a poll
    pub fn get(&self, poll_id: &PollId) -> Option<Poll> {
        self.polls.get(poll_id).map(|p| p.value().clone())
    }

    /// All polls
    pub fn list(&self) -> Vec<Poll> {
        self.polls.iter().map(|p| p.value().clone()).collect()
    }

    /// Number of polls
    pub fn len(&self) -> usize {
        self.polls.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }
}
