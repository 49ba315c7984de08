//! Vote intake - build, publish, acknowledge
//!
//! Intake never waits for downstream consumers: once the event is on the
//! bus the vote is accepted. A bus failure means no event exists anywhere
//! and the caller retries; nothing is buffered locally.

use event_bus::{BusError, EventBus};
use std::sync::Arc;
use thiserror::Error;
use vote_events::{OptionId, PollId, UserId, VoteEvent, VOTES_TOPIC};

/// Intake errors
#[derive(Error, Debug)]
pub enum IntakeError {
    /// Transient: the caller should retry
    #[error("event bus unavailable: {0}")]
    BusUnavailable(#[from] BusError),
}

/// Accepts vote submissions and publishes them keyed by poll id
#[derive(Clone)]
pub struct VoteIntake {
    bus: Arc<EventBus>,
}

impl VoteIntake {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Accept a vote
    ///
    /// A missing caller identity gets a synthetic anonymous one; identity
    /// problems never block a vote. Returns the published event.
    pub fn submit(
        &self,
        poll_id: PollId,
        option_id: OptionId,
        caller: Option<UserId>,
    ) -> Result<VoteEvent, IntakeError> {
        let user_id = caller.unwrap_or_else(UserId::new_v4);
        let event = VoteEvent::new(poll_id, option_id, user_id);

        self.bus
            .publish(VOTES_TOPIC, &poll_id.to_string(), event.to_bytes())?;

        tracing::debug!("Accepted vote {} for poll {}", event.vote_id, poll_id);
        Ok(event)
    }
}
