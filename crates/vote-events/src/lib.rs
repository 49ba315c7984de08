//! Shared event and domain types for the live tally pipeline
//!
//! Everything that crosses a service boundary lives here:
//! - VoteEvent / PollCreatedEvent, the payloads carried on the event bus
//! - TallyUpdate, the payload pushed to live subscribers
//! - the Poll / PollOption domain model

pub mod events;
pub mod poll;

pub use events::{PollCreatedEvent, PollOptionInfo, TallyUpdate, VoteEvent};
pub use poll::{Poll, PollOption};

use uuid::Uuid;

/// Poll identifier
pub type PollId = Uuid;

/// Poll option identifier
pub type OptionId = Uuid;

/// Voter identifier
pub type UserId = Uuid;

/// Vote identifier (unique per accepted submission)
pub type VoteId = Uuid;

/// Topic carrying vote events
pub const VOTES_TOPIC: &str = "votes";

/// Topic carrying poll-created events
pub const POLLS_CREATED_TOPIC: &str = "polls-created";
