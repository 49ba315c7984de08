//! Poll domain model
//!
//! A poll owns an ordered list of its options. An option refers back to its
//! poll by id only; there is no live parent pointer, so the graph has a
//! single owner and no cycles.

use serde::{Deserialize, Serialize};

use crate::{OptionId, PollCreatedEvent, PollId, PollOptionInfo};

/// One selectable option of a poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub id: OptionId,
    /// Back-reference for lookup, never a live object pointer
    pub poll_id: PollId,
    pub text: String,
}

/// A poll and its options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub created_by: String,
    pub options: Vec<PollOption>,
}

impl Poll {
    /// Build a poll from a title and option texts, generating fresh ids
    pub fn new(title: String, option_texts: Vec<String>, created_by: String) -> Self {
        let id = PollId::new_v4();
        let options = option_texts
            .into_iter()
            .map(|text| PollOption {
                id: OptionId::new_v4(),
                poll_id: id,
                text,
            })
            .collect();
        Self {
            id,
            title,
            created_by,
            options,
        }
    }

    /// Whether the given option belongs to this poll
    pub fn has_option(&self, option_id: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option_id)
    }

    /// Announcement event for this poll
    pub fn created_event(&self) -> PollCreatedEvent {
        PollCreatedEvent {
            poll_id: self.id,
            title: self.title.clone(),
            options: self
                .options
                .iter()
                .map(|o| PollOptionInfo {
                    option_id: o.id,
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_back_reference_owning_poll() {
        let poll = Poll::new(
            "lunch".to_string(),
            vec!["pizza".to_string(), "ramen".to_string()],
            "anonymous".to_string(),
        );
        assert_eq!(poll.options.len(), 2);
        for option in &poll.options {
            assert_eq!(option.poll_id, poll.id);
        }
        assert!(poll.has_option(&poll.options[0].id));
        assert!(!poll.has_option(&OptionId::new_v4()));
    }

    #[test]
    fn test_created_event_preserves_option_order() {
        let poll = Poll::new(
            "best number".to_string(),
            vec!["one".to_string(), "two".to_string(), "three".to_string()],
            "anonymous".to_string(),
        );
        let event = poll.created_event();
        assert_eq!(event.poll_id, poll.id);
        let texts: Vec<_> = event.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }
}
