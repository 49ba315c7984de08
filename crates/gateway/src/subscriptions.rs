//! Broadcast hub - per-poll subscriber registry and fan-out
//!
//! Maps a poll id to the connections watching it. Every subscriber owns a
//! bounded broadcast queue; publishing never blocks, and a subscriber that
//! falls behind loses its oldest queued updates rather than slowing anyone
//! else down. Nothing is replayed: a subscription only sees updates
//! published after it was created.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use vote_events::{PollId, TallyUpdate};

/// Subscription ID
pub type SubscriptionId = u64;

/// One live subscriber of one poll
struct Subscription {
    poll_id: PollId,
    sender: broadcast::Sender<TallyUpdate>,
}

/// Manages live tally subscriptions
pub struct SubscriptionManager {
    /// Active subscriptions by ID
    subscriptions: DashMap<SubscriptionId, Subscription>,
    /// Subscriptions by poll for fan-out lookup
    poll_subscriptions: DashMap<PollId, Vec<SubscriptionId>>,
    /// Next subscription ID
    next_id: AtomicU64,
    /// Queue capacity handed to each new subscription
    queue_capacity: usize,
}

impl SubscriptionManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            subscriptions: DashMap::new(),
            poll_subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    /// Subscribe to one poll's tally updates
    pub fn subscribe(&self, poll_id: PollId) -> (SubscriptionId, broadcast::Receiver<TallyUpdate>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = broadcast::channel(self.queue_capacity);

        self.subscriptions.insert(id, Subscription { poll_id, sender });
        self.poll_subscriptions.entry(poll_id).or_default().push(id);

        tracing::debug!("Created subscription {} for poll {}", id, poll_id);
        (id, receiver)
    }

    /// Remove a subscription
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        if let Some((_, sub)) = self.subscriptions.remove(&subscription_id) {
            if let Some(mut subs) = self.poll_subscriptions.get_mut(&sub.poll_id) {
                subs.retain(|&id| id != subscription_id);
            }
            tracing::debug!("Removed subscription {}", subscription_id);
            true
        } else {
            false
        }
    }

    /// Push an update to every subscriber of its poll
    ///
    /// Never blocks; a subscriber with a full queue drops its oldest
    /// update, and a vanished subscriber is simply skipped.
    pub fn publish(&self, update: &TallyUpdate) {
        if let Some(sub_ids) = self.poll_subscriptions.get(&update.poll_id) {
            for &sub_id in sub_ids.iter() {
                if let Some(sub) = self.subscriptions.get(&sub_id) {
                    let _ = sub.sender.send(update.clone());
                }
            }
        }
    }

    /// Forward aggregator updates into the hub until the source closes
    pub async fn forward_updates(self: Arc<Self>, mut updates: broadcast::Receiver<TallyUpdate>) {
        loop {
            match updates.recv().await {
                Ok(update) => self.publish(&update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Broadcast hub lagged behind aggregator, {} updates lost", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Check if a subscription exists
    pub fn has_subscription(&self, subscription_id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&subscription_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn update(poll_id: PollId, count: u64) -> TallyUpdate {
        TallyUpdate {
            poll_id,
            option_id: Uuid::new_v4(),
            option_count: count,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_updates_for_its_poll() {
        let manager = SubscriptionManager::new(64);
        let poll = Uuid::new_v4();

        let (_, mut receiver) = manager.subscribe(poll);
        manager.publish(&update(poll, 1));

        assert_eq!(receiver.recv().await.unwrap().option_count, 1);
    }

    #[tokio::test]
    async fn test_updates_scoped_to_poll() {
        let manager = SubscriptionManager::new(64);
        let poll_a = Uuid::new_v4();
        let poll_b = Uuid::new_v4();

        let (_, mut rx_a) = manager.subscribe(poll_a);
        let (_, mut rx_b) = manager.subscribe(poll_b);

        manager.publish(&update(poll_b, 7));

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.recv().await.unwrap().option_count, 7);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_backlog() {
        let manager = SubscriptionManager::new(64);
        let poll = Uuid::new_v4();

        let (_, mut early) = manager.subscribe(poll);
        manager.publish(&update(poll, 1));

        let (_, mut late) = manager.subscribe(poll);
        manager.publish(&update(poll, 2));

        assert_eq!(early.recv().await.unwrap().option_count, 1);
        assert_eq!(early.recv().await.unwrap().option_count, 2);
        // Only the update published after the late join.
        assert_eq!(late.recv().await.unwrap().option_count, 2);
        assert!(late.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest() {
        let manager = SubscriptionManager::new(2);
        let poll = Uuid::new_v4();
        let (_, mut receiver) = manager.subscribe(poll);

        for count in 1..=5 {
            manager.publish(&update(poll, count));
        }

        // The queue held two; the three oldest are gone.
        match receiver.recv().await {
            Err(broadcast::error::RecvError::Lagged(n)) => assert_eq!(n, 3),
            other => panic!("expected lag, got {:?}", other),
        }
        assert_eq!(receiver.recv().await.unwrap().option_count, 4);
        assert_eq!(receiver.recv().await.unwrap().option_count, 5);
    }

    #[test]
    fn test_unsubscribe() {
        let manager = SubscriptionManager::new(64);
        let (id, _receiver) = manager.subscribe(Uuid::new_v4());

        assert!(manager.has_subscription(id));
        assert!(manager.unsubscribe(id));
        assert!(!manager.has_subscription(id));
        assert!(!manager.unsubscribe(id));
    }
}
