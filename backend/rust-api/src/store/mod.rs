//! Duel Record Store: durable duel rows with conditional writes and a change feed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::models::Duel;

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryDuelStore;
pub use redis_store::RedisDuelStore;

/// Buffered states per subscriber before it starts lagging.
const SUBSCRIPTION_CAPACITY: usize = 64;

#[async_trait]
pub trait DuelStore: Send + Sync {
    /// Persists a new duel at version 0.
    async fn create(&self, duel: Duel) -> Result<Duel, StoreError>;

    async fn get_by_id(&self, duel_id: &str) -> Result<Duel, StoreError>;

    /// Replaces the stored duel with `next` iff its version is still
    /// `expected_version`. The stored copy gets `expected_version + 1` and
    /// every subscriber receives it.
    async fn compare_and_swap(
        &self,
        duel_id: &str,
        expected_version: u64,
        next: Duel,
    ) -> Result<Duel, StoreError>;

    fn subscribe(&self, duel_id: &str) -> Subscription;

    async fn ping(&self) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Per-duel fan-out of committed states to local subscribers.
#[derive(Clone, Default)]
pub struct ChangeHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Duel>>>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, duel_id: &str) -> Subscription {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.retain(|_, tx| tx.receiver_count() > 0);

        let receiver = channels
            .entry(duel_id.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_CAPACITY).0)
            .subscribe();

        Subscription {
            duel_id: duel_id.to_string(),
            receiver,
        }
    }

    /// Returns how many subscribers the state was delivered to.
    pub fn publish(&self, duel: &Duel) -> usize {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match channels.get(&duel.id) {
            Some(tx) => tx.send(duel.clone()).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, duel_id: &str) -> usize {
        let channels = self
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .get(duel_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// Handle on one duel's change feed. Dropping it unsubscribes.
pub struct Subscription {
    duel_id: String,
    receiver: broadcast::Receiver<Duel>,
}

impl Subscription {
    pub fn duel_id(&self) -> &str {
        &self.duel_id
    }

    /// Next committed state, or `None` once the feed is closed.
    ///
    /// States are full snapshots, so a lagging subscriber just skips ahead.
    pub async fn recv(&mut self) -> Option<Duel> {
        loop {
            match self.receiver.recv().await {
                Ok(duel) => return Some(duel),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        "Subscriber on duel {} lagged, skipped {} states",
                        self.duel_id,
                        skipped
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        tracing::debug!("Unsubscribed from duel {}", self.duel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::state_machine::tests::waiting_duel;

    #[tokio::test]
    async fn published_states_reach_every_subscriber() {
        let hub = ChangeHub::new();
        let duel = waiting_duel(2);
        let mut a = hub.subscribe(&duel.id);
        let mut b = hub.subscribe(&duel.id);

        assert_eq!(hub.publish(&duel), 2);
        assert_eq!(a.recv().await.unwrap().id, duel.id);
        assert_eq!(b.recv().await.unwrap().id, duel.id);
    }

    #[tokio::test]
    async fn unsubscribed_handles_stop_counting() {
        let hub = ChangeHub::new();
        let duel = waiting_duel(1);
        let sub = hub.subscribe(&duel.id);
        assert_eq!(hub.subscriber_count(&duel.id), 1);
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(&duel.id), 0);
        assert_eq!(hub.publish(&duel), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newer_states() {
        let hub = ChangeHub::new();
        let mut duel = waiting_duel(1);
        let mut sub = hub.subscribe(&duel.id);
        for v in 0..(SUBSCRIPTION_CAPACITY as u64 + 10) {
            duel.version = v;
            hub.publish(&duel);
        }
        let received = sub.recv().await.unwrap();
        assert!(received.version >= 10);
    }
}
