use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{ChangeHub, DuelStore, Subscription};
use crate::error::StoreError;
use crate::metrics::track_store_operation;
use crate::models::Duel;

/// Process-local store. All writes serialize on one mutex, and states are
/// published while it is held so subscribers see them in commit order.
#[derive(Default)]
pub struct InMemoryDuelStore {
    duels: Mutex<HashMap<String, Duel>>,
    hub: ChangeHub,
}

impl InMemoryDuelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Duel>> {
        self.duels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DuelStore for InMemoryDuelStore {
    async fn create(&self, mut duel: Duel) -> Result<Duel, StoreError> {
        track_store_operation("create", "memory", async {
            let mut duels = self.lock();
            if duels.contains_key(&duel.id) {
                return Err(StoreError::AlreadyExists(duel.id.clone()));
            }
            duel.version = 0;
            duels.insert(duel.id.clone(), duel.clone());
            self.hub.publish(&duel);
            Ok(duel)
        })
        .await
    }

    async fn get_by_id(&self, duel_id: &str) -> Result<Duel, StoreError> {
        track_store_operation("get", "memory", async {
            self.lock()
                .get(duel_id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(duel_id.to_string()))
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        duel_id: &str,
        expected_version: u64,
        mut next: Duel,
    ) -> Result<Duel, StoreError> {
        track_store_operation("compare_and_swap", "memory", async {
            let mut duels = self.lock();
            let current = duels
                .get_mut(duel_id)
                .ok_or_else(|| StoreError::NotFound(duel_id.to_string()))?;

            if current.version != expected_version {
                tracing::debug!(
                    "CAS rejected on duel {}: expected v{}, stored v{}",
                    duel_id,
                    expected_version,
                    current.version
                );
                return Err(StoreError::Conflict(duel_id.to_string()));
            }

            next.version = expected_version + 1;
            next.updated_at = Utc::now();
            *current = next.clone();
            self.hub.publish(&next);
            Ok(next)
        })
        .await
    }

    fn subscribe(&self, duel_id: &str) -> Subscription {
        self.hub.subscribe(duel_id)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
