use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::state_machine::{self, AnswerOutcome};
use crate::error::{DuelError, StoreError};
use crate::metrics::{self, DUELS_ACTIVE, DUELS_TOTAL};
use crate::models::question::validate_question_set;
use crate::models::{Duel, DuelStatus, Question};
use crate::store::{DuelStore, Subscription};

/// The only writer of duel records. Every mutation is a pure transition from
/// `state_machine` followed by one conditional write.
pub struct DuelEngine {
    store: Arc<dyn DuelStore>,
    max_write_attempts: usize,
}

pub struct CreateDuel {
    pub player1_id: String,
    pub player2_id: Option<String>,
    pub questions: Vec<Question>,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
}

impl DuelEngine {
    pub fn new(store: Arc<dyn DuelStore>, max_write_attempts: usize) -> Self {
        Self {
            store,
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn DuelStore> {
        &self.store
    }

    /// Persists a new duel; activates it right away when both seats are bound.
    pub async fn create_duel(&self, req: CreateDuel) -> Result<Duel, DuelError> {
        let duel = state_machine::new_duel(
            Uuid::new_v4().to_string(),
            req.player1_id,
            req.player2_id,
            req.questions,
            req.topic,
            req.difficulty,
            Utc::now(),
        )?;

        let created = self.store.create(duel).await?;
        DUELS_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(
            "Duel created: {} ({} vs {:?}, {} questions)",
            created.id,
            created.player1_id,
            created.player2_id,
            created.questions.len()
        );

        if created.player2_id.is_none() {
            return Ok(created);
        }

        let next = state_machine::activate(&created, Utc::now())?;
        let active = self
            .store
            .compare_and_swap(&created.id, created.version, next)
            .await?;
        self.on_activated(&active);
        Ok(active)
    }

    pub async fn join_duel(&self, duel_id: &str, player_id: &str) -> Result<Duel, DuelError> {
        let current = self.load(duel_id).await?;
        let next = state_machine::bind_opponent(&current, player_id, Utc::now())?;

        match self
            .store
            .compare_and_swap(duel_id, current.version, next)
            .await
        {
            Ok(active) => {
                self.on_activated(&active);
                Ok(active)
            }
            // Someone else took the seat or the owner cancelled first.
            Err(StoreError::Conflict(_)) => {
                let fresh = self.load(duel_id).await?;
                Err(DuelError::DuelNotActive {
                    duel_id: duel_id.to_string(),
                    status: fresh.status,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sole answer path for humans, bots, and the turn clock alike.
    pub async fn submit_answer(
        &self,
        duel_id: &str,
        player_id: &str,
        answer_id: Option<&str>,
    ) -> Result<Duel, DuelError> {
        let result = self.try_submit_answer(duel_id, player_id, answer_id).await;
        match &result {
            Ok(outcome) => {
                metrics::record_answer(outcome.record.is_correct, answer_id.is_none());
                tracing::info!(
                    "Answer accepted: duel={}, player={}, question={}, correct={}, version={}",
                    duel_id,
                    player_id,
                    outcome.record.question_id,
                    outcome.record.is_correct,
                    outcome.duel.version
                );
                if outcome.finished {
                    DUELS_TOTAL.with_label_values(&["finished"]).inc();
                    DUELS_ACTIVE.dec();
                    tracing::info!(
                        "Duel finished: {} winner={:?} score={}:{}",
                        duel_id,
                        outcome.duel.winner_id,
                        outcome.duel.player1_score,
                        outcome.duel.player2_score
                    );
                }
            }
            Err(e) => {
                metrics::record_rejection(e.reason());
                if e.is_stale_submission() {
                    tracing::debug!("Submission dropped: {}", e);
                } else {
                    tracing::warn!("Submission failed: {}", e);
                }
            }
        }
        result.map(|outcome| outcome.duel)
    }

    async fn try_submit_answer(
        &self,
        duel_id: &str,
        player_id: &str,
        answer_id: Option<&str>,
    ) -> Result<AnswerOutcome, DuelError> {
        let mut current = self.load(duel_id).await?;
        let slot = state_machine::check_turn(&current, player_id)?;
        let answered_before = current.answers(slot).len();

        for attempt in 1..=self.max_write_attempts {
            let outcome = state_machine::apply_answer(&current, player_id, answer_id, Utc::now())?;

            match self
                .store
                .compare_and_swap(duel_id, current.version, outcome.duel.clone())
                .await
            {
                Ok(stored) => {
                    return Ok(AnswerOutcome {
                        duel: stored,
                        ..outcome
                    })
                }
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!(
                        "Write conflict on duel {} (attempt {}), re-reading",
                        duel_id,
                        attempt
                    );
                    current = self.load(duel_id).await?;
                    if current.status != DuelStatus::Active {
                        return Err(DuelError::DuelNotActive {
                            duel_id: duel_id.to_string(),
                            status: current.status,
                        });
                    }
                    // Only retry if this turn is provably still unresolved.
                    let still_ours = current.current_turn.as_deref() == Some(player_id)
                        && current.answers(slot).len() == answered_before;
                    if !still_ours {
                        return Err(DuelError::TurnAlreadyResolved(duel_id.to_string()));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DuelError::WriteConflict(duel_id.to_string()))
    }

    pub async fn cancel_duel(&self, duel_id: &str, player_id: &str) -> Result<Duel, DuelError> {
        for _ in 0..self.max_write_attempts {
            let current = self.load(duel_id).await?;
            let was_active = current.status == DuelStatus::Active;
            let next = state_machine::cancel(&current, player_id, Utc::now())?;

            match self
                .store
                .compare_and_swap(duel_id, current.version, next)
                .await
            {
                Ok(cancelled) => {
                    DUELS_TOTAL.with_label_values(&["cancelled"]).inc();
                    if was_active {
                        DUELS_ACTIVE.dec();
                    }
                    tracing::info!("Duel cancelled: {} by {}", duel_id, player_id);
                    return Ok(cancelled);
                }
                // Cancelling is idempotent in intent, so a fresh read is safe.
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(DuelError::WriteConflict(duel_id.to_string()))
    }

    pub async fn get_duel(&self, duel_id: &str) -> Result<Duel, DuelError> {
        self.load(duel_id).await
    }

    pub fn subscribe(&self, duel_id: &str) -> Subscription {
        self.store.subscribe(duel_id)
    }

    /// Reads a duel and re-validates its questions, so a corrupted row can
    /// never reach the state machine.
    async fn load(&self, duel_id: &str) -> Result<Duel, DuelError> {
        let duel = self.store.get_by_id(duel_id).await?;
        validate_question_set(&duel.questions).map_err(|(question_id, defect)| {
            DuelError::MalformedQuestion {
                question_id,
                defect,
            }
        })?;
        Ok(duel)
    }

    fn on_activated(&self, duel: &Duel) {
        DUELS_TOTAL.with_label_values(&["activated"]).inc();
        DUELS_ACTIVE.inc();
        tracing::info!(
            "Duel activated: {} first turn={:?}",
            duel.id,
            duel.current_turn
        );
    }
}
