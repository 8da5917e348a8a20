use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::duel_service::DuelEngine;
use crate::error::DuelError;
use crate::metrics::BOT_ANSWERS_TOTAL;
use crate::models::{Duel, DuelStatus, Question};

/// Bot identities share this prefix so they never collide with JWT subjects.
pub const BOT_ID_PREFIX: &str = "bot:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotProfile {
    pub id: String,
    pub accuracy_probability: f64,
    #[serde(default = "default_min_think_ms")]
    pub min_think_ms: u64,
    #[serde(default = "default_max_think_ms")]
    pub max_think_ms: u64,
    #[serde(default)]
    pub difficulty: Option<String>,
}

fn default_min_think_ms() -> u64 {
    1500
}

fn default_max_think_ms() -> u64 {
    6000
}

impl BotProfile {
    pub fn new(id: &str, accuracy_probability: f64, difficulty: &str) -> Self {
        Self {
            id: id.to_string(),
            accuracy_probability,
            min_think_ms: default_min_think_ms(),
            max_think_ms: default_max_think_ms(),
            difficulty: Some(difficulty.to_string()),
        }
    }

    pub fn defaults() -> Vec<BotProfile> {
        vec![
            BotProfile::new("bot:easy", 0.5, "easy"),
            BotProfile::new("bot:medium", 0.7, "medium"),
            BotProfile::new("bot:hard", 0.9, "hard"),
        ]
    }

    pub fn is_bot_id(player_id: &str) -> bool {
        player_id.starts_with(BOT_ID_PREFIX)
    }

    /// Uniform delay in `[min_think_ms, max_think_ms]`.
    pub fn think_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let lo = self.min_think_ms.min(self.max_think_ms);
        let hi = self.min_think_ms.max(self.max_think_ms);
        Duration::from_millis(rng.random_range(lo..=hi))
    }
}

/// Picks the correct option with probability `accuracy`, otherwise a uniformly
/// random incorrect one. Falls back to the correct option when there is no
/// incorrect one to pick.
pub fn choose_answer<'q, R: Rng + ?Sized>(
    question: &'q Question,
    accuracy: f64,
    rng: &mut R,
) -> Option<&'q str> {
    let accuracy = if accuracy.is_finite() {
        accuracy.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let correct = question.correct_option().map(|o| o.id.as_str());

    if rng.random_bool(accuracy) {
        return correct.or_else(|| question.options.first().map(|o| o.id.as_str()));
    }

    let incorrect = question.incorrect_options();
    incorrect
        .choose(rng)
        .copied()
        .map(|o| o.id.as_str())
        .or(correct)
}

/// Automatic player for one bot identity. Answers only through
/// `DuelEngine::submit_answer`, like any human.
pub struct BotResponder {
    engine: Arc<DuelEngine>,
    profile: BotProfile,
    /// duel id -> own answer-log length already acted on
    acted: Mutex<HashMap<String, usize>>,
}

/// Owning handle for a running bot; dropping it stops the bot.
pub struct BotHandle {
    bot_id: String,
    task: JoinHandle<()>,
}

impl BotHandle {
    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BotHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl BotResponder {
    pub fn new(engine: Arc<DuelEngine>, profile: BotProfile) -> Self {
        Self {
            engine,
            profile,
            acted: Mutex::new(HashMap::new()),
        }
    }

    pub fn profile(&self) -> &BotProfile {
        &self.profile
    }

    /// Claims the bot's current turn on `duel`, returning the answer-log
    /// length it acts on. `None` if it is not the bot's turn or the bot has
    /// already acted on this turn.
    pub fn claim_turn(&self, duel: &Duel) -> Option<usize> {
        if duel.status != DuelStatus::Active
            || duel.current_turn.as_deref() != Some(self.profile.id.as_str())
        {
            return None;
        }
        let slot = duel.slot_of(&self.profile.id)?;
        let answered = duel.answers(slot).len();

        let mut acted = self
            .acted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if acted.get(&duel.id) == Some(&answered) {
            return None;
        }
        acted.insert(duel.id.clone(), answered);
        Some(answered)
    }

    fn release_turn(&self, duel_id: &str, answered: usize) {
        let mut acted = self
            .acted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if acted.get(duel_id) == Some(&answered) {
            acted.remove(duel_id);
        }
    }

    /// Answers a claimed turn if the duel has not moved on since the claim.
    pub async fn answer_turn<R: Rng + ?Sized>(
        &self,
        duel_id: &str,
        answered: usize,
        rng: &mut R,
    ) -> Result<Option<Duel>, DuelError> {
        let fresh = self.engine.get_duel(duel_id).await?;
        let still_ours = fresh.status == DuelStatus::Active
            && fresh.current_turn.as_deref() == Some(self.profile.id.as_str())
            && fresh
                .slot_of(&self.profile.id)
                .map(|slot| fresh.answers(slot).len())
                == Some(answered);
        if !still_ours {
            tracing::debug!("Bot {} skipped a resolved turn on duel {}", self.profile.id, duel_id);
            return Ok(None);
        }

        let Some(question) = fresh.questions.get(answered) else {
            return Ok(None);
        };
        let pick = choose_answer(question, self.profile.accuracy_probability, rng);
        let is_correct = question.is_correct_answer(pick);

        let result = self.engine.submit_answer(duel_id, &self.profile.id, pick).await;
        match result {
            Ok(duel) => {
                BOT_ANSWERS_TOTAL
                    .with_label_values(&[self.profile.id.as_str(), if is_correct { "true" } else { "false" }])
                    .inc();
                tracing::debug!(
                    "Bot {} answered question {} on duel {} (correct={})",
                    self.profile.id,
                    question.id,
                    duel_id,
                    is_correct
                );
                Ok(Some(duel))
            }
            Err(e) if e.is_stale_submission() => Ok(None),
            Err(e) => {
                self.release_turn(duel_id, answered);
                Err(e)
            }
        }
    }

    /// Follows the duel's change feed and plays every turn handed to the bot.
    pub fn spawn(self: Arc<Self>, duel_id: &str) -> BotHandle {
        let bot_id = self.profile.id.clone();
        let duel_id = duel_id.to_string();
        let task = tokio::spawn(async move { self.run(duel_id).await });
        BotHandle { bot_id, task }
    }

    async fn run(&self, duel_id: String) {
        let mut rng = StdRng::from_rng(&mut rand::rng());
        let mut changes = self.engine.subscribe(&duel_id);
        let mut current = match self.engine.get_duel(&duel_id).await {
            Ok(duel) => Some(duel),
            Err(e) => {
                tracing::warn!("Bot {} could not load duel {}: {}", self.profile.id, duel_id, e);
                return;
            }
        };

        tracing::info!("Bot {} joined duel {}", self.profile.id, duel_id);
        loop {
            let duel = match current.take() {
                Some(duel) => duel,
                None => match changes.recv().await {
                    Some(duel) => duel,
                    None => return,
                },
            };
            if duel.status.is_terminal() {
                tracing::debug!("Bot {} leaving duel {} ({})", self.profile.id, duel_id, duel.status);
                return;
            }

            let Some(answered) = self.claim_turn(&duel) else {
                continue;
            };
            sleep(self.profile.think_delay(&mut rng)).await;
            if let Err(e) = self.answer_turn(&duel_id, answered, &mut rng).await {
                tracing::warn!("Bot {} failed to answer on duel {}: {}", self.profile.id, duel_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::sample_question;
    use crate::models::QuestionOption;
    use crate::services::duel_service::CreateDuel;
    use crate::services::state_machine::tests::{questions, ALICE};
    use crate::store::InMemoryDuelStore;

    fn fast_bot(accuracy: f64) -> BotProfile {
        BotProfile {
            id: "bot:test".to_string(),
            accuracy_probability: accuracy,
            min_think_ms: 0,
            max_think_ms: 5,
            difficulty: None,
        }
    }

    async fn bot_duel(profile: &BotProfile, n: usize) -> (Arc<DuelEngine>, Duel) {
        let engine = Arc::new(DuelEngine::new(Arc::new(InMemoryDuelStore::new()), 3));
        let duel = engine
            .create_duel(CreateDuel {
                player1_id: ALICE.to_string(),
                player2_id: Some(profile.id.clone()),
                questions: questions(n),
                topic: None,
                difficulty: None,
            })
            .await
            .unwrap();
        (engine, duel)
    }

    #[test]
    fn perfect_accuracy_always_picks_the_correct_option() {
        let question = sample_question("q1", "b");
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(choose_answer(&question, 1.0, &mut rng), Some("b"));
        }
    }

    #[test]
    fn zero_accuracy_picks_among_incorrect_options() {
        let question = sample_question("q1", "b");
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let pick = choose_answer(&question, 0.0, &mut rng).unwrap();
            assert_ne!(pick, "b");
            seen.insert(pick);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn no_incorrect_option_falls_back_to_the_correct_one() {
        let question = Question {
            id: "q1".to_string(),
            prompt: "?".to_string(),
            options: vec![QuestionOption {
                id: "only".to_string(),
                text: "Only".to_string(),
                is_correct: true,
            }],
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(choose_answer(&question, 0.0, &mut rng), Some("only"));
    }

    #[test]
    fn accuracy_is_respected_over_many_draws() {
        let question = sample_question("q1", "a");
        let mut rng = StdRng::seed_from_u64(42);
        let hits = (0..4000)
            .filter(|_| choose_answer(&question, 0.7, &mut rng) == Some("a"))
            .count();
        let rate = hits as f64 / 4000.0;
        assert!((0.65..0.75).contains(&rate), "rate was {rate}");
    }

    #[test]
    fn think_delay_stays_in_range() {
        let profile = BotProfile {
            min_think_ms: 100,
            max_think_ms: 200,
            ..fast_bot(0.5)
        };
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let delay = profile.think_delay(&mut rng);
            assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn default_profiles_are_namespaced() {
        let profiles = BotProfile::defaults();
        assert_eq!(profiles.len(), 3);
        assert!(profiles.iter().all(|p| BotProfile::is_bot_id(&p.id)));
        assert!(!BotProfile::is_bot_id(ALICE));
    }

    #[tokio::test]
    async fn a_turn_is_claimed_only_once() {
        let profile = fast_bot(1.0);
        let (engine, duel) = bot_duel(&profile, 2).await;
        let bot = BotResponder::new(engine.clone(), profile);

        // alice holds the first turn
        assert_eq!(bot.claim_turn(&duel), None);

        let after = engine.submit_answer(&duel.id, ALICE, Some("a")).await.unwrap();
        assert_eq!(bot.claim_turn(&after), Some(0));
        assert_eq!(bot.claim_turn(&after), None);

        let mut rng = StdRng::seed_from_u64(9);
        let answered = bot.answer_turn(&duel.id, 0, &mut rng).await.unwrap().unwrap();
        assert_eq!(answered.player2_score, 1);

        // a stale claim cannot submit twice
        assert!(bot.answer_turn(&duel.id, 0, &mut rng).await.unwrap().is_none());
        assert_eq!(engine.get_duel(&duel.id).await.unwrap().player2_answers.len(), 1);
    }

    #[tokio::test]
    async fn spawned_bot_plays_every_turn() {
        let profile = fast_bot(1.0);
        let (engine, duel) = bot_duel(&profile, 3).await;
        let bot = Arc::new(BotResponder::new(engine.clone(), profile));
        let handle = bot.spawn(&duel.id);
        assert_eq!(handle.bot_id(), "bot:test");

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let current = engine.get_duel(&duel.id).await.unwrap();
                    if current.current_turn.as_deref() == Some(ALICE) {
                        break;
                    }
                    sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .unwrap();
            engine.submit_answer(&duel.id, ALICE, Some("b")).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let done = engine.get_duel(&duel.id).await.unwrap();
        assert_eq!(done.status, DuelStatus::Finished);
        assert_eq!(done.player2_score, 3);
        assert_eq!(done.winner_id.as_deref(), Some("bot:test"));
    }
}
