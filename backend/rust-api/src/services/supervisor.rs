use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::bot_service::{BotHandle, BotProfile, BotResponder};
use super::duel_service::DuelEngine;
use super::turn_clock::{TurnClock, TurnClockHandle};
use crate::models::{Duel, DuelStatus};

/// How often finished duels are swept out of the supervisor.
pub const REAP_INTERVAL: Duration = Duration::from_secs(30);

struct DuelTasks {
    clock: TurnClockHandle,
    bots: Vec<BotHandle>,
}

/// Owns the background tasks of every live duel: one turn clock each, plus a
/// responder per bot participant.
pub struct DuelSupervisor {
    engine: Arc<DuelEngine>,
    turn_duration: Duration,
    bots: Vec<BotProfile>,
    running: Mutex<HashMap<String, DuelTasks>>,
}

impl DuelSupervisor {
    pub fn new(engine: Arc<DuelEngine>, turn_duration: Duration, bots: Vec<BotProfile>) -> Self {
        Self {
            engine,
            turn_duration,
            bots,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<DuelEngine> {
        &self.engine
    }

    pub fn profile(&self, bot_id: &str) -> Option<&BotProfile> {
        self.bots.iter().find(|p| p.id == bot_id)
    }

    /// Bot for a requested difficulty, or the first configured one.
    pub fn bot_for_difficulty(&self, difficulty: Option<&str>) -> Option<&BotProfile> {
        difficulty
            .and_then(|want| {
                self.bots
                    .iter()
                    .find(|p| p.difficulty.as_deref() == Some(want))
            })
            .or_else(|| self.bots.first())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DuelTasks>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts the clock and bots for an active duel. Returns `false` when the
    /// duel is not active or already supervised.
    pub fn launch(&self, duel: &Duel) -> bool {
        if duel.status != DuelStatus::Active {
            return false;
        }

        let mut running = self.lock();
        running.retain(|_, tasks| !tasks.clock.is_finished());
        if running.contains_key(&duel.id) {
            return false;
        }

        let clock = TurnClock::start(self.engine.clone(), &duel.id, self.turn_duration);
        let participants = std::iter::once(duel.player1_id.as_str()).chain(duel.player2_id.as_deref());
        let mut bots = Vec::new();
        for player_id in participants.filter(|id| BotProfile::is_bot_id(id)) {
            match self.profile(player_id) {
                Some(profile) => {
                    let responder = Arc::new(BotResponder::new(self.engine.clone(), profile.clone()));
                    bots.push(responder.spawn(&duel.id));
                }
                None => tracing::warn!(
                    "Duel {} has unknown bot participant {}; only the clock will play for it",
                    duel.id,
                    player_id
                ),
            }
        }

        tracing::info!(
            "Supervising duel {}: turn_duration={:?}, bots={:?}",
            duel.id,
            self.turn_duration,
            bots.iter().map(|b| b.bot_id()).collect::<Vec<_>>()
        );
        running.insert(duel.id.clone(), DuelTasks { clock, bots });
        true
    }

    /// Stops the tasks of a duel right away.
    pub fn stop(&self, duel_id: &str) {
        if let Some(tasks) = self.lock().remove(duel_id) {
            tracing::debug!(
                "Stopping tasks for duel {} ({} bots)",
                tasks.clock.duel_id(),
                tasks.bots.len()
            );
        }
    }

    /// Drops the handles of duels whose clock has exited.
    pub fn reap(&self) -> usize {
        let mut running = self.lock();
        let before = running.len();
        running.retain(|_, tasks| !tasks.clock.is_finished());
        before - running.len()
    }

    /// Sweeps finished duels every `every` until the supervisor is dropped.
    pub fn spawn_reaper(supervisor: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let supervisor = Arc::downgrade(supervisor);
        tracing::info!("Starting duel reaper loop (interval {:?})", every);

        tokio::spawn(async move {
            loop {
                sleep(every).await;
                let Some(supervisor) = supervisor.upgrade() else {
                    tracing::debug!("Supervisor dropped, stopping duel reaper");
                    return;
                };
                let reaped = supervisor.reap();
                if reaped > 0 {
                    tracing::debug!("Reaped {} finished duels", reaped);
                }
            }
        })
    }

    pub fn is_supervised(&self, duel_id: &str) -> bool {
        self.lock().contains_key(duel_id)
    }

    pub fn supervised_count(&self) -> usize {
        self.lock().len()
    }
}
