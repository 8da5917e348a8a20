use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::duel_service::DuelEngine;
use crate::metrics::TURN_TIMEOUTS_TOTAL;
use crate::models::{Duel, DuelStatus};
use crate::utils::time::remaining_since;

/// Pause before re-reading a duel after a forced submission hit a backend error.
const RETRY_PAUSE: Duration = Duration::from_millis(250);

/// Identifies one turn: who holds it and when it began.
type TurnKey = (String, DateTime<Utc>);

/// Per-duel countdown that forces a no-answer when the turn holder runs out
/// of time. Re-arms on every committed change.
pub struct TurnClock {
    engine: Arc<DuelEngine>,
    duel_id: String,
    turn_duration: Duration,
}

/// Owning handle for a running clock; dropping it stops the clock.
pub struct TurnClockHandle {
    duel_id: String,
    task: JoinHandle<()>,
}

impl TurnClockHandle {
    pub fn duel_id(&self) -> &str {
        &self.duel_id
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TurnClockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TurnClock {
    pub fn start(engine: Arc<DuelEngine>, duel_id: &str, turn_duration: Duration) -> TurnClockHandle {
        let clock = TurnClock {
            engine,
            duel_id: duel_id.to_string(),
            turn_duration,
        };
        TurnClockHandle {
            duel_id: duel_id.to_string(),
            task: tokio::spawn(clock.run()),
        }
    }

    async fn run(self) {
        // Subscribe before the first read so no commit slips between the two.
        let mut changes = self.engine.subscribe(&self.duel_id);
        let mut duel = match self.engine.get_duel(&self.duel_id).await {
            Ok(duel) => duel,
            Err(e) => {
                tracing::warn!("Turn clock for duel {} not started: {}", self.duel_id, e);
                return;
            }
        };
        tracing::debug!(
            "Turn clock started: duel={}, turn_duration={:?}",
            self.duel_id,
            self.turn_duration
        );

        let mut fired_for: Option<TurnKey> = None;

        loop {
            if duel.status.is_terminal() {
                tracing::debug!("Turn clock stopped: duel={} is {}", self.duel_id, duel.status);
                return;
            }

            let armed = armed_turn(&duel).filter(|key| fired_for.as_ref() != Some(key));
            let Some((holder, started_at)) = armed else {
                match changes.recv().await {
                    Some(next) => duel = newer(duel, next),
                    None => return,
                }
                continue;
            };

            let wait = remaining_since(started_at, self.turn_duration, Utc::now());
            tokio::select! {
                changed = changes.recv() => match changed {
                    Some(next) => duel = newer(duel, next),
                    None => return,
                },
                _ = sleep(wait) => {
                    fired_for = Some((holder.clone(), started_at));
                    match self.engine.submit_answer(&self.duel_id, &holder, None).await {
                        Ok(next) => {
                            TURN_TIMEOUTS_TOTAL.inc();
                            tracing::info!(
                                "Turn expired: duel={}, player={}",
                                self.duel_id,
                                holder
                            );
                            duel = newer(duel, next);
                        }
                        Err(e) if e.is_stale_submission() => {
                            tracing::debug!("Turn clock lost the race on duel {}: {}", self.duel_id, e);
                        }
                        Err(e) => {
                            tracing::warn!("Turn clock failed to expire turn on duel {}: {}", self.duel_id, e);
                            fired_for = None;
                            sleep(RETRY_PAUSE).await;
                            if let Ok(fresh) = self.engine.get_duel(&self.duel_id).await {
                                duel = newer(duel, fresh);
                            }
                        }
                    }
                }
            }
        }
    }
}

fn armed_turn(duel: &Duel) -> Option<TurnKey> {
    if duel.status != DuelStatus::Active {
        return None;
    }
    Some((duel.current_turn.clone()?, duel.turn_started_at?))
}

fn newer(current: Duel, candidate: Duel) -> Duel {
    if candidate.version >= current.version {
        candidate
    } else {
        current
    }
}
