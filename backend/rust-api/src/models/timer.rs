use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::duel::DuelView;

/// Events pushed to clients over the duel SSE stream.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DuelStreamEvent {
    DuelUpdated(DuelView),
    TurnTick(TurnTick),
    DuelClosed(DuelClosed),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TurnTick {
    pub duel_id: String,
    pub current_turn: String,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DuelClosed {
    pub duel_id: String,
    pub status: super::duel::DuelStatus,
    pub winner_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DuelStreamEvent {
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            DuelStreamEvent::DuelUpdated(_) => "duel-updated",
            DuelStreamEvent::TurnTick(_) => "turn-tick",
            DuelStreamEvent::DuelClosed(_) => "duel-closed",
        }
    }
}
