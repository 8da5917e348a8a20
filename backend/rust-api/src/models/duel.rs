use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::{Question, QuestionView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuelStatus {
    Waiting,
    Active,
    Finished,
    Cancelled,
}

impl DuelStatus {
    /// Status only moves forward: waiting -> active -> finished, or into cancelled.
    pub fn can_transition_to(self, next: DuelStatus) -> bool {
        matches!(
            (self, next),
            (DuelStatus::Waiting, DuelStatus::Active)
                | (DuelStatus::Waiting, DuelStatus::Cancelled)
                | (DuelStatus::Active, DuelStatus::Finished)
                | (DuelStatus::Active, DuelStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DuelStatus::Finished | DuelStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DuelStatus::Waiting => "waiting",
            DuelStatus::Active => "active",
            DuelStatus::Finished => "finished",
            DuelStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DuelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    /// `None` is an explicit no-answer (turn timeout).
    pub answer_id: Option<String>,
    pub is_correct: bool,
    pub time_spent_seconds: u32,
    pub answered_at: DateTime<Utc>,
}

impl AnswerRecord {
    fn to_view(&self, sealed: bool) -> AnswerView {
        AnswerView {
            question_id: self.question_id.clone(),
            answer_id: if sealed { None } else { self.answer_id.clone() },
            is_correct: if sealed { None } else { Some(self.is_correct) },
            sealed,
            time_spent_seconds: self.time_spent_seconds,
            answered_at: self.answered_at,
        }
    }
}

/// An answer-log entry as one viewer sees it. Sealed entries hide the pick
/// and its grading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerView {
    pub question_id: String,
    pub answer_id: Option<String>,
    pub is_correct: Option<bool>,
    pub sealed: bool,
    pub time_spent_seconds: u32,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn other(self) -> PlayerSlot {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duel {
    pub id: String,
    pub player1_id: String,
    pub player2_id: Option<String>,
    pub questions: Vec<Question>,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub current_question_index: usize,
    pub current_turn: Option<String>,
    pub turn_started_at: Option<DateTime<Utc>>,
    pub player1_answers: Vec<AnswerRecord>,
    pub player2_answers: Vec<AnswerRecord>,
    pub player1_score: u32,
    pub player2_score: u32,
    pub status: DuelStatus,
    pub winner_id: Option<String>,
    pub cancelled_by: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Duel {
    pub fn slot_of(&self, player_id: &str) -> Option<PlayerSlot> {
        if self.player1_id == player_id {
            Some(PlayerSlot::One)
        } else if self.player2_id.as_deref() == Some(player_id) {
            Some(PlayerSlot::Two)
        } else {
            None
        }
    }

    pub fn is_participant(&self, player_id: &str) -> bool {
        self.slot_of(player_id).is_some()
    }

    pub fn player_id(&self, slot: PlayerSlot) -> Option<&str> {
        match slot {
            PlayerSlot::One => Some(self.player1_id.as_str()),
            PlayerSlot::Two => self.player2_id.as_deref(),
        }
    }

    pub fn answers(&self, slot: PlayerSlot) -> &[AnswerRecord] {
        match slot {
            PlayerSlot::One => &self.player1_answers,
            PlayerSlot::Two => &self.player2_answers,
        }
    }

    pub fn answers_mut(&mut self, slot: PlayerSlot) -> &mut Vec<AnswerRecord> {
        match slot {
            PlayerSlot::One => &mut self.player1_answers,
            PlayerSlot::Two => &mut self.player2_answers,
        }
    }

    pub fn score(&self, slot: PlayerSlot) -> u32 {
        match slot {
            PlayerSlot::One => self.player1_score,
            PlayerSlot::Two => self.player2_score,
        }
    }

    pub fn score_mut(&mut self, slot: PlayerSlot) -> &mut u32 {
        match slot {
            PlayerSlot::One => &mut self.player1_score,
            PlayerSlot::Two => &mut self.player2_score,
        }
    }

    /// The question `player_id` has to answer next, if any remain.
    pub fn next_question_for(&self, player_id: &str) -> Option<&Question> {
        let slot = self.slot_of(player_id)?;
        self.questions.get(self.answers(slot).len())
    }

    pub fn has_completed(&self, slot: PlayerSlot) -> bool {
        self.answers(slot).len() >= self.questions.len()
    }

    /// The duel as `viewer_id` may see it. Options never carry the answer key,
    /// and an opponent's pick stays sealed until the viewer has answered the
    /// same question. Finished and cancelled duels are shown in full.
    pub fn to_view_for(&self, viewer_id: &str) -> DuelView {
        let viewer = self.slot_of(viewer_id);
        let revealed = |slot: PlayerSlot| -> Option<usize> {
            if self.status.is_terminal() || viewer == Some(slot) {
                None
            } else {
                Some(viewer.map_or(0, |own| self.answers(own).len()))
            }
        };
        let (answers1, score1) = self.log_view(PlayerSlot::One, revealed(PlayerSlot::One));
        let (answers2, score2) = self.log_view(PlayerSlot::Two, revealed(PlayerSlot::Two));

        DuelView {
            id: self.id.clone(),
            player1_id: self.player1_id.clone(),
            player2_id: self.player2_id.clone(),
            questions: self.questions.iter().map(Question::to_view).collect(),
            topic: self.topic.clone(),
            difficulty: self.difficulty.clone(),
            current_question_index: self.current_question_index,
            current_turn: self.current_turn.clone(),
            turn_started_at: self.turn_started_at,
            player1_answers: answers1,
            player2_answers: answers2,
            player1_score: score1,
            player2_score: score2,
            status: self.status,
            winner_id: self.winner_id.clone(),
            cancelled_by: self.cancelled_by.clone(),
            version: self.version,
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }

    /// `revealed` is how many leading entries are open; `None` opens all.
    /// The score only counts open entries.
    fn log_view(&self, slot: PlayerSlot, revealed: Option<usize>) -> (Vec<AnswerView>, u32) {
        let log = self.answers(slot);
        match revealed {
            None => (
                log.iter().map(|record| record.to_view(false)).collect(),
                self.score(slot),
            ),
            Some(open) => {
                let views = log
                    .iter()
                    .enumerate()
                    .map(|(i, record)| record.to_view(i >= open))
                    .collect();
                let score = log.iter().take(open).filter(|r| r.is_correct).count() as u32;
                (views, score)
            }
        }
    }
}

/// What clients see: the duel without the answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelView {
    pub id: String,
    pub player1_id: String,
    pub player2_id: Option<String>,
    pub questions: Vec<QuestionView>,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub current_question_index: usize,
    pub current_turn: Option<String>,
    pub turn_started_at: Option<DateTime<Utc>>,
    pub player1_answers: Vec<AnswerView>,
    pub player2_answers: Vec<AnswerView>,
    pub player1_score: u32,
    pub player2_score: u32,
    pub status: DuelStatus,
    pub winner_id: Option<String>,
    pub cancelled_by: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(DuelStatus::Waiting.can_transition_to(DuelStatus::Active));
        assert!(DuelStatus::Active.can_transition_to(DuelStatus::Finished));
        assert!(DuelStatus::Active.can_transition_to(DuelStatus::Cancelled));
        assert!(!DuelStatus::Active.can_transition_to(DuelStatus::Waiting));
        assert!(!DuelStatus::Finished.can_transition_to(DuelStatus::Active));
        assert!(!DuelStatus::Cancelled.can_transition_to(DuelStatus::Active));
        assert!(!DuelStatus::Waiting.can_transition_to(DuelStatus::Finished));
    }

    fn record(question_id: &str, answer_id: &str, is_correct: bool) -> AnswerRecord {
        AnswerRecord {
            question_id: question_id.to_string(),
            answer_id: Some(answer_id.to_string()),
            is_correct,
            time_spent_seconds: 3,
            answered_at: Utc::now(),
        }
    }

    fn duel_with_logs(p1: Vec<AnswerRecord>, p2: Vec<AnswerRecord>) -> Duel {
        let now = Utc::now();
        Duel {
            id: "d1".to_string(),
            player1_id: "alice".to_string(),
            player2_id: Some("bob".to_string()),
            questions: Vec::new(),
            topic: None,
            difficulty: None,
            current_question_index: 0,
            current_turn: Some("bob".to_string()),
            turn_started_at: Some(now),
            player1_score: p1.iter().filter(|r| r.is_correct).count() as u32,
            player2_score: p2.iter().filter(|r| r.is_correct).count() as u32,
            player1_answers: p1,
            player2_answers: p2,
            status: DuelStatus::Active,
            winner_id: None,
            cancelled_by: None,
            version: 1,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    #[test]
    fn opponent_pick_is_sealed_until_viewer_answers() {
        let duel = duel_with_logs(vec![record("q1", "a", true)], vec![]);

        let bob = duel.to_view_for("bob");
        let entry = &bob.player1_answers[0];
        assert!(entry.sealed);
        assert_eq!(entry.answer_id, None);
        assert_eq!(entry.is_correct, None);
        assert_eq!(entry.question_id, "q1");
        assert_eq!(bob.player1_score, 0);

        let alice = duel.to_view_for("alice");
        assert!(!alice.player1_answers[0].sealed);
        assert_eq!(alice.player1_answers[0].answer_id.as_deref(), Some("a"));
        assert_eq!(alice.player1_score, 1);
    }

    #[test]
    fn answered_questions_open_up() {
        let mut duel = duel_with_logs(
            vec![record("q1", "a", true), record("q2", "b", true)],
            vec![record("q1", "c", false)],
        );

        let bob = duel.to_view_for("bob");
        assert!(!bob.player1_answers[0].sealed);
        assert_eq!(bob.player1_answers[0].is_correct, Some(true));
        assert!(bob.player1_answers[1].sealed);
        assert_eq!(bob.player1_score, 1);

        let outsider = duel.to_view_for("mallory");
        assert!(outsider.player1_answers.iter().all(|a| a.sealed));
        assert!(outsider.player2_answers.iter().all(|a| a.sealed));

        duel.status = DuelStatus::Cancelled;
        let bob = duel.to_view_for("bob");
        assert!(bob.player1_answers.iter().all(|a| !a.sealed));
        assert_eq!(bob.player1_score, 2);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&DuelStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
