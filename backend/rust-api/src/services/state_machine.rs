//! Pure duel transitions. Nothing here touches storage; `DuelEngine` feeds
//! the current state in and persists whatever comes out.

use chrono::{DateTime, Utc};

use crate::error::DuelError;
use crate::models::question::validate_question_set;
use crate::models::{AnswerRecord, Duel, DuelStatus, PlayerSlot, Question};
use crate::utils::time::seconds_between;

/// Result of applying one answer.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub duel: Duel,
    pub record: AnswerRecord,
    pub finished: bool,
}

/// Builds a validated duel in `waiting` with empty answer logs.
pub fn new_duel(
    id: String,
    player1_id: String,
    player2_id: Option<String>,
    questions: Vec<Question>,
    topic: Option<String>,
    difficulty: Option<String>,
    now: DateTime<Utc>,
) -> Result<Duel, DuelError> {
    if player1_id.trim().is_empty() {
        return Err(DuelError::InvalidPlayers("player id is empty".to_string()));
    }
    if let Some(ref p2) = player2_id {
        if p2.trim().is_empty() {
            return Err(DuelError::InvalidPlayers("opponent id is empty".to_string()));
        }
        if *p2 == player1_id {
            return Err(DuelError::InvalidPlayers(
                "a player cannot duel themselves".to_string(),
            ));
        }
    }
    if questions.is_empty() {
        return Err(DuelError::EmptyQuestionSet);
    }
    validate_question_set(&questions)
        .map_err(|(question_id, defect)| DuelError::MalformedQuestion { question_id, defect })?;

    Ok(Duel {
        id,
        player1_id,
        player2_id,
        questions,
        topic,
        difficulty,
        current_question_index: 0,
        current_turn: None,
        turn_started_at: None,
        player1_answers: Vec::new(),
        player2_answers: Vec::new(),
        player1_score: 0,
        player2_score: 0,
        status: DuelStatus::Waiting,
        winner_id: None,
        cancelled_by: None,
        version: 0,
        created_at: now,
        updated_at: now,
        finished_at: None,
    })
}

/// waiting -> active, first turn to player 1. Requires both players bound.
pub fn activate(duel: &Duel, now: DateTime<Utc>) -> Result<Duel, DuelError> {
    if !duel.status.can_transition_to(DuelStatus::Active) || duel.player2_id.is_none() {
        return Err(not_active(duel));
    }

    let mut next = duel.clone();
    next.status = DuelStatus::Active;
    next.current_turn = Some(duel.player1_id.clone());
    next.turn_started_at = Some(now);
    next.current_question_index = 0;
    Ok(next)
}

/// Binds the second seat of an open invite and activates the duel.
pub fn bind_opponent(duel: &Duel, player_id: &str, now: DateTime<Utc>) -> Result<Duel, DuelError> {
    if player_id.trim().is_empty() {
        return Err(DuelError::InvalidPlayers("player id is empty".to_string()));
    }
    if duel.player1_id == player_id {
        return Err(DuelError::InvalidPlayers(
            "a player cannot join their own duel".to_string(),
        ));
    }
    if duel.status != DuelStatus::Waiting || duel.player2_id.is_some() {
        return Err(not_active(duel));
    }

    let mut bound = duel.clone();
    bound.player2_id = Some(player_id.to_string());
    activate(&bound, now)
}

/// Rejects anything but the turn holder of an active duel. No state changes.
pub fn check_turn(duel: &Duel, player_id: &str) -> Result<PlayerSlot, DuelError> {
    if duel.status != DuelStatus::Active {
        return Err(not_active(duel));
    }
    if duel.current_turn.as_deref() != Some(player_id) {
        return Err(not_your_turn(duel, player_id));
    }
    // current_turn is always a participant while active
    duel.slot_of(player_id)
        .ok_or_else(|| not_your_turn(duel, player_id))
}

/// Scores `answer_id` against the acting player's next question, appends it
/// to their log, and hands the turn over or finishes the duel.
pub fn apply_answer(
    duel: &Duel,
    player_id: &str,
    answer_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AnswerOutcome, DuelError> {
    let slot = check_turn(duel, player_id)?;
    let question = duel
        .questions
        .get(duel.answers(slot).len())
        .ok_or_else(|| not_your_turn(duel, player_id))?;

    let is_correct = question.is_correct_answer(answer_id);
    let record = AnswerRecord {
        question_id: question.id.clone(),
        answer_id: answer_id.map(str::to_string),
        is_correct,
        time_spent_seconds: seconds_between(duel.turn_started_at.unwrap_or(now), now),
        answered_at: now,
    };

    let mut next = duel.clone();
    next.answers_mut(slot).push(record.clone());
    if is_correct {
        *next.score_mut(slot) += 1;
    }

    let finished = next.has_completed(PlayerSlot::One) && next.has_completed(PlayerSlot::Two);
    if finished {
        next.status = DuelStatus::Finished;
        next.current_turn = None;
        next.turn_started_at = None;
        next.finished_at = Some(now);
        next.winner_id = resolve_winner(&next);
    } else {
        let other = slot.other();
        let next_slot = if next.has_completed(other) { slot } else { other };
        next.current_turn = next.player_id(next_slot).map(str::to_string);
        next.turn_started_at = Some(now);
    }
    next.current_question_index = shared_cursor(&next);

    Ok(AnswerOutcome {
        duel: next,
        record,
        finished,
    })
}

/// A participant abandons a waiting or active duel.
pub fn cancel(duel: &Duel, player_id: &str, now: DateTime<Utc>) -> Result<Duel, DuelError> {
    if !duel.is_participant(player_id) {
        return Err(DuelError::NotParticipant {
            duel_id: duel.id.clone(),
            player_id: player_id.to_string(),
        });
    }
    if !duel.status.can_transition_to(DuelStatus::Cancelled) {
        return Err(not_active(duel));
    }

    let mut next = duel.clone();
    next.status = DuelStatus::Cancelled;
    next.current_turn = None;
    next.turn_started_at = None;
    next.winner_id = None;
    next.cancelled_by = Some(player_id.to_string());
    Ok(next)
}

/// Strictly higher score wins; equal scores are a tie (`None`).
fn resolve_winner(duel: &Duel) -> Option<String> {
    match duel.player1_score.cmp(&duel.player2_score) {
        std::cmp::Ordering::Greater => Some(duel.player1_id.clone()),
        std::cmp::Ordering::Less => duel.player2_id.clone(),
        std::cmp::Ordering::Equal => None,
    }
}

/// Index both players have reached, clamped to the last question.
fn shared_cursor(duel: &Duel) -> usize {
    let answered_by_both = duel.player1_answers.len().min(duel.player2_answers.len());
    answered_by_both.min(duel.questions.len().saturating_sub(1))
}

fn not_active(duel: &Duel) -> DuelError {
    DuelError::DuelNotActive {
        duel_id: duel.id.clone(),
        status: duel.status,
    }
}

fn not_your_turn(duel: &Duel, player_id: &str) -> DuelError {
    DuelError::NotYourTurn {
        duel_id: duel.id.clone(),
        player_id: player_id.to_string(),
    }
}
