//! Error types for the duel engine and its store adapters.

use axum::http::StatusCode;
use thiserror::Error;

use crate::models::{question::QuestionDefect, DuelStatus};

/// Failures of the Duel Record Store contract.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duel {0} not found")]
    NotFound(String),

    #[error("duel {0} already exists")]
    AlreadyExists(String),

    /// Conditional write lost against a newer version.
    #[error("version conflict on duel {0}")]
    Conflict(String),

    /// Row exists but does not decode into a duel.
    #[error("duel {id} is unreadable: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Errors returned by the duel engine operations.
#[derive(Error, Debug)]
pub enum DuelError {
    #[error("duel {0} not found")]
    DuelNotFound(String),

    #[error("player {player_id} does not hold the turn in duel {duel_id}")]
    NotYourTurn { duel_id: String, player_id: String },

    #[error("duel {duel_id} is {status}, not accepting this action")]
    DuelNotActive { duel_id: String, status: DuelStatus },

    #[error("write conflict on duel {0}, retry budget exhausted")]
    WriteConflict(String),

    #[error("turn in duel {0} was already resolved by a concurrent submission")]
    TurnAlreadyResolved(String),

    #[error("question {question_id} is malformed: {defect}")]
    MalformedQuestion {
        question_id: String,
        defect: QuestionDefect,
    },

    #[error("a duel needs at least one question")]
    EmptyQuestionSet,

    #[error("topic {topic} has {available} matching questions, {requested} requested")]
    NotEnoughQuestions {
        topic: String,
        requested: usize,
        available: usize,
    },

    #[error("invalid players: {0}")]
    InvalidPlayers(String),

    #[error("player {player_id} is not part of duel {duel_id}")]
    NotParticipant { duel_id: String, player_id: String },

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl DuelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DuelError::DuelNotFound(_) => StatusCode::NOT_FOUND,
            DuelError::NotYourTurn { .. }
            | DuelError::DuelNotActive { .. }
            | DuelError::WriteConflict(_)
            | DuelError::TurnAlreadyResolved(_) => StatusCode::CONFLICT,
            DuelError::MalformedQuestion { .. }
            | DuelError::EmptyQuestionSet
            | DuelError::NotEnoughQuestions { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DuelError::InvalidPlayers(_) => StatusCode::BAD_REQUEST,
            DuelError::NotParticipant { .. } => StatusCode::FORBIDDEN,
            DuelError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the rejected-submission metric.
    pub fn reason(&self) -> &'static str {
        match self {
            DuelError::DuelNotFound(_) => "not_found",
            DuelError::NotYourTurn { .. } => "not_your_turn",
            DuelError::DuelNotActive { .. } => "not_active",
            DuelError::WriteConflict(_) => "write_conflict",
            DuelError::TurnAlreadyResolved(_) => "turn_already_resolved",
            DuelError::MalformedQuestion { .. } => "malformed_question",
            DuelError::EmptyQuestionSet => "empty_question_set",
            DuelError::NotEnoughQuestions { .. } => "not_enough_questions",
            DuelError::InvalidPlayers(_) => "invalid_players",
            DuelError::NotParticipant { .. } => "not_participant",
            DuelError::Storage(_) => "storage",
        }
    }

    /// Lost races and stale submissions; callers treat these as no-ops.
    pub fn is_stale_submission(&self) -> bool {
        matches!(
            self,
            DuelError::NotYourTurn { .. }
                | DuelError::TurnAlreadyResolved(_)
                | DuelError::DuelNotActive { .. }
        )
    }
}

impl From<StoreError> for DuelError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => DuelError::DuelNotFound(id),
            StoreError::Corrupt { id, reason } => {
                tracing::warn!("Treating unreadable duel {} as missing: {}", id, reason);
                DuelError::DuelNotFound(id)
            }
            StoreError::Conflict(id) => DuelError::WriteConflict(id),
            StoreError::AlreadyExists(id) => {
                DuelError::Storage(anyhow::anyhow!("duel {} already exists", id))
            }
            StoreError::Backend(e) => DuelError::Storage(e),
        }
    }
}
