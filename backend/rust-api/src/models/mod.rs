use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod duel;
pub mod question;
pub mod timer;

pub use duel::{AnswerRecord, AnswerView, Duel, DuelStatus, DuelView, PlayerSlot};
pub use question::{Question, QuestionOption, QuestionView};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDuelRequest {
    /// Leave empty to open an invite that another player joins later.
    #[validate(length(min = 1, max = 128))]
    pub opponent_id: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub topic: String,
    #[validate(length(min = 1, max = 32))]
    pub difficulty: Option<String>,
    #[validate(range(min = 1, max = 20))]
    pub question_count: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBotDuelRequest {
    #[validate(length(min = 1, max = 64))]
    pub topic: String,
    #[validate(length(min = 1, max = 32))]
    pub difficulty: Option<String>,
    #[validate(range(min = 1, max = 20))]
    pub question_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    /// `null` submits an explicit no-answer.
    pub answer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DuelResponse {
    pub duel: DuelView,
}

impl DuelResponse {
    pub fn for_viewer(duel: &Duel, viewer_id: &str) -> Self {
        Self {
            duel: duel.to_view_for(viewer_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitAnswerResponse {
    pub correct: bool,
    pub duel: DuelView,
}
