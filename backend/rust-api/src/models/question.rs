use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
}

/// Why a question was rejected at duel creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionDefect {
    NoCorrectOption,
    MultipleCorrectOptions(usize),
    TooFewOptions(usize),
    DuplicateOptionId(String),
    DuplicateQuestionId,
}

impl std::fmt::Display for QuestionDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuestionDefect::NoCorrectOption => write!(f, "no option is marked correct"),
            QuestionDefect::MultipleCorrectOptions(n) => {
                write!(f, "{} options are marked correct", n)
            }
            QuestionDefect::TooFewOptions(n) => write!(f, "needs at least 2 options, has {}", n),
            QuestionDefect::DuplicateOptionId(id) => write!(f, "option id '{}' repeats", id),
            QuestionDefect::DuplicateQuestionId => write!(f, "question id repeats in the set"),
        }
    }
}

impl Question {
    /// Checks a single question: exactly one correct option, at least two
    /// options, unique option ids.
    pub fn validate(&self) -> Result<(), QuestionDefect> {
        if self.options.len() < 2 {
            return Err(QuestionDefect::TooFewOptions(self.options.len()));
        }

        let mut seen = HashSet::new();
        for option in &self.options {
            if !seen.insert(option.id.as_str()) {
                return Err(QuestionDefect::DuplicateOptionId(option.id.clone()));
            }
        }

        match self.options.iter().filter(|o| o.is_correct).count() {
            0 => Err(QuestionDefect::NoCorrectOption),
            1 => Ok(()),
            n => Err(QuestionDefect::MultipleCorrectOptions(n)),
        }
    }

    pub fn correct_option(&self) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.is_correct)
    }

    pub fn incorrect_options(&self) -> Vec<&QuestionOption> {
        self.options.iter().filter(|o| !o.is_correct).collect()
    }

    /// Unknown ids and `None` both score as incorrect.
    pub fn is_correct_answer(&self, answer_id: Option<&str>) -> bool {
        answer_id
            .and_then(|id| self.options.iter().find(|o| o.id == id))
            .map(|o| o.is_correct)
            .unwrap_or(false)
    }

    pub fn to_view(&self) -> QuestionView {
        QuestionView {
            id: self.id.clone(),
            prompt: self.prompt.clone(),
            options: self
                .options
                .iter()
                .map(|o| OptionView {
                    id: o.id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

/// Validates a whole question set, returning the offending question id on failure.
pub fn validate_question_set(questions: &[Question]) -> Result<(), (String, QuestionDefect)> {
    let mut ids = HashSet::new();
    for question in questions {
        if !ids.insert(question.id.as_str()) {
            return Err((question.id.clone(), QuestionDefect::DuplicateQuestionId));
        }
        question
            .validate()
            .map_err(|defect| (question.id.clone(), defect))?;
    }
    Ok(())
}

/// Client-facing question, stripped of the answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: String,
    pub prompt: String,
    pub options: Vec<OptionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionView {
    pub id: String,
    pub text: String,
}

#[cfg(test)]
pub(crate) fn sample_question(id: &str, correct: &str) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Question {}", id),
        options: ["a", "b", "c"]
            .iter()
            .map(|opt| QuestionOption {
                id: opt.to_string(),
                text: format!("Option {}", opt),
                is_correct: *opt == correct,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_question_passes() {
        assert!(sample_question("q1", "b").validate().is_ok());
    }

    #[test]
    fn question_without_correct_option_is_rejected() {
        let q = sample_question("q1", "none");
        assert_eq!(q.validate(), Err(QuestionDefect::NoCorrectOption));
    }

    #[test]
    fn question_with_two_correct_options_is_rejected() {
        let mut q = sample_question("q1", "a");
        q.options[2].is_correct = true;
        assert_eq!(q.validate(), Err(QuestionDefect::MultipleCorrectOptions(2)));
    }

    #[test]
    fn single_option_question_is_rejected() {
        let mut q = sample_question("q1", "a");
        q.options.truncate(1);
        assert_eq!(q.validate(), Err(QuestionDefect::TooFewOptions(1)));
    }

    #[test]
    fn duplicate_question_ids_are_rejected() {
        let set = vec![sample_question("q1", "a"), sample_question("q1", "b")];
        let err = validate_question_set(&set).unwrap_err();
        assert_eq!(err.0, "q1");
        assert_eq!(err.1, QuestionDefect::DuplicateQuestionId);
    }

    #[test]
    fn unknown_or_missing_answer_scores_incorrect() {
        let q = sample_question("q1", "c");
        assert!(q.is_correct_answer(Some("c")));
        assert!(!q.is_correct_answer(Some("a")));
        assert!(!q.is_correct_answer(Some("zzz")));
        assert!(!q.is_correct_answer(None));
    }

    #[test]
    fn view_hides_answer_key() {
        let view = sample_question("q1", "a").to_view();
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("is_correct"));
    }
}
