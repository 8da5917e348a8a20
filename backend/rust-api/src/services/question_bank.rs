use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::Database;

use crate::models::{Question, QuestionOption};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// Supplies the ordered question set fixed at duel creation. An unknown
/// topic yields an empty set, not an error.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn questions_for(
        &self,
        topic: &str,
        difficulty: Option<&str>,
        count: usize,
    ) -> Result<Vec<Question>>;
}

/// Built-in financial-literacy questions, used in dev and tests.
pub struct StaticQuestionBank {
    entries: Vec<(String, String, Question)>,
}

impl StaticQuestionBank {
    pub fn new(entries: Vec<(String, String, Question)>) -> Self {
        Self { entries }
    }

    pub fn with_defaults() -> Self {
        let q = |id: &str, prompt: &str, options: &[(&str, &str, bool)]| Question {
            id: id.to_string(),
            prompt: prompt.to_string(),
            options: options
                .iter()
                .map(|(oid, text, ok)| QuestionOption {
                    id: oid.to_string(),
                    text: text.to_string(),
                    is_correct: *ok,
                })
                .collect(),
        };

        let basics = [
            q(
                "basics-1",
                "What is an emergency fund for?",
                &[
                    ("a", "Covering unexpected expenses", true),
                    ("b", "Buying stocks on a dip", false),
                    ("c", "Paying for holidays", false),
                ],
            ),
            q(
                "basics-2",
                "Which usually charges the highest interest?",
                &[
                    ("a", "A mortgage", false),
                    ("b", "A credit card balance", true),
                    ("c", "A student loan", false),
                ],
            ),
            q(
                "basics-3",
                "What does compound interest earn interest on?",
                &[
                    ("a", "Only the original deposit", false),
                    ("b", "The deposit plus interest already earned", true),
                    ("c", "Nothing after the first year", false),
                ],
            ),
            q(
                "basics-4",
                "Diversification mainly reduces...",
                &[
                    ("a", "Taxes", false),
                    ("b", "Fees", false),
                    ("c", "Risk from any single investment", true),
                ],
            ),
            q(
                "basics-5",
                "Inflation makes a fixed amount of cash...",
                &[
                    ("a", "Buy less over time", true),
                    ("b", "Buy more over time", false),
                    ("c", "Keep the same value", false),
                ],
            ),
        ];

        let bitcoin = [
            q(
                "btc-1",
                "What is the maximum supply of bitcoin?",
                &[
                    ("a", "21 million", true),
                    ("b", "100 million", false),
                    ("c", "Unlimited", false),
                ],
            ),
            q(
                "btc-2",
                "Roughly how often is a new bitcoin block mined?",
                &[
                    ("a", "Every second", false),
                    ("b", "Every 10 minutes", true),
                    ("c", "Every day", false),
                ],
            ),
            q(
                "btc-3",
                "What is a halving?",
                &[
                    ("a", "Splitting a wallet in two", false),
                    ("b", "The block reward being cut in half", true),
                    ("c", "A 50% price drop", false),
                ],
            ),
        ];

        let mut entries = Vec::new();
        for question in basics {
            entries.push(("basics".to_string(), "easy".to_string(), question));
        }
        for question in bitcoin {
            entries.push(("bitcoin".to_string(), "medium".to_string(), question));
        }
        Self::new(entries)
    }
}

#[async_trait]
impl QuestionBank for StaticQuestionBank {
    async fn questions_for(
        &self,
        topic: &str,
        difficulty: Option<&str>,
        count: usize,
    ) -> Result<Vec<Question>> {
        let picked: Vec<Question> = self
            .entries
            .iter()
            .filter(|(t, d, _)| t == topic && difficulty.map_or(true, |want| want == d.as_str()))
            .map(|(_, _, question)| question.clone())
            .take(count)
            .collect();
        Ok(picked)
    }
}

/// Reads the `duel_questions` collection:
/// `{ _id, topic, difficulty, prompt, options: [{ id, text, is_correct }] }`.
pub struct MongoQuestionBank {
    mongo: Database,
}

impl MongoQuestionBank {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Random pick of up to `count` matching questions.
    fn sampling_pipeline(topic: &str, difficulty: Option<&str>, count: usize) -> Vec<Document> {
        let mut filter = doc! { "topic": topic };
        if let Some(difficulty) = difficulty {
            filter.insert("difficulty", difficulty);
        }
        vec![
            doc! { "$match": filter },
            doc! { "$sample": { "size": count as i64 } },
        ]
    }

    fn parse_question(document: &Document) -> Result<Question> {
        let id = match document.get("_id") {
            Some(Bson::ObjectId(oid)) => oid.to_hex(),
            Some(Bson::String(value)) => value.to_string(),
            _ => return Err(anyhow!("Question has unsupported _id type")),
        };
        let prompt = document
            .get_str("prompt")
            .map_err(|_| anyhow!("Question {} prompt missing", id))?
            .to_string();

        let options = document
            .get_array("options")
            .map_err(|_| anyhow!("Question {} options missing", id))?
            .iter()
            .map(|value| {
                let option = value
                    .as_document()
                    .ok_or_else(|| anyhow!("Question {} has a non-document option", id))?;
                Ok(QuestionOption {
                    id: option
                        .get_str("id")
                        .map_err(|_| anyhow!("Question {} option id missing", id))?
                        .to_string(),
                    text: option
                        .get_str("text")
                        .map_err(|_| anyhow!("Question {} option text missing", id))?
                        .to_string(),
                    is_correct: option.get_bool("is_correct").unwrap_or(false),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Question {
            id,
            prompt,
            options,
        })
    }
}

#[async_trait]
impl QuestionBank for MongoQuestionBank {
    async fn questions_for(
        &self,
        topic: &str,
        difficulty: Option<&str>,
        count: usize,
    ) -> Result<Vec<Question>> {
        let collection = self.mongo.collection::<Document>("duel_questions");
        let pipeline = Self::sampling_pipeline(topic, difficulty, count);

        let documents: Vec<Document> = retry_async_with_config(RetryConfig::patient(), || async {
            collection
                .aggregate(pipeline.clone())
                .await?
                .try_collect::<Vec<Document>>()
                .await
        })
        .await
        .context("Failed to query duel questions")?;

        // Shape problems surface here; the engine still validates the set.
        let questions = documents
            .iter()
            .map(Self::parse_question)
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Loaded {} questions for topic={} difficulty={:?}",
            questions.len(),
            topic,
            difficulty
        );
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::validate_question_set;

    #[tokio::test]
    async fn static_bank_filters_by_topic_and_difficulty() {
        let bank = StaticQuestionBank::with_defaults();
        let qs = bank.questions_for("bitcoin", Some("medium"), 2).await.unwrap();
        assert_eq!(qs.len(), 2);
        assert!(qs.iter().all(|q| q.id.starts_with("btc-")));

        assert!(bank.questions_for("bitcoin", Some("hard"), 2).await.unwrap().is_empty());
        assert!(bank.questions_for("stocks", None, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_defaults_are_well_formed() {
        let bank = StaticQuestionBank::with_defaults();
        let qs = bank.questions_for("basics", None, 100).await.unwrap();
        assert_eq!(qs.len(), 5);
        assert!(validate_question_set(&qs).is_ok());
    }

    #[test]
    fn mongo_documents_parse_into_questions() {
        let document = doc! {
            "_id": "q-42",
            "topic": "basics",
            "prompt": "Pick a",
            "options": [
                { "id": "a", "text": "A", "is_correct": true },
                { "id": "b", "text": "B" },
            ],
        };
        let question = MongoQuestionBank::parse_question(&document).unwrap();
        assert_eq!(question.id, "q-42");
        assert_eq!(question.options.len(), 2);
        assert!(question.options[0].is_correct);
        assert!(!question.options[1].is_correct);
    }

    #[test]
    fn mongo_pipeline_samples_within_topic() {
        let pipeline = MongoQuestionBank::sampling_pipeline("bitcoin", Some("easy"), 4);
        assert_eq!(pipeline.len(), 2);
        let filter = pipeline[0].get_document("$match").unwrap();
        assert_eq!(filter.get_str("topic").unwrap(), "bitcoin");
        assert_eq!(filter.get_str("difficulty").unwrap(), "easy");
        let sample = pipeline[1].get_document("$sample").unwrap();
        assert_eq!(sample.get_i64("size").unwrap(), 4);

        let any_level = MongoQuestionBank::sampling_pipeline("basics", None, 1);
        assert!(!any_level[0].get_document("$match").unwrap().contains_key("difficulty"));
    }

    #[test]
    fn mongo_documents_without_options_are_rejected() {
        let document = doc! { "_id": "q-1", "prompt": "?" };
        assert!(MongoQuestionBank::parse_question(&document).is_err());
    }
}
