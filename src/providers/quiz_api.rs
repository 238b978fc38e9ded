use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::content::{Question, QuestionOrigin};
use crate::providers::{FetchOutcome, FetchRequest, QuestionProvider, place_answer};

/// Adapter for the keyed commercial quiz API
/// (`GET {base}/api/v1/questions?limit=N` with an `X-Api-Key` header).
///
/// The key is handed in at construction; nothing else in the core ever sees
/// it. Browsers reach the same upstream through the relay in `web::proxy`.
pub struct QuizApiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

// The upstream encodes options as `answers.answer_a..answer_f` (nullable)
// with matching `correct_answers.answer_a_correct` string flags. BTreeMap
// keeps the answer slots in key order.
#[derive(Debug, Deserialize)]
struct QuizApiQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    answers: BTreeMap<String, Option<String>>,
    #[serde(default)]
    correct_answers: BTreeMap<String, Option<String>>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

impl QuizApiProvider {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            api_key,
        }
    }

    fn normalize(items: Vec<QuizApiQuestion>, amount: usize) -> Vec<Question> {
        let mut questions: Vec<Question> = items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, raw)| {
                let mut correct: Option<String> = None;
                let mut distractors: Vec<String> = Vec::new();

                for (slot, text) in &raw.answers {
                    let Some(text) = text else { continue };
                    let flag_key = format!("{}_correct", slot);
                    let is_correct = raw
                        .correct_answers
                        .get(&flag_key)
                        .and_then(|v| v.as_deref())
                        .map(|v| v.eq_ignore_ascii_case("true"))
                        .unwrap_or(false);
                    if is_correct && correct.is_none() {
                        correct = Some(text.clone());
                    } else {
                        distractors.push(text.clone());
                    }
                }

                let correct = match correct {
                    Some(correct) => correct,
                    None => {
                        tracing::debug!(
                            question.index = idx,
                            "Dropping keyed-provider question with no flagged correct answer"
                        );
                        return None;
                    }
                };

                let (options, correct_index) = place_answer(correct, distractors);
                if options.len() < 2 {
                    tracing::debug!(
                        question.index = idx,
                        "Dropping keyed-provider question with fewer than two options"
                    );
                    return None;
                }

                Some(Question {
                    id: idx as u32 + 1,
                    prompt: raw.question,
                    options,
                    correct_index,
                    topic: raw
                        .category
                        .filter(|c| !c.is_empty())
                        .map(|c| c.to_lowercase())
                        .unwrap_or_else(|| "quizapi".to_string()),
                    difficulty: raw
                        .difficulty
                        .filter(|d| !d.is_empty())
                        .unwrap_or_else(|| "medium".to_string()),
                    origin: QuestionOrigin::QuizApi,
                })
            })
            .collect();

        questions.truncate(amount);
        questions
    }
}

#[async_trait]
impl QuestionProvider for QuizApiProvider {
    fn name(&self) -> &'static str {
        "quiz_api"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let amount = request.clamped_amount();
        let url = format!("{}/api/v1/questions", self.base_url);

        tracing::debug!(http.url = %url, request.amount = amount, "Fetching from keyed quiz provider");

        let response = match self
            .http
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("limit", amount.to_string())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::Failed(format!("request error: {}", e));
            }
        };

        if !response.status().is_success() {
            return FetchOutcome::Failed(format!("unexpected status {}", response.status()));
        }

        let items = match response.json::<Vec<QuizApiQuestion>>().await {
            Ok(items) => items,
            Err(e) => {
                return FetchOutcome::Failed(format!("malformed payload: {}", e));
            }
        };

        if items.is_empty() {
            return FetchOutcome::Empty;
        }

        let questions = Self::normalize(items, amount);
        tracing::debug!(
            questions.count = questions.len(),
            "Normalized keyed provider batch"
        );
        FetchOutcome::from_batch(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(question: &str, answers: &[(&str, Option<&str>)], correct_slot: &str) -> QuizApiQuestion {
        let answers_map: BTreeMap<String, Option<String>> = answers
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(|s| s.to_string())))
            .collect();
        let correct_answers = answers
            .iter()
            .map(|(k, _)| {
                let flag = if *k == correct_slot { "true" } else { "false" };
                (format!("{}_correct", k), Some(flag.to_string()))
            })
            .collect();
        QuizApiQuestion {
            question: question.to_string(),
            answers: answers_map,
            correct_answers,
            category: Some("Linux".to_string()),
            difficulty: Some("Easy".to_string()),
        }
    }

    #[test]
    fn normalize_collects_non_null_answers_and_flags_correct() {
        let items = vec![item(
            "Which command lists directory contents?",
            &[
                ("answer_a", Some("ls")),
                ("answer_b", Some("cd")),
                ("answer_c", Some("rm")),
                ("answer_d", None),
            ],
            "answer_a",
        )];
        let questions = QuizApiProvider::normalize(items, 10);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].options.len(), 3);
        assert_eq!(questions[0].correct_text(), "ls");
        assert_eq!(questions[0].topic, "linux");
        assert_eq!(questions[0].origin, QuestionOrigin::QuizApi);
    }

    #[test]
    fn normalize_drops_items_without_a_correct_flag() {
        let mut bad = item(
            "No flagged answer",
            &[("answer_a", Some("x")), ("answer_b", Some("y"))],
            "answer_a",
        );
        bad.correct_answers.clear();
        let good = item(
            "Flagged",
            &[("answer_a", Some("x")), ("answer_b", Some("y"))],
            "answer_b",
        );
        let questions = QuizApiProvider::normalize(vec![bad, good], 10);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].prompt, "Flagged");
        assert_eq!(questions[0].correct_text(), "y");
    }

    #[test]
    fn normalize_drops_items_with_a_single_answer() {
        let items = vec![item("Single", &[("answer_a", Some("only"))], "answer_a")];
        let questions = QuizApiProvider::normalize(items, 10);
        assert!(questions.is_empty());
    }
}
