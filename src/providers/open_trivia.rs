use async_trait::async_trait;
use serde::Deserialize;
use std::borrow::Cow;
use std::time::Duration;

use crate::content::{Question, QuestionOrigin};
use crate::providers::{FetchOutcome, FetchRequest, QuestionProvider, apply_topic_filter, place_answer};

/// Adapter for the public trivia API (opentdb.com-style):
/// `GET {base}/api.php?amount=..&encode=url3986[&category=..][&difficulty=..][&type=..]`.
pub struct OpenTriviaProvider {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OpenTriviaResponse {
    #[serde(default)]
    results: Vec<OpenTriviaResult>,
}

#[derive(Debug, Deserialize)]
struct OpenTriviaResult {
    #[serde(default)]
    question: String,
    #[serde(default)]
    correct_answer: String,
    #[serde(default)]
    incorrect_answers: Vec<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    difficulty: String,
}

/// Percent-decodes one field, keeping the raw text when decoding fails so a
/// single bad field never sinks the whole batch.
fn decode_field(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

impl OpenTriviaProvider {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    /// Normalizes a raw payload into canonical questions: decode fields,
    /// merge-and-shuffle the option list, drop records with fewer than two
    /// options, bias by topic, cap at the requested amount.
    fn normalize(
        results: Vec<OpenTriviaResult>,
        amount: usize,
        topic: Option<&str>,
    ) -> Vec<Question> {
        let mapped: Vec<Question> = results
            .into_iter()
            .enumerate()
            .filter_map(|(idx, raw)| {
                let prompt = if raw.question.is_empty() {
                    format!("Question {}", idx + 1)
                } else {
                    decode_field(&raw.question)
                };
                let correct = decode_field(&raw.correct_answer);
                let distractors: Vec<String> =
                    raw.incorrect_answers.iter().map(|s| decode_field(s)).collect();

                let (options, correct_index) = place_answer(correct, distractors);
                if options.len() < 2 {
                    tracing::debug!(
                        question.index = idx,
                        "Dropping remote question with fewer than two options"
                    );
                    return None;
                }

                let topic = if raw.category.is_empty() {
                    "opentdb".to_string()
                } else {
                    decode_field(&raw.category).to_lowercase()
                };
                let difficulty = if raw.difficulty.is_empty() {
                    "medium".to_string()
                } else {
                    raw.difficulty
                };

                Some(Question {
                    id: idx as u32 + 1,
                    prompt,
                    options,
                    correct_index,
                    topic,
                    difficulty,
                    origin: QuestionOrigin::OpenTrivia,
                })
            })
            .collect();

        let mut biased = apply_topic_filter(mapped, topic);
        biased.truncate(amount);
        biased
    }
}

#[async_trait]
impl QuestionProvider for OpenTriviaProvider {
    fn name(&self) -> &'static str {
        "open_trivia"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let amount = request.clamped_amount();
        let url = format!("{}/api.php", self.base_url);

        let mut query: Vec<(&str, String)> = vec![
            ("amount", amount.to_string()),
            ("encode", "url3986".to_string()),
        ];
        if let Some(category) = &request.category {
            query.push(("category", category.clone()));
        }
        if let Some(difficulty) = &request.difficulty {
            query.push(("difficulty", difficulty.clone()));
        }
        if let Some(answer_type) = &request.answer_type {
            query.push(("type", answer_type.clone()));
        }

        tracing::debug!(http.url = %url, request.amount = amount, "Fetching from primary trivia provider");

        let response = match self.http.get(&url).query(&query).send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::Failed(format!("request error: {}", e));
            }
        };

        if !response.status().is_success() {
            return FetchOutcome::Failed(format!("unexpected status {}", response.status()));
        }

        let payload = match response.json::<OpenTriviaResponse>().await {
            Ok(payload) => payload,
            Err(e) => {
                return FetchOutcome::Failed(format!("malformed payload: {}", e));
            }
        };

        if payload.results.is_empty() {
            return FetchOutcome::Empty;
        }

        let questions = Self::normalize(payload.results, amount, request.topic.as_deref());
        tracing::debug!(
            questions.count = questions.len(),
            "Normalized primary provider batch"
        );
        FetchOutcome::from_batch(questions)
    }
}
