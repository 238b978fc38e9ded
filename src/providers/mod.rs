use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::thread_rng;
use regex::Regex;
use std::sync::LazyLock;

use crate::content::Question;

pub mod local;
pub mod open_trivia;
pub mod quiz_api;

pub use local::LocalPoolProvider;
pub use open_trivia::OpenTriviaProvider;
pub use quiz_api::QuizApiProvider;

pub const MIN_BATCH: u8 = 1;
pub const MAX_BATCH: u8 = 50;

/// Vocabulary used to bias results towards JavaScript when that topic is
/// requested. Matched against prompt + category, case-insensitively.
static JS_TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)javascript|\bjs\b|node(\.js)?|react|vue|angular|programming|computer")
        .expect("JS topic regex is valid")
});

/// What a single provider attempt produced. `Empty` and `Failed` both advance
/// the fallback chain; keeping them distinct preserves the real error for
/// logging and future retry policies.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Batch(Vec<Question>),
    Empty,
    Failed(String),
}

impl FetchOutcome {
    /// Collapses an already-normalized batch, mapping zero questions to `Empty`.
    pub fn from_batch(questions: Vec<Question>) -> Self {
        if questions.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Batch(questions)
        }
    }

    pub fn into_questions(self) -> Option<Vec<Question>> {
        match self {
            FetchOutcome::Batch(questions) => Some(questions),
            FetchOutcome::Empty | FetchOutcome::Failed(_) => None,
        }
    }
}

/// Parameters for one acquisition attempt.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub amount: u8,
    /// Opaque provider-specific category id.
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub answer_type: Option<String>,
    pub topic: Option<String>,
}

impl FetchRequest {
    pub fn clamped_amount(&self) -> usize {
        self.amount.clamp(MIN_BATCH, MAX_BATCH) as usize
    }
}

#[async_trait]
pub trait QuestionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Never errors outward: all failure modes collapse into the outcome.
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// Merges the correct answer and distractors into one uniformly shuffled
/// option list and locates the correct answer's new position by value.
///
/// Shuffle and locate are one step: holding on to a pre-shuffle index here
/// would silently break the correctness invariant.
pub fn place_answer(correct: String, mut distractors: Vec<String>) -> (Vec<String>, usize) {
    let mut options = Vec::with_capacity(distractors.len() + 1);
    options.push(correct.clone());
    options.append(&mut distractors);
    options.shuffle(&mut thread_rng());
    let correct_index = options
        .iter()
        .position(|opt| *opt == correct)
        .unwrap_or(0);
    (options, correct_index)
}

/// Re-shuffles an existing question's options, recomputing the correct index
/// from the correct answer's text.
pub fn reshuffle_question(question: &Question) -> Question {
    let correct = question.correct_text().to_string();
    let mut options = question.options.clone();
    options.shuffle(&mut thread_rng());
    let correct_index = options
        .iter()
        .position(|opt| *opt == correct)
        .unwrap_or(0);
    Question {
        options,
        correct_index,
        ..question.clone()
    }
}

/// Post-filter applied when the caller asked for the "javascript" topic.
/// Falls back to the unfiltered batch when nothing matches, so topic bias
/// never empties out an otherwise usable result.
pub fn apply_topic_filter(batch: Vec<Question>, topic: Option<&str>) -> Vec<Question> {
    let wants_js = topic
        .map(|t| t.eq_ignore_ascii_case("javascript"))
        .unwrap_or(false);
    if !wants_js {
        return batch;
    }

    let filtered: Vec<Question> = batch
        .iter()
        .filter(|q| {
            let haystack = format!("{} {}", q.prompt, q.topic);
            JS_TOPIC_RE.is_match(&haystack)
        })
        .cloned()
        .collect();

    if filtered.is_empty() {
        tracing::debug!("No JS-specific questions found; using general results");
        batch
    } else {
        tracing::debug!(
            filtered.count = filtered.len(),
            "Filtered batch to JS-related questions"
        );
        filtered
    }
}
