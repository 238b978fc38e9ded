use crate::config::{PoolConfig, PoolSourceType};
use crate::error::{PoolError, Result as AppResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pool shipped inside the binary, used when no file/http source is configured.
const BUNDLED_POOL: &str = include_str!("../data/local_pool.json");

/// Where a question was acquired from. Sessions keep this so the fallback
/// behaviour stays observable after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOrigin {
    OpenTrivia,
    QuizApi,
    LocalPool,
}

/// Canonical question record every provider normalizes into.
///
/// `correct_index` points into `options` as built here; any later reshuffle
/// must recompute the correct answer from its text, never from this index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub topic: String,
    pub difficulty: String,
    pub origin: QuestionOrigin,
}

impl Question {
    pub fn correct_text(&self) -> &str {
        &self.options[self.correct_index]
    }
}

// Raw shapes of the local pool document.
#[derive(Debug, Clone, Deserialize)]
struct PoolQuestion {
    prompt: String,
    options: Vec<String>,
    answer: usize,
    #[serde(default = "default_topic")]
    topic: String,
    #[serde(default = "default_difficulty")]
    difficulty: String,
}

fn default_topic() -> String {
    "general".to_string()
}

fn default_difficulty() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct PoolDocument {
    questions: Vec<PoolQuestion>,
}

pub struct PoolParser;

impl PoolParser {
    /// Parse a pool document, dropping malformed entries rather than failing
    /// the whole load.
    #[tracing::instrument(skip(content), fields(content.length = content.len()))]
    pub fn parse(content: &str) -> Result<Vec<Question>, PoolError> {
        let document: PoolDocument = serde_json::from_str(content)
            .map_err(|e| PoolError::Parse(format!("Failed to parse pool JSON: {}", e)))?;

        let total = document.questions.len();
        let questions: Vec<Question> = document
            .questions
            .into_iter()
            .enumerate()
            .filter_map(|(idx, raw)| {
                if raw.options.len() < 2 {
                    tracing::warn!(
                        question.index = idx,
                        options.count = raw.options.len(),
                        "Dropping pool question with fewer than two options"
                    );
                    return None;
                }
                if raw.answer >= raw.options.len() {
                    tracing::warn!(
                        question.index = idx,
                        answer.index = raw.answer,
                        "Dropping pool question with out-of-range answer index"
                    );
                    return None;
                }
                Some(Question {
                    id: idx as u32 + 1,
                    prompt: raw.prompt,
                    options: raw.options,
                    correct_index: raw.answer,
                    topic: raw.topic.to_lowercase(),
                    difficulty: raw.difficulty,
                    origin: QuestionOrigin::LocalPool,
                })
            })
            .collect();

        if questions.len() < total {
            tracing::warn!(
                dropped.count = total - questions.len(),
                "Some pool questions were malformed and dropped"
            );
        }

        Ok(questions)
    }
}

#[tracing::instrument(skip(config), fields(
    pool.source_type = ?config.source_type,
    pool.file_path = ?config.file_path,
    pool.http_url = ?config.http_url
))]
async fn load_raw_pool(config: &PoolConfig) -> Result<String, PoolError> {
    match config.source_type {
        PoolSourceType::Bundled => Ok(BUNDLED_POOL.to_string()),
        PoolSourceType::File => {
            let file_path = config
                .file_path
                .as_ref()
                .ok_or_else(|| PoolError::Config("File path required for file source".to_string()))?;
            tracing::debug!(file.path = %file_path, "Loading pool from file");
            tokio::fs::read_to_string(file_path)
                .await
                .map_err(|e| PoolError::FileRead {
                    path: file_path.clone(),
                    source: e,
                })
        }
        PoolSourceType::Http => {
            let url = config
                .http_url
                .as_ref()
                .ok_or_else(|| PoolError::Config("HTTP URL required for http source".to_string()))?;
            tracing::debug!(http.url = %url, "Fetching pool from URL");
            let response = reqwest::get(url).await.map_err(|e| PoolError::HttpFetch {
                url: url.clone(),
                source: e,
            })?;
            response.text().await.map_err(|e| PoolError::HttpFetch {
                url: url.clone(),
                source: e,
            })
        }
    }
}

/// Cached snapshot of the bundled/local question pool, refreshable at runtime.
pub struct LocalPoolCache {
    questions: RwLock<Arc<Vec<Question>>>,
    pool_config: PoolConfig,
}

impl LocalPoolCache {
    pub async fn new(config: PoolConfig) -> AppResult<Self> {
        let raw = load_raw_pool(&config).await?;
        let initial = PoolParser::parse(&raw)?;
        tracing::info!(
            pool.questions.count = initial.len(),
            "LocalPoolCache initialized"
        );
        Ok(Self {
            questions: RwLock::new(Arc::new(initial)),
            pool_config: config,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> AppResult<()> {
        let raw = load_raw_pool(&self.pool_config).await?;
        let parsed = PoolParser::parse(&raw)?;
        let mut guard = self.questions.write().await;
        *guard = Arc::new(parsed);
        tracing::info!(
            pool.questions.count = guard.len(),
            "Refreshed local question pool"
        );
        Ok(())
    }

    pub async fn questions(&self) -> Arc<Vec<Question>> {
        self.questions.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pool_document_and_lowercases_topics() {
        let content = r#"{
  "questions": [
    {
      "prompt": "Which keyword declares a block-scoped variable in JavaScript?",
      "options": ["var", "let", "def", "dim"],
      "answer": 1,
      "topic": "JavaScript",
      "difficulty": "easy"
    }
  ]
}"#;
        let questions = PoolParser::parse(content).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].topic, "javascript");
        assert_eq!(questions[0].correct_text(), "let");
        assert_eq!(questions[0].origin, QuestionOrigin::LocalPool);
    }

    #[test]
    fn drops_malformed_entries_but_keeps_the_rest() {
        let content = r#"{
  "questions": [
    { "prompt": "Only one option", "options": ["alone"], "answer": 0 },
    { "prompt": "Answer out of range", "options": ["a", "b"], "answer": 5 },
    { "prompt": "Fine", "options": ["yes", "no"], "answer": 0 }
  ]
}"#;
        let questions = PoolParser::parse(content).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].prompt, "Fine");
    }

    #[test]
    fn bundled_pool_parses_with_enough_questions() {
        let questions = PoolParser::parse(BUNDLED_POOL).unwrap();
        assert!(questions.len() >= 10);
        for q in questions.iter() {
            assert!(q.options.len() >= 2);
            assert!(q.correct_index < q.options.len());
        }
    }
}
