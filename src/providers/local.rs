use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::sync::Arc;

use crate::content::{LocalPoolCache, Question};
use crate::providers::{FetchOutcome, FetchRequest, QuestionProvider, reshuffle_question};

/// Provider backed by the bundled/local question pool. Last link in the
/// fallback chain, and the only one that never hard-fails.
pub struct LocalPoolProvider {
    pool: Arc<LocalPoolCache>,
}

fn filter_matches(value: &str, wanted: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(w) if w.eq_ignore_ascii_case("all") => true,
        Some(w) => value.eq_ignore_ascii_case(w),
    }
}

impl LocalPoolProvider {
    pub fn new(pool: Arc<LocalPoolCache>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionProvider for LocalPoolProvider {
    fn name(&self) -> &'static str {
        "local_pool"
    }

    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let snapshot = self.pool.questions().await;
        let amount = request.clamped_amount();

        let mut selected: Vec<Question> = snapshot
            .iter()
            .filter(|q| {
                filter_matches(&q.topic, request.topic.as_deref())
                    && filter_matches(&q.difficulty, request.difficulty.as_deref())
            })
            .map(reshuffle_question)
            .collect();

        selected.shuffle(&mut thread_rng());
        selected.truncate(amount);

        tracing::debug!(
            pool.total = snapshot.len(),
            selected.count = selected.len(),
            request.topic = ?request.topic,
            request.difficulty = ?request.difficulty,
            "Selected questions from local pool"
        );

        FetchOutcome::from_batch(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolConfig, PoolSourceType};

    async fn bundled_pool() -> Arc<LocalPoolCache> {
        let config = PoolConfig {
            source_type: PoolSourceType::Bundled,
            file_path: None,
            http_url: None,
        };
        Arc::new(LocalPoolCache::new(config).await.unwrap())
    }

    #[tokio::test]
    async fn filters_by_topic_and_difficulty() {
        let provider = LocalPoolProvider::new(bundled_pool().await);
        let request = FetchRequest {
            amount: 50,
            topic: Some("science".to_string()),
            difficulty: Some("easy".to_string()),
            ..Default::default()
        };
        let questions = provider.fetch(&request).await.into_questions().unwrap();
        assert!(!questions.is_empty());
        for q in &questions {
            assert_eq!(q.topic, "science");
            assert_eq!(q.difficulty, "easy");
        }
    }

    #[tokio::test]
    async fn all_sentinel_disables_the_filter() {
        let provider = LocalPoolProvider::new(bundled_pool().await);
        let request = FetchRequest {
            amount: 50,
            topic: Some("all".to_string()),
            difficulty: Some("all".to_string()),
            ..Default::default()
        };
        let questions = provider.fetch(&request).await.into_questions().unwrap();
        assert!(questions.len() >= 10);
    }

    #[tokio::test]
    async fn unknown_topic_yields_empty_outcome() {
        let provider = LocalPoolProvider::new(bundled_pool().await);
        let request = FetchRequest {
            amount: 10,
            topic: Some("underwater-basket-weaving".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            provider.fetch(&request).await,
            FetchOutcome::Empty
        ));
    }

    #[tokio::test]
    async fn options_are_reshuffled_with_correct_text_preserved() {
        let provider = LocalPoolProvider::new(bundled_pool().await);
        let request = FetchRequest {
            amount: 50,
            ..Default::default()
        };
        let questions = provider.fetch(&request).await.into_questions().unwrap();
        for q in &questions {
            assert!(q.options.len() >= 2);
            assert!(q.correct_index < q.options.len());
        }
    }
}
