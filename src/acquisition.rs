use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProvidersConfig, SessionConfig};
use crate::content::{LocalPoolCache, Question, QuestionOrigin};
use crate::providers::{
    FetchOutcome, FetchRequest, LocalPoolProvider, OpenTriviaProvider, QuestionProvider,
    QuizApiProvider,
};

/// What the caller asks the chain for. Topic/difficulty use None or "all" as
/// "no constraint"; `category` is an opaque id for the primary provider.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionRequest {
    pub amount: u8,
    pub topic: Option<String>,
    pub difficulty: Option<String>,
    pub category: Option<String>,
}

/// Outcome of a full walk of the chain. `degraded` flags that the widened
/// last-resort path was taken (or that nothing at all could be produced), so
/// the surface can warn while still starting whatever session is possible.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionReport {
    pub questions: Vec<Question>,
    pub origin: Option<QuestionOrigin>,
    pub degraded: bool,
}

/// Ordered fallback over question providers: primary remote, then the keyed
/// remote iff a credential is configured, then the local pool, then the local
/// pool with all filters widened. Advances on empty results and on hard
/// failures alike; never errors outward.
pub struct AcquisitionChain {
    remotes: Vec<Box<dyn QuestionProvider>>,
    local: Box<dyn QuestionProvider>,
    max_remote_amount: u8,
}

impl AcquisitionChain {
    pub fn from_settings(
        providers: &ProvidersConfig,
        session: &SessionConfig,
        pool: Arc<LocalPoolCache>,
    ) -> Self {
        let timeout = Duration::from_secs(providers.request_timeout_secs);
        let mut remotes: Vec<Box<dyn QuestionProvider>> = vec![Box::new(OpenTriviaProvider::new(
            providers.open_trivia_url.clone(),
            timeout,
        ))];

        match &providers.quiz_api_key {
            Some(key) if !key.is_empty() => {
                remotes.push(Box::new(QuizApiProvider::new(
                    providers.quiz_api_url.clone(),
                    key.clone(),
                    timeout,
                )));
            }
            _ => {
                tracing::info!("No quiz API key configured; keyed provider disabled");
            }
        }

        Self {
            remotes,
            local: Box::new(LocalPoolProvider::new(pool)),
            max_remote_amount: session.max_remote_amount,
        }
    }

    #[cfg(test)]
    fn with_providers(
        remotes: Vec<Box<dyn QuestionProvider>>,
        local: Box<dyn QuestionProvider>,
    ) -> Self {
        Self {
            remotes,
            local,
            max_remote_amount: 30,
        }
    }

    #[tracing::instrument(skip(self), fields(
        request.amount = request.amount,
        request.topic = ?request.topic,
        request.difficulty = ?request.difficulty
    ))]
    pub async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionReport {
        let normalized_difficulty = normalize_constraint(request.difficulty.as_deref());

        let remote_request = FetchRequest {
            amount: request.amount.min(self.max_remote_amount),
            category: request.category.clone(),
            difficulty: normalized_difficulty.clone(),
            answer_type: Some("multiple".to_string()),
            topic: request.topic.clone(),
        };

        for provider in &self.remotes {
            match provider.fetch(&remote_request).await {
                FetchOutcome::Batch(questions) => {
                    tracing::info!(
                        provider.name = provider.name(),
                        questions.count = questions.len(),
                        "Acquired questions from remote provider"
                    );
                    return report_from(questions, false);
                }
                FetchOutcome::Empty => {
                    tracing::debug!(
                        provider.name = provider.name(),
                        "Provider returned no questions; trying next"
                    );
                }
                FetchOutcome::Failed(reason) => {
                    tracing::warn!(
                        provider.name = provider.name(),
                        reason = %reason,
                        "Provider attempt failed; trying next"
                    );
                }
            }
        }

        let local_request = FetchRequest {
            amount: request.amount,
            difficulty: normalized_difficulty,
            topic: normalize_constraint(request.topic.as_deref()),
            ..Default::default()
        };

        if let FetchOutcome::Batch(questions) = self.local.fetch(&local_request).await {
            tracing::info!(
                questions.count = questions.len(),
                "Acquired questions from local pool"
            );
            return report_from(questions, false);
        }

        // Widen the filter once: ignore topic and difficulty entirely and
        // take a fresh shuffle of the whole pool.
        tracing::warn!("Filtered local pool was empty; widening filters for a last resort");
        let widened = FetchRequest {
            amount: request.amount,
            ..Default::default()
        };

        match self.local.fetch(&widened).await {
            FetchOutcome::Batch(questions) => report_from(questions, true),
            _ => {
                tracing::error!("Local pool is empty; no playable questions acquired");
                AcquisitionReport {
                    questions: Vec::new(),
                    origin: None,
                    degraded: true,
                }
            }
        }
    }
}

fn report_from(questions: Vec<Question>, degraded: bool) -> AcquisitionReport {
    let origin = questions.first().map(|q| q.origin);
    AcquisitionReport {
        questions,
        origin,
        degraded,
    }
}

fn normalize_constraint(value: Option<&str>) -> Option<String> {
    match value {
        None => None,
        Some(v) if v.eq_ignore_ascii_case("all") || v.is_empty() => None,
        Some(v) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubProvider {
        name: &'static str,
        outcome: FetchOutcome,
    }

    #[async_trait]
    impl QuestionProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _request: &FetchRequest) -> FetchOutcome {
            self.outcome.clone()
        }
    }

    /// Local stub that honors the topic filter so widening is observable.
    struct FilteringLocalStub;

    #[async_trait]
    impl QuestionProvider for FilteringLocalStub {
        fn name(&self) -> &'static str {
            "local_pool"
        }

        async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
            if request.topic.is_some() {
                FetchOutcome::Empty
            } else {
                FetchOutcome::Batch(vec![local_question("widened")])
            }
        }
    }

    fn local_question(prompt: &str) -> Question {
        Question {
            id: 1,
            prompt: prompt.to_string(),
            options: vec!["a".to_string(), "b".to_string()],
            correct_index: 0,
            topic: "general".to_string(),
            difficulty: "easy".to_string(),
            origin: QuestionOrigin::LocalPool,
        }
    }

    fn remote_question() -> Question {
        Question {
            origin: QuestionOrigin::OpenTrivia,
            ..local_question("remote")
        }
    }

    #[tokio::test]
    async fn first_provider_with_questions_wins() {
        let chain = AcquisitionChain::with_providers(
            vec![Box::new(StubProvider {
                name: "open_trivia",
                outcome: FetchOutcome::Batch(vec![remote_question()]),
            })],
            Box::new(StubProvider {
                name: "local_pool",
                outcome: FetchOutcome::Batch(vec![local_question("local")]),
            }),
        );
        let report = chain.acquire(&AcquisitionRequest::default()).await;
        assert_eq!(report.origin, Some(QuestionOrigin::OpenTrivia));
        assert!(!report.degraded);
    }

    #[tokio::test]
    async fn empty_primary_without_credential_falls_back_to_local_pool() {
        let chain = AcquisitionChain::with_providers(
            vec![Box::new(StubProvider {
                name: "open_trivia",
                outcome: FetchOutcome::Empty,
            })],
            Box::new(StubProvider {
                name: "local_pool",
                outcome: FetchOutcome::Batch(vec![local_question("local")]),
            }),
        );
        let report = chain.acquire(&AcquisitionRequest::default()).await;
        assert_eq!(report.origin, Some(QuestionOrigin::LocalPool));
        assert!(!report.degraded);
        assert!(
            report
                .questions
                .iter()
                .all(|q| q.origin == QuestionOrigin::LocalPool)
        );
    }

    #[tokio::test]
    async fn hard_failure_advances_the_chain_like_empty() {
        let chain = AcquisitionChain::with_providers(
            vec![
                Box::new(StubProvider {
                    name: "open_trivia",
                    outcome: FetchOutcome::Failed("connection refused".to_string()),
                }),
                Box::new(StubProvider {
                    name: "quiz_api",
                    outcome: FetchOutcome::Batch(vec![Question {
                        origin: QuestionOrigin::QuizApi,
                        ..local_question("keyed")
                    }]),
                }),
            ],
            Box::new(StubProvider {
                name: "local_pool",
                outcome: FetchOutcome::Empty,
            }),
        );
        let report = chain.acquire(&AcquisitionRequest::default()).await;
        assert_eq!(report.origin, Some(QuestionOrigin::QuizApi));
    }

    #[tokio::test]
    async fn widens_filters_once_and_reports_degraded() {
        let chain = AcquisitionChain::with_providers(
            vec![Box::new(StubProvider {
                name: "open_trivia",
                outcome: FetchOutcome::Empty,
            })],
            Box::new(FilteringLocalStub),
        );
        let request = AcquisitionRequest {
            amount: 5,
            topic: Some("nonexistent".to_string()),
            ..Default::default()
        };
        let report = chain.acquire(&request).await;
        assert!(report.degraded);
        assert_eq!(report.questions.len(), 1);
        assert_eq!(report.questions[0].prompt, "widened");
    }

    #[tokio::test]
    async fn totally_empty_world_reports_degraded_with_no_questions() {
        let chain = AcquisitionChain::with_providers(
            vec![Box::new(StubProvider {
                name: "open_trivia",
                outcome: FetchOutcome::Failed("down".to_string()),
            })],
            Box::new(StubProvider {
                name: "local_pool",
                outcome: FetchOutcome::Empty,
            }),
        );
        let report = chain.acquire(&AcquisitionRequest::default()).await;
        assert!(report.degraded);
        assert!(report.questions.is_empty());
        assert!(report.origin.is_none());
    }
}
